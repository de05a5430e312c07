//! A from-scratch Compound File Binary (MS-CFB) reader and writer, used to
//! carry an ECMA-376 Agile encrypted package the way Office itself does:
//! `EncryptionInfo` and `EncryptedPackage` streams under a `DataSpaces`
//! storage tree.

pub mod consts;
pub mod dataspaces;
pub mod difat;
pub mod directory;
pub mod fat;
pub mod header;
pub mod minifat;
pub mod reader;
pub mod writer;

pub use dataspaces::build_encrypted_package_cfb;
pub use reader::{is_cfb_file, CfbReader, DirectoryEntry};
pub use writer::CfbWriter;
