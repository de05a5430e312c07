//! Compound File Binary format constants (MS-CFB).

/// Magic bytes at the start of every CFB file.
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

pub const DIRENTRY_SIZE: usize = 128;

pub const SECTOR_SIZE_V3: usize = 512;
pub const SECTOR_SIZE_V4: usize = 4096;
pub const MINI_SECTOR_SIZE: usize = 64;
pub const MINI_STREAM_CUTOFF: u32 = 4096;

pub const MAXREGSECT: u32 = 0xFFFF_FFFA;
pub const DIFSECT: u32 = 0xFFFF_FFFC;
pub const FATSECT: u32 = 0xFFFF_FFFD;
pub const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
pub const FREESECT: u32 = 0xFFFF_FFFF;

pub const NOSTREAM: u32 = 0xFFFF_FFFF;

pub const STGTY_EMPTY: u8 = 0;
pub const STGTY_STORAGE: u8 = 1;
pub const STGTY_STREAM: u8 = 2;
pub const STGTY_ROOT: u8 = 5;
