//! The fixed `DataSpaces`/`EncryptionInfo`/`EncryptedPackage` stream tree
//! that wraps an Agile-encrypted OOXML package inside a CFB container.
//!
//! The `DataSpaces` stream bodies are protocol constants (MS-OFFCRYPTO
//! §2.3.4.5-2.3.4.8): a fixed length-prefixed-Unicode-string / version-number
//! encoding, not anything this crate's writer chooses.

use crate::error::Result;

use super::writer::CfbWriter;

fn write_unicode_lpp4(buf: &mut Vec<u8>, s: &str) {
    let mut bytes = Vec::with_capacity(s.len() * 2);
    for ch in s.encode_utf16() {
        bytes.extend_from_slice(&ch.to_le_bytes());
    }
    let len = bytes.len() as u32;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&bytes);
    if len % 4 == 2 {
        buf.extend_from_slice(&0u16.to_le_bytes());
    }
}

fn write_utf8_lpp4_null(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
}

fn build_dataspace_map_stream() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&8u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());

    let entry_start = buf.len();
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    write_unicode_lpp4(&mut buf, "EncryptedPackage");
    write_unicode_lpp4(&mut buf, "StrongEncryptionDataSpace");
    let entry_len = (buf.len() - entry_start) as u32;
    buf[entry_start..entry_start + 4].copy_from_slice(&entry_len.to_le_bytes());

    buf
}

fn build_dataspace_definition_stream() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&8u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    write_unicode_lpp4(&mut buf, "StrongEncryptionTransform");
    buf
}

fn build_transform_primary_stream() -> Vec<u8> {
    let mut buf = Vec::new();

    let header_start = buf.len();
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    write_unicode_lpp4(&mut buf, "{FF9A3F03-56EF-4613-BDD5-5A41C1D07246}");
    let header_len = (buf.len() - header_start) as u32;
    buf[header_start..header_start + 4].copy_from_slice(&header_len.to_le_bytes());

    write_unicode_lpp4(&mut buf, "Microsoft.Container.EncryptionTransform");
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());

    buf.extend_from_slice(&0u32.to_le_bytes());
    write_utf8_lpp4_null(&mut buf);
    buf.extend_from_slice(&4u32.to_le_bytes());

    buf
}

fn build_dataspace_version_stream() -> Vec<u8> {
    let mut buf = Vec::new();
    write_unicode_lpp4(&mut buf, "Microsoft.Container.DataSpaces");
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf
}

/// Builds the complete CFB container bytes for an encrypted OOXML package:
/// `EncryptionInfo`, `EncryptedPackage`, and the `DataSpaces` storage tree
/// that declares the `StrongEncryptionTransform` applied to it.
pub fn build_encrypted_package_cfb(encryption_info: &[u8], encrypted_package: &[u8]) -> Result<Vec<u8>> {
    let dataspace_map = build_dataspace_map_stream();
    let dataspace_def = build_dataspace_definition_stream();
    let transform_primary = build_transform_primary_stream();
    let dataspace_version = build_dataspace_version_stream();

    let ds_root = "\u{0006}DataSpaces";

    let mut writer = CfbWriter::new();
    writer.create_stream(&["EncryptionInfo"], encryption_info);
    writer.create_stream_forced_large(&["EncryptedPackage"], encrypted_package);

    writer.create_storage(&[ds_root]);
    writer.create_storage(&[ds_root, "DataSpaceInfo"]);
    writer.create_storage(&[ds_root, "TransformInfo"]);
    writer.create_storage(&[ds_root, "TransformInfo", "StrongEncryptionTransform"]);

    writer.create_stream(&[ds_root, "DataSpaceMap"], &dataspace_map);
    writer.create_stream(
        &[ds_root, "DataSpaceInfo", "StrongEncryptionDataSpace"],
        &dataspace_def,
    );
    writer.create_stream(
        &[
            ds_root,
            "TransformInfo",
            "StrongEncryptionTransform",
            "\u{0006}Primary",
        ],
        &transform_primary,
    );
    writer.create_stream(&[ds_root, "Version"], &dataspace_version);

    writer.build()
}
