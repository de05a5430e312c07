//! The Agile encryptor/decryptor pipeline: verifier, key wrap, and
//! segment-wise package encryption.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::xml::{attr, XmlEvent, XmlReader};

use super::aescbc::AesCbc;
use super::keyderivation::{
    derive_block_key, hash_password, BLOCK_KEY_ENCRYPTED_KEY, BLOCK_KEY_VERIFIER_INPUT,
    BLOCK_KEY_VERIFIER_VALUE,
};
use super::{Algorithm, EncryptionOptions};

const SEGMENT_SIZE: usize = 4096;
const VERSION_MAJOR: u16 = 4;
const VERSION_MINOR: u16 = 4;

/// The two streams the CFB container must carry for an encrypted package.
pub struct AgileEnvelope {
    pub encryption_info: Vec<u8>,
    pub encrypted_package: Vec<u8>,
}

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| Error::Other(format!("failed to generate random bytes: {e}")))?;
    Ok(buf)
}

/// Derives the 16-byte IV for Agile block `i`: the low 16 bytes of
/// `SHA-512(salt || LE32(i))`.
fn segment_iv(salt: &[u8], index: u32) -> [u8; 16] {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(index.to_le_bytes());
    let digest = hasher.finalize();
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    iv
}

/// Zero-pads `data` to a 16-byte multiple.
fn zero_pad(data: &[u8]) -> Vec<u8> {
    let rem = data.len() % 16;
    if rem == 0 {
        return data.to_vec();
    }
    let mut out = data.to_vec();
    out.resize(data.len() + (16 - rem), 0);
    out
}

/// Encrypts `plaintext` under the Agile envelope described by `options`.
pub fn encrypt_agile(plaintext: &[u8], options: &EncryptionOptions) -> Result<AgileEnvelope> {
    let key_bytes = options.algorithm.key_bytes();

    let salt_key: [u8; 16] = random_bytes()?; // S_key, the verifier salt
    let salt_data: [u8; 16] = random_bytes()?; // S_data, the package salt
    let mut content_key = vec![0u8; key_bytes];
    OsRng
        .try_fill_bytes(&mut content_key)
        .map_err(|e| Error::Other(format!("failed to generate content key: {e}")))?;

    let h_n = hash_password(&options.password, &salt_key, options.spin_count);
    let verifier_input_key = derive_block_key(&h_n, &BLOCK_KEY_VERIFIER_INPUT, key_bytes);
    let verifier_value_key = derive_block_key(&h_n, &BLOCK_KEY_VERIFIER_VALUE, key_bytes);
    let key_wrap_key = derive_block_key(&h_n, &BLOCK_KEY_ENCRYPTED_KEY, key_bytes);

    let verifier: [u8; 16] = random_bytes()?;
    let verifier_cipher = AesCbc::new(&verifier_input_key)?;
    let encrypted_verifier_hash_input = verifier_cipher.encrypt(&salt_key, &verifier)?;

    let verifier_digest = Sha512::digest(verifier);
    let value_cipher = AesCbc::new(&verifier_value_key)?;
    let encrypted_verifier_hash_value =
        value_cipher.encrypt(&salt_key, &zero_pad(&verifier_digest))?;

    let key_cipher = AesCbc::new(&key_wrap_key)?;
    let encrypted_key_value = key_cipher.encrypt(&salt_key, &zero_pad(&content_key))?;

    let encrypted_package = encrypt_package_segments(&content_key, &salt_data, plaintext)?;

    let xml = build_encryption_info_xml(
        options.algorithm,
        &salt_data,
        options.spin_count,
        &salt_key,
        &encrypted_verifier_hash_input,
        &encrypted_verifier_hash_value,
        &encrypted_key_value,
    );

    let mut encryption_info = Vec::with_capacity(8 + xml.len());
    encryption_info.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
    encryption_info.extend_from_slice(&VERSION_MINOR.to_le_bytes());
    encryption_info.extend_from_slice(&0u32.to_le_bytes()); // flags = 0
    encryption_info.extend_from_slice(xml.as_bytes());

    Ok(AgileEnvelope {
        encryption_info,
        encrypted_package,
    })
}

fn encrypt_package_segments(content_key: &[u8], salt_data: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(8 + plaintext.len() + 64);
    out.extend_from_slice(&(plaintext.len() as u64).to_le_bytes());

    let cipher = AesCbc::new(content_key)?;
    let mut offset = 0usize;
    let mut index = 0u32;
    loop {
        let end = (offset + SEGMENT_SIZE).min(plaintext.len());
        let segment = &plaintext[offset..end];
        let iv = segment_iv(salt_data, index);
        out.extend_from_slice(&cipher.encrypt(&iv, segment)?);
        if end == plaintext.len() {
            break;
        }
        offset = end;
        index += 1;
    }
    Ok(out)
}

fn build_encryption_info_xml(
    algorithm: Algorithm,
    salt_data: &[u8],
    spin_count: u32,
    salt_key: &[u8],
    encrypted_verifier_hash_input: &[u8],
    encrypted_verifier_hash_value: &[u8],
    encrypted_key_value: &[u8],
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption"
 xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
  <keyData saltSize="16" blockSize="16" keyBits="{key_bits}" hashSize="64"
           cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512"
           saltValue="{salt_data}"/>
  <keyEncryptors>
    <keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
      <p:encryptedKey spinCount="{spin}" saltSize="16" blockSize="16" keyBits="{key_bits}"
                      hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC"
                      hashAlgorithm="SHA512" saltValue="{salt_key}"
                      encryptedVerifierHashInput="{ever_in}" encryptedVerifierHashValue="{ever_val}"
                      encryptedKeyValue="{ekey}"/>
    </keyEncryptor>
  </keyEncryptors>
</encryption>"#,
        key_bits = algorithm.key_bits(),
        salt_data = BASE64.encode(salt_data),
        spin = spin_count,
        salt_key = BASE64.encode(salt_key),
        ever_in = BASE64.encode(encrypted_verifier_hash_input),
        ever_val = BASE64.encode(encrypted_verifier_hash_value),
        ekey = BASE64.encode(encrypted_key_value),
    )
}

struct ParsedEncryptionInfo {
    key_bits: u32,
    salt_data: Vec<u8>,
    spin_count: u32,
    salt_key: Vec<u8>,
    encrypted_verifier_hash_input: Vec<u8>,
    encrypted_verifier_hash_value: Vec<u8>,
    encrypted_key_value: Vec<u8>,
}

fn parse_encryption_info(encryption_info: &[u8]) -> Result<ParsedEncryptionInfo> {
    if encryption_info.len() < 8 {
        return Err(Error::Parse("EncryptionInfo stream too short".to_string()));
    }
    let major = u16::from_le_bytes([encryption_info[0], encryption_info[1]]);
    let minor = u16::from_le_bytes([encryption_info[2], encryption_info[3]]);
    if major != VERSION_MAJOR || minor != VERSION_MINOR {
        return Err(Error::UnsupportedEncryptionVersion { major, minor });
    }
    let xml = &encryption_info[8..];

    let mut key_bits = None;
    let mut salt_data = None;
    let mut spin_count = None;
    let mut salt_key = None;
    let mut ever_in = None;
    let mut ever_val = None;
    let mut ekey = None;

    let mut reader = XmlReader::new(xml);
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } => match name.as_str() {
                "keyData" => {
                    key_bits = attr(&attrs, "keyBits")
                        .and_then(|v| v.parse::<u32>().ok());
                    salt_data = attr(&attrs, "saltValue")
                        .map(|v| BASE64.decode(v))
                        .transpose()
                        .map_err(|e| Error::Parse(e.to_string()))?;
                }
                "encryptedKey" => {
                    spin_count = attr(&attrs, "spinCount")
                        .and_then(|v| v.parse::<u32>().ok());
                    salt_key = attr(&attrs, "saltValue")
                        .map(|v| BASE64.decode(v))
                        .transpose()
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    ever_in = attr(&attrs, "encryptedVerifierHashInput")
                        .map(|v| BASE64.decode(v))
                        .transpose()
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    ever_val = attr(&attrs, "encryptedVerifierHashValue")
                        .map(|v| BASE64.decode(v))
                        .transpose()
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    ekey = attr(&attrs, "encryptedKeyValue")
                        .map(|v| BASE64.decode(v))
                        .transpose()
                        .map_err(|e| Error::Parse(e.to_string()))?;
                }
                _ => {}
            },
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    Ok(ParsedEncryptionInfo {
        key_bits: key_bits.ok_or_else(|| Error::Parse("missing keyBits".to_string()))?,
        salt_data: salt_data.ok_or_else(|| Error::Parse("missing package saltValue".to_string()))?,
        spin_count: spin_count.ok_or_else(|| Error::Parse("missing spinCount".to_string()))?,
        salt_key: salt_key.ok_or_else(|| Error::Parse("missing key saltValue".to_string()))?,
        encrypted_verifier_hash_input: ever_in
            .ok_or_else(|| Error::Parse("missing encryptedVerifierHashInput".to_string()))?,
        encrypted_verifier_hash_value: ever_val
            .ok_or_else(|| Error::Parse("missing encryptedVerifierHashValue".to_string()))?,
        encrypted_key_value: ekey
            .ok_or_else(|| Error::Parse("missing encryptedKeyValue".to_string()))?,
    })
}

/// Returns the first `expected` bytes of `data`, or a parse error if it's
/// shorter. Guards against a crafted `EncryptionInfo` whose decrypted
/// verifier/key material is too short to slice at its fixed offsets.
fn require_len<'a>(data: &'a [u8], expected: usize, what: &str) -> Result<&'a [u8]> {
    if data.len() < expected {
        return Err(Error::Parse(format!(
            "{what} must be at least {expected} bytes, got {}",
            data.len()
        )));
    }
    Ok(&data[..expected])
}

/// Decrypts an Agile-encrypted package given its `EncryptionInfo` and
/// `EncryptedPackage` streams and the password.
pub fn decrypt_agile(encryption_info: &[u8], encrypted_package: &[u8], password: &str) -> Result<Vec<u8>> {
    let info = parse_encryption_info(encryption_info)?;
    let key_bytes = (info.key_bits / 8) as usize;

    let salt_key: [u8; 16] = info
        .salt_key
        .as_slice()
        .try_into()
        .map_err(|_| Error::Parse("key saltValue must be 16 bytes".to_string()))?;

    let h_n = hash_password(password, &salt_key, info.spin_count);
    let verifier_input_key = derive_block_key(&h_n, &BLOCK_KEY_VERIFIER_INPUT, key_bytes);
    let verifier_value_key = derive_block_key(&h_n, &BLOCK_KEY_VERIFIER_VALUE, key_bytes);
    let key_wrap_key = derive_block_key(&h_n, &BLOCK_KEY_ENCRYPTED_KEY, key_bytes);

    let verifier = AesCbc::new(&verifier_input_key)?.decrypt(&salt_key, &info.encrypted_verifier_hash_input)?;
    let verifier = require_len(&verifier, 16, "decrypted verifier hash input")?;
    let verifier_hash = AesCbc::new(&verifier_value_key)?.decrypt(&salt_key, &info.encrypted_verifier_hash_value)?;
    let verifier_hash = require_len(&verifier_hash, 64, "decrypted verifier hash value")?;

    let computed = Sha512::digest(verifier);
    if computed.as_slice().ct_eq(verifier_hash).unwrap_u8() != 1 {
        return Err(Error::IncorrectPassword);
    }

    let content_key_padded = AesCbc::new(&key_wrap_key)?.decrypt(&salt_key, &info.encrypted_key_value)?;
    let content_key = require_len(&content_key_padded, key_bytes, "decrypted content key")?.to_vec();

    decrypt_package_segments(&content_key, &info.salt_data, encrypted_package)
}

fn decrypt_package_segments(content_key: &[u8], salt_data: &[u8], encrypted_package: &[u8]) -> Result<Vec<u8>> {
    if encrypted_package.len() < 8 {
        return Err(Error::Parse("EncryptedPackage stream too short".to_string()));
    }
    let plaintext_len = u64::from_le_bytes(encrypted_package[..8].try_into().unwrap()) as usize;
    let ciphertext = &encrypted_package[8..];

    let cipher = AesCbc::new(content_key)?;
    let mut out = Vec::with_capacity(plaintext_len);
    let mut offset = 0usize;
    let mut index = 0u32;
    while out.len() < plaintext_len {
        let plain_remaining = plaintext_len - out.len();
        let segment_plain_len = SEGMENT_SIZE.min(plain_remaining);
        let aligned_len = segment_plain_len + ((16 - segment_plain_len % 16) % 16);
        if offset + aligned_len > ciphertext.len() {
            return Err(Error::Parse(
                "EncryptedPackage stream shorter than declared length".to_string(),
            ));
        }
        let segment = &ciphertext[offset..offset + aligned_len];
        let iv = segment_iv(salt_data, index);
        let plain = cipher.decrypt(&iv, segment)?;
        out.extend_from_slice(&plain[..segment_plain_len]);
        offset += aligned_len;
        index += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_short_plaintext() {
        let options = EncryptionOptions::new("hunter2").with_spin_count(100);
        let envelope = encrypt_agile(b"hello world", &options).unwrap();
        let plain = decrypt_agile(
            &envelope.encryption_info,
            &envelope.encrypted_package,
            "hunter2",
        )
        .unwrap();
        assert_eq!(plain, b"hello world");
    }

    #[test]
    fn round_trips_multi_segment_plaintext() {
        let options = EncryptionOptions::new("p@ss").with_spin_count(50);
        let data: Vec<u8> = (0..SEGMENT_SIZE * 2 + 123).map(|i| (i % 256) as u8).collect();
        let envelope = encrypt_agile(&data, &options).unwrap();
        let plain = decrypt_agile(&envelope.encryption_info, &envelope.encrypted_package, "p@ss").unwrap();
        assert_eq!(plain, data);
    }

    #[test]
    fn wrong_password_fails() {
        let options = EncryptionOptions::new("right").with_spin_count(20);
        let envelope = encrypt_agile(b"secret data", &options).unwrap();
        let err = decrypt_agile(&envelope.encryption_info, &envelope.encrypted_package, "wrong").unwrap_err();
        assert!(matches!(err, Error::IncorrectPassword));
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let options = EncryptionOptions::new("pw").with_spin_count(10);
        let envelope = encrypt_agile(b"", &options).unwrap();
        let plain = decrypt_agile(&envelope.encryption_info, &envelope.encrypted_package, "pw").unwrap();
        assert!(plain.is_empty());
    }

    /// A crafted `EncryptionInfo` whose `encryptedVerifierHashInput` decrypts
    /// to zero bytes (still block-aligned, so `AesCbc::decrypt` accepts it)
    /// must return a parse error rather than panicking on a fixed-size slice.
    #[test]
    fn truncated_verifier_hash_input_is_a_parse_error_not_a_panic() {
        let options = EncryptionOptions::new("pw").with_spin_count(10);
        let envelope = encrypt_agile(b"data", &options).unwrap();

        let xml = String::from_utf8(envelope.encryption_info[8..].to_vec()).unwrap();
        let needle = "encryptedVerifierHashInput=\"";
        let start = xml.find(needle).unwrap() + needle.len();
        let end = start + xml[start..].find('"').unwrap();
        let corrupted_xml = format!("{}{}", &xml[..start], &xml[end..]);

        let mut corrupted_info = envelope.encryption_info[..8].to_vec();
        corrupted_info.extend_from_slice(corrupted_xml.as_bytes());

        let err = decrypt_agile(&corrupted_info, &envelope.encrypted_package, "pw").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
