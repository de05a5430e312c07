//! AES-CBC-no-padding primitive with caller-supplied IVs and implicit
//! zero-padding of short inputs.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// A prepared AES key ready to encrypt or decrypt under caller-supplied
/// 16-byte IVs. Holds no IV state itself.
pub struct AesCbc {
    key: Vec<u8>,
}

fn pad_to_block_multiple(data: &[u8]) -> Vec<u8> {
    let rem = data.len() % 16;
    if rem == 0 {
        return data.to_vec();
    }
    let mut out = data.to_vec();
    out.resize(data.len() + (16 - rem), 0);
    out
}

impl AesCbc {
    /// `key` must be 16, 24, or 32 bytes (AES-128/192/256).
    pub fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 | 24 | 32 => Ok(AesCbc { key: key.to_vec() }),
            other => Err(Error::UnsupportedAlgorithm(format!(
                "unsupported AES key length: {other} bytes"
            ))),
        }
    }

    /// Encrypts `plaintext` under `iv`, zero-padding to a 16-byte multiple
    /// first if needed. Returns ciphertext of the padded length.
    pub fn encrypt(&self, iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut buf = pad_to_block_multiple(plaintext);
        match self.key.len() {
            16 => {
                let enc = Aes128CbcEnc::new(self.key.as_slice().into(), iv.into());
                encrypt_in_place(enc, &mut buf)
            }
            24 => {
                let enc = Aes192CbcEnc::new(self.key.as_slice().into(), iv.into());
                encrypt_in_place(enc, &mut buf)
            }
            32 => {
                let enc = Aes256CbcEnc::new(self.key.as_slice().into(), iv.into());
                encrypt_in_place(enc, &mut buf)
            }
            _ => unreachable!("validated in new()"),
        }
        Ok(buf)
    }

    /// Decrypts `ciphertext` (must already be block-aligned) under `iv`.
    /// The caller is responsible for truncating any zero-padding using an
    /// externally tracked true length.
    pub fn decrypt(&self, iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() % 16 != 0 {
            return Err(Error::Parse(
                "CBC ciphertext length is not a multiple of the block size".to_string(),
            ));
        }
        let mut buf = ciphertext.to_vec();
        match self.key.len() {
            16 => {
                let dec = Aes128CbcDec::new(self.key.as_slice().into(), iv.into());
                decrypt_in_place(dec, &mut buf)
            }
            24 => {
                let dec = Aes192CbcDec::new(self.key.as_slice().into(), iv.into());
                decrypt_in_place(dec, &mut buf)
            }
            32 => {
                let dec = Aes256CbcDec::new(self.key.as_slice().into(), iv.into());
                decrypt_in_place(dec, &mut buf)
            }
            _ => unreachable!("validated in new()"),
        }
        Ok(buf)
    }
}

fn encrypt_in_place<C: BlockEncryptMut>(mut cipher: C, buf: &mut [u8]) {
    use aes::cipher::block_padding::NoPadding;
    cipher
        .encrypt_padded_mut::<NoPadding>(buf, buf.len())
        .expect("buffer is already block-aligned by pad_to_block_multiple");
}

fn decrypt_in_place<C: BlockDecryptMut>(mut cipher: C, buf: &mut [u8]) {
    use aes::cipher::block_padding::NoPadding;
    cipher
        .decrypt_padded_mut::<NoPadding>(buf)
        .expect("buffer length validated by caller");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_block_aligned_input() {
        let key = [0x42u8; 32];
        let iv = [0x11u8; 16];
        let cipher = AesCbc::new(&key).unwrap();
        let plaintext = b"0123456789abcdef0123456789abcdef";
        let ct = cipher.encrypt(&iv, plaintext).unwrap();
        let pt = cipher.decrypt(&iv, &ct).unwrap();
        assert_eq!(&pt[..plaintext.len()], plaintext);
    }

    #[test]
    fn zero_pads_short_input_to_block_multiple() {
        let key = [0x01u8; 16];
        let iv = [0x00u8; 16];
        let cipher = AesCbc::new(&key).unwrap();
        let ct = cipher.encrypt(&iv, b"short").unwrap();
        assert_eq!(ct.len(), 16);
    }

    #[test]
    fn rejects_unsupported_key_length() {
        assert!(AesCbc::new(&[0u8; 20]).is_err());
    }
}
