//! ECMA-376 Agile encryption: AES-CBC primitive, iterated SHA-512 key
//! derivation, and the encryptor/decryptor pipeline built on top of them.

mod agile;
mod aescbc;
mod keyderivation;

pub use agile::{decrypt_agile, encrypt_agile, AgileEnvelope};
pub use aescbc::AesCbc;
pub use keyderivation::{derive_block_key, hash_password, BLOCK_KEY_ENCRYPTED_KEY, BLOCK_KEY_VERIFIER_INPUT, BLOCK_KEY_VERIFIER_VALUE};

/// The AES key length an [`EncryptionOptions`] requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Aes128,
    Aes256,
}

impl Algorithm {
    pub fn key_bits(self) -> u32 {
        match self {
            Algorithm::Aes128 => 128,
            Algorithm::Aes256 => 256,
        }
    }

    pub fn key_bytes(self) -> usize {
        (self.key_bits() / 8) as usize
    }
}

/// Parameters for encrypting a workbook with [`crate::model::Workbook::save_encrypted`].
#[derive(Debug, Clone)]
pub struct EncryptionOptions {
    pub algorithm: Algorithm,
    pub password: String,
    pub spin_count: u32,
}

impl EncryptionOptions {
    pub fn new(password: impl Into<String>) -> Self {
        EncryptionOptions {
            algorithm: Algorithm::Aes256,
            password: password.into(),
            spin_count: 100_000,
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_spin_count(mut self, spin_count: u32) -> Self {
        self.spin_count = spin_count;
        self
    }
}
