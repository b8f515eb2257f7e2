//! On-disk layout of the key vault.
//!
//! Every vault starts with the `KHLD` magic and a version byte; the rest is
//! owned by the version module. The sealed key table is opaque here.

use anyhow::{Result, bail};

use crate::crypto::{KdfParams, NONCE_LEN, SALT_LEN};

pub mod v1;

pub const MAGIC: &[u8; 4] = b"KHLD";
pub const MAGIC_LEN: usize = MAGIC.len();
pub const VER_LEN: usize = 1;
pub const CURRENT_VERSION: u8 = v1::VERSION_V1;

/// Header fields kept in the clear, plus the sealed key table.
#[derive(Debug)]
pub(crate) struct VaultFile {
    pub version: u8,
    pub kdf: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl VaultFile {
    /// A vault record in the current format version.
    pub fn current(
        kdf: KdfParams,
        salt: [u8; SALT_LEN],
        nonce: [u8; NONCE_LEN],
        ciphertext: Vec<u8>,
    ) -> Self {
        VaultFile {
            version: CURRENT_VERSION,
            kdf,
            salt,
            nonce,
            ciphertext,
        }
    }
}

/// Reads a vault file of any supported version.
pub fn parse(data: &[u8]) -> Result<VaultFile> {
    let Some((magic, rest)) = data.split_first_chunk::<MAGIC_LEN>() else {
        bail!("vault file too short");
    };
    if magic != MAGIC {
        bail!("not a keyhold vault file");
    }

    match rest.first() {
        Some(&v1::VERSION_V1) => v1::parse(data),
        Some(other) => bail!("unsupported vault version: {other}"),
        None => bail!("vault file too short"),
    }
}

pub fn serialize(file: &VaultFile) -> Result<Vec<u8>> {
    if file.version != v1::VERSION_V1 {
        bail!("unsupported vault version: {}", file.version);
    }
    Ok(v1::serialize(file))
}
