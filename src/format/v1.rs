//! Vault format v1.
//!
//! ```text
//! MAGIC (4) | VERSION (1) | MEM_COST (4) | TIME_COST (4) | PARALLELISM (4) | SALT (16) | NONCE (24) | CIPHERTEXT
//! ```
//!
//! Integers are little-endian.

use anyhow::{Context, Result, bail};

use super::{MAGIC, MAGIC_LEN, VER_LEN, VaultFile};
use crate::crypto::{KdfParams, NONCE_LEN, SALT_LEN};

pub const VERSION_V1: u8 = 1;

const U32_LEN: usize = 4;

pub const HEADER_LEN: usize = MAGIC_LEN + VER_LEN + 3 * U32_LEN + SALT_LEN + NONCE_LEN;

/// Sequential reader over the fixed-size header fields.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.offset + N;
        let bytes: [u8; N] = self
            .data
            .get(self.offset..end)
            .context("vault header truncated")?
            .try_into()?;
        self.offset = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take::<U32_LEN>()?))
    }

    fn rest(self) -> &'a [u8] {
        &self.data[self.offset..]
    }
}

pub fn parse(data: &[u8]) -> Result<VaultFile> {
    if data.len() < HEADER_LEN {
        bail!("vault file too short for v1");
    }

    let mut cursor = Cursor {
        data,
        offset: MAGIC_LEN + VER_LEN,
    };

    let mem_cost = cursor.u32()?;
    let time_cost = cursor.u32()?;
    let parallelism = cursor.u32()?;
    let salt = cursor.take::<SALT_LEN>()?;
    let nonce = cursor.take::<NONCE_LEN>()?;

    let kdf = KdfParams::new(mem_cost, time_cost, parallelism)
        .context("vault header carries invalid KDF parameters")?;

    Ok(VaultFile::current(kdf, salt, nonce, cursor.rest().to_vec()))
}

pub fn serialize(file: &VaultFile) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + file.ciphertext.len());
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);
    for field in [
        file.kdf.mem_cost_kib(),
        file.kdf.time_cost(),
        file.kdf.parallelism(),
    ] {
        buf.extend_from_slice(&field.to_le_bytes());
    }
    buf.extend_from_slice(&file.salt);
    buf.extend_from_slice(&file.nonce);
    buf.extend_from_slice(&file.ciphertext);
    buf
}
