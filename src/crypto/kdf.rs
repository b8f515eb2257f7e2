use anyhow::{Context, Result, anyhow};
use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::KEY_LEN;

const DEFAULT_MEM_COST_KIB: u32 = 64 * 1024;
const DEFAULT_TIME_COST: u32 = 3;
const DEFAULT_PARALLELISM: u32 = 1;

/// Argon2id cost parameters used to derive the vault key from a password.
/// Stored in the vault header so a vault always opens with the costs it was
/// created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams {
            mem_cost_kib: DEFAULT_MEM_COST_KIB,
            time_cost: DEFAULT_TIME_COST,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl KdfParams {
    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let kdf = KdfParams {
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        kdf.validate()?;
        Ok(kdf)
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    /// Checks the costs against argon2's own limits (memory of at least
    /// 8 KiB per lane, non-zero time and parallelism).
    pub fn validate(&self) -> Result<()> {
        self.argon2_params().map(drop)
    }

    fn argon2_params(&self) -> Result<Params> {
        Params::new(
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))
    }
}

/// Stretches `password` into a vault key with Argon2id v1.3.
pub fn derive_key(password: &str, salt: &[u8], kdf: KdfParams) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, kdf.argon2_params()?);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    hasher
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| anyhow!("{e}"))
        .context("argon2 key derivation failed")?;
    Ok(key)
}
