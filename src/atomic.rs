//! Crash-safe whole-file persistence shared by the vault and the file substrate.

use anyhow::{Context, Result, anyhow};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// A file that is only ever replaced as a whole.
///
/// Writers never leave a partially written file behind: either the previous
/// contents or the new contents are on disk after a crash.
#[derive(Debug, Clone)]
pub struct AtomicFile {
    path: PathBuf,
}

impl AtomicFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).with_context(|| format!("failed to read {}", self.path.display()))
    }

    /// Like [`load`](Self::load), but a missing file is `None`.
    pub fn load_if_exists(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    /// Replaces the file contents, creating parent directories as needed.
    ///
    /// The data goes to a synced sibling temp file that is then moved over
    /// the target. On Unix the parent directory is synced afterwards so the
    /// rename itself survives a crash.
    pub fn save(&self, data: &[u8]) -> Result<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let tmp_path = self.write_temp(data)?;
        self.atomic_replace(&tmp_path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp_path);
        })?;

        // The new contents are committed at this point; a failed directory
        // sync only weakens durability and must not report the write as lost.
        #[cfg(not(target_os = "windows"))]
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            warn!(dir = %dir.display(), error = %e, "directory sync after replace failed");
        }

        Ok(())
    }

    /// Directory holding the file; `.` for a bare file name.
    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn write_temp(&self, data: &[u8]) -> Result<PathBuf> {
        let tmp_path = self.random_tmp_path()?;
        let mut tmp = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;

        if let Err(e) = tmp.write_all(data).and_then(|()| tmp.sync_all()) {
            drop(tmp);
            let _ = fs::remove_file(&tmp_path);
            return Err(e).context("failed to write temporary file");
        }
        Ok(tmp_path)
    }

    /// `<name>.<16 hex digits>.tmp` in the target's directory.
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut bytes = [0u8; 8];
        fill(&mut bytes).map_err(|_| anyhow!("OS random generator unavailable"))?;

        let name = self
            .path
            .file_name()
            .with_context(|| format!("{} has no file name", self.path.display()))?
            .to_string_lossy();

        Ok(self
            .path
            .with_file_name(format!("{name}.{:016x}.tmp", u64::from_le_bytes(bytes))))
    }

    /// `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH` when the target exists;
    /// it refuses to replace a missing file, so first writes fall back to a
    /// plain rename.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call;
        // Windows does not retain the pointers.
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context("atomic replace failed");
        }

        Ok(())
    }

    /// On Unix, `rename()` is atomic within one filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}
