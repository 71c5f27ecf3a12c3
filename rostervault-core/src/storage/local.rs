/*!
Directory-backed key-value store.
*/

use super::{entry_size, KeyValueStore};
use crate::{Result, StoreError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Filesystem store keeping one file per key
///
/// Key names are percent-encoded into file names so namespaced keys such as
/// `nuzlocke-roster:team` are portable. Writes go to a temporary file in the
/// same directory which is then renamed over the target, so a failed write
/// never leaves a half-written record behind.
///
/// # Example
/// ```rust
/// use rostervault_core::storage::{FileStore, KeyValueStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = FileStore::new(dir.path());
/// store.set("nuzlocke-roster:team", "[]").unwrap();
/// assert_eq!(store.get("nuzlocke-roster:team").unwrap().as_deref(), Some("[]"));
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    quota: Option<usize>,
}

impl FileStore {
    /// Create a store rooted at `root`; the directory is created on first write
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            quota: None,
        }
    }

    /// Cap the bytes (key plus value) the store will hold
    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::unavailable("empty keys cannot be stored"));
        }
        Ok(self.root.join(encode_key(key)))
    }

    /// Ensure the root directory exists, creating it if necessary
    fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|e| {
                StoreError::from_io(
                    &format!("Failed to create directory {}", self.root.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// Decoded key and file size of every record file
    fn entries(&self) -> Result<Vec<(String, usize)>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::from_io(
                    &format!("Failed to list {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| StoreError::from_io("Failed to read entry", e))?;
            let file_name = entry.file_name();
            let Some(key) = file_name.to_str().and_then(decode_key) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len() as usize).unwrap_or(0);
            entries.push((key, size));
        }
        Ok(entries)
    }

    fn used_bytes(&self) -> Result<usize> {
        Ok(self
            .entries()?
            .iter()
            .map(|(key, size)| key.len() + size)
            .sum())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(StoreError::serialization(
                format!("Record {} is not valid UTF-8", path.display()),
            )),
            Err(e) => Err(StoreError::from_io(
                &format!("Failed to read {}", path.display()),
                e,
            )),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        self.ensure_root()?;

        if let Some(quota) = self.quota {
            let freed = fs::metadata(&path)
                .map(|m| key.len() + m.len() as usize)
                .unwrap_or(0);
            let needed = projected_usage(self.used_bytes()?, freed, entry_size(key, value));
            if needed > quota {
                return Err(StoreError::quota_exceeded(format!(
                    "setting '{key}' needs {needed} bytes, quota is {quota}"
                )));
            }
        }

        let context = format!("Failed to write {}", path.display());
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| StoreError::from_io(&context, e))?;
        tmp.write_all(value.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| StoreError::from_io(&context, e))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::from_io(&context, e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::from_io(
                &format!("Failed to delete {}", path.display()),
                e,
            )),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|(key, _)| key).collect())
    }

    fn remaining_capacity(&self) -> Option<usize> {
        let quota = self.quota?;
        let used = self.used_bytes().ok()?;
        Some(quota.saturating_sub(used))
    }
}

/// Usage after replacing a `freed`-byte entry with an `incoming`-byte one
///
/// The directory can change between measuring the old entry and scanning the
/// total, so `freed` may exceed `used`.
fn projected_usage(used: usize, freed: usize, incoming: usize) -> usize {
    used.saturating_sub(freed) + incoming
}

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.')
}

/// Percent-encode a key into a file name; a leading `.` is always encoded so
/// record files never collide with hidden temporaries.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        if is_plain(byte) && !(i == 0 && byte == b'.') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    if name.starts_with('.') {
        return None;
    }
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
