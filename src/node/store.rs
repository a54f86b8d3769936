//! Capacity-bounded blob storage on local disk
//!
//! Layout: one file per blob, `<root>/<file_id>`. Uploads land in a hidden
//! staging file (`<root>/.<file_id>.<nonce>.part`) and are renamed into place
//! once every byte has arrived.
//!
//! `used_bytes` is a running counter. It is computed from the directory
//! contents when the store opens and then only adjusted by uploads and
//! deletes made through this store. Uploads in flight hold a reservation in
//! `reserved_bytes` from the capacity check until they commit or fail, so
//! concurrent uploads together never exceed capacity.

use crate::common::{format_bytes, validate_file_id, Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const STAGING_SUFFIX: &str = ".part";

/// Local index entry for a blob received by this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub upload_time: DateTime<Utc>,
}

pub struct BlobStore {
    root: PathBuf,
    capacity_bytes: u64,
    used_bytes: u64,
    reserved_bytes: u64,
    files: HashMap<String, StoredFile>,
}

impl BlobStore {
    /// Open or create the storage directory and measure what is already in it
    pub fn open(root: impl AsRef<Path>, capacity_bytes: u64) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let stale = Self::remove_stale_staging(&root)?;
        if stale > 0 {
            tracing::info!("Removed {} unfinished upload(s) from {:?}", stale, root);
        }

        let used_bytes = Self::scan_used_bytes(&root)?;
        tracing::info!(
            "BlobStore opened at {:?}: {} used of {}",
            root,
            format_bytes(used_bytes),
            format_bytes(capacity_bytes)
        );

        Ok(Self {
            root,
            capacity_bytes,
            used_bytes,
            reserved_bytes: 0,
            files: HashMap::new(),
        })
    }

    /// Total size of every regular file under `root`, recursively
    pub fn scan_used_bytes(root: &Path) -> Result<u64> {
        let mut total = 0u64;
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    total += entry.metadata()?.len();
                }
            }
        }

        Ok(total)
    }

    fn remove_stale_staging(root: &Path) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(STAGING_SUFFIX) && entry.file_type()?.is_file()
            {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Bytes held for uploads that have not committed yet
    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes
    }

    /// Capacity not taken by stored blobs or in-flight uploads
    pub fn free_bytes(&self) -> u64 {
        self.capacity_bytes
            .saturating_sub(self.used_bytes)
            .saturating_sub(self.reserved_bytes)
    }

    /// Where the blob for `file_id` lives
    pub fn blob_path(&self, file_id: &str) -> Result<PathBuf> {
        validate_file_id(file_id)?;
        Ok(self.root.join(file_id))
    }

    /// Hold `file_size` bytes for an upload, or reject it if stored blobs,
    /// other in-flight uploads and this one would exceed capacity.
    /// Every successful call must be matched by one [`BlobStore::release`].
    pub fn reserve(&mut self, file_size: u64) -> Result<()> {
        let total = self
            .used_bytes
            .checked_add(self.reserved_bytes)
            .and_then(|t| t.checked_add(file_size));
        match total {
            Some(total) if total <= self.capacity_bytes => {
                self.reserved_bytes += file_size;
                Ok(())
            }
            _ => Err(Error::Capacity(format!(
                "Insufficient storage: {} requested, {} free",
                format_bytes(file_size),
                format_bytes(self.free_bytes())
            ))),
        }
    }

    pub fn release(&mut self, file_size: u64) {
        self.reserved_bytes = self.reserved_bytes.saturating_sub(file_size);
    }

    /// Fresh staging path for an upload of `file_id`. Concurrent uploads of
    /// the same id get distinct staging files.
    pub fn staging_path(&self, file_id: &str) -> Result<PathBuf> {
        validate_file_id(file_id)?;
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Ok(self
            .root
            .join(format!(".{}.{}{}", file_id, &nonce[..8], STAGING_SUFFIX)))
    }

    /// Move a fully received staging file into place and account for it.
    /// A blob replaced under the same id stops counting toward usage.
    pub fn commit_upload(
        &mut self,
        staging: &Path,
        file_id: &str,
        file_name: &str,
        file_size: u64,
    ) -> Result<()> {
        let target = self.blob_path(file_id)?;
        let replaced = fs::metadata(&target).map(|m| m.len()).ok();

        fs::rename(staging, &target)?;

        if let Some(old) = replaced {
            self.used_bytes = self.used_bytes.saturating_sub(old);
        }
        self.used_bytes += file_size;
        self.files.insert(
            file_id.to_string(),
            StoredFile {
                file_id: file_id.to_string(),
                file_name: file_name.to_string(),
                file_size,
                upload_time: Utc::now(),
            },
        );
        Ok(())
    }

    /// Path and size of an existing blob
    pub fn locate(&self, file_id: &str) -> Result<(PathBuf, u64)> {
        let path = self.blob_path(file_id)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok((path, meta.len())),
            Ok(_) => Err(Error::NotFound(format!("File not found: {}", file_id))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("File not found: {}", file_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a blob, returning the bytes it occupied
    pub fn delete(&mut self, file_id: &str) -> Result<u64> {
        let (path, size) = self.locate(file_id)?;
        fs::remove_file(&path)?;
        self.used_bytes = self.used_bytes.saturating_sub(size);
        self.files.remove(file_id);
        Ok(size)
    }

    /// Index entry for blobs received since this node started
    pub fn file_info(&self, file_id: &str) -> Option<&StoredFile> {
        self.files.get(file_id)
    }

    /// Display name for logs
    pub fn file_name(&self, file_id: &str) -> String {
        self.files
            .get(file_id)
            .map(|f| f.file_name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
