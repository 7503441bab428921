// SPDX-License-Identifier: AGPL-3.0-or-later
// ProvDB - Columnar Provenance Index for Software Archives
// Copyright (C) 2026 The ProvDB Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Table store abstraction
//!
//! Tables live as immutable files under a base location. The store exposes
//! listing, whole-file and byte-range reads, and atomic promotion of a
//! freshly built table directory. Two backends: the local filesystem and
//! anything `object_store` can talk to (S3, GCS, Azure, HTTP).
//!
//! Keys are `/`-separated paths relative to the base location, e.g.
//! `contents_in_frontier_directories/part-00003.parquet`.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use object_store::ObjectStore;
use url::Url;

use crate::error::{ProvError, Result};

/// Default number of retries for transient storage errors.
pub const DEFAULT_RETRIES: u32 = 3;

/// Marker file written last by a successful build.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Read-mostly store holding immutable table files.
pub trait TableStore: Send + Sync {
    /// Lists the file keys directly under `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// File size in bytes.
    fn size(&self, key: &str) -> Result<u64>;

    /// Reads a whole file.
    fn read(&self, key: &str) -> Result<Bytes>;

    /// Reads `length` bytes starting at `offset`.
    fn read_range(&self, key: &str, offset: u64, length: usize) -> Result<Bytes>;

    fn exists(&self, key: &str) -> Result<bool>;

    fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Promotes a locally staged directory to the table name `name`.
    ///
    /// After this returns, readers listing `name` see the complete file set;
    /// the `_SUCCESS` marker becomes visible last.
    fn put_atomic(&self, name: &str, staging: &Path) -> Result<()>;
}

/// Runs `op`, retrying transient failures with exponential backoff.
pub fn with_retries<T>(retries: u32, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0u32;
    loop {
        match op() {
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                let backoff = Duration::from_millis(50u64 << attempt);
                tracing::warn!(
                    "transient error on {what} (attempt {attempt}/{retries}): {e}; \
                     retrying in {backoff:?}"
                );
                std::thread::sleep(backoff);
            }
            other => return other,
        }
    }
}

/// Opens a store from a URL or plain filesystem path.
pub fn store_from_url(url: &str) -> Result<Arc<dyn TableStore>> {
    if let Ok(parsed) = Url::parse(url) {
        match parsed.scheme() {
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| ProvError::InvalidArgument(format!("bad file URL: {url}")))?;
                return Ok(Arc::new(LocalFsStore::new(path)?));
            }
            scheme if scheme.len() > 1 => {
                return Ok(Arc::new(ObjectStoreBackend::from_url(&parsed)?));
            }
            // single letter: almost certainly a Windows drive, fall through
            _ => {}
        }
    }
    Ok(Arc::new(LocalFsStore::new(PathBuf::from(url))?))
}

// =============================================================================
// Local filesystem
// =============================================================================

pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl TableStore for LocalFsStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                keys.push(format!(
                    "{}/{}",
                    prefix.trim_end_matches('/'),
                    entry.file_name().to_string_lossy()
                ));
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }

    fn size(&self, key: &str) -> Result<u64> {
        Ok(std::fs::metadata(self.resolve(key))?.len())
    }

    fn read(&self, key: &str) -> Result<Bytes> {
        Ok(Bytes::from(std::fs::read(self.resolve(key))?))
    }

    fn read_range(&self, key: &str, offset: u64, length: usize) -> Result<Bytes> {
        let mut file = std::fs::File::open(self.resolve(key))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.resolve(key).exists())
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    fn put_atomic(&self, name: &str, staging: &Path) -> Result<()> {
        let target = self.resolve(name);
        if target.exists() {
            return Err(ProvError::InvalidArgument(format!(
                "table {name} already exists; refusing to overwrite"
            )));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(staging, &target)?;
        Ok(())
    }
}

// =============================================================================
// object_store backends
// =============================================================================

/// Adapts any `object_store` implementation to the synchronous `TableStore`
/// interface. The async calls are driven on a private current-thread runtime;
/// callers are expected to be ordinary worker threads.
pub struct ObjectStoreBackend {
    store: Box<dyn ObjectStore>,
    base: object_store::path::Path,
    runtime: tokio::runtime::Runtime,
    retries: u32,
}

impl ObjectStoreBackend {
    pub fn from_url(url: &Url) -> Result<Self> {
        let (store, base) = object_store::parse_url(url)
            .map_err(|e| ProvError::InvalidArgument(format!("unsupported store URL {url}: {e}")))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            store,
            base,
            runtime,
            retries: DEFAULT_RETRIES,
        })
    }

    fn object_path(&self, key: &str) -> object_store::path::Path {
        let mut path = self.base.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path = path.child(part);
        }
        path
    }

    fn map_err(key: &str, e: object_store::Error) -> ProvError {
        match e {
            object_store::Error::NotFound { .. } => ProvError::NotFound(key.to_string()),
            other => ProvError::Transient(format!("{key}: {other}")),
        }
    }
}

impl TableStore for ObjectStoreBackend {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.object_path(prefix);
        with_retries(self.retries, "list", || {
            self.runtime.block_on(async {
                let mut stream = self.store.list(Some(&path));
                let mut keys = Vec::new();
                while let Some(meta) = stream.next().await {
                    let meta = meta.map_err(|e| Self::map_err(prefix, e))?;
                    // relative to the base location, like LocalFsStore keys
                    let full = meta.location.as_ref();
                    let base = self.base.as_ref();
                    let key = full.strip_prefix(base).unwrap_or(full);
                    keys.push(key.trim_start_matches('/').to_string());
                }
                keys.sort_unstable();
                Ok(keys)
            })
        })
    }

    fn size(&self, key: &str) -> Result<u64> {
        let path = self.object_path(key);
        with_retries(self.retries, "head", || {
            self.runtime.block_on(async {
                let meta = self.store.head(&path).await.map_err(|e| Self::map_err(key, e))?;
                Ok(meta.size as u64)
            })
        })
    }

    fn read(&self, key: &str) -> Result<Bytes> {
        let path = self.object_path(key);
        with_retries(self.retries, "get", || {
            self.runtime.block_on(async {
                let result = self.store.get(&path).await.map_err(|e| Self::map_err(key, e))?;
                result.bytes().await.map_err(|e| Self::map_err(key, e))
            })
        })
    }

    fn read_range(&self, key: &str, offset: u64, length: usize) -> Result<Bytes> {
        let path = self.object_path(key);
        let range = offset as usize..offset as usize + length;
        with_retries(self.retries, "get_range", || {
            self.runtime.block_on(async {
                self.store
                    .get_range(&path, range.clone())
                    .await
                    .map_err(|e| Self::map_err(key, e))
            })
        })
    }

    fn exists(&self, key: &str) -> Result<bool> {
        match self.size(key) {
            Ok(_) => Ok(true),
            Err(ProvError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key);
        let payload = Bytes::copy_from_slice(data);
        with_retries(self.retries, "put", || {
            self.runtime.block_on(async {
                self.store
                    .put(&path, payload.clone().into())
                    .await
                    .map_err(|e| Self::map_err(key, e))?;
                Ok(())
            })
        })
    }

    fn put_atomic(&self, name: &str, staging: &Path) -> Result<()> {
        // Object stores have no rename; upload everything, success marker last.
        let mut files: Vec<PathBuf> = std::fs::read_dir(staging)?
            .map(|entry| Ok(entry?.path()))
            .collect::<Result<_>>()?;
        files.sort_unstable();
        let marker = staging.join(SUCCESS_MARKER);
        for file in files.iter().filter(|f| **f != marker) {
            let file_name = file
                .file_name()
                .ok_or_else(|| ProvError::Internal("staged file without a name".into()))?
                .to_string_lossy()
                .into_owned();
            let data = std::fs::read(file)?;
            self.write(&format!("{name}/{file_name}"), &data)?;
        }
        if marker.exists() {
            let data = std::fs::read(&marker)?;
            self.write(&format!("{name}/{SUCCESS_MARKER}"), &data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_store_read_write_list() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = LocalFsStore::new(dir.path())?;

        store.write("tbl/part-00000.parquet", b"columnar")?;
        store.write("tbl/part-00000.ef", b"sidecar")?;

        assert!(store.exists("tbl/part-00000.parquet")?);
        assert!(!store.exists("tbl/part-00001.parquet")?);

        let keys = store.list("tbl")?;
        assert_eq!(keys, vec!["tbl/part-00000.ef", "tbl/part-00000.parquet"]);

        assert_eq!(store.read("tbl/part-00000.parquet")?.as_ref(), b"columnar");
        assert_eq!(store.size("tbl/part-00000.parquet")?, 8);
        assert_eq!(store.read_range("tbl/part-00000.parquet", 3, 5)?.as_ref(), b"umnar");
        Ok(())
    }

    #[test]
    fn test_local_store_atomic_promote() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = LocalFsStore::new(dir.path())?;

        let staging = dir.path().join("nodes.tmp-1");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("part-00000.parquet"), b"x").unwrap();
        std::fs::write(staging.join(SUCCESS_MARKER), b"").unwrap();

        store.put_atomic("nodes", &staging)?;
        assert!(store.exists(&format!("nodes/{SUCCESS_MARKER}"))?);
        assert!(!staging.exists());

        // refuses to clobber an existing table
        let staging2 = dir.path().join("nodes.tmp-2");
        std::fs::create_dir_all(&staging2).unwrap();
        assert!(store.put_atomic("nodes", &staging2).is_err());
        Ok(())
    }

    #[test]
    fn test_with_retries_gives_up_on_permanent_errors() {
        let mut calls = 0;
        let result: Result<()> = with_retries(3, "op", || {
            calls += 1;
            Err(ProvError::InvalidArgument("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_with_retries_retries_transient() {
        let mut calls = 0;
        let result = with_retries(3, "op", || {
            calls += 1;
            if calls < 3 {
                Err(ProvError::Transient("flaky".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_store_from_url_local_path() {
        let dir = TempDir::new().unwrap();
        let store = store_from_url(dir.path().to_str().unwrap()).unwrap();
        store.write("t/f", b"1").unwrap();
        assert!(store.exists("t/f").unwrap());
    }
}
