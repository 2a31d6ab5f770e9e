use crate::codec::sync_frame::{Dirent, FileStat};
use crate::error::{AdbResult, AdbServerError};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

/// The filesystem contract [`crate::sync_service`] consumes. Paths are
/// opaque UTF-8 strings interpreted entirely by the implementation — the
/// sync service never inspects them beyond the 1024-byte length check.
#[async_trait]
pub trait AbstractFileSystem: Send + Sync {
    /// Stat `path`. Returns `Ok(None)` for "not found" rather than an error;
    /// other failures (permissions, I/O) are real errors.
    async fn stat(&self, path: &str) -> AdbResult<Option<FileStat>>;

    /// List the entries directly under `path`. Finite and eagerly
    /// collected; `.` and `..` are excluded. No ordering is guaranteed.
    async fn iterdir(&self, path: &str) -> AdbResult<Vec<Dirent>>;

    /// Open `path` for reading.
    async fn open_for_read(&self, path: &str) -> AdbResult<Box<dyn AsyncRead + Send + Unpin>>;

    /// Open `path` for writing with the given Unix mode, creating parent
    /// directories as needed.
    async fn open_for_write(
        &self,
        path: &str,
        mode: u32,
    ) -> AdbResult<Box<dyn AsyncWrite + Send + Unpin>>;

    /// Best-effort modification time update.
    async fn set_mtime(&self, path: &str, mtime: u32) -> AdbResult<()>;

    /// Idempotently create `path` and any missing parents.
    async fn makedirs(&self, path: &str) -> AdbResult<()>;
}

/// Default [`AbstractFileSystem`]: maps sync paths onto the host disk,
/// relative to the process's working directory. No sandboxing: command
/// and path confinement are out of scope for this crate.
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            self.root.clone()
        } else {
            self.root.join(trimmed)
        }
    }
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn metadata_to_stat(meta: &std::fs::Metadata) -> FileStat {
    use std::os::unix::fs::MetadataExt;
    FileStat {
        mode: meta.mode(),
        size: meta.size() as u32,
        mtime: meta.mtime() as u32,
    }
}

#[cfg(not(unix))]
fn metadata_to_stat(meta: &std::fs::Metadata) -> FileStat {
    let mode = if meta.is_dir() { 0o040755 } else { 0o100644 };
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    FileStat {
        mode,
        size: meta.len() as u32,
        mtime,
    }
}

#[async_trait]
impl AbstractFileSystem for LocalFileSystem {
    async fn stat(&self, path: &str) -> AdbResult<Option<FileStat>> {
        let full = self.resolve(path);
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(Some(metadata_to_stat(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AdbServerError::Filesystem(e.to_string())),
        }
    }

    async fn iterdir(&self, path: &str) -> AdbResult<Vec<Dirent>> {
        let full = self.resolve(path);
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| AdbServerError::Filesystem(e.to_string()))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| AdbServerError::Filesystem(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "." || name == ".." {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(|e| AdbServerError::Filesystem(e.to_string()))?;
            let stat = metadata_to_stat(&meta);
            entries.push(Dirent {
                name,
                mode: stat.mode,
                size: stat.size,
                mtime: stat.mtime,
            });
        }
        Ok(entries)
    }

    async fn open_for_read(&self, path: &str) -> AdbResult<Box<dyn AsyncRead + Send + Unpin>> {
        let full = self.resolve(path);
        let file = tokio::fs::File::open(&full)
            .await
            .map_err(|e| AdbServerError::Filesystem(e.to_string()))?;
        Ok(Box::new(file))
    }

    async fn open_for_write(
        &self,
        path: &str,
        mode: u32,
    ) -> AdbResult<Box<dyn AsyncWrite + Send + Unpin>> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AdbServerError::Filesystem(e.to_string()))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full)
            .await
            .map_err(|e| AdbServerError::Filesystem(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(mode & 0o7777);
            let _ = file.set_permissions(perms).await;
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(Box::new(file))
    }

    async fn set_mtime(&self, path: &str, mtime: u32) -> AdbResult<()> {
        let full = self.resolve(path);
        let time = filetime::FileTime::from_unix_time(mtime as i64, 0);
        let full_clone = full.clone();
        tokio::task::spawn_blocking(move || filetime::set_file_mtime(&full_clone, time))
            .await
            .map_err(|e| AdbServerError::Internal(e.to_string()))?
            .map_err(|e| AdbServerError::Filesystem(e.to_string()))
    }

    async fn makedirs(&self, path: &str) -> AdbResult<()> {
        let full = self.resolve(path);
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| AdbServerError::Filesystem(e.to_string()))
    }
}
