use super::CacheKey;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Directory of immutable derived assets. The filesystem is the only
/// index, so the cache survives restarts and is shared between processes.
#[derive(Debug, Clone)]
pub struct DiskCache {
    cache_dir: PathBuf,
}

impl DiskCache {
    pub async fn new(cache_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).await?;
        Ok(Self { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    pub async fn open(&self, key: &CacheKey) -> io::Result<Option<File>> {
        match File::open(self.path_for(key)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Temp file, fsync, rename. Readers never see a partial file.
    pub async fn save(&self, key: &CacheKey, data: &[u8]) -> io::Result<()> {
        let final_path = self.path_for(key);
        let tmp_path = self
            .cache_dir
            .join(format!(".{}.{}.tmp", key.file_name(), uuid::Uuid::new_v4().simple()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &final_path).await
        }
        .await;

        if written.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        written
    }
}
