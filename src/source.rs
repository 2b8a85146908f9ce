use std::io::{self, SeekFrom};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Random-access bytes to upload.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn size(&self) -> io::Result<u64>;

    /// Reads exactly `end - start` bytes starting at `start`.
    async fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>>;

    /// Human-readable name used in diagnostics.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ByteSource for LocalFile {
    async fn size(&self) -> io::Result<u64> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", self.path.display()),
            ));
        }
        Ok(metadata.len())
    }

    async fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        if end < start {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range end {} is before start {}", end, start),
            ));
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let mut buffer = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buffer).await?;
        Ok(buffer)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
