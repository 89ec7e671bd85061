use std::io::{ErrorKind, Result as IoResult};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{future, Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>>>>;

pub const MAX_LOGO_SIZE: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub key: String,
    pub url: String,
}

#[derive(Debug)]
pub enum MediaError {
    InvalidFileType,
    TooLarge,
    Io(std::io::Error),
}

#[async_trait(?Send)]
pub trait StorageProvider: Send + Sync {
    async fn put(&self, key: &str, data: ByteStream) -> IoResult<()>;
    async fn delete(&self, key: &str) -> IoResult<()>;
    fn public_url(&self, key: &str) -> String;
}

#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    public_base: String,
}

impl LocalStorage {
    pub fn new(root_dir: PathBuf, public_base: String) -> Self {
        Self {
            root_dir,
            public_base,
        }
    }
}

#[async_trait(?Send)]
impl StorageProvider for LocalStorage {
    async fn put(&self, key: &str, mut data: ByteStream) -> IoResult<()> {
        let path = self.root_dir.join(key);
        let mut file = tokio::fs::File::create(&path).await?;

        let mut write_result: IoResult<()> = Ok(());
        while let Some(chunk) = data.next().await {
            let written = match chunk {
                Ok(bytes) => file.write_all(&bytes).await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                write_result = Err(err);
                break;
            }
        }

        if write_result.is_ok() {
            write_result = file.flush().await;
        }

        // Partial uploads never stay on disk.
        if write_result.is_err() {
            let _ = tokio::fs::remove_file(&path).await;
        }

        write_result
    }

    async fn delete(&self, key: &str) -> IoResult<()> {
        let path = self.root_dir.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn public_url(&self, key: &str) -> String {
        let base = self.public_base.trim_end_matches('/');
        format!("{}/{}", base, key)
    }
}

/// Accepted logo extension, normalized, or `None`.
pub fn logo_extension(filename: &str) -> Option<String> {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_lowercase();

    matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "webp" | "svg").then_some(ext)
}

#[derive(Clone)]
pub struct MediaService {
    provider: Arc<dyn StorageProvider>,
    max_logo_size: u64,
}

impl MediaService {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            provider,
            max_logo_size: MAX_LOGO_SIZE,
        }
    }

    pub async fn save_logo<S>(
        &self,
        owner: Uuid,
        filename: &str,
        stream: S,
    ) -> Result<StoredFile, MediaError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + 'static,
    {
        let ext = logo_extension(filename).ok_or(MediaError::InvalidFileType)?;
        let key = format!("logo_{}_{}.{}", owner.simple(), Uuid::new_v4().simple(), ext);
        let size_limit = self.max_logo_size;

        let limited_stream = stream.scan(0u64, move |size, chunk| {
            let next = chunk.and_then(|bytes| {
                *size += bytes.len() as u64;
                if *size > size_limit {
                    Err(std::io::Error::new(ErrorKind::InvalidData, "File too large"))
                } else {
                    Ok(bytes)
                }
            });

            future::ready(Some(next))
        });

        if let Err(err) = self.provider.put(&key, Box::pin(limited_stream)).await {
            if err.kind() == ErrorKind::InvalidData {
                return Err(MediaError::TooLarge);
            }
            return Err(MediaError::Io(err));
        }

        Ok(StoredFile {
            url: self.provider.public_url(&key),
            key,
        })
    }

    pub async fn delete(&self, key: &str) -> Result<(), MediaError> {
        self.provider.delete(key).await.map_err(MediaError::Io)
    }
}
