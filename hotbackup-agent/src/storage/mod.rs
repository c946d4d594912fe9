//! Object storage access for archives.
//!
//! A [`Bucket`] is an `object_store` backend plus a root path taken from the
//! bucket URL; every key handed to or returned from a `Bucket` is relative to
//! that root.

pub mod secrets;

use crate::utils::errors::Result;
use secrets::{bucket_options, SecretProvider};
use futures_util::TryStreamExt;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

/// Handle to a bucket (or a folder inside one) in remote object storage.
#[derive(Clone)]
pub struct Bucket {
    store: Arc<dyn ObjectStore>,
    root: ObjectPath,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("store", &self.store.to_string())
            .field("root", &self.root.as_ref())
            .finish()
    }
}

impl Bucket {
    /// Open a bucket from a URL such as `s3://bucket/folder`, `gs://bucket`,
    /// `az://container/folder` or `file:///var/backups`.
    ///
    /// `options` are provider configuration keys (credentials, region...) as
    /// understood by `object_store`.
    pub fn open<I, K, V>(bucket_url: &str, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let url = Url::parse(bucket_url)?;
        let (store, root) = object_store::parse_url_opts(&url, options)?;
        debug!("Opened bucket {} (root '{}')", bucket_url, root);

        Ok(Self {
            store: Arc::from(store),
            root,
        })
    }

    /// Open a bucket with credentials from the named secret, if any.
    pub fn open_with_secret(
        bucket_url: &str,
        secret_name: Option<&str>,
        secrets: &dyn SecretProvider,
    ) -> Result<Self> {
        let options = match secret_name.filter(|name| !name.is_empty()) {
            Some(name) => bucket_options(bucket_url, &secrets.secret_data(name)?)?,
            None => Vec::new(),
        };
        Self::open(bucket_url, options)
    }

    /// Wrap an already constructed store, rooted at its top level.
    pub fn from_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            root: ObjectPath::default(),
        }
    }

    fn location(&self, key: &str) -> ObjectPath {
        if self.root.as_ref().is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.root, key))
        }
    }

    fn relative_key<'a>(&self, location: &'a ObjectPath) -> &'a str {
        let full = location.as_ref();
        if self.root.as_ref().is_empty() {
            return full;
        }
        full.strip_prefix(self.root.as_ref())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(full)
    }

    /// List every key below `prefix` (all keys when empty), sorted.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let location = if prefix.trim_matches('/').is_empty() {
            self.root.clone()
        } else {
            self.location(prefix)
        };
        let filter = if location.as_ref().is_empty() { None } else { Some(&location) };

        let objects: Vec<_> = self.store.list(filter).try_collect().await?;
        let mut keys: Vec<String> = objects
            .iter()
            .map(|meta| self.relative_key(&meta.location).to_string())
            .collect();

        keys.sort();
        Ok(keys)
    }

    /// Stream the contents of `key`.
    pub async fn reader(&self, key: &str) -> Result<impl AsyncRead + Unpin + Send + 'static> {
        let result = self.store.get(&self.location(key)).await?;
        let stream = result.into_stream().map_err(std::io::Error::from);
        Ok(StreamReader::new(stream))
    }

    /// Start a multipart write to `key`. The object only becomes visible once
    /// the writer is shut down; `abort` discards it.
    pub fn writer(&self, key: &str) -> BufWriter {
        BufWriter::new(Arc::clone(&self.store), self.location(key))
    }

    /// Write `bytes` to `key` in a single request.
    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.store
            .put(&self.location(key), PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(&self.location(key)).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.store.head(&self.location(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
