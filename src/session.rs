//! Session Provisioner - scoped engine resources for one operation
//!
//! A [`Session`] is opened at the start of every ingest/retrieve/search and
//! dropped before the call returns. When the storage configuration carries an
//! access key, the session also wires remote object storage (S3):
//!
//! 1. Install the remote-storage runtime (eagerly when `install_extension`
//!    is set, otherwise it is activated on first remote access)
//! 2. Set region, access key and secret key
//! 3. Set the session token, only if one is supplied
//!
//! Anything wrong with that setup is a `StorageConfig` error, never a data
//! error.

use crate::config::StorageConfig;
use crate::error::{PitError, Result};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::cell::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

const REMOTE_SCHEME: &str = "s3://";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Open a session for one operation.
pub fn open_session(config: &StorageConfig) -> Result<Session> {
    let remote = if config.remote_enabled() {
        Some(RemoteStorage::configure(config)?)
    } else {
        None
    };

    Ok(Session::start(remote))
}

/// Open a session whose remote locations resolve inside `store`:
/// `s3://bucket/key` becomes the path `bucket/key`.
pub fn open_session_with_store(store: Arc<dyn ObjectStore>) -> Session {
    Session::start(Some(RemoteStorage {
        source: StoreSource::Fixed(store),
        runtime: OnceCell::new(),
    }))
}

/// Engine resources held for the duration of one operation. Released on drop.
pub struct Session {
    id: u64,
    remote: Option<RemoteStorage>,
}

impl Session {
    fn start(remote: Option<RemoteStorage>) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Opening session {}", id);
        Self { id, remote }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn has_remote_storage(&self) -> bool {
        self.remote.is_some()
    }

    /// Remote storage for this session; an error if none was configured.
    pub fn remote(&self) -> Result<&RemoteStorage> {
        self.remote.as_ref().ok_or_else(|| {
            PitError::StorageConfig(
                "remote location requested but no access key is configured".to_string(),
            )
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("Closing session {}", self.id);
    }
}

/// True for locations that live on remote object storage.
pub fn is_remote(location: &str) -> bool {
    location.starts_with(REMOTE_SCHEME)
}

/// `s3://bucket/key` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub bucket: String,
    pub key: String,
}

impl RemoteLocation {
    pub fn parse(location: &str) -> Result<Self> {
        let rest = location.strip_prefix(REMOTE_SCHEME).ok_or_else(|| {
            PitError::MalformedInput(format!("'{}' is not an {} location", location, REMOTE_SCHEME))
        })?;

        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(PitError::MalformedInput(format!(
                "'{}' must look like {}bucket/key",
                location, REMOTE_SCHEME
            ))),
        }
    }
}

#[derive(Clone)]
struct RemoteSettings {
    region: String,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    endpoint: Option<String>,
}

impl RemoteSettings {
    fn from_config(config: &StorageConfig) -> Result<Self> {
        let access_key_id = config.access_key_id.clone().unwrap_or_default();
        let region = config
            .region
            .clone()
            .ok_or_else(|| PitError::StorageConfig("access key given without a region".to_string()))?;
        let secret_access_key = config.secret_access_key.clone().ok_or_else(|| {
            PitError::StorageConfig("access key given without a secret access key".to_string())
        })?;

        if let Some(endpoint) = &config.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(PitError::StorageConfig(format!(
                    "endpoint '{}' must start with http:// or https://",
                    endpoint
                )));
            }
        }

        Ok(Self {
            region,
            access_key_id,
            secret_access_key,
            session_token: config.session_token.clone(),
            endpoint: config.endpoint.clone(),
        })
    }

    fn store_for(&self, bucket: &str) -> Result<AmazonS3> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.region)
            .with_access_key_id(&self.access_key_id)
            .with_secret_access_key(&self.secret_access_key);

        if let Some(token) = &self.session_token {
            builder = builder.with_token(token);
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        builder
            .build()
            .map_err(|e| PitError::StorageConfig(format!("failed to configure remote storage: {}", e)))
    }
}

enum StoreSource {
    /// One S3 client per bucket, built from credentials
    S3(RemoteSettings),
    /// One caller-supplied store holding every bucket as a path prefix
    Fixed(Arc<dyn ObjectStore>),
}

/// Remote object storage wired into a session.
pub struct RemoteStorage {
    source: StoreSource,
    runtime: OnceCell<Runtime>,
}

impl RemoteStorage {
    fn configure(config: &StorageConfig) -> Result<Self> {
        let settings = RemoteSettings::from_config(config)?;
        info!("Remote storage configured for region {}", settings.region);
        if settings.session_token.is_some() {
            debug!("Remote storage session token set");
        }

        let storage = Self {
            source: StoreSource::S3(settings),
            runtime: OnceCell::new(),
        };
        if config.install_extension {
            storage.install()?;
            info!("Remote storage runtime installed");
        }

        Ok(storage)
    }

    fn install(&self) -> Result<&Runtime> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PitError::StorageConfig(format!("failed to start remote storage runtime: {}", e)))?;
        let _ = self.runtime.set(runtime);

        self.runtime
            .get()
            .ok_or_else(|| PitError::StorageConfig("remote storage runtime unavailable".to_string()))
    }

    /// Store and object path for an `s3://bucket/key` location.
    fn resolve(&self, location: &str) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
        let parsed = RemoteLocation::parse(location)?;
        match &self.source {
            StoreSource::S3(settings) => {
                let store = settings.store_for(&parsed.bucket)?;
                Ok((Arc::new(store), object_path(&parsed.key)?))
            }
            StoreSource::Fixed(store) => Ok((
                Arc::clone(store),
                object_path(&format!("{}/{}", parsed.bucket, parsed.key))?,
            )),
        }
    }

    /// Fetch the whole object at `location`.
    pub fn read(&self, location: &str) -> Result<Vec<u8>> {
        let (store, path) = self.resolve(location)?;
        let runtime = self.install()?;

        let bytes = runtime
            .block_on(async {
                let result = store.get(&path).await?;
                result.bytes().await
            })
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => PitError::SourceNotFound(location.to_string()),
                other => PitError::Storage(format!("failed to read {}: {}", location, other)),
            })?;

        debug!("Fetched {} bytes from {}", bytes.len(), location);
        Ok(bytes.to_vec())
    }

    /// Upload `bytes` as the object at `location` in a single put, replacing
    /// any existing object.
    pub fn write(&self, location: &str, bytes: Vec<u8>) -> Result<()> {
        let (store, path) = self.resolve(location)?;
        let runtime = self.install()?;
        let len = bytes.len();

        runtime
            .block_on(store.put(&path, PutPayload::from(bytes)))
            .map_err(|e| PitError::Storage(format!("failed to write {}: {}", location, e)))?;

        debug!("Uploaded {} bytes to {}", len, location);
        Ok(())
    }
}

fn object_path(key: &str) -> Result<ObjectPath> {
    ObjectPath::parse(key).map_err(|e| PitError::MalformedInput(format!("invalid object key '{}': {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use object_store::local::LocalFileSystem;
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    fn remote_config() -> StorageConfig {
        StorageConfig::default().with_credentials("eu-west-1", "AKIATEST", "secret")
    }

    #[test]
    fn test_no_access_key_means_no_remote() {
        let session = open_session(&StorageConfig::default()).unwrap();
        assert!(!session.has_remote_storage());
        assert_eq!(session.remote().err().map(|e| e.kind()), Some(ErrorKind::StorageConfig));
    }

    #[test]
    fn test_remote_configured_lazily() {
        let session = open_session(&remote_config()).unwrap();
        let remote = session.remote().unwrap();
        assert!(remote.runtime.get().is_none());
    }

    #[test]
    fn test_install_flag_installs_eagerly() {
        let config = remote_config().with_session_token("tok").with_install_extension(true);
        let session = open_session(&config).unwrap();
        let remote = session.remote().unwrap();
        assert!(remote.runtime.get().is_some());
        assert!(matches!(
            &remote.source,
            StoreSource::S3(settings) if settings.session_token.as_deref() == Some("tok")
        ));
    }

    #[test]
    fn test_incomplete_credentials_are_config_errors() {
        let mut missing_secret = remote_config();
        missing_secret.secret_access_key = None;
        let mut missing_region = remote_config();
        missing_region.region = None;
        let bad_endpoint = remote_config().with_endpoint("localhost:4566");

        for config in [missing_secret, missing_region, bad_endpoint] {
            let err = open_session(&config).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::StorageConfig);
        }
    }

    #[test]
    fn test_sessions_are_distinct() {
        let a = open_session(&StorageConfig::default()).unwrap();
        let b = open_session(&StorageConfig::default()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_parse_remote_location() {
        assert!(is_remote("s3://bucket/data/x.parquet"));
        assert!(!is_remote("/tmp/x.parquet"));
        assert_eq!(
            RemoteLocation::parse("s3://bucket/data/x.parquet").unwrap(),
            RemoteLocation {
                bucket: "bucket".into(),
                key: "data/x.parquet".into()
            }
        );
        assert!(RemoteLocation::parse("s3://bucket").is_err());
        assert!(RemoteLocation::parse("s3:///key").is_err());
    }

    #[test]
    fn test_remote_write_then_read() {
        let session = open_session_with_store(Arc::new(InMemory::new()));
        let remote = session.remote().unwrap();

        remote.write("s3://bucket/a/b.bin", b"payload".to_vec()).unwrap();
        assert_eq!(remote.read("s3://bucket/a/b.bin").unwrap(), b"payload".to_vec());

        // same key in another bucket is another object
        let err = remote.read("s3://other/a/b.bin").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    }

    #[test]
    fn test_remote_missing_object_is_not_found() {
        let session = open_session_with_store(Arc::new(InMemory::new()));
        let err = session.remote().unwrap().read("s3://bucket/missing.parquet").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    }

    #[test]
    fn test_remote_failed_put_is_storage_error() {
        let dir = TempDir::new().unwrap();
        // a plain file where the bucket directory would have to be
        std::fs::write(dir.path().join("bucket"), b"not a directory").unwrap();
        let store = LocalFileSystem::new_with_prefix(dir.path()).unwrap();
        let session = open_session_with_store(Arc::new(store));

        let err = session
            .remote()
            .unwrap()
            .write("s3://bucket/x.parquet", b"data".to_vec())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
