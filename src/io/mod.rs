/*!
Narrow object-store abstraction the table layers read and write through.

A [FileIO] exposes exactly the capabilities the format needs: open an input,
open an output, delete, existence and length checks, all addressed by URI.
The [ObjectStoreFileIO] implementation maps URI schemes onto `object_store`
clients built from a string properties map, so credentials and endpoint
overrides never appear in code.
*/

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::ObjectStore;

use crate::error::{Error, Result};

/// Property key for an S3 endpoint override.
pub const S3_ENDPOINT: &str = "s3.endpoint";
/// Property key for the S3 access key id.
pub const S3_ACCESS_KEY_ID: &str = "s3.access-key-id";
/// Property key for the S3 secret access key.
pub const S3_SECRET_ACCESS_KEY: &str = "s3.secret-access-key";
/// Property key for the S3 region.
pub const S3_REGION: &str = "s3.region";
/// Property key naming a request signer for outbound S3 requests.
pub const S3_SIGNER: &str = "s3.signer";

/// Capability set for reading and writing table files by URI.
#[async_trait]
pub trait FileIO: Send + Sync + Debug {
    /// Open a readable file.
    fn new_input(&self, uri: &str) -> Result<InputFile>;
    /// Open a writable file.
    fn new_output(&self, uri: &str) -> Result<OutputFile>;
    /// Delete the object at the URI.
    async fn delete(&self, uri: &str) -> Result<()>;
    /// Whether an object exists at the URI.
    async fn exists(&self, uri: &str) -> Result<bool>;
    /// Length in bytes of the object at the URI.
    async fn len(&self, uri: &str) -> Result<u64>;
}

#[derive(Debug, Clone)]
/// A readable object addressed by URI.
pub struct InputFile {
    store: Arc<dyn ObjectStore>,
    path: Path,
    uri: String,
}

impl InputFile {
    /// The URI this file was opened with.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Read the whole object.
    pub async fn read(&self) -> Result<Vec<u8>> {
        let result = self
            .store
            .get(&self.path)
            .await
            .map_err(|err| Error::io(&self.uri, err))?;
        Ok(result
            .bytes()
            .await
            .map_err(|err| Error::io(&self.uri, err))?
            .to_vec())
    }

    /// Length of the object in bytes.
    pub async fn len(&self) -> Result<u64> {
        let meta = self
            .store
            .head(&self.path)
            .await
            .map_err(|err| Error::io(&self.uri, err))?;
        Ok(meta.size as u64)
    }
}

#[derive(Debug, Clone)]
/// A writable object addressed by URI.
pub struct OutputFile {
    store: Arc<dyn ObjectStore>,
    path: Path,
    uri: String,
}

impl OutputFile {
    /// The URI this file was opened with.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Write the whole object, replacing any previous content.
    pub async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        self.store
            .put(&self.path, bytes.into())
            .await
            .map_err(|err| Error::io(&self.uri, err))?;
        Ok(())
    }
}

/// [FileIO] over `object_store` clients, one per URI scheme and authority.
#[derive(Debug)]
pub struct ObjectStoreFileIO {
    properties: HashMap<String, String>,
    stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreFileIO {
    /// Build a file io layer from connection properties. A configured
    /// request signer this build cannot honor is rejected up front.
    pub fn new(properties: HashMap<String, String>) -> Result<Self> {
        if let Some(signer) = properties.get(S3_SIGNER) {
            return Err(Error::SignatureError(format!(
                "request signer {signer} is not available here"
            )));
        }
        Ok(ObjectStoreFileIO {
            properties,
            stores: RwLock::new(HashMap::new()),
        })
    }

    /// Register a store for a scheme, bypassing construction from
    /// properties. Used for in-memory stores in tests.
    pub fn with_store(self, scheme: &str, store: Arc<dyn ObjectStore>) -> Self {
        self.stores
            .write()
            .unwrap()
            .insert(scheme.to_string(), store.clone());
        self
    }

    fn store_for(&self, uri: &str) -> Result<(Arc<dyn ObjectStore>, Path)> {
        let (scheme, authority, path) = split_uri(uri);
        // first writer installs the client, everyone else reuses it
        let key = match authority {
            Some(authority) => format!("{scheme}://{authority}"),
            None => scheme.to_string(),
        };
        {
            let stores = self.stores.read().unwrap();
            if let Some(store) = stores.get(&key).or_else(|| stores.get(scheme)) {
                return Ok((store.clone(), Path::from(path)));
            }
        }
        let built = self.build_store(scheme, authority, uri)?;
        let mut stores = self.stores.write().unwrap();
        let store = stores.entry(key).or_insert(built).clone();
        Ok((store, Path::from(path)))
    }

    fn build_store(
        &self,
        scheme: &str,
        authority: Option<&str>,
        uri: &str,
    ) -> Result<Arc<dyn ObjectStore>> {
        match scheme {
            "s3" | "s3a" | "s3n" => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(authority.unwrap_or_default());
                if let Some(region) = self.properties.get(S3_REGION) {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = self.properties.get(S3_ENDPOINT) {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(key) = self.properties.get(S3_ACCESS_KEY_ID) {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = self.properties.get(S3_SECRET_ACCESS_KEY) {
                    builder = builder.with_secret_access_key(secret);
                }
                Ok(Arc::new(builder.build()?))
            }
            "gs" => Ok(Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(authority.unwrap_or_default())
                    .build()?,
            )),
            "file" | "" => Ok(Arc::new(LocalFileSystem::new())),
            other => Err(Error::UnsupportedFeature(format!(
                "no object store for scheme {other} ({uri})"
            ))),
        }
    }
}

#[async_trait]
impl FileIO for ObjectStoreFileIO {
    fn new_input(&self, uri: &str) -> Result<InputFile> {
        let (store, path) = self.store_for(uri)?;
        Ok(InputFile {
            store,
            path,
            uri: uri.to_string(),
        })
    }

    fn new_output(&self, uri: &str) -> Result<OutputFile> {
        let (store, path) = self.store_for(uri)?;
        Ok(OutputFile {
            store,
            path,
            uri: uri.to_string(),
        })
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let (store, path) = self.store_for(uri)?;
        store
            .delete(&path)
            .await
            .map_err(|err| Error::io(uri, err))?;
        Ok(())
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let (store, path) = self.store_for(uri)?;
        match store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(Error::io(uri, err)),
        }
    }

    async fn len(&self, uri: &str) -> Result<u64> {
        let (store, path) = self.store_for(uri)?;
        let meta = store.head(&path).await.map_err(|err| Error::io(uri, err))?;
        Ok(meta.size as u64)
    }
}

/// Split a URI into scheme, authority and object path.
fn split_uri(uri: &str) -> (&str, Option<&str>, &str) {
    match uri.split_once("://") {
        Some((scheme, rest)) => match rest.split_once('/') {
            Some((authority, path)) => (scheme, Some(authority), path),
            None => (scheme, Some(rest), ""),
        },
        None => ("", None, uri),
    }
}
