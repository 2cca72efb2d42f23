//! Product image helpers on top of the object storage provider.

use std::sync::Arc;

use rand::Rng;
use tracing::{error, info};

use crate::provider::{ObjectStorage, ProviderError};

const NAME_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const NAME_LEN: usize = 13;

/// Random lowercase base-36 object name.
#[must_use]
pub fn random_object_name() -> String {
    let mut rng = rand::rng();
    (0..NAME_LEN)
        .map(|_| char::from(NAME_ALPHABET[rng.random_range(0..NAME_ALPHABET.len())]))
        .collect()
}

/// Extension of `file_name` (text after the last dot), lowercased.
/// A name without a dot yields the whole name, matching how uploads were
/// named historically.
#[must_use]
pub fn file_extension(file_name: &str) -> String {
    file_name
        .rsplit('.')
        .next()
        .unwrap_or(file_name)
        .to_ascii_lowercase()
}

#[must_use]
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// Storage path for a new upload: `{folder}/{random}.{ext}`.
#[must_use]
pub fn object_path(folder: &str, file_name: &str) -> String {
    let folder = folder.trim_matches('/');
    let name = format!("{}.{}", random_object_name(), file_extension(file_name));
    if folder.is_empty() { name } else { format!("{folder}/{name}") }
}

#[derive(Clone)]
pub struct ProductImages {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
}

impl ProductImages {
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>) -> Self {
        Self { storage, bucket: bucket.into() }
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload `bytes` under a fresh random name inside `folder`.
    /// Returns the stored path, which `public_url` turns into a link.
    ///
    /// # Errors
    ///
    /// Propagates the provider's upload error.
    pub async fn upload_file(&self, file_name: &str, bytes: Vec<u8>, folder: &str) -> Result<String, ProviderError> {
        let path = object_path(folder, file_name);
        let content_type = content_type_for(&file_extension(file_name));
        let size = bytes.len();
        let stored = self
            .storage
            .upload(&self.bucket, &path, bytes, content_type)
            .await?;
        info!(bucket = %self.bucket, path = %stored, size, "image uploaded");
        Ok(stored)
    }

    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        self.storage.public_url(&self.bucket, path)
    }

    /// # Errors
    ///
    /// Propagates the provider's delete error after logging it.
    pub async fn delete_file(&self, path: &str) -> Result<(), ProviderError> {
        if let Err(e) = self
            .storage
            .remove(&self.bucket, &[path.to_string()])
            .await
        {
            error!(error = %e, path, "error deleting file");
            return Err(e);
        }
        info!(bucket = %self.bucket, path, "image deleted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
