//! Recipe images: base64 data-URL decoding and content-addressed storage on local disk.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::{
    config::Config,
    constants::{IMAGE_DIRECTORY, IMAGE_FORMATS},
    error::{Error, ErrorKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

impl Image {
    /// Relative storage path, named after the SHA-256 digest of the content.
    pub fn path(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        let hash = format!("{:x}", hasher.finalize());

        format!("{IMAGE_DIRECTORY}/{hash}.{}", self.extension)
    }
}

/// Decodes `data:image/<type>;base64,<payload>`.
pub fn decode_image(data: &str) -> Result<Image, Error> {
    let invalid = || {
        ErrorKind::Validation.field(
            "image",
            "Upload a valid image as a base64 data URL (data:image/png;base64,...).",
        )
    };

    let (mime, payload) = data
        .trim()
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .ok_or_else(invalid)?;

    let extension = IMAGE_FORMATS
        .iter()
        .find(|(m, _)| m.eq_ignore_ascii_case(mime))
        .map(|(_, ext)| *ext)
        .ok_or_else(|| {
            ErrorKind::Validation.field("image", &format!("Unsupported image type: {mime}"))
        })?;

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(payload).map_err(|e| {
        log::warn!("Rejected image payload: {e}");
        invalid()
    })?;
    if bytes.is_empty() {
        return Err(invalid());
    }

    Ok(Image { bytes, extension })
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStore {
    pub fn new(root: PathBuf, url_prefix: &str) -> Self {
        let url_prefix = if url_prefix.ends_with('/') {
            url_prefix.to_string()
        } else {
            format!("{url_prefix}/")
        };

        Self { root, url_prefix }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.media_root.clone(), &config.media_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.url_prefix, path)
    }

    /// Writes the image unless identical content is already stored. Returns the relative path.
    pub async fn save(&self, image: &Image) -> Result<String, Error> {
        let path = image.path();
        let target = self.root.join(&path);

        if fs::try_exists(&target).await.unwrap_or(false) {
            log::trace!("> Image {path} already stored");
            return Ok(path);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                log::error!("Failed to create media directory {}: {e}", parent.display());
                ErrorKind::Internal.default()
            })?;
        }

        fs::write(&target, &image.bytes).await.map_err(|e| {
            log::error!("Failed to write image {}: {e}", target.display());
            ErrorKind::Internal.default()
        })?;
        log::debug!("Stored image {path} ({} bytes)", image.bytes.len());

        Ok(path)
    }

    pub async fn remove(&self, path: &str) {
        let target = self.root.join(path);
        if let Err(e) = fs::remove_file(&target).await {
            log::warn!("Failed to remove image {}: {e}", target.display());
        }
    }
}
