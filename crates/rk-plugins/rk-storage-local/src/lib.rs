//! # rk-storage-local
//! rankit/crates/rk-plugins/rk-storage-local/src/lib.rs
//! Local filesystem implementation of `MediaStore`.
//! Uploads land in a single bucket directory under generated unique names.

use async_trait::async_trait;
use image::ImageFormat;
use rk_core::error::AppError;
use rk_core::traits::MediaStore;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Directory (and URL segment) every post image is stored under.
pub const BUCKET: &str = "post-images";

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/uploads")
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// The directory to serve under `url_prefix`.
    pub fn root(&self) -> &Path {
        &self.root_path
    }

    fn bucket_path(&self) -> PathBuf {
        self.root_path.join(BUCKET)
    }
}

/// Picks the file extension from the bytes themselves; the declared content
/// type is only a hint.
fn sniff_extension(data: &[u8]) -> Result<&'static str, AppError> {
    let unsupported = || AppError::ValidationError("upload must be a PNG, JPEG, GIF or WebP image".into());
    match image::guess_format(data).map_err(|_| unsupported())? {
        ImageFormat::Png => Ok("png"),
        ImageFormat::Jpeg => Ok("jpg"),
        ImageFormat::Gif => Ok("gif"),
        ImageFormat::WebP => Ok("webp"),
        _ => Err(unsupported()),
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    /// Saves an upload as `<bucket>/<uuid>.<ext>` and returns the file name.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        // 1. Validate
        if data.is_empty() {
            return Err(AppError::ValidationError("upload is empty".into()).into());
        }
        let ext = sniff_extension(&data)?;
        if !content_type.starts_with("image/") {
            log::debug!("upload declared as {content_type}, sniffed as {ext}");
        }

        // 2. Ensure directory exists
        let dir = self.bucket_path();
        fs::create_dir_all(&dir).await?;

        // 3. Save under a fresh name
        let media_id = format!("{}.{ext}", Uuid::new_v4());
        fs::write(dir.join(&media_id), &data).await?;

        log::info!("stored upload {media_id} ({} bytes)", data.len());
        Ok(media_id)
    }

    fn get_url(&self, media_id: &str) -> String {
        format!("{}/{BUCKET}/{media_id}", self.url_prefix)
    }
}
