//! Image download and normalization.
//!
//! Eligible candidates are fetched concurrently by the pipeline; each fetch
//! normalizes to JPEG (WebP sources are transcoded), persists the bytes to a
//! uniquely named temp file and probes the pixel dimensions.

use std::io::Cursor;
use std::path::PathBuf;

use reqwest::header::USER_AGENT;
use uuid::Uuid;

use crate::error::FetchError;

/// Suffixes accepted by the eligibility filter. Matching is case-sensitive:
/// `.JPG` sources are skipped.
const ELIGIBLE_SUFFIXES: &[&str] = &[".jpg", ".jpeg", ".webp"];

/// An image reference extracted from the page, in DOM order.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub source: String,
    pub ordinal: usize,
}

/// A candidate that survived download and normalization.
#[derive(Debug)]
pub struct FetchedImage {
    pub ordinal: usize,
    /// Temp artifact holding the normalized JPEG bytes.
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Whether a source reference may be included in the output document.
///
/// Inline data URIs are never fetched; everything else must carry one of the
/// supported raster suffixes.
pub fn is_eligible(source: &str) -> bool {
    !source.starts_with("data:") && ELIGIBLE_SUFFIXES.iter().any(|s| source.ends_with(s))
}

/// Downloads and normalizes individual image candidates.
pub struct ImageFetcher {
    client: reqwest::Client,
    user_agent: String,
    work_dir: PathBuf,
}

impl ImageFetcher {
    pub fn new(client: reqwest::Client, user_agent: String, work_dir: PathBuf) -> Self {
        Self {
            client,
            user_agent,
            work_dir,
        }
    }

    /// Fetch one candidate: download, transcode WebP to JPEG, persist to a
    /// per-run-unique temp file and probe dimensions.
    pub async fn fetch(&self, candidate: &ImageCandidate) -> Result<FetchedImage, FetchError> {
        let response = self
            .client
            .get(&candidate.source)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await?.to_vec();
        let bytes = if candidate.source.ends_with(".webp") {
            transcode_webp_to_jpeg(&bytes)?
        } else {
            bytes
        };

        let (width, height) = decode_dimensions(&bytes)?;

        let path = self.work_dir.join(format!("image-{}.jpg", Uuid::new_v4()));
        tokio::fs::write(&path, &bytes).await?;

        tracing::debug!(
            source = %candidate.source,
            ordinal = candidate.ordinal,
            width,
            height,
            "image fetched"
        );

        Ok(FetchedImage {
            ordinal: candidate.ordinal,
            path,
            width,
            height,
        })
    }
}

/// Re-encode WebP bytes as baseline JPEG.
pub fn transcode_webp_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, FetchError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut out = Cursor::new(Vec::new());
    decoded
        .to_rgb8()
        .write_to(&mut out, image::ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

/// Pixel dimensions of an encoded image, without a full decode.
pub fn decode_dimensions(bytes: &[u8]) -> Result<(u32, u32), FetchError> {
    let reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}
