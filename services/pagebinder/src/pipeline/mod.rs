//! Document generation pipeline.
//!
//! Turns a page URL into a delivered PDF: render, extract image sources,
//! filter, fetch concurrently, assemble in DOM order, deliver, clean up.
//! `generate` never propagates a failure past its boundary — every path
//! either delivers a document or tells the user what went wrong, and the
//! temporary artifacts of a run are removed on success and failure alike.

pub mod assemble;
pub mod fetch;
pub mod render;

pub use assemble::{assemble, build_document, PageImage};
pub use fetch::{is_eligible, FetchedImage, ImageCandidate, ImageFetcher};
pub use render::{ChromiumRenderer, PageRenderer};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::channels::Channel;
use crate::session::{DocumentGenerator, GenerateRequest};

pub const NOTICE_LOAD_FAILED: &str =
    "Failed to load the page. Please check the URL and try again.";
pub const NOTICE_SEND_FAILED: &str =
    "Sorry, there was an error sending the PDF. Please try again.";

/// Orchestrates one URL → PDF run end to end.
pub struct DocumentPipeline {
    renderer: Arc<dyn PageRenderer>,
    channel: Arc<dyn Channel>,
    fetcher: ImageFetcher,
    navigation_timeout: Duration,
    work_dir: PathBuf,
}

impl DocumentPipeline {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        channel: Arc<dyn Channel>,
        client: reqwest::Client,
        user_agent: String,
        navigation_timeout: Duration,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            renderer,
            channel,
            fetcher: ImageFetcher::new(client, user_agent, work_dir.clone()),
            navigation_timeout,
            work_dir,
        }
    }

    async fn run(&self, request: GenerateRequest) {
        let sources = match self
            .renderer
            .image_sources(&request.url, self.navigation_timeout)
            .await
        {
            Ok(sources) => sources,
            Err(error) => {
                tracing::warn!(url = %request.url, %error, "page render failed");
                self.reply(&request.chat_id, NOTICE_LOAD_FAILED).await;
                return;
            }
        };

        let candidates: Vec<ImageCandidate> = sources
            .iter()
            .enumerate()
            .filter_map(|(ordinal, source)| {
                if is_eligible(source) {
                    Some(ImageCandidate {
                        source: source.clone(),
                        ordinal,
                    })
                } else {
                    tracing::debug!(%source, "skipping unsupported image source");
                    None
                }
            })
            .collect();

        tracing::info!(
            url = %request.url,
            found = sources.len(),
            eligible = candidates.len(),
            "page rendered"
        );

        // Fan out; the join point waits for every fetch to settle. A failed
        // fetch drops its candidate, never the run.
        let results = join_all(candidates.iter().map(|c| self.fetcher.fetch(c))).await;

        let mut fetched: Vec<FetchedImage> = Vec::new();
        for (candidate, result) in candidates.iter().zip(results) {
            match result {
                Ok(image) => fetched.push(image),
                Err(error) => {
                    tracing::warn!(source = %candidate.source, %error, "image dropped");
                }
            }
        }

        // Page order is DOM order, never fetch-completion order
        fetched.sort_by_key(|image| image.ordinal);

        let mut artifacts: Vec<PathBuf> = fetched.iter().map(|image| image.path.clone()).collect();

        if let Err(error) = self
            .assemble_and_deliver(&request, &fetched, &mut artifacts)
            .await
        {
            tracing::error!(url = %request.url, %error, "document delivery failed");
            self.reply(&request.chat_id, NOTICE_SEND_FAILED).await;
        }

        self.cleanup(&artifacts).await;
    }

    async fn assemble_and_deliver(
        &self,
        request: &GenerateRequest,
        fetched: &[FetchedImage],
        artifacts: &mut Vec<PathBuf>,
    ) -> anyhow::Result<()> {
        let mut pages = Vec::with_capacity(fetched.len());
        for image in fetched {
            match tokio::fs::read(&image.path).await {
                Ok(jpeg) => pages.push(PageImage {
                    width: image.width,
                    height: image.height,
                    jpeg,
                }),
                Err(error) => {
                    tracing::warn!(
                        path = %image.path.display(),
                        %error,
                        "temp artifact unreadable, dropping page"
                    );
                }
            }
        }

        let bytes = assemble(pages).await?;

        // Finalize to storage and sync before delivery touches the file
        let document_path = self.work_dir.join(format!("document-{}.pdf", Uuid::new_v4()));
        artifacts.push(document_path.clone());

        let mut file = tokio::fs::File::create(&document_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        let document = tokio::fs::read(&document_path).await?;
        let file_name = format!("{}.pdf", request.output_name);
        self.channel
            .send_document(&request.chat_id, &file_name, document)
            .await?;

        tracing::info!(url = %request.url, %file_name, "document delivered");
        Ok(())
    }

    /// Remove every temp artifact; one failure never blocks the others.
    async fn cleanup(&self, artifacts: &[PathBuf]) {
        for path in artifacts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                // Tracked but never created (e.g. the run failed earlier)
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "failed to remove temp artifact");
                }
            }
        }
    }

    async fn reply(&self, chat_id: &str, message: &str) {
        if let Err(error) = self.channel.send(message, chat_id).await {
            tracing::warn!(chat_id, %error, "failed to send pipeline reply");
        }
    }
}

#[async_trait]
impl DocumentGenerator for DocumentPipeline {
    async fn generate(&self, request: GenerateRequest) {
        self.run(request).await;
    }
}
