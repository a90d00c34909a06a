//! Headless page renderer.
//!
//! Launches a Chromium instance per run, navigates with a bounded wait and
//! collects the `src` of every image element in DOM order. The browser is
//! closed on every exit path.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures_util::StreamExt;

use crate::error::RenderError;

const COLLECT_IMAGE_SOURCES: &str = "Array.from(document.images).map(img => img.src)";

/// Seam between the pipeline and the browser engine.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url` and return the source of every image element, in DOM order.
    async fn image_sources(
        &self,
        url: &str,
        max_wait: Duration,
    ) -> Result<Vec<String>, RenderError>;
}

/// Chromium-backed renderer (CDP via chromiumoxide).
#[derive(Debug, Default)]
pub struct ChromiumRenderer;

impl ChromiumRenderer {
    async fn collect(
        browser: &Browser,
        url: &str,
        max_wait: Duration,
    ) -> Result<Vec<String>, RenderError> {
        let page = tokio::time::timeout(max_wait, browser.new_page(url))
            .await
            .map_err(|_| RenderError::NavigationTimeout {
                url: url.to_string(),
            })?
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let sources: Vec<String> = page
            .evaluate(COLLECT_IMAGE_SOURCES)
            .await
            .map_err(|e| RenderError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| RenderError::Script(e.to_string()))?;

        Ok(sources)
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn image_sources(
        &self,
        url: &str,
        max_wait: Duration,
    ) -> Result<Vec<String>, RenderError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .build()
            .map_err(RenderError::LaunchFailed)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::LaunchFailed(e.to_string()))?;

        // Drive CDP events until the browser shuts down
        let mut driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = Self::collect(&browser, url, max_wait).await;

        if let Err(error) = browser.close().await {
            tracing::warn!(%error, "browser close failed");
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), &mut driver).await;
        driver.abort();

        result
    }
}
