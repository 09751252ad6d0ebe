//! Headless Chromium session behind the `PageDriver` seam.
//!
//! One browser process per scrape invocation, driven over CDP by
//! chromiumoxide. The CDP event handler runs on a background task that is
//! aborted when the session closes.

use crate::config::ScraperConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use super::{DriverError, DriverLauncher, PageDriver};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ChromiumLauncher {
    navigation_timeout: Duration,
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            executable: config.chrome_executable.clone(),
        }
    }
}

#[async_trait]
impl DriverLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let mut builder = BrowserConfig::builder();
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {e}");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                browser.close().await.ok();
                browser.wait().await.ok();
                events.abort();
                return Err(DriverError::Launch(e.to_string()));
            }
        };

        debug!("Browser session opened");
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            events,
            navigation_timeout: self.navigation_timeout,
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    events: JoinHandle<()>,
    navigation_timeout: Duration,
}

#[async_trait]
impl PageDriver for ChromiumSession {
    async fn goto(&self, url: &Url) -> Result<(), DriverError> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url.as_str())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Navigation(e.to_string())),
            Err(_) => Err(DriverError::Timeout {
                selector: url.to_string(),
                ms: self.navigation_timeout.as_millis() as u64,
            }),
        }
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let poll = async {
            loop {
                if self.page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| DriverError::Timeout {
                selector: selector.to_string(),
                ms: timeout.as_millis() as u64,
            })
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page
            .content()
            .await
            .map_err(|e| DriverError::Evaluation(e.to_string()))
    }

    async fn click_next(&self, selector: &str) -> Result<bool, DriverError> {
        let found = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| DriverError::Evaluation(e.to_string()))?;
        let Some(control) = found.into_iter().next() else {
            return Ok(false);
        };
        control
            .click()
            .await
            .map_err(|e| DriverError::SelectorNotFound(format!("{selector}: {e}")))?;
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let page = self.page.clone().close().await;
        let browser = self.browser.close().await;
        self.browser.wait().await.ok();
        self.events.abort();
        debug!("Browser session closed");

        page.map_err(|e| DriverError::Evaluation(e.to_string()))?;
        browser.map_err(|_| DriverError::Closed)?;
        Ok(())
    }
}
