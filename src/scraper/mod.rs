pub mod chromium;
pub mod cleaner;
pub mod parsers;

use crate::config::{ScraperConfig, SourceConfig};
use crate::models::ScrapeBatch;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use self::parsers::RowExtractor;

// ── Page driver ───────────────────────────────────────────────────────────────

/// Failures raised by a browsing session.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("timed out after {ms}ms waiting for {selector}")]
    Timeout { selector: String, ms: u64 },

    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("page evaluation failed: {0}")]
    Evaluation(String),

    #[error("browser session closed")]
    Closed,
}

/// One headless browsing session.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &Url) -> Result<(), DriverError>;

    /// Resolve once `selector` is present, or fail after `timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Rendered DOM snapshot of the current page.
    async fn content(&self) -> Result<String, DriverError>;

    /// Click the first element matching `selector`. `Ok(false)` when there
    /// is no such element.
    async fn click_next(&self, selector: &str) -> Result<bool, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens a fresh session per scrape invocation.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError>;
}

// ── Paginator ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TraverseOptions {
    pub wait_timeout: Duration,
    pub settle_delay: Duration,
    pub max_pages: Option<u32>,
}

impl From<&ScraperConfig> for TraverseOptions {
    fn from(cfg: &ScraperConfig) -> Self {
        Self {
            wait_timeout: Duration::from_millis(cfg.wait_timeout_ms),
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
            max_pages: cfg.max_pages,
        }
    }
}

/// Why a traversal stopped. Only `LastPage` means the chain was exhausted;
/// the rest are truncations, and the rows gathered before them are kept.
#[derive(Debug)]
pub enum Halt {
    LastPage,
    PageLimit(u32),
    WaitFailed(DriverError),
    SnapshotFailed(DriverError),
    AdvanceFailed(DriverError),
}

impl Halt {
    pub fn is_complete(&self) -> bool {
        matches!(self, Halt::LastPage)
    }
}

#[derive(Debug)]
pub struct Traversal {
    pub batch: ScrapeBatch,
    pub halt: Halt,
}

/// Walk the page chain starting at `src.url`, extracting every page until
/// the next control disappears or something fails.
///
/// Only a failure to open the start URL is returned as an error. Anything
/// that goes wrong afterwards ends the loop and hands back what was
/// accumulated so far.
pub async fn traverse(
    driver: &dyn PageDriver,
    src: &SourceConfig,
    extractor: &RowExtractor,
    opts: &TraverseOptions,
) -> Result<Traversal, DriverError> {
    info!("Opening {}", src.url);
    driver.goto(&src.url).await?;

    let mut batch = ScrapeBatch::default();

    let halt = loop {
        let page = batch.pages_visited() + 1;

        if let Err(e) = driver.wait_for(&src.ready_selector, opts.wait_timeout).await {
            break Halt::WaitFailed(e);
        }
        if page > 1 {
            tokio::time::sleep(opts.settle_delay).await;
        }

        let html = match driver.content().await {
            Ok(html) => html,
            Err(e) => break Halt::SnapshotFailed(e),
        };

        let rows = extractor.extract(&html);
        debug!("  Page {}: {} rows", page, rows.len());
        batch.push_page(rows);

        if let Some(max) = opts.max_pages {
            if batch.pages_visited() >= max as usize {
                break Halt::PageLimit(max);
            }
        }

        match driver.click_next(&src.next_selector).await {
            Ok(true) => {}
            Ok(false) => break Halt::LastPage,
            Err(e) => break Halt::AdvanceFailed(e),
        }
    };

    match &halt {
        Halt::LastPage => info!(
            "Reached last page: {} pages, {} rows",
            batch.pages_visited(),
            batch.len()
        ),
        Halt::PageLimit(max) => warn!("Reached page limit ({}), stopping", max),
        other => warn!(
            "Pagination stopped early after {} pages ({} rows): {:?}",
            batch.pages_visited(),
            batch.len(),
            other
        ),
    }

    Ok(Traversal { batch, halt })
}

// ── Scripted driver for tests ─────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::config::AppConfig;

    fn opts() -> TraverseOptions {
        TraverseOptions {
            wait_timeout: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
            max_pages: None,
        }
    }

    async fn run(driver: &FakeDriver, opts: &TraverseOptions) -> Result<Traversal, DriverError> {
        let cfg = AppConfig::default();
        let src = &cfg.sources.rankings;
        let extractor = RowExtractor::for_source(src).unwrap();
        traverse(driver, src, &extractor, opts).await
    }

    #[tokio::test]
    async fn test_visits_every_page_of_finite_chain() {
        for n in 1..=5 {
            let driver = FakeDriver::new(chain(n, 3));
            let t = run(&driver, &opts()).await.unwrap();
            assert!(t.halt.is_complete());
            assert_eq!(t.batch.pages_visited(), n);
            assert_eq!(t.batch.len(), n * 3);
        }
    }

    #[tokio::test]
    async fn test_row_count_is_sum_over_pages() {
        let pages = vec![
            FakePage { html: rank_page(1, 4), renders: true },
            FakePage { html: rank_page(2, 0), renders: true },
            FakePage { html: rank_page(3, 2), renders: true },
        ];
        let driver = FakeDriver::new(pages);
        let t = run(&driver, &opts()).await.unwrap();
        assert_eq!(t.batch.pages, vec![4, 0, 2]);
        assert_eq!(t.batch.len(), 6);
    }

    #[tokio::test]
    async fn test_rows_in_page_then_dom_order() {
        let driver = FakeDriver::new(chain(2, 2));
        let t = run(&driver, &opts()).await.unwrap();
        let ranks: Vec<&str> = t.batch.rows.iter().map(|r| r.field(0)).collect();
        assert_eq!(ranks, vec!["1.1", "1.2", "2.1", "2.2"]);
    }

    #[tokio::test]
    async fn test_page_failing_to_render_keeps_earlier_pages() {
        let mut pages = chain(5, 3);
        pages[2].renders = false;
        let driver = FakeDriver::new(pages);

        let t = run(&driver, &opts()).await.unwrap();
        assert!(matches!(t.halt, Halt::WaitFailed(DriverError::Timeout { .. })));
        assert_eq!(t.batch.pages_visited(), 2);
        assert_eq!(t.batch.len(), 6);
        assert_eq!(t.batch.rows[5].field(1), "B2_3");
    }

    #[tokio::test]
    async fn test_advance_failure_truncates() {
        let driver = FakeDriver::new(chain(4, 1)).click_fails_on(2);
        let t = run(&driver, &opts()).await.unwrap();
        assert!(matches!(t.halt, Halt::AdvanceFailed(_)));
        assert!(!t.halt.is_complete());
        assert_eq!(t.batch.len(), 2);
    }

    #[tokio::test]
    async fn test_first_page_not_rendering_returns_empty() {
        let mut pages = chain(3, 2);
        pages[0].renders = false;
        let driver = FakeDriver::new(pages);
        let t = run(&driver, &opts()).await.unwrap();
        assert!(t.batch.is_empty());
        assert_eq!(t.batch.pages_visited(), 0);
    }

    #[tokio::test]
    async fn test_start_navigation_failure_is_error() {
        let driver = FakeDriver::new(chain(2, 2)).goto_fails();
        let err = run(&driver, &opts()).await.unwrap_err();
        assert!(matches!(err, DriverError::Navigation(_)));
    }

    #[tokio::test]
    async fn test_page_limit_stops_traversal() {
        let driver = FakeDriver::new(chain(10, 1));
        let limited = TraverseOptions { max_pages: Some(3), ..opts() };
        let t = run(&driver, &limited).await.unwrap();
        assert!(matches!(t.halt, Halt::PageLimit(3)));
        assert_eq!(t.batch.pages_visited(), 3);
    }

    #[test]
    fn test_options_from_config() {
        let o = TraverseOptions::from(&ScraperConfig::default());
        assert_eq!(o.wait_timeout, Duration::from_millis(5000));
        assert_eq!(o.settle_delay, Duration::from_millis(1000));
        assert_eq!(o.max_pages, None);
    }
}
