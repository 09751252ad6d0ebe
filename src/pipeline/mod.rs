//! Pipeline orchestrator: ties browser session → scraper → storage together.
//!
//! One `scrape(kind)` call is one full cycle:
//!   1. Launch a browser session and walk the source's page chain.
//!   2. Close the session, whatever the traversal outcome.
//!   3. Normalise every extracted row (no row is dropped).
//!   4. Check out a connection and reconcile under the source's policy.
//!
//! Pagination trouble after the first page only truncates the batch. A
//! failure to open the start page, to launch the browser, or to store any
//! row fails the whole call; rows stored before a failing row stay stored.

use crate::config::{AppConfig, SourceConfig};
use crate::models::{CategoryRecord, Kind, RankRecord, Stored};
use crate::scraper::cleaner::{clean_category_rows, clean_rank_rows};
use crate::scraper::parsers::RowExtractor;
use crate::scraper::{traverse, DriverLauncher, Traversal, TraverseOptions};
use crate::storage::{self, Store};
use crate::utils::RunTimer;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Normalised records of one scrape, in traversal order.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Batch {
    Rankings(Vec<RankRecord>),
    Categories(Vec<CategoryRecord>),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Rankings(v) => v.len(),
            Batch::Categories(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persisted rows of one table, in identity order.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StoredRows {
    Rankings(Vec<Stored<RankRecord>>),
    Categories(Vec<Stored<CategoryRecord>>),
}

#[derive(Debug)]
pub struct ScrapeOutcome {
    pub kind: Kind,
    pub pages_visited: usize,
    /// False when pagination stopped before the last page.
    pub complete: bool,
    pub data: Batch,
    pub elapsed: Duration,
}

pub struct Pipeline {
    config: AppConfig,
    store: Arc<Store>,
    launcher: Arc<dyn DriverLauncher>,
}

impl Pipeline {
    pub fn new(config: AppConfig, store: Arc<Store>, launcher: Arc<dyn DriverLauncher>) -> Self {
        Self { config, store, launcher }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn scrape(&self, kind: Kind) -> Result<ScrapeOutcome> {
        let mut timer = RunTimer::start(format!("{} scrape", kind));
        let src = self.config.source(kind);
        let extractor = RowExtractor::for_source(src)?;

        let traversal = self
            .collect(src, &extractor)
            .await
            .with_context(|| format!("{} traversal failed", kind))?;
        let pages_visited = traversal.batch.pages_visited();
        let complete = traversal.halt.is_complete();
        let rows = traversal.batch.rows;

        let conn = self.store.checkout().context("No store connection")?;
        let data = match kind {
            Kind::Rankings => {
                let records = clean_rank_rows(&rows);
                self.store.reconcile(&conn, &records, src.policy)?;
                Batch::Rankings(records)
            }
            Kind::Categories => {
                let records = clean_category_rows(&rows);
                self.store.reconcile(&conn, &records, src.policy)?;
                Batch::Categories(records)
            }
        };

        info!(
            "{}: {} records over {} pages saved to {} ({:?}{})",
            kind,
            data.len(),
            pages_visited,
            kind.table(),
            src.policy,
            if complete { "" } else { ", truncated" }
        );

        timer.record(data.len(), pages_visited);
        Ok(ScrapeOutcome { kind, pages_visited, complete, data, elapsed: timer.elapsed() })
    }

    /// Traverse inside a session that is closed on every exit path.
    async fn collect(&self, src: &SourceConfig, extractor: &RowExtractor) -> Result<Traversal> {
        let mut session = self
            .launcher
            .launch()
            .await
            .context("Failed to launch browser")?;

        let opts = TraverseOptions::from(&self.config.scraper);
        let result = traverse(session.as_ref(), src, extractor, &opts).await;

        if let Err(e) = session.close().await {
            warn!("Closing browser session: {}", e);
        }
        Ok(result?)
    }

    pub fn rows(&self, kind: Kind) -> Result<StoredRows> {
        let conn = self.store.checkout().context("No store connection")?;
        Ok(match kind {
            Kind::Rankings => StoredRows::Rankings(storage::fetch_all(&conn)?),
            Kind::Categories => StoredRows::Categories(storage::fetch_all(&conn)?),
        })
    }
}
