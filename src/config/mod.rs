use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::models::{CategoryRecord, Kind, RankRecord, Record};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Browser/pagination timing shared by every source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Bound on waiting for the ready marker after each advance.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Fixed pause after the marker reappears, before extracting.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Unbounded when absent.
    #[serde(default)]
    pub max_pages: Option<u32>,

    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(default = "default_rankings_source")]
    pub rankings: SourceConfig,

    #[serde(default = "default_categories_source")]
    pub categories: SourceConfig,
}

/// How a batch is merged into its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Unconditional insert, no uniqueness constraint on the table.
    Append,
    /// Insert or overwrite non-key columns on natural-key conflict.
    Upsert,
}

/// One paginated dashboard.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub url: Url,
    /// DOM marker that signals the table has rendered.
    pub ready_selector: String,
    pub row_selector: String,
    pub next_selector: String,
    /// One entry per record field, in field order.
    pub fields: Vec<FieldSpec>,
    pub policy: Policy,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSpec {
    pub selector: String,
    /// Read this attribute instead of the text content.
    #[serde(default)]
    pub attr: Option<String>,
}

impl FieldSpec {
    pub fn text(selector: &str) -> Self {
        Self { selector: selector.to_string(), attr: None }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

const RANKINGS_URL: &str = "https://brawltime.ninja/dashboard?filter[season]=2025-01-06&filter[trophyRangeGte]=18&filter[powerplay]=true&cube=map&dimension=brawler&metric=wins&metric=useRate&sort=wins";
const CATEGORIES_URL: &str = "https://brawltime.ninja/dashboard?cube=map&dimension=brawler&dimension=class";

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_wait_timeout_ms() -> u64 {
    5000
}
fn default_settle_delay_ms() -> u64 {
    1000
}
fn default_navigation_timeout_ms() -> u64 {
    30_000
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/brawl.duckdb")
}
fn default_true() -> bool {
    true
}

fn default_rankings_source() -> SourceConfig {
    SourceConfig {
        url: Url::parse(RANKINGS_URL).expect("static url"),
        ready_selector: "table.w-full".to_string(),
        row_selector: "table.w-full tbody tr".to_string(),
        next_selector: r#"button[aria-label="next"]"#.to_string(),
        fields: vec![
            FieldSpec::text("td:nth-child(1)"),
            FieldSpec::text(r#"th[scope="row"] figcaption"#),
            FieldSpec::text("td:nth-child(3)"),
            FieldSpec::text("td:nth-child(4)"),
        ],
        policy: Policy::Upsert,
    }
}

fn default_categories_source() -> SourceConfig {
    SourceConfig {
        url: Url::parse(CATEGORIES_URL).expect("static url"),
        ready_selector: "table.w-full".to_string(),
        row_selector: "table.w-full tbody tr".to_string(),
        next_selector: r#"button[aria-label="next"]"#.to_string(),
        fields: vec![
            FieldSpec::text(r#"th[scope="row"] figcaption"#),
            FieldSpec::text("td:nth-child(2)"),
        ],
        policy: Policy::Append,
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            max_pages: None,
            chrome_executable: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path(), run_migrations: true }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            rankings: default_rankings_source(),
            categories: default_categories_source(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::load_from(Path::new("config"))
    }

    /// `dir/default.toml`, then `dir/local.toml`, then `BRAWL__*` variables,
    /// then `DATABASE_URL` for the store path. Later layers win.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(
                config::File::from(dir.join("default"))
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::from(dir.join("local"))
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("BRAWL")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("storage.db_path", std::env::var("DATABASE_URL").ok())?
            .build()
            .context("Failed to assemble configuration")?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn source(&self, kind: Kind) -> &SourceConfig {
        match kind {
            Kind::Rankings => &self.sources.rankings,
            Kind::Categories => &self.sources.categories,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (kind, columns) in [
            (Kind::Rankings, RankRecord::COLUMNS.len()),
            (Kind::Categories, CategoryRecord::COLUMNS.len()),
        ] {
            let src = self.source(kind);
            if src.fields.len() != columns {
                bail!(
                    "sources.{}: expected {} fields, got {}",
                    kind,
                    columns,
                    src.fields.len()
                );
            }
            let selectors = [&src.ready_selector, &src.row_selector, &src.next_selector]
                .into_iter()
                .chain(src.fields.iter().map(|f| &f.selector));
            for sel in selectors {
                scraper::Selector::parse(sel)
                    .map_err(|e| anyhow::anyhow!("sources.{}: bad selector {:?}: {:?}", kind, sel, e))?;
            }
        }
        if self.scraper.wait_timeout_ms == 0 {
            bail!("scraper.wait_timeout_ms must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.sources.rankings.policy, Policy::Upsert);
        assert_eq!(cfg.sources.categories.policy, Policy::Append);
        assert_eq!(cfg.scraper.max_pages, None);
    }

    #[test]
    fn test_field_count_mismatch_rejected() {
        let mut cfg = AppConfig::default();
        cfg.sources.categories.fields.pop();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("sources.categories"));
    }

    #[test]
    fn test_bad_selector_rejected() {
        let mut cfg = AppConfig::default();
        cfg.sources.rankings.next_selector = "button[[".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[server]\nport = 8080\n[sources.categories]\nurl = \"https://example.com/classes\"\nready_selector = \"table\"\nrow_selector = \"tr\"\nnext_selector = \".next\"\npolicy = \"upsert\"\nfields = [{ selector = \"td:nth-child(1)\" }, { selector = \"img\", attr = \"alt\" }]\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.sources.categories.policy, Policy::Upsert);
        assert_eq!(cfg.sources.categories.fields[1].attr.as_deref(), Some("alt"));
        assert_eq!(cfg.sources.rankings.policy, Policy::Upsert);
        assert!(cfg.validate().is_ok());
    }

    // Only test that touches process environment.
    #[test]
    fn test_env_layers_over_files() {
        let dir = std::env::temp_dir().join(format!("brawl_etl_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "[server]\nport = 9000\nhost = \"0.0.0.0\"\n[storage]\ndb_path = \"from_file.duckdb\"\n",
        )
        .unwrap();
        std::fs::write(dir.join("local.toml"), "[server]\nhost = \"10.0.0.1\"\n").unwrap();

        let files_only = AppConfig::load_from(&dir).unwrap();
        assert_eq!(files_only.server.port, 9000);
        assert_eq!(files_only.server.host, "10.0.0.1");
        assert_eq!(files_only.storage.db_path, PathBuf::from("from_file.duckdb"));

        unsafe {
            std::env::set_var("BRAWL__SERVER__PORT", "9100");
            std::env::set_var("DATABASE_URL", "/tmp/from_env.duckdb");
        }
        let layered = AppConfig::load_from(&dir);
        unsafe {
            std::env::remove_var("BRAWL__SERVER__PORT");
            std::env::remove_var("DATABASE_URL");
        }
        let _ = std::fs::remove_dir_all(&dir);

        let layered = layered.unwrap();
        assert_eq!(layered.server.port, 9100);
        assert_eq!(layered.server.host, "10.0.0.1");
        assert_eq!(layered.storage.db_path, PathBuf::from("/tmp/from_env.duckdb"));
    }
}
