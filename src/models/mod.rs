use serde::{Deserialize, Serialize};

// ── Record kinds ──────────────────────────────────────────────────────────────

/// Which dashboard a scrape targets. Each kind owns one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Rankings,
    Categories,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Rankings => "rankings",
            Kind::Categories => "categories",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Kind::Rankings => RankRecord::TABLE,
            Kind::Categories => CategoryRecord::TABLE,
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw scrape output ─────────────────────────────────────────────────────────

/// One DOM row as extracted: one cell per configured field, in field order.
/// Missing fields are already empty strings; nothing is trimmed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTuple(pub Vec<String>);

impl RawTuple {
    pub fn field(&self, idx: usize) -> &str {
        self.0.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// Rows accumulated over one traversal, in page-visit then row order.
#[derive(Debug, Clone, Default)]
pub struct ScrapeBatch {
    pub rows: Vec<RawTuple>,
    /// Row count per visited page.
    pub pages: Vec<usize>,
}

impl ScrapeBatch {
    pub fn push_page(&mut self, rows: Vec<RawTuple>) {
        self.pages.push(rows.len());
        self.rows.extend(rows);
    }

    pub fn pages_visited(&self) -> usize {
        self.pages.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Domain records ────────────────────────────────────────────────────────────

/// Binds a record type to its table shape. All columns are text; the first
/// column in `COLUMNS` is the natural key.
pub trait Record: Serialize + Sized {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn key_column() -> &'static str {
        Self::COLUMNS[0]
    }

    /// Column values in `COLUMNS` order.
    fn values(&self) -> Vec<&str>;

    /// Inverse of `values`, used when reading rows back.
    fn from_values(values: Vec<String>) -> Self;

    fn natural_key(&self) -> &str {
        self.values()[0]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankRecord {
    pub rank: String,
    pub brawler_name: String,
    pub wins: String,
    pub use_rate: String,
}

impl Record for RankRecord {
    const TABLE: &'static str = "brawl_data";
    const COLUMNS: &'static [&'static str] = &["brawler", "rank", "wins", "use_rate"];

    fn values(&self) -> Vec<&str> {
        vec![
            self.brawler_name.as_str(),
            self.rank.as_str(),
            self.wins.as_str(),
            self.use_rate.as_str(),
        ]
    }

    fn from_values(values: Vec<String>) -> Self {
        let mut it = values.into_iter();
        let mut next = || it.next().unwrap_or_default();
        let brawler_name = next();
        Self {
            brawler_name,
            rank: next(),
            wins: next(),
            use_rate: next(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub name: String,
    pub class_name: String,
}

impl Record for CategoryRecord {
    const TABLE: &'static str = "brawler_classes";
    const COLUMNS: &'static [&'static str] = &["name", "class_name"];

    fn values(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.class_name.as_str()]
    }

    fn from_values(values: Vec<String>) -> Self {
        let mut it = values.into_iter();
        Self {
            name: it.next().unwrap_or_default(),
            class_name: it.next().unwrap_or_default(),
        }
    }
}

/// A persisted row: insertion identity plus the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stored<R> {
    pub id: i64,
    #[serde(flatten)]
    pub record: R,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_values_round_trip_column_order() {
        let r = RankRecord {
            rank: "1".into(),
            brawler_name: "SHELLY".into(),
            wins: "100".into(),
            use_rate: "10%".into(),
        };
        assert_eq!(r.values(), vec!["SHELLY", "1", "100", "10%"]);
        assert_eq!(r.natural_key(), "SHELLY");
        assert_eq!(RankRecord::key_column(), "brawler");
        let back = RankRecord::from_values(r.values().into_iter().map(String::from).collect());
        assert_eq!(back, r);
    }

    #[test]
    fn test_stored_serializes_flat_camel_case() {
        let s = Stored {
            id: 7,
            record: RankRecord {
                rank: "2".into(),
                brawler_name: "COLT".into(),
                wins: "50".into(),
                use_rate: "3%".into(),
            },
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["id"], 7);
        assert_eq!(v["brawlerName"], "COLT");
        assert_eq!(v["useRate"], "3%");
    }

    #[test]
    fn test_raw_tuple_missing_field_is_empty() {
        let raw = RawTuple(vec!["a".into()]);
        assert_eq!(raw.field(0), "a");
        assert_eq!(raw.field(3), "");
    }

    #[test]
    fn test_kind_parses_lowercase() {
        let k: Kind = serde_json::from_str("\"categories\"").unwrap();
        assert_eq!(k, Kind::Categories);
        assert_eq!(k.table(), "brawler_classes");
    }
}
