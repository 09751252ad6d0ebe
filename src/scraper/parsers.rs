use crate::config::{FieldSpec, SourceConfig};
use crate::models::RawTuple;
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

// ── Row extractor ─────────────────────────────────────────────────────────────

/// Selector-based table reader, compiled once per source and applied to
/// every page snapshot of a traversal.
pub struct RowExtractor {
    rows: Selector,
    fields: Vec<(Selector, Option<String>)>,
}

impl RowExtractor {
    pub fn new(row_selector: &str, fields: &[FieldSpec]) -> Result<Self> {
        let rows = parse_selector(row_selector)?;
        let fields = fields
            .iter()
            .map(|f| Ok((parse_selector(&f.selector)?, f.attr.clone())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows, fields })
    }

    pub fn for_source(src: &SourceConfig) -> Result<Self> {
        Self::new(&src.row_selector, &src.fields)
    }

    /// Every matching row in document order, one cell per field.
    /// A field that matches nothing yields an empty string.
    pub fn extract(&self, html: &str) -> Vec<RawTuple> {
        let doc = Html::parse_document(html);
        doc.select(&self.rows).map(|row| self.read_row(row)).collect()
    }

    fn read_row(&self, row: ElementRef<'_>) -> RawTuple {
        let cells = self
            .fields
            .iter()
            .map(|(sel, attr)| {
                let Some(el) = row.select(sel).next() else {
                    return String::new();
                };
                match attr {
                    Some(name) => el.value().attr(name).unwrap_or_default().to_string(),
                    None => el.text().collect::<String>(),
                }
            })
            .collect();
        RawTuple(cells)
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("selector {:?}: {:?}", s, e))
}
