use crate::models::{CategoryRecord, RankRecord, RawTuple};

// ── Normalisers ───────────────────────────────────────────────────────────────
//
// Total and non-filtering: every raw tuple becomes exactly one record, with
// absent cells as empty strings.

fn cell(raw: &RawTuple, idx: usize) -> String {
    raw.field(idx).trim().to_string()
}

/// Field order: rank, brawler, wins, use rate.
pub fn normalise_rank(raw: &RawTuple) -> RankRecord {
    RankRecord {
        rank: cell(raw, 0),
        brawler_name: cell(raw, 1),
        wins: cell(raw, 2),
        use_rate: cell(raw, 3),
    }
}

/// Field order: name, class.
pub fn normalise_category(raw: &RawTuple) -> CategoryRecord {
    CategoryRecord {
        name: cell(raw, 0),
        class_name: cell(raw, 1),
    }
}

pub fn clean_rank_rows(rows: &[RawTuple]) -> Vec<RankRecord> {
    rows.iter().map(normalise_rank).collect()
}

pub fn clean_category_rows(rows: &[RawTuple]) -> Vec<CategoryRecord> {
    rows.iter().map(normalise_category).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(cells: &[&str]) -> RawTuple {
        RawTuple(cells.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_normalise_rank_trims() {
        let r = normalise_rank(&raw(&[" 1\n", "  Shelly ", "1,204", "12.5% "]));
        assert_eq!(r.rank, "1");
        assert_eq!(r.brawler_name, "Shelly");
        assert_eq!(r.wins, "1,204");
        assert_eq!(r.use_rate, "12.5%");
    }

    #[test]
    fn test_normalise_is_total() {
        let r = normalise_rank(&RawTuple::default());
        assert_eq!(r, RankRecord::default());

        let c = normalise_category(&raw(&["Spike"]));
        assert_eq!(c.name, "Spike");
        assert_eq!(c.class_name, "");
    }

    #[test]
    fn test_clean_keeps_every_row() {
        let rows = vec![raw(&["", "", "", ""]), raw(&["2", "Colt"]), RawTuple::default()];
        let cleaned = clean_rank_rows(&rows);
        assert_eq!(cleaned.len(), rows.len());
        assert_eq!(cleaned[1].brawler_name, "Colt");
        assert_eq!(cleaned[1].wins, "");
    }

    #[test]
    fn test_clean_category_rows() {
        let cleaned = clean_category_rows(&[raw(&["Bull ", " Tank"]), raw(&[])]);
        assert_eq!(
            cleaned,
            vec![
                CategoryRecord { name: "Bull".into(), class_name: "Tank".into() },
                CategoryRecord::default(),
            ]
        );
    }
}
