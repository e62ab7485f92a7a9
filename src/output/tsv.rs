use std::io::Write;

use crate::error::FlowmonError;
use crate::state::TableSnapshot;

use super::{header, limited, row_cells};

/// Write the ranked aggregates as TSV: a header row, then one row per
/// aggregate in rank order.
pub fn write_tsv(
    snapshot: &TableSnapshot,
    limit: Option<usize>,
    writer: &mut impl Write,
) -> Result<(), FlowmonError> {
    writeln!(writer, "{}", header(snapshot).join("\t")).map_err(FlowmonError::Serialization)?;

    for agg in limited(snapshot, limit) {
        let row: Vec<String> = row_cells(snapshot, agg)
            .iter()
            .map(|c| escape_tsv(c))
            .collect();
        writeln!(writer, "{}", row.join("\t")).map_err(FlowmonError::Serialization)?;
    }

    Ok(())
}

/// Escape tabs and newlines in a string for TSV output.
fn escape_tsv(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testutil::sample_snapshot;
    use crate::model::fields::TableMode;
    use crate::state::FlowTable;

    fn render(snapshot: &TableSnapshot, limit: Option<usize>) -> String {
        let mut buf = Vec::new();
        write_tsv(snapshot, limit, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn empty_table_produces_header_only() {
        let snap = FlowTable::new(TableMode::Normal).snapshot();
        let output = render(&snap, None);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("InIf\tOutIf\tSrcMac"));
        assert!(lines[0].ends_with("TotalBytes\tTotalPackets\tRate(kbps)"));
    }

    #[test]
    fn column_count_is_constant() {
        let output = render(&sample_snapshot(), None);
        for line in output.lines() {
            assert_eq!(line.split('\t').count(), 16, "Expected 16 columns in: {line:?}");
        }
    }

    #[test]
    fn rows_follow_rank_order() {
        let output = render(&sample_snapshot(), None);
        let rows: Vec<Vec<&str>> = output
            .lines()
            .skip(1)
            .map(|l| l.split('\t').collect())
            .collect();
        assert_eq!(rows.len(), 2);
        // SrcPort is column 9, TotalBytes column 13.
        assert_eq!(rows[0][9], "443");
        assert_eq!(rows[0][13], "3200");
        assert_eq!(rows[1][9], "22");
        assert_eq!(rows[1][13], "500");
        assert_eq!(rows[1][0], "-");
    }

    #[test]
    fn limit_truncates_rows() {
        let output = render(&sample_snapshot(), Some(1));
        assert_eq!(output.lines().count(), 2);
    }

    #[test]
    fn tab_is_escaped() {
        assert_eq!(escape_tsv("foo\tbar\nbaz"), "foo bar baz");
    }
}
