use std::io::Write;

use crate::error::FlowmonError;
use crate::state::TableSnapshot;

use super::{header, limited, row_cells};

/// Widest a column may grow before its cells are truncated.
const MAX_COLUMN_WIDTH: usize = 40;

/// Write the ranked aggregates as an aligned, human-readable table.
///
/// Only active key fields get a column. The metric columns are always shown.
pub fn write_pretty(
    snapshot: &TableSnapshot,
    limit: Option<usize>,
    writer: &mut impl Write,
) -> Result<(), FlowmonError> {
    write_pretty_inner(snapshot, limit, writer).map_err(FlowmonError::Serialization)
}

fn write_pretty_inner(
    snapshot: &TableSnapshot,
    limit: Option<usize>,
    w: &mut impl Write,
) -> Result<(), std::io::Error> {
    let names = header(snapshot);
    let rows: Vec<Vec<String>> = limited(snapshot, limit)
        .iter()
        .map(|agg| row_cells(snapshot, agg))
        .collect();

    let field_count = snapshot.fields.len();
    let shown: Vec<usize> = (0..names.len())
        .filter(|&i| i >= field_count || snapshot.keys.contains(names[i]))
        .collect();

    let widths: Vec<usize> = shown
        .iter()
        .map(|&i| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain([names[i].len()])
                .max()
                .unwrap_or(0)
                .min(MAX_COLUMN_WIDTH)
        })
        .collect();
    let total_width = widths.iter().sum::<usize>() + widths.len().saturating_sub(1) * 2;

    writeln!(w, "Flow Aggregates")?;
    writeln!(w, "{}", "=".repeat(total_width.max(15)))?;
    writeln!(w, "Processed Messages: {}", snapshot.messages)?;
    writeln!(w, "Aggregates:         {}", snapshot.aggregates.len())?;
    writeln!(w, "Sorted by:          {}", snapshot.sort_name())?;
    writeln!(w)?;

    let header_line: Vec<String> = shown
        .iter()
        .zip(&widths)
        .map(|(&i, &width)| pad(names[i], width, i >= field_count))
        .collect();
    writeln!(w, "{}", header_line.join("  ").trim_end())?;
    writeln!(w, "{}", "-".repeat(total_width))?;

    for row in &rows {
        let line: Vec<String> = shown
            .iter()
            .zip(&widths)
            .map(|(&i, &width)| pad(&truncate(&row[i], width), width, i >= field_count))
            .collect();
        writeln!(w, "{}", line.join("  ").trim_end())?;
    }

    if rows.is_empty() {
        writeln!(w, "(no flows received)")?;
    } else if rows.len() < snapshot.aggregates.len() {
        writeln!(w, "({} more aggregates...)", snapshot.aggregates.len() - rows.len())?;
    }

    Ok(())
}

fn pad(s: &str, width: usize, right_align: bool) -> String {
    let fill = width.saturating_sub(s.chars().count());
    if right_align {
        format!("{}{s}", " ".repeat(fill))
    } else {
        format!("{s}{}", " ".repeat(fill))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fields::TableMode;
    use crate::output::testutil::sample_snapshot;
    use crate::state::FlowTable;

    fn render(snapshot: &TableSnapshot, limit: Option<usize>) -> String {
        let mut buf = Vec::new();
        write_pretty(snapshot, limit, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn pretty_contains_header_and_stats() {
        let output = render(&sample_snapshot(), None);
        assert!(output.contains("Flow Aggregates"));
        assert!(output.contains("Processed Messages: 3"));
        assert!(output.contains("Sorted by:          TotalBytes"));
        assert!(output.contains("SrcPort"));
        assert!(output.contains("Rate(kbps)"));
    }

    #[test]
    fn pretty_hides_inactive_columns() {
        let output = render(&sample_snapshot(), None);
        assert!(!output.contains("DstAddr"));
        assert!(!output.contains("SrcMac"));
    }

    #[test]
    fn pretty_sorted_by_rank() {
        let output = render(&sample_snapshot(), None);
        let pos_443 = output.find("443").unwrap();
        let pos_22 = output.find("  22").unwrap();
        assert!(pos_443 < pos_22);
    }

    #[test]
    fn pretty_empty_table() {
        let output = render(&FlowTable::new(TableMode::Normal).snapshot(), None);
        assert!(output.contains("(no flows received)"));
        assert!(output.contains("Processed Messages: 0"));
    }

    #[test]
    fn pretty_reports_hidden_rows() {
        let output = render(&sample_snapshot(), Some(1));
        assert!(output.contains("(1 more aggregates...)"));
    }

    #[test]
    fn truncate_long_values() {
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("abc", 6), "abc");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }
}
