use std::fmt::Write;

use anyhow::Result;

use super::flatten::{Cell, FlatRow, SCENARIO_COLUMN};

/// Sort direction for the report column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Parse direction from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            _ => Err(anyhow::anyhow!(
                "Unsupported sort direction: {}. Supported directions: asc, desc",
                s
            )),
        }
    }
}

/// Top rows of a result batch ordered by one response column
#[derive(Debug, Clone)]
pub struct Report {
    pub sort_by: String,
    pub direction: SortDirection,
    pub rows: Vec<FlatRow>,
    /// Rows removed because the sort column was missing or non-numeric
    pub dropped: usize,
}

/// Coerce `sort_by` to numbers, drop rows where that fails, sort, and keep the
/// first `rows_to_show`
///
/// The sort is stable, so ties keep their input order. Kept rows carry the
/// coerced numeric cell in the sort column.
pub fn top_rows(
    rows: &[FlatRow],
    sort_by: &str,
    direction: SortDirection,
    rows_to_show: usize,
) -> Report {
    let mut keyed: Vec<(f64, FlatRow)> = rows
        .iter()
        .filter_map(|row| {
            let key = row.get(sort_by)?.as_number()?;
            let mut row = row.clone();
            row.cells.insert(sort_by.to_string(), Cell::Number(key));
            Some((key, row))
        })
        .collect();
    let dropped = rows.len() - keyed.len();

    match direction {
        SortDirection::Ascending => keyed.sort_by(|a, b| a.0.total_cmp(&b.0)),
        SortDirection::Descending => keyed.sort_by(|a, b| b.0.total_cmp(&a.0)),
    }
    keyed.truncate(rows_to_show);

    Report {
        sort_by: sort_by.to_string(),
        direction,
        rows: keyed.into_iter().map(|(_, row)| row).collect(),
        dropped,
    }
}

/// Render rows as a fixed-width text table with the given column order
///
/// Cells absent from a row render empty.
pub fn render_table(rows: &[FlatRow], columns: &[String]) -> String {
    let grid: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| {
                    if col == SCENARIO_COLUMN {
                        row.scenario_name.clone()
                    } else {
                        row.get(col).map(Cell::to_string).unwrap_or_default()
                    }
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            grid.iter()
                .map(|cells| cells[i].chars().count())
                .chain(std::iter::once(col.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    write_line(&mut out, columns.iter().map(String::as_str), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_line(&mut out, rule.iter().map(String::as_str), &widths);
    for cells in &grid {
        write_line(&mut out, cells.iter().map(String::as_str), &widths);
    }
    out
}

fn write_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let line = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}
