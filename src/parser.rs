//! Strict parsing of the pipe-delimited BOQ table a model returns.
//!
//! Structural problems (no header, wrong column count, no usable rows) fail
//! the parse; per-row problems reject only that row and are reported as
//! warnings so the caller can decide whether a partial table is acceptable.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::boq::{BoqRow, Unit};

const MAX_DESCRIPTION_LEN: usize = 200;

/// Tokens in a quantity cell that indicate the model hedged instead of
/// committing to a number.
const NON_DETERMINISTIC_MARKERS: &[&str] = &["-", "–", "to", "±", "?", "TBD", "vary"];

static QTY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(\.\d+)?)\s*(.*)$").expect("quantity pattern"));

// =============================================================================
// Errors
// =============================================================================

/// Structural failures. Any of these means the response as a whole is not a
/// usable table.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no table header found in response")]
    NoHeaderFound,
    #[error("table header has {0} columns, expected 3")]
    HeaderShape(usize),
    #[error("table contained no valid rows")]
    EmptyTable,
}

// =============================================================================
// Output
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub rows: Vec<BoqRow>,
    /// Row count before any caller-side filtering, for audit.
    pub raw_row_count: usize,
    /// Per-row rejections and anything else worth surfacing.
    pub warnings: Vec<String>,
}

// =============================================================================
// Parsing
// =============================================================================

fn split_cells(line: &str) -> Vec<&str> {
    line.split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

fn has_non_deterministic_marker(qty_cell: &str) -> bool {
    let lower = qty_cell.to_lowercase();
    NON_DETERMINISTIC_MARKERS
        .iter()
        .any(|m| lower.contains(&m.to_lowercase()))
}

fn parse_row(cells: &[&str], line_no: usize, warnings: &mut Vec<String>) -> Option<BoqRow> {
    let description = cells[0];
    let specifications = cells[1];
    let qty_cell = cells[2];

    if description.is_empty() || description.len() > MAX_DESCRIPTION_LEN {
        warnings.push(format!(
            "line {line_no}: description empty or longer than {MAX_DESCRIPTION_LEN} characters, row skipped"
        ));
        return None;
    }
    if specifications.is_empty() {
        warnings.push(format!("line {line_no}: empty specifications, row skipped"));
        return None;
    }

    let captures = match QTY_RE.captures(qty_cell) {
        Some(c) => c,
        None => {
            let reason = if has_non_deterministic_marker(qty_cell) {
                "non-deterministic quantity"
            } else {
                "unparseable quantity"
            };
            warnings.push(format!("line {line_no}: {reason} '{qty_cell}', row skipped"));
            return None;
        }
    };

    let quantity: f64 = captures[1].parse().ok()?;
    let remainder = captures[3].trim();

    // A range like "10-20" matches the pattern with "-20" left over; the
    // leftover must be a real unit or the row is rejected.
    let unit = if remainder.is_empty() {
        Unit::Nos
    } else {
        match remainder.parse::<Unit>() {
            Ok(unit) => unit,
            Err(_) => {
                let reason = if has_non_deterministic_marker(qty_cell) {
                    "non-deterministic quantity"
                } else {
                    "unrecognized unit"
                };
                warnings.push(format!("line {line_no}: {reason} '{qty_cell}', row skipped"));
                return None;
            }
        }
    };

    Some(BoqRow {
        description: description.to_string(),
        specifications: specifications.to_string(),
        quantity,
        unit,
    })
}

/// Parses a model response into BOQ rows.
///
/// The header is the first line naming both the description and qty columns;
/// any preamble before it is ignored. The header must split into exactly 3
/// cells. Separator lines (`---`) and lines without a `|` are skipped. A
/// blank line after at least one data row terminates the table, so trailing
/// commentary is ignored rather than treated as malformed rows.
pub fn parse_table(response: &str) -> Result<ParsedTable, ParseError> {
    let mut lines = response.lines().enumerate();

    let header_cells = loop {
        let (_, line) = lines.next().ok_or(ParseError::NoHeaderFound)?;
        let lower = line.to_lowercase();
        if lower.contains("description") && lower.contains("qty") {
            break split_cells(line.trim());
        }
    };
    if header_cells.len() != 3 {
        return Err(ParseError::HeaderShape(header_cells.len()));
    }

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    let mut raw_row_count = 0usize;

    for (idx, line) in lines {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if raw_row_count > 0 {
                break;
            }
            continue;
        }
        if trimmed.contains("---") || !trimmed.contains('|') {
            continue;
        }

        let cells = split_cells(trimmed);
        if cells.len() != 3 {
            warnings.push(format!(
                "line {line_no}: expected 3 cells, found {}, row skipped",
                cells.len()
            ));
            continue;
        }

        raw_row_count += 1;
        if let Some(row) = parse_row(&cells, line_no, &mut warnings) {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(ParseError::EmptyTable);
    }

    Ok(ParsedTable {
        rows,
        raw_row_count,
        warnings,
    })
}

// =============================================================================
// Advisory completeness checks
// =============================================================================

const EXPECTED_CATEGORIES: &[(&str, &[&str])] = &[
    ("DC earthing", &["dc"]),
    ("lightning protection", &["lightning", "ese", "arrestor", "arrester"]),
    ("earthing", &["earth"]),
    ("instrumentation", &["ct", "current transformer"]),
    ("busbar", &["busbar"]),
    ("cabling", &["cable"]),
];

const SUSPICIOUS_QUANTITY: f64 = 10_000.0;
const MIN_EXPECTED_ITEMS: usize = 5;

/// Checks a parsed table for signs of an incomplete or implausible BOQ.
/// Findings are advisory; they never fail the run.
pub fn validate_complete(rows: &[BoqRow]) -> Vec<String> {
    let mut warnings = Vec::new();

    if rows.len() < MIN_EXPECTED_ITEMS {
        warnings.push(format!(
            "only {} items in table, a complete BOQ usually has more",
            rows.len()
        ));
    }

    let haystack: String = rows
        .iter()
        .map(|r| format!("{} {}", r.description, r.specifications))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    for (category, keywords) in EXPECTED_CATEGORIES {
        if !keywords.iter().any(|k| haystack.contains(k)) {
            warnings.push(format!("no {category} items found in table"));
        }
    }

    for row in rows {
        if row.quantity > SUSPICIOUS_QUANTITY {
            warnings.push(format!(
                "suspicious quantity {} for '{}'",
                row.quantity, row.description
            ));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_TABLE: &str = "\
Description | Specifications | Qty
--- | --- | ---
DC Bonding Jumpers | 6 mm² tinned copper, PVC, 2m | 120 Nos
DC PE Cable | 16 mm² Cu/PVC | 850 m
DC Earth Pits | 3m × Ø16mm copper-bonded rod | 2 Nos
Earthing Compound | 25kg bentonite-graphite mix | 8 Bags
Earth Grid Strip | 50×6mm Cu | 320 m";

    #[test]
    fn parses_a_well_formed_table() {
        let table = parse_table(GOOD_TABLE).unwrap();
        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.raw_row_count, 5);
        assert!(table.warnings.is_empty());
        assert_eq!(table.rows[0].quantity, 120.0);
        assert_eq!(table.rows[0].unit, Unit::Nos);
        assert_eq!(table.rows[1].unit, Unit::Metre);
        assert_eq!(table.rows[3].unit, Unit::Bags);
    }

    #[test]
    fn boundary_pipes_are_tolerated() {
        let table = parse_table(
            "| Description | Specifications | Qty |\n| LA Earth Pits | 3m rod | 3 Nos |",
        )
        .unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].description, "LA Earth Pits");
    }

    #[test]
    fn preamble_before_the_header_is_ignored() {
        let input = "\
Here is the BOQ you requested:

Description | Specifications | Qty
Earth Pit | 3m rod | 2 Nos";
        let table = parse_table(input).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(table.warnings.is_empty());
        assert_eq!(table.rows[0].description, "Earth Pit");
    }

    #[test]
    fn lines_containing_triple_dashes_are_skipped() {
        let input = "\
Description | Specifications | Qty
Earth Pit | 3m rod | 2 Nos
Cable | 3-core --- armored | 10 m";
        let table = parse_table(input).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.raw_row_count, 1);
        assert!(table.warnings.is_empty());
    }

    #[test]
    fn trailing_prose_without_pipes_is_ignored_silently() {
        let input = "\
Description | Specifications | Qty
Earth Pit | 3m rod | 2 Nos
Let me know if you need the HV variant as well.";
        let table = parse_table(input).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(table.warnings.is_empty());
    }

    #[test]
    fn refusal_text_has_no_header() {
        assert_eq!(
            parse_table("Sorry, I cannot help with that request."),
            Err(ParseError::NoHeaderFound)
        );
        assert_eq!(parse_table(""), Err(ParseError::NoHeaderFound));
    }

    #[test]
    fn wrong_header_arity_is_structural() {
        assert_eq!(
            parse_table("Description | Qty\nPE Cable | 100 m"),
            Err(ParseError::HeaderShape(2))
        );
        assert_eq!(
            parse_table("Description | Specifications | Qty | Unit\nPE Cable | Cu | 100 | m"),
            Err(ParseError::HeaderShape(4))
        );
    }

    #[test]
    fn missing_unit_defaults_to_nos() {
        let table =
            parse_table("Description | Specifications | Qty\nSPD Type 2 | Uc 320V | 2").unwrap();
        assert_eq!(table.rows[0].unit, Unit::Nos);
        assert_eq!(table.rows[0].quantity, 2.0);
    }

    #[test]
    fn fractional_quantities_are_accepted() {
        let table =
            parse_table("Description | Specifications | Qty\nEarth Strip | Cu | 12.5 m").unwrap();
        assert_eq!(table.rows[0].quantity, 12.5);
    }

    #[test]
    fn hedged_quantities_reject_the_row_only() {
        let input = "\
Description | Specifications | Qty
Earth Pits | 3m rod | 10-20 Nos
PE Cable | 16 mm² | TBD
Surge Arrester | ZnO 18kV | ±5 Nos
LA Pits | 3m rod | 3 Nos";
        let table = parse_table(input).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.raw_row_count, 4);
        assert_eq!(table.warnings.len(), 3);
        assert!(table.warnings[0].contains("non-deterministic"));
    }

    #[test]
    fn overlong_description_rejects_the_row() {
        let long = "x".repeat(201);
        let input = format!(
            "Description | Specifications | Qty\n{long} | spec | 1 Nos\nEarth Pit | rod | 2 Nos"
        );
        let table = parse_table(&input).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(table.warnings[0].contains("description"));
    }

    #[test]
    fn blank_line_terminates_the_table() {
        let input = "\
Description | Specifications | Qty
Earth Pit | 3m rod | 2 Nos

Note: quantities assume loam soil | x | 1";
        let table = parse_table(input).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(table.warnings.is_empty());
    }

    #[test]
    fn all_rows_invalid_is_an_empty_table() {
        let input = "Description | Specifications | Qty\nEarth Pit | 3m rod | TBD";
        assert_eq!(parse_table(input), Err(ParseError::EmptyTable));
    }

    #[test]
    fn completeness_checks_flag_missing_categories_and_big_quantities() {
        let rows = vec![BoqRow {
            description: "DC PE Cable".into(),
            specifications: "16 mm²".into(),
            quantity: 25_000.0,
            unit: Unit::Metre,
        }];
        let warnings = validate_complete(&rows);
        assert!(warnings.iter().any(|w| w.contains("only 1 items")));
        assert!(warnings.iter().any(|w| w.contains("lightning")));
        assert!(warnings.iter().any(|w| w.contains("busbar")));
        assert!(warnings.iter().any(|w| w.contains("suspicious quantity")));
        // cable and dc categories are present, no warning for those
        assert!(!warnings.iter().any(|w| w.contains("no cabling")));
    }
}
