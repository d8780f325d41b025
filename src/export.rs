//! BOQ export formats.
//!
//! CSV for spreadsheets and a pipe table for anything that already consumes
//! the model output format. The pipe table re-parses through the strict
//! table parser, so exports can be fed back in for verification.

use crate::domain::boq::BoqRow;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV produced invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("CSV row missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("CSV row has invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

const HEADERS: [&str; 4] = ["Description", "Specifications", "Qty", "Unit"];

pub fn to_csv(rows: &[BoqRow]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.write_record([
            row.description.as_str(),
            row.specifications.as_str(),
            &row.quantity.to_string(),
            row.unit.as_str(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(csv::Error::from(e.into_error())))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn from_csv(data: &str) -> Result<Vec<BoqRow>, ExportError> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: usize, name: &'static str| {
            record
                .get(idx)
                .map(str::to_string)
                .ok_or(ExportError::MissingColumn(name))
        };
        let quantity_raw = field(2, "Qty")?;
        let quantity = quantity_raw
            .trim()
            .parse::<f64>()
            .map_err(|_| ExportError::InvalidField {
                field: "Qty",
                value: quantity_raw.clone(),
            })?;
        let unit_raw = field(3, "Unit")?;
        let unit = unit_raw.parse().map_err(|_| ExportError::InvalidField {
            field: "Unit",
            value: unit_raw.clone(),
        })?;
        rows.push(BoqRow {
            description: field(0, "Description")?,
            specifications: field(1, "Specifications")?,
            quantity,
            unit,
        });
    }
    Ok(rows)
}

/// Renders rows back into the pipe table format.
pub fn to_display_table(rows: &[BoqRow]) -> String {
    let mut out = String::from("Description | Specifications | Qty\n");
    for row in rows {
        out.push_str(&format!(
            "{} | {} | {} {}\n",
            row.description, row.specifications, row.quantity, row.unit
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::boq::Unit;

    fn sample_rows() -> Vec<BoqRow> {
        vec![
            BoqRow {
                description: "DC Earth Pits".into(),
                specifications: "3m × Ø16mm copper-bonded rod".into(),
                quantity: 2.0,
                unit: Unit::Nos,
            },
            BoqRow {
                description: "Earth Grid Strip".into(),
                specifications: "50×6mm Cu, buried 600mm".into(),
                quantity: 312.5,
                unit: Unit::Metre,
            },
        ]
    }

    #[test]
    fn csv_round_trips() {
        let rows = sample_rows();
        let csv = to_csv(&rows).unwrap();
        assert!(csv.starts_with("Description,Specifications,Qty,Unit"));
        assert_eq!(from_csv(&csv).unwrap(), rows);
    }

    #[test]
    fn display_table_is_reparseable() {
        let rows = sample_rows();
        let table = to_display_table(&rows);
        let parsed = crate::parser::parse_table(&table).unwrap();
        assert_eq!(parsed.rows, rows);
    }

    #[test]
    fn bad_quantity_is_rejected() {
        let data = "Description,Specifications,Qty,Unit\nEarth Pit,rod,many,Nos\n";
        assert!(matches!(
            from_csv(data),
            Err(ExportError::InvalidField { field: "Qty", .. })
        ));
    }
}
