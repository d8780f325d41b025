//! DC-side parameter extraction.
//!
//! Works with whatever the layout tool recorded; every figure has a fallback
//! so this extractor never fails.

use crate::domain::parameters::DcInputs;
use crate::domain::snapshot::{DesignSnapshot, Orientation, Point, PolygonConfig};

use super::fields::{self, ISC_FIELDS, MODULE_LENGTH_FIELDS, MODULE_WIDTH_FIELDS};

/// Aspect ratio assumed when edge lengths must be estimated from area alone.
const FALLBACK_ASPECT_RATIO: f64 = 1.5;

pub fn extract_dc(snapshot: &DesignSnapshot) -> DcInputs {
    let configs = &snapshot.polygon_configs;
    let total_tables: u32 = configs.iter().map(|c| c.table_count).sum();
    let total_modules: u32 = configs.iter().map(|c| c.module_count).sum();
    let first = configs.first();

    let structure_type = snapshot
        .structure_type
        .clone()
        .or_else(|| first.and_then(|c| c.structure_type.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    let total_rows = total_row_count(configs, first, total_tables);
    let module_layout = module_layout_code(first, total_tables, total_modules);

    let (isc, module_width, module_length) = match &snapshot.selected_panel {
        Some(panel) => (
            fields::first_number(panel, ISC_FIELDS).unwrap_or(0.0),
            fields::first_number(panel, MODULE_WIDTH_FIELDS).unwrap_or(0.0),
            fields::first_number(panel, MODULE_LENGTH_FIELDS).unwrap_or(0.0),
        ),
        None => (0.0, 0.0, 0.0),
    };

    let [edge1, edge2, edge3, edge4] = edge_lengths(configs, first);

    DcInputs {
        structure_type,
        module_width_mm: module_width,
        module_length_mm: module_length,
        total_number_of_tables: total_tables,
        module_layout_per_table: module_layout,
        total_number_of_rows: total_rows,
        string_short_circuit_current_a: isc,
        total_number_of_strings_per_inverter: snapshot.total_string_count.unwrap_or(0),
        edge1_length_m: round2(edge1),
        edge2_length_m: round2(edge2),
        edge3_length_m: round2(edge3),
        edge4_length_m: round2(edge4),
    }
}

/// Total table rows across the plant. Ballasted structures are one row per
/// table; elevated and ground-mount layouts report row hints, falling back to
/// typical tables-per-row densities when no hint survives.
fn total_row_count(configs: &[PolygonConfig], first: Option<&PolygonConfig>, total_tables: u32) -> u32 {
    let structure = first.and_then(|c| c.structure_type.as_deref());
    let hinted: u32 = configs
        .iter()
        .map(|c| {
            c.table_layout_rows
                .or(c.rows)
                .or(c.table_rows)
                .unwrap_or(0)
        })
        .sum();

    match structure {
        Some("ballasted") => total_tables,
        Some("ground_mount_tables") if hinted == 0 && total_tables > 0 => {
            (total_tables as f64 / 3.5).ceil() as u32
        }
        Some("fixed_tilt") if hinted == 0 && total_tables > 0 => {
            (total_tables as f64 / 3.0).ceil() as u32
        }
        _ => hinted,
    }
}

/// Layout code such as `"2P×12"`: rows per table, orientation letter,
/// modules per row.
fn module_layout_code(first: Option<&PolygonConfig>, total_tables: u32, total_modules: u32) -> String {
    let Some(config) = first else {
        return "Unknown".to_string();
    };
    if total_tables == 0 {
        return "Unknown".to_string();
    }

    let modules_per_table = ((total_modules as f64) / (total_tables as f64)).round() as u32;
    let orientation = config
        .orientation
        .map(|o| o.code())
        .unwrap_or(Orientation::Landscape.code());

    if config.structure_type.as_deref() == Some("ballasted") {
        return format!("1{orientation}×{modules_per_table}");
    }
    if let Some(table_config) = &config.table_config {
        return format!(
            "{}{orientation}×{}",
            table_config.rows, table_config.modules_per_row
        );
    }
    if let (Some(rows), Some(modules_per_row)) = (config.rows, config.modules_per_row) {
        return format!("{rows}{orientation}×{modules_per_row}");
    }

    // No layout hints at all: assume a square-ish table.
    let estimated_rows = (modules_per_table as f64).sqrt().ceil().max(1.0) as u32;
    let estimated_modules = ((modules_per_table as f64) / (estimated_rows as f64)).ceil() as u32;
    format!("{estimated_rows}{orientation}×{estimated_modules}")
}

fn distance(a: &Point, b: &Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// Perimeter edge lengths, best hint first: explicit edges array, bounding
/// box, direct width/height, polygon vertices, then an area-based estimate.
fn edge_lengths(configs: &[PolygonConfig], first: Option<&PolygonConfig>) -> [f64; 4] {
    if let Some(config) = first {
        if let Some(edges) = &config.edges {
            if !edges.is_empty() {
                let edge = |i: usize| edges.get(i).copied().unwrap_or(0.0);
                return [edge(0), edge(1), edge(2), edge(3)];
            }
        }
        if let Some(bounds) = &config.bounds {
            let (w, h) = (bounds.width(), bounds.height());
            return [w, h, w, h];
        }
        if let (Some(w), Some(h)) = (config.width_m, config.height_m) {
            return [w, h, w, h];
        }
        if let Some(points) = &config.vertices {
            if points.len() >= 4 {
                return [
                    distance(&points[0], &points[1]),
                    distance(&points[1], &points[2]),
                    distance(&points[2], &points[3]),
                    distance(&points[3], &points[0]),
                ];
            }
        }
    }

    let total_area: f64 = configs.iter().map(|c| c.area_m2).sum();
    if total_area > 0.0 {
        let width = (total_area * FALLBACK_ASPECT_RATIO).sqrt();
        let height = total_area / width;
        return [width, height, width, height];
    }
    [0.0; 4]
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{Bounds, TableConfig};
    use serde_json::json;

    fn snapshot_with(configs: Vec<PolygonConfig>) -> DesignSnapshot {
        DesignSnapshot {
            polygon_configs: configs,
            ..Default::default()
        }
    }

    #[test]
    fn ballasted_rows_equal_tables() {
        let snapshot = snapshot_with(vec![PolygonConfig {
            table_count: 50,
            module_count: 600,
            structure_type: Some("ballasted".to_string()),
            ..Default::default()
        }]);
        let dc = extract_dc(&snapshot);
        assert_eq!(dc.total_number_of_rows, 50);
        assert_eq!(dc.total_number_of_tables, 50);
    }

    #[test]
    fn fixed_tilt_estimates_rows_when_unhinted() {
        let snapshot = snapshot_with(vec![PolygonConfig {
            table_count: 10,
            structure_type: Some("fixed_tilt".to_string()),
            ..Default::default()
        }]);
        // ceil(10 / 3)
        assert_eq!(extract_dc(&snapshot).total_number_of_rows, 4);
    }

    #[test]
    fn ground_mount_estimates_rows_when_unhinted() {
        let snapshot = snapshot_with(vec![PolygonConfig {
            table_count: 10,
            structure_type: Some("ground_mount_tables".to_string()),
            ..Default::default()
        }]);
        // ceil(10 / 3.5)
        assert_eq!(extract_dc(&snapshot).total_number_of_rows, 3);
    }

    #[test]
    fn row_hints_win_over_estimates() {
        let snapshot = snapshot_with(vec![PolygonConfig {
            table_count: 10,
            table_layout_rows: Some(5),
            structure_type: Some("fixed_tilt".to_string()),
            ..Default::default()
        }]);
        assert_eq!(extract_dc(&snapshot).total_number_of_rows, 5);
    }

    #[test]
    fn layout_code_uses_table_config() {
        let snapshot = snapshot_with(vec![PolygonConfig {
            table_count: 4,
            module_count: 96,
            orientation: Some(Orientation::Portrait),
            table_config: Some(TableConfig {
                rows: 2,
                modules_per_row: 12,
            }),
            structure_type: Some("fixed_tilt".to_string()),
            ..Default::default()
        }]);
        assert_eq!(extract_dc(&snapshot).module_layout_per_table, "2P×12");
    }

    #[test]
    fn layout_unknown_without_tables() {
        let snapshot = snapshot_with(vec![]);
        assert_eq!(extract_dc(&snapshot).module_layout_per_table, "Unknown");
    }

    #[test]
    fn isc_falls_back_through_candidate_fields() {
        let mut snapshot = snapshot_with(vec![]);
        snapshot.selected_panel = Some(json!({"specs": {"isc": 13.9}}));
        assert_eq!(extract_dc(&snapshot).string_short_circuit_current_a, 13.9);

        snapshot.selected_panel = Some(json!({"model": "no electricals"}));
        assert_eq!(extract_dc(&snapshot).string_short_circuit_current_a, 0.0);
    }

    #[test]
    fn edges_prefer_explicit_array_over_bounds() {
        let snapshot = snapshot_with(vec![PolygonConfig {
            table_count: 1,
            edges: Some(vec![100.0, 60.0, 100.0, 60.0]),
            bounds: Some(Bounds {
                left: 0.0,
                right: 10.0,
                top: 0.0,
                bottom: 10.0,
            }),
            ..Default::default()
        }]);
        let dc = extract_dc(&snapshot);
        assert_eq!(dc.edge1_length_m, 100.0);
        assert_eq!(dc.edge2_length_m, 60.0);
    }

    #[test]
    fn edges_estimated_from_area_as_last_resort() {
        let snapshot = snapshot_with(vec![PolygonConfig {
            table_count: 1,
            area_m2: 600.0,
            ..Default::default()
        }]);
        let dc = extract_dc(&snapshot);
        // width = sqrt(600 * 1.5) = 30, height = 600 / 30 = 20
        assert_eq!(dc.edge1_length_m, 30.0);
        assert_eq!(dc.edge2_length_m, 20.0);
        assert_eq!(dc.edge3_length_m, 30.0);
        assert_eq!(dc.edge4_length_m, 20.0);
    }
}
