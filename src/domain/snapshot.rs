//! Design-state snapshot types.
//!
//! A `DesignSnapshot` is the read-only view of the design session that the
//! extraction layer consumes. Catalog records (panels, inverters, breakers)
//! come from heterogeneous sources, so their electrical fields are kept as
//! raw JSON and probed through ordered accessor lists in `extract::fields`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoilType {
    SaturatedClay,
    Clay,
    Loam,
    MoistSand,
    DrySand,
    Rock,
}

impl fmt::Display for SoilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SoilType::SaturatedClay => "Saturated Clay",
            SoilType::Clay => "Clay",
            SoilType::Loam => "Loam",
            SoilType::MoistSand => "Moist Sand",
            SoilType::DrySand => "Dry Sand",
            SoilType::Rock => "Rock",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "LV")]
    Lv,
    #[serde(rename = "HV")]
    Hv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Single-letter code used in module layout strings.
    pub fn code(&self) -> char {
        match self {
            Orientation::Portrait => 'P',
            Orientation::Landscape => 'L',
        }
    }
}

// =============================================================================
// Geometry
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Axis-aligned bounding box of a layout polygon, in metres.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        (self.right - self.left).abs()
    }

    pub fn height(&self) -> f64 {
        (self.bottom - self.top).abs()
    }
}

// =============================================================================
// Polygon configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub rows: u32,
    pub modules_per_row: u32,
}

/// One laid-out area of the plant with its table/module counts and whatever
/// geometry hints the layout tool recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolygonConfig {
    #[serde(default)]
    pub table_count: u32,
    #[serde(default)]
    pub module_count: u32,
    #[serde(default)]
    pub area_m2: f64,
    #[serde(default)]
    pub structure_type: Option<String>,
    #[serde(default)]
    pub orientation: Option<Orientation>,
    // Row-count hints; tools disagree on the field name.
    #[serde(default)]
    pub table_layout_rows: Option<u32>,
    #[serde(default)]
    pub rows: Option<u32>,
    #[serde(default)]
    pub table_rows: Option<u32>,
    #[serde(default)]
    pub table_config: Option<TableConfig>,
    #[serde(default)]
    pub modules_per_row: Option<u32>,
    // Geometry hints, in descending order of reliability.
    #[serde(default)]
    pub edges: Option<Vec<f64>>,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub width_m: Option<f64>,
    #[serde(default)]
    pub height_m: Option<f64>,
    #[serde(default)]
    pub vertices: Option<Vec<Point>>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            rows: 1,
            modules_per_row: 1,
        }
    }
}

// =============================================================================
// AC configuration
// =============================================================================

/// Cable catalog record attached to a selected route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CableSpec {
    #[serde(default)]
    pub cross_section_mm2: Option<f64>,
    #[serde(default)]
    pub ampacity_a: Option<f64>,
}

/// A cable selection for one AC route, keyed in `selected_cables` by a
/// free-form route label such as `"input-Inverter to AC Combiner Panel"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CableSelection {
    #[serde(default)]
    pub length_m: Option<f64>,
    #[serde(default)]
    pub number_of_runs: Option<u32>,
    #[serde(default)]
    pub cable: Option<CableSpec>,
}

/// A breaker selection for one AC section. The catalog record stays raw
/// because rating field names vary by vendor export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerSelection {
    #[serde(default)]
    pub section_type: Option<String>,
    #[serde(default)]
    pub breaker: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub inputs: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelGroup {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub configurations: Vec<PanelConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformerConfig {
    #[serde(default)]
    pub power_rating_mva: Option<f64>,
    #[serde(default)]
    pub primary_voltage_v: Option<f64>,
    #[serde(default)]
    pub secondary_voltage_v: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformerGroup {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub configurations: Vec<TransformerConfig>,
}

/// HV plant with string inverters feeding LV AC combiner panels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HvStringConfig {
    #[serde(default)]
    pub lv_ac_combiner_panels: Option<PanelGroup>,
    #[serde(default)]
    pub idts: Option<TransformerGroup>,
    #[serde(default)]
    pub power_transformer: Option<TransformerConfig>,
}

/// HV plant with central inverters feeding inverter-duty transformers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HvCentralConfig {
    #[serde(default)]
    pub idts: Option<TransformerGroup>,
    #[serde(default)]
    pub power_transformer: Option<TransformerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcConfiguration {
    #[serde(default)]
    pub poc_voltage_v: Option<f64>,
    #[serde(default)]
    pub selected_cables: HashMap<String, CableSelection>,
    #[serde(default)]
    pub selected_breakers: HashMap<String, BreakerSelection>,
    #[serde(default)]
    pub hv_string_config: Option<HvStringConfig>,
    #[serde(default)]
    pub hv_central_config: Option<HvCentralConfig>,
}

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignSnapshot {
    #[serde(default)]
    pub polygon_configs: Vec<PolygonConfig>,
    /// Selected PV module catalog record (schema varies by source).
    #[serde(default)]
    pub selected_panel: Option<serde_json::Value>,
    /// Selected inverter catalog record (schema varies by source).
    #[serde(default)]
    pub selected_inverter: Option<serde_json::Value>,
    #[serde(default)]
    pub structure_type: Option<String>,
    #[serde(default)]
    pub total_string_count: Option<u32>,
    #[serde(default)]
    pub soil_type: Option<SoilType>,
    #[serde(default)]
    pub connection_type: Option<ConnectionType>,
    /// Overrides inverter counts derived from the AC configuration.
    #[serde(default)]
    pub manual_inverter_count: Option<u32>,
    #[serde(default)]
    pub ac_configuration: Option<AcConfiguration>,
}
