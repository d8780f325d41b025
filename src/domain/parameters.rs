//! Canonical parameter groups produced by extraction and consumed by the
//! prompt assembler.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::snapshot::SoilType;

// =============================================================================
// Calculation / system type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationType {
    #[serde(rename = "LV")]
    Lv,
    #[serde(rename = "HV_String")]
    HvString,
    #[serde(rename = "HV_Central")]
    HvCentral,
}

impl CalculationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationType::Lv => "LV",
            CalculationType::HvString => "HV_String",
            CalculationType::HvCentral => "HV_Central",
        }
    }

    pub fn system_type(&self) -> SystemType {
        match self {
            CalculationType::Lv => SystemType::LvConnection,
            CalculationType::HvString | CalculationType::HvCentral => SystemType::HvConnection,
        }
    }
}

impl fmt::Display for CalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemType {
    #[serde(rename = "LV_Connection")]
    LvConnection,
    #[serde(rename = "HV_Connection")]
    HvConnection,
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemType::LvConnection => f.write_str("LV_Connection"),
            SystemType::HvConnection => f.write_str("HV_Connection"),
        }
    }
}

// =============================================================================
// Cable run spec
// =============================================================================

/// Number of parallel runs and conductor cross-section for one cable route.
/// Canonical text form is `"<runs>R*<mm2>"`, e.g. `2R*70`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CableRunSpec {
    pub runs: u32,
    pub cross_section_mm2: f64,
}

impl CableRunSpec {
    pub fn new(runs: u32, cross_section_mm2: f64) -> Self {
        Self {
            runs,
            cross_section_mm2,
        }
    }
}

impl fmt::Display for CableRunSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}R*{}", self.runs, self.cross_section_mm2)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid cable run spec '{0}', expected '<runs>R*<mm2>'")]
pub struct CableRunSpecParseError(String);

impl FromStr for CableRunSpec {
    type Err = CableRunSpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (runs_part, section_part) = trimmed
            .split_once(['R', 'r'])
            .ok_or_else(|| CableRunSpecParseError(s.to_string()))?;
        let section_part = section_part
            .strip_prefix('*')
            .ok_or_else(|| CableRunSpecParseError(s.to_string()))?;
        let runs: u32 = runs_part
            .trim()
            .parse()
            .map_err(|_| CableRunSpecParseError(s.to_string()))?;
        let cross_section_mm2: f64 = section_part
            .trim()
            .parse()
            .map_err(|_| CableRunSpecParseError(s.to_string()))?;
        Ok(Self {
            runs,
            cross_section_mm2,
        })
    }
}

impl Serialize for CableRunSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CableRunSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

// =============================================================================
// Parameter groups
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcInputs {
    pub structure_type: String,
    pub module_width_mm: f64,
    pub module_length_mm: f64,
    pub total_number_of_tables: u32,
    /// Layout code per table, e.g. `"2Px12"` (2 portrait rows of 12 modules).
    pub module_layout_per_table: String,
    pub total_number_of_rows: u32,
    pub string_short_circuit_current_a: f64,
    pub total_number_of_strings_per_inverter: u32,
    pub edge1_length_m: f64,
    pub edge2_length_m: f64,
    pub edge3_length_m: f64,
    pub edge4_length_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightningProtectionInputs {
    pub total_plant_area_m2: f64,
    pub soil_type: SoilType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcCommonInputs {
    pub system_type: SystemType,
    pub number_of_inverters: u32,
}

/// One cable route with its resolved distances and conductor sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CableStage {
    pub distance_m: f64,
    /// distance x parallel runs.
    pub length_per_circuit_m: f64,
    /// length per circuit x upstream equipment count.
    pub complete_length_m: f64,
    pub cross_section: CableRunSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSpec {
    pub kind: String,
    pub rating_a: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LvConnectionInputs {
    pub inverter_output_voltage_v: f64,
    pub inverter_output_current_a: f64,
    pub inverters_on_lv_combiner: u32,
    pub lv_combiner_output_current_a: f64,
    pub inverter_to_combiner: CableStage,
    pub combiner_to_poc: CableStage,
    pub combiner_income_breaker_rating_a: f64,
    pub combiner_outgoing_breaker_rating_a: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HvStringInverterInputs {
    pub number_of_string_inverters: u32,
    pub inverter_output_voltage_v: f64,
    pub inverter_output_current_a: f64,
    pub inverters_per_lv_combiner_panel: u32,
    pub total_lv_combiner_panels: u32,
    pub quantity_of_idts: u32,
    pub single_idt_rating_mva: f64,
    pub idt_impedance_percent: f64,
    pub idt_input_voltage_v: f64,
    pub idt_input_current_a: f64,
    pub idt_output_voltage_v: f64,
    pub idt_output_current_a: f64,
    pub quantity_of_pts: u32,
    pub single_pt_rating_mva: f64,
    pub pt_impedance_percent: f64,
    pub pt_input_voltage_v: f64,
    pub pt_input_current_a: f64,
    pub pt_output_voltage_v: f64,
    pub pt_output_current_a: f64,
    pub inverter_to_lv_panel: CableStage,
    pub lv_panel_to_idt: CableStage,
    pub idt_to_pt: CableStage,
    pub pt_to_poc: CableStage,
    pub combiner_income_breaker_rating_a: f64,
    pub combiner_outgoing_breaker_rating_a: f64,
    pub cb_idt_to_pt: BreakerSpec,
    pub cb_pt_to_poc: BreakerSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HvCentralInverterInputs {
    pub number_of_central_inverters: u32,
    pub single_inverter_rating_kw: f64,
    pub inverter_output_voltage_v: f64,
    pub inverter_output_current_a: f64,
    pub quantity_of_idts: u32,
    pub single_idt_rating_mva: f64,
    pub idt_impedance_percent: f64,
    pub idt_input_voltage_v: f64,
    pub idt_input_current_a: f64,
    pub idt_output_voltage_v: f64,
    pub idt_output_current_a: f64,
    pub quantity_of_pts: u32,
    pub single_pt_rating_mva: f64,
    pub pt_impedance_percent: f64,
    pub pt_input_voltage_v: f64,
    pub pt_input_current_a: f64,
    pub pt_output_voltage_v: f64,
    pub pt_output_current_a: f64,
    pub inverter_to_idt: CableStage,
    pub idt_to_pt: CableStage,
    pub pt_to_poc: CableStage,
    pub cb_inverter_to_idt: BreakerSpec,
    pub cb_idt_to_pt: BreakerSpec,
    pub cb_pt_to_poc: BreakerSpec,
}

/// Exactly one connection group is present per parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionInputs {
    Lv(LvConnectionInputs),
    HvString(HvStringInverterInputs),
    HvCentral(HvCentralInverterInputs),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubstationInputs {
    pub grid_size_m2: f64,
    pub target_earthing_resistance_ohms: f64,
}

impl SubstationInputs {
    pub fn for_system(system: SystemType) -> Self {
        match system {
            SystemType::LvConnection => Self {
                grid_size_m2: 900.0,
                target_earthing_resistance_ohms: 5.0,
            },
            SystemType::HvConnection => Self {
                grid_size_m2: 1600.0,
                target_earthing_resistance_ohms: 1.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedPreferences {
    pub string_side_protective_device: String,
    pub preferred_material: String,
    pub preferred_insulation_of_earthing_cables: String,
    pub rail_bonding_mode: String,
    pub structure_drop_rule: String,
}

impl Default for FixedPreferences {
    fn default() -> Self {
        Self {
            string_side_protective_device: "String fuse".to_string(),
            preferred_material: "Tinned copper".to_string(),
            preferred_insulation_of_earthing_cables: "PVC".to_string(),
            rail_bonding_mode: "Bonding clamps".to_string(),
            structure_drop_rule:
                "one drop per N tables (where N depends on structure type and is defined in rules, not user input)"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerEarthingInputs {
    pub number_of_idts: u32,
    pub number_of_pts: u32,
    pub scheme: String,
}

impl TransformerEarthingInputs {
    pub fn new(number_of_idts: u32) -> Self {
        Self {
            number_of_idts,
            // Single power transformer per plant in every supported topology.
            number_of_pts: 1,
            scheme:
                "2 dedicated earth pits for neutral earthing + 2 dedicated earth pits for body earthing"
                    .to_string(),
        }
    }
}

// =============================================================================
// Complete parameter set
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSet {
    pub dc: DcInputs,
    pub lightning: LightningProtectionInputs,
    pub ac_common: AcCommonInputs,
    pub connection: ConnectionInputs,
    pub substation: SubstationInputs,
    pub fixed_preferences: FixedPreferences,
    pub transformer_earthing: Option<TransformerEarthingInputs>,
    pub calculation_type: CalculationType,
    pub session_id: String,
    pub extracted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cable_run_spec_round_trips_through_text() {
        let spec = CableRunSpec::new(2, 70.0);
        assert_eq!(spec.to_string(), "2R*70");
        let parsed: CableRunSpec = "2R*70".parse().unwrap();
        assert_eq!(parsed, spec);

        let fractional: CableRunSpec = "1R*2.5".parse().unwrap();
        assert_eq!(fractional.runs, 1);
        assert_eq!(fractional.cross_section_mm2, 2.5);
    }

    #[test]
    fn cable_run_spec_rejects_malformed_text() {
        assert!("".parse::<CableRunSpec>().is_err());
        assert!("70".parse::<CableRunSpec>().is_err());
        assert!("2R70".parse::<CableRunSpec>().is_err());
        assert!("xR*70".parse::<CableRunSpec>().is_err());
    }

    #[test]
    fn substation_defaults_depend_on_system_type() {
        let lv = SubstationInputs::for_system(SystemType::LvConnection);
        assert_eq!(lv.grid_size_m2, 900.0);
        assert_eq!(lv.target_earthing_resistance_ohms, 5.0);

        let hv = SubstationInputs::for_system(SystemType::HvConnection);
        assert_eq!(hv.grid_size_m2, 1600.0);
        assert_eq!(hv.target_earthing_resistance_ohms, 1.0);
    }
}
