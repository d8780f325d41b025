//! Bill-of-quantities rows, run records and workflow result types.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::parameters::CalculationType;

// =============================================================================
// Units
// =============================================================================

/// Closed set of measurement units accepted in a BOQ table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Metre,
    Nos,
    Lot,
    Kg,
    Bags,
    Ampere,
    KiloAmpere,
    VoltAmpere,
    KiloVolt,
    Ohm,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Metre => "m",
            Unit::Nos => "Nos",
            Unit::Lot => "Lot",
            Unit::Kg => "kg",
            Unit::Bags => "Bags",
            Unit::Ampere => "A",
            Unit::KiloAmpere => "kA",
            Unit::VoltAmpere => "VA",
            Unit::KiloVolt => "kV",
            Unit::Ohm => "Ω",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized unit '{0}'")]
pub struct UnitParseError(pub String);

impl FromStr for Unit {
    type Err = UnitParseError;

    /// Case-insensitive parse with the common spelling variants folded into
    /// the canonical set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_lowercase().as_str() {
            "m" | "meter" | "meters" | "metre" | "metres" => Unit::Metre,
            "nos" | "no" | "nos." | "pieces" | "pcs" => Unit::Nos,
            "lot" | "lots" => Unit::Lot,
            "kg" | "kgs" | "kilogram" | "kilograms" => Unit::Kg,
            "bag" | "bags" => Unit::Bags,
            "a" | "amp" | "amps" => Unit::Ampere,
            "ka" => Unit::KiloAmpere,
            "va" => Unit::VoltAmpere,
            "kv" => Unit::KiloVolt,
            "ω" | "ohm" | "ohms" => Unit::Ohm,
            other => return Err(UnitParseError(other.to_string())),
        };
        Ok(unit)
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoqRow {
    pub description: String,
    pub specifications: String,
    pub quantity: f64,
    pub unit: Unit,
}

// =============================================================================
// Run lifecycle
// =============================================================================

/// Lifecycle of a persisted run. `pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Completed,
    FailedLlmNonCompliant,
    FailedParsing,
    FailedNetwork,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Completed => "completed",
            RunStatus::FailedLlmNonCompliant => "failed_llm_non_compliant",
            RunStatus::FailedParsing => "failed_parsing",
            RunStatus::FailedNetwork => "failed_network",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "completed" => Ok(RunStatus::Completed),
            "failed_llm_non_compliant" => Ok(RunStatus::FailedLlmNonCompliant),
            "failed_parsing" => Ok(RunStatus::FailedParsing),
            "failed_network" => Ok(RunStatus::FailedNetwork),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full audit record of one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoqRun {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub calculation_type: CalculationType,
    pub prompt_text: String,
    pub inputs_block: String,
    pub token_estimate: i32,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i32,
    pub status: RunStatus,
    pub retry_count: i32,
    pub raw_response: Option<String>,
    pub parsed_rows: Option<Vec<BoqRow>>,
    pub validation_warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_tokens_used: Option<i64>,
    pub processing_time_ms: Option<i64>,
}

// =============================================================================
// Workflow surface types
// =============================================================================

fn default_max_retries() -> u32 {
    3
}

fn default_max_tokens() -> u32 {
    4000
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowOptions {
    pub calculation_type: CalculationType,
    pub project_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub provider: crate::services::completion::ProviderKind,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowMetadata {
    pub calculation_type: CalculationType,
    pub model_name: String,
    pub total_items: usize,
    /// Valid rows parsed before the zero-quantity filter.
    pub raw_row_count: usize,
    pub retry_count: u32,
    pub processing_time_ms: u128,
    pub token_estimate: usize,
    pub total_tokens_used: Option<u32>,
}

/// The one value that crosses the workflow boundary; errors are folded into
/// `success`/`error` rather than propagated.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub run_id: String,
    pub rows: Vec<BoqRow>,
    pub metadata: WorkflowMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parsing_folds_aliases() {
        assert_eq!("Nos".parse::<Unit>().unwrap(), Unit::Nos);
        assert_eq!("pcs".parse::<Unit>().unwrap(), Unit::Nos);
        assert_eq!("METRES".parse::<Unit>().unwrap(), Unit::Metre);
        assert_eq!("Lots".parse::<Unit>().unwrap(), Unit::Lot);
        assert_eq!("ohms".parse::<Unit>().unwrap(), Unit::Ohm);
        assert_eq!("kV".parse::<Unit>().unwrap(), Unit::KiloVolt);
        assert_eq!("ka".parse::<Unit>().unwrap(), Unit::KiloAmpere);
        assert!("furlong".parse::<Unit>().is_err());
    }

    #[test]
    fn run_status_round_trips() {
        for status in [
            RunStatus::Pending,
            RunStatus::Completed,
            RunStatus::FailedLlmNonCompliant,
            RunStatus::FailedParsing,
            RunStatus::FailedNetwork,
            RunStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
    }
}
