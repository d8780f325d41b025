//! Ordered accessor lists for probing loosely-schema'd catalog records.
//!
//! Panel, inverter and breaker records arrive from several catalog sources
//! that disagree on field names. Each electrical figure is looked up through
//! a named, ordered candidate list; the first present numeric value wins.
//! Entries may be dotted paths into nested objects.

use serde_json::Value;

/// Module short-circuit current, amperes. `isc_a` is the canonical export
/// field; the tail covers legacy and nested catalog shapes.
pub const ISC_FIELDS: &[&str] = &[
    "isc_a",
    "short_circuit_current",
    "isc",
    "shortCircuitCurrent",
    "isc_stc",
    "Isc",
    "ISC",
    "current_isc",
    "module_isc",
    "specifications.isc",
    "electrical.isc",
    "specs.isc",
    "parameters.isc",
    "iv_curve.isc",
    "electrical_specs.isc",
    "electrical_parameters.isc",
    "stc.isc",
    "stc_conditions.isc",
];

/// Module width, millimetres.
pub const MODULE_WIDTH_FIELDS: &[&str] = &["module_width", "width", "dimensions.width"];

/// Module length, millimetres.
pub const MODULE_LENGTH_FIELDS: &[&str] = &["module_length", "length", "dimensions.length"];

/// Breaker continuous current rating, amperes. `ampacity` is primary.
pub const BREAKER_RATING_FIELDS: &[&str] = &[
    "ampacity",
    "current_rating_a",
    "rated_current_a",
    "rating_a",
    "ampere_rating",
    "rating",
    "current_rating",
    "nominal_current",
    "rated_current",
];

/// Inverter AC output power, kilowatts.
pub const INVERTER_AC_POWER_FIELDS: &[&str] = &[
    "nominal_ac_power_kw",
    "maximum_ac_power_kw",
    "power_kw",
    "ac_power",
];

/// Inverter AC output voltage, volts.
pub const INVERTER_AC_VOLTAGE_FIELDS: &[&str] = &["nominal_ac_voltage_v", "output_voltage"];

/// Walk a dotted path into a JSON object.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// First numeric value found under any of the candidate paths. Numbers
/// encoded as strings (a common catalog export quirk) are accepted.
pub fn first_number(value: &Value, paths: &[&str]) -> Option<f64> {
    for path in paths {
        match lookup(value, path) {
            Some(Value::Number(n)) => {
                if let Some(f) = n.as_f64() {
                    return Some(f);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(f) = s.trim().parse::<f64>() {
                    return Some(f);
                }
            }
            _ => {}
        }
    }
    None
}

/// First non-empty string value found under any of the candidate paths.
pub fn first_string(value: &Value, paths: &[&str]) -> Option<String> {
    for path in paths {
        if let Some(Value::String(s)) = lookup(value, path) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn isc_prefers_canonical_field() {
        let panel = json!({"isc": 12.0, "isc_a": 13.96});
        assert_eq!(first_number(&panel, ISC_FIELDS), Some(13.96));
    }

    #[test]
    fn falls_through_to_nested_paths() {
        let panel = json!({"electrical": {"isc": "14.1"}});
        assert_eq!(first_number(&panel, ISC_FIELDS), Some(14.1));
    }

    #[test]
    fn absent_fields_yield_none() {
        let panel = json!({"model": "XYZ-550"});
        assert_eq!(first_number(&panel, ISC_FIELDS), None);
        assert_eq!(first_string(&panel, &["vendor.name"]), None);
    }

    #[test]
    fn breaker_rating_prefers_ampacity() {
        let breaker = json!({"rating": 125.0, "ampacity": 100.0});
        assert_eq!(first_number(&breaker, BREAKER_RATING_FIELDS), Some(100.0));
    }
}
