//! LV connection extraction.
//!
//! This extractor is strict: cable routes and breaker ratings must all be
//! resolved from the AC configuration or the whole extraction fails. A BOQ
//! generated from invented LV cable data would be worse than no BOQ.

use crate::domain::parameters::{CableRunSpec, CableStage, LvConnectionInputs};
use crate::domain::snapshot::{AcConfiguration, DesignSnapshot};

use super::dc::round2;
use super::fields::{
    self, BREAKER_RATING_FIELDS, INVERTER_AC_POWER_FIELDS, INVERTER_AC_VOLTAGE_FIELDS,
};
use super::ExtractionError;

const FALLBACK_INVERTER_POWER_KW: f64 = 40.0;
const FALLBACK_INVERTER_VOLTAGE_V: f64 = 400.0;

/// Three-phase current from power and line voltage: I = P / (V * 1.732 / 1000).
pub(crate) fn three_phase_current_a(power_kw: f64, voltage_v: f64) -> f64 {
    power_kw / (voltage_v * 1.732 / 1000.0)
}

#[derive(Debug, Default)]
struct ResolvedRoute {
    distance_m: Option<f64>,
    cross_section: Option<CableRunSpec>,
}

impl ResolvedRoute {
    fn stage(&self, route: &'static str, upstream_count: u32) -> Result<CableStage, ExtractionError> {
        let distance = self
            .distance_m
            .ok_or(ExtractionError::MissingCableData(route))?;
        let cross_section = self
            .cross_section
            .ok_or(ExtractionError::MissingCableData(route))?;
        let per_circuit = distance * cross_section.runs as f64;
        Ok(CableStage {
            distance_m: distance,
            length_per_circuit_m: per_circuit,
            complete_length_m: per_circuit * upstream_count as f64,
            cross_section,
        })
    }
}

fn resolve_cables(ac: &AcConfiguration) -> (ResolvedRoute, ResolvedRoute) {
    let mut inverter_to_combiner = ResolvedRoute::default();
    let mut combiner_to_poc = ResolvedRoute::default();

    for (key, selection) in &ac.selected_cables {
        let lower = key.to_lowercase();
        let length = selection.length_m.filter(|l| *l > 0.0);
        let cross_section = selection
            .cable
            .as_ref()
            .and_then(|c| c.cross_section_mm2)
            .filter(|c| *c > 0.0);

        let target = if (lower.contains("inverter") && lower.contains("combiner"))
            || (lower.contains("input") && lower.contains("combiner"))
        {
            &mut inverter_to_combiner
        } else if (lower.contains("combiner") && lower.contains("poc"))
            || (lower.contains("output") && lower.contains("poc"))
        {
            &mut combiner_to_poc
        } else {
            continue;
        };

        // Both figures or neither; a route with only a length is unusable.
        if let (Some(length), Some(section)) = (length, cross_section) {
            let runs = selection.number_of_runs.unwrap_or(1).max(1);
            target.distance_m = Some(length);
            target.cross_section = Some(CableRunSpec::new(runs, section));
        } else {
            tracing::warn!(route = %key, "cable entry missing length or cross-section, skipping");
        }
    }

    (inverter_to_combiner, combiner_to_poc)
}

fn resolve_breakers(ac: &AcConfiguration) -> (Option<f64>, Option<f64>) {
    let mut income = None;
    let mut outgoing = None;

    for (key, selection) in &ac.selected_breakers {
        let lower = key.to_lowercase();
        let section = selection.section_type.as_deref();
        let rating = selection
            .breaker
            .as_ref()
            .and_then(|b| fields::first_number(b, BREAKER_RATING_FIELDS))
            .filter(|r| *r > 0.0);

        if lower.contains("input")
            || lower.contains("income")
            || lower.contains("individual")
            || matches!(section, Some("input") | Some("individual"))
        {
            if rating.is_some() {
                income = rating;
            }
        } else if lower.contains("output")
            || lower.contains("outgoing")
            || matches!(section, Some("output") | Some("outgoing"))
        {
            if rating.is_some() {
                outgoing = rating;
            }
        }
    }

    (income, outgoing)
}

pub fn extract_lv(snapshot: &DesignSnapshot) -> Result<LvConnectionInputs, ExtractionError> {
    let ac = snapshot
        .ac_configuration
        .as_ref()
        .ok_or(ExtractionError::MissingCableData("ac_configuration"))?;

    let voltage_v = snapshot
        .selected_inverter
        .as_ref()
        .and_then(|inv| fields::first_number(inv, INVERTER_AC_VOLTAGE_FIELDS))
        .or(ac.poc_voltage_v)
        .unwrap_or(FALLBACK_INVERTER_VOLTAGE_V);
    let power_kw = snapshot
        .selected_inverter
        .as_ref()
        .and_then(|inv| fields::first_number(inv, INVERTER_AC_POWER_FIELDS))
        .unwrap_or(FALLBACK_INVERTER_POWER_KW);
    let inverter_current_a = round2(three_phase_current_a(power_kw, voltage_v));

    let (inverter_to_combiner, combiner_to_poc) = resolve_cables(ac);
    let (income, outgoing) = resolve_breakers(ac);

    let number_of_inverters = snapshot.manual_inverter_count.unwrap_or(0);
    // A single LV combiner panel feeds the PoC.
    let combiner_panels = 1u32;

    let inputs = LvConnectionInputs {
        inverter_output_voltage_v: voltage_v,
        inverter_output_current_a: inverter_current_a,
        inverters_on_lv_combiner: number_of_inverters,
        lv_combiner_output_current_a: round2(number_of_inverters as f64 * inverter_current_a),
        inverter_to_combiner: inverter_to_combiner
            .stage("inverter_to_combiner", number_of_inverters)?,
        combiner_to_poc: combiner_to_poc.stage("combiner_to_poc", combiner_panels)?,
        combiner_income_breaker_rating_a: income
            .ok_or(ExtractionError::MissingBreakerData("combiner_income"))?,
        combiner_outgoing_breaker_rating_a: outgoing
            .ok_or(ExtractionError::MissingBreakerData("combiner_outgoing"))?,
    };

    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{BreakerSelection, CableSelection, CableSpec};
    use serde_json::json;
    use std::collections::HashMap;

    fn cable(length: f64, runs: u32, section: f64) -> CableSelection {
        CableSelection {
            length_m: Some(length),
            number_of_runs: Some(runs),
            cable: Some(CableSpec {
                cross_section_mm2: Some(section),
                ampacity_a: None,
            }),
        }
    }

    fn breaker(ampacity: f64) -> BreakerSelection {
        BreakerSelection {
            section_type: None,
            breaker: Some(json!({ "ampacity": ampacity })),
        }
    }

    fn configured_snapshot() -> DesignSnapshot {
        let mut cables = HashMap::new();
        cables.insert(
            "input-Inverter to AC Combiner Panel".to_string(),
            cable(10.0, 2, 70.0),
        );
        cables.insert(
            "output-AC Combiner Panel to PoC".to_string(),
            cable(25.0, 1, 185.0),
        );

        let mut breakers = HashMap::new();
        breakers.insert("individual-Individual Inverter Breaker".to_string(), breaker(100.0));
        breakers.insert("outgoing-Combiner Outgoing Breaker".to_string(), breaker(250.0));

        DesignSnapshot {
            selected_inverter: Some(json!({
                "nominal_ac_power_kw": 110.0,
                "nominal_ac_voltage_v": 400.0,
            })),
            manual_inverter_count: Some(4),
            ac_configuration: Some(AcConfiguration {
                poc_voltage_v: Some(400.0),
                selected_cables: cables,
                selected_breakers: breakers,
                hv_string_config: None,
                hv_central_config: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn cable_lengths_multiply_distance_runs_and_inverters() {
        let lv = extract_lv(&configured_snapshot()).unwrap();
        assert_eq!(lv.inverter_to_combiner.distance_m, 10.0);
        assert_eq!(lv.inverter_to_combiner.cross_section.to_string(), "2R*70");
        // 10 m x 2 runs = 20 m per circuit, x 4 inverters = 80 m
        assert_eq!(lv.inverter_to_combiner.length_per_circuit_m, 20.0);
        assert_eq!(lv.inverter_to_combiner.complete_length_m, 80.0);
        // single combiner panel
        assert_eq!(lv.combiner_to_poc.complete_length_m, 25.0);
    }

    #[test]
    fn currents_follow_three_phase_formula() {
        let lv = extract_lv(&configured_snapshot()).unwrap();
        // 110 / (400 * 1.732 / 1000) = 158.78
        assert_eq!(lv.inverter_output_current_a, 158.78);
        assert_eq!(lv.lv_combiner_output_current_a, 635.12);
    }

    #[test]
    fn breaker_ratings_resolved_from_catalog_records() {
        let lv = extract_lv(&configured_snapshot()).unwrap();
        assert_eq!(lv.combiner_income_breaker_rating_a, 100.0);
        assert_eq!(lv.combiner_outgoing_breaker_rating_a, 250.0);
    }

    #[test]
    fn missing_cable_route_fails_extraction() {
        let mut snapshot = configured_snapshot();
        snapshot
            .ac_configuration
            .as_mut()
            .unwrap()
            .selected_cables
            .remove("output-AC Combiner Panel to PoC");
        assert!(matches!(
            extract_lv(&snapshot),
            Err(ExtractionError::MissingCableData("combiner_to_poc"))
        ));
    }

    #[test]
    fn missing_breaker_rating_fails_extraction() {
        let mut snapshot = configured_snapshot();
        snapshot
            .ac_configuration
            .as_mut()
            .unwrap()
            .selected_breakers
            .remove("outgoing-Combiner Outgoing Breaker");
        assert!(matches!(
            extract_lv(&snapshot),
            Err(ExtractionError::MissingBreakerData("combiner_outgoing"))
        ));
    }

    #[test]
    fn cable_with_length_but_no_section_is_unusable() {
        let mut snapshot = configured_snapshot();
        let ac = snapshot.ac_configuration.as_mut().unwrap();
        ac.selected_cables.insert(
            "input-Inverter to AC Combiner Panel".to_string(),
            CableSelection {
                length_m: Some(10.0),
                number_of_runs: Some(2),
                cable: None,
            },
        );
        assert!(matches!(
            extract_lv(&snapshot),
            Err(ExtractionError::MissingCableData("inverter_to_combiner"))
        ));
    }
}
