//! HV extraction for string-inverter and central-inverter plants.
//!
//! Unlike the LV path this one is best-effort: any route or transformer
//! figure missing from the AC configuration takes a provisional default so a
//! draft BOQ can still be produced early in the design.

use crate::domain::parameters::{
    BreakerSpec, CableRunSpec, CableStage, HvCentralInverterInputs, HvStringInverterInputs,
};
use crate::domain::snapshot::{AcConfiguration, DesignSnapshot, TransformerConfig};

use super::dc::round2;
use super::fields::{self, INVERTER_AC_POWER_FIELDS, INVERTER_AC_VOLTAGE_FIELDS};
use super::lv::three_phase_current_a;

// Provisional route figures used when the AC configuration carries no data
// for a stage. Taken from typical utility-scale layouts; real selections
// always win.
const STRING_INVERTER_TO_LV_PANEL: (f64, &str) = (50.0, "1R*16");
const STRING_LV_PANEL_TO_IDT: (f64, &str) = (200.0, "1R*95");
const STRING_IDT_TO_PT: (f64, &str) = (300.0, "1R*185");
const STRING_PT_TO_POC: (f64, &str) = (500.0, "1R*240");

const CENTRAL_INVERTER_TO_IDT: (f64, &str) = (100.0, "1R*185");
const CENTRAL_IDT_TO_PT: (f64, &str) = (300.0, "1R*185");
const CENTRAL_PT_TO_POC: (f64, &str) = (500.0, "1R*240");

const DEFAULT_VCB_RATING_A: f64 = 630.0;
const DEFAULT_CENTRAL_TO_IDT_RATING_A: f64 = 1250.0;
const DEFAULT_TRANSFORMER_IMPEDANCE_PERCENT: f64 = 6.0;

const DEFAULT_STRING_IDT_RATING_MVA: f64 = 1.0;
const DEFAULT_CENTRAL_IDT_RATING_MVA: f64 = 2.5;
const DEFAULT_IDT_SECONDARY_V: f64 = 11_000.0;
const DEFAULT_PT_SECONDARY_V: f64 = 33_000.0;

const DEFAULT_CENTRAL_INVERTER_KW: f64 = 1000.0;
const DEFAULT_CENTRAL_INVERTER_V: f64 = 1500.0;

/// One route with its default, overridable by a matching cable selection.
#[derive(Debug, Clone)]
struct Route {
    distance_m: f64,
    cross_section: CableRunSpec,
}

impl Route {
    fn provisional((distance, spec): (f64, &str)) -> Self {
        Self {
            distance_m: distance,
            // Provisional specs are compile-time constants in valid form.
            cross_section: spec.parse().unwrap_or(CableRunSpec::new(1, 16.0)),
        }
    }

    fn stage(&self, upstream_count: u32) -> CableStage {
        let per_circuit = self.distance_m * self.cross_section.runs as f64;
        CableStage {
            distance_m: self.distance_m,
            length_per_circuit_m: per_circuit,
            complete_length_m: per_circuit * upstream_count as f64,
            cross_section: self.cross_section,
        }
    }

    fn override_from(&mut self, selection: &crate::domain::snapshot::CableSelection, default_section: f64) {
        let runs = selection.number_of_runs.unwrap_or(1).max(1);
        let section = selection
            .cable
            .as_ref()
            .and_then(|c| c.cross_section_mm2)
            .unwrap_or(default_section);
        if let Some(length) = selection.length_m.filter(|l| *l > 0.0) {
            self.distance_m = length;
        }
        self.cross_section = CableRunSpec::new(runs, section);
    }
}

fn breaker_rating(selection: &crate::domain::snapshot::BreakerSelection, default: f64) -> f64 {
    selection
        .breaker
        .as_ref()
        .and_then(|b| fields::first_number(b, fields::BREAKER_RATING_FIELDS))
        .filter(|r| *r > 0.0)
        .unwrap_or(default)
}

fn breaker_kind(selection: &crate::domain::snapshot::BreakerSelection) -> String {
    selection
        .breaker
        .as_ref()
        .and_then(|b| fields::first_string(b, &["breaker_type"]))
        .unwrap_or_else(|| "VCB".to_string())
}

fn transformer_rating(config: Option<&TransformerConfig>, default: f64) -> f64 {
    config.and_then(|c| c.power_rating_mva).unwrap_or(default)
}

fn transformer_secondary(config: Option<&TransformerConfig>, default: f64) -> f64 {
    config.and_then(|c| c.secondary_voltage_v).unwrap_or(default)
}

// =============================================================================
// HV string
// =============================================================================

pub fn extract_hv_string(snapshot: &DesignSnapshot) -> HvStringInverterInputs {
    let ac = snapshot.ac_configuration.as_ref();
    let hv = ac.and_then(|a| a.hv_string_config.as_ref());
    let inverters = snapshot.manual_inverter_count.unwrap_or(0);

    let lv_panel_count = hv
        .and_then(|h| h.lv_ac_combiner_panels.as_ref())
        .map(|p| p.count)
        .filter(|c| *c > 0)
        .unwrap_or_else(|| (inverters as f64 / 8.0).ceil() as u32);
    let lv_panel_inputs: u32 = hv
        .and_then(|h| h.lv_ac_combiner_panels.as_ref())
        .map(|p| p.configurations.iter().map(|c| c.inputs).sum())
        .unwrap_or(0);

    let idt_count = hv
        .and_then(|h| h.idts.as_ref())
        .map(|g| g.count)
        .filter(|c| *c > 0)
        .unwrap_or_else(|| (inverters as f64 / 8.0).ceil() as u32);
    let idt_config = hv
        .and_then(|h| h.idts.as_ref())
        .and_then(|g| g.configurations.first());
    let pt_config = hv.and_then(|h| h.power_transformer.as_ref());

    let mut inverter_to_lv_panel = Route::provisional(STRING_INVERTER_TO_LV_PANEL);
    let mut lv_panel_to_idt = Route::provisional(STRING_LV_PANEL_TO_IDT);
    let mut idt_to_pt = Route::provisional(STRING_IDT_TO_PT);
    let mut pt_to_poc = Route::provisional(STRING_PT_TO_POC);

    let mut income_breaker = 100.0;
    let mut outgoing_breaker = 63.0;
    let mut cb_idt_to_pt = BreakerSpec {
        kind: "VCB".to_string(),
        rating_a: DEFAULT_VCB_RATING_A,
    };
    let mut cb_pt_to_poc = BreakerSpec {
        kind: "VCB".to_string(),
        rating_a: DEFAULT_VCB_RATING_A,
    };

    if let Some(ac) = ac {
        for (key, selection) in &ac.selected_cables {
            let lower = key.to_lowercase();
            if lower.contains("input") && lower.contains("inverter") {
                inverter_to_lv_panel.override_from(selection, 16.0);
            } else if lower.contains("output") && lower.contains("panel") && lower.contains("idt") {
                lv_panel_to_idt.override_from(selection, 95.0);
            } else if lower.contains("idt_to_transformer")
                || (lower.contains("idt") && lower.contains("power") && lower.contains("transformer"))
            {
                idt_to_pt.override_from(selection, 185.0);
            } else if lower.contains("transformer_to_poc")
                || (lower.contains("power") && lower.contains("transformer") && lower.contains("point"))
            {
                pt_to_poc.override_from(selection, 240.0);
            }
        }
        for (key, selection) in &ac.selected_breakers {
            let lower = key.to_lowercase();
            if lower.contains("individual") && lower.contains("inverter") {
                income_breaker = breaker_rating(selection, 100.0);
            } else if lower.contains("outgoing") && lower.contains("panel") {
                outgoing_breaker = breaker_rating(selection, 63.0);
            } else if lower.contains("idt_output") || (lower.contains("idt") && lower.contains("output")) {
                cb_idt_to_pt = BreakerSpec {
                    kind: breaker_kind(selection),
                    rating_a: breaker_rating(selection, DEFAULT_VCB_RATING_A),
                };
            } else if lower.contains("power_transformer")
                || (lower.contains("power") && lower.contains("transformer") && lower.contains("grid"))
            {
                cb_pt_to_poc = BreakerSpec {
                    kind: breaker_kind(selection),
                    rating_a: breaker_rating(selection, DEFAULT_VCB_RATING_A),
                };
            }
        }
    }

    let inverter_power_kw = snapshot
        .selected_inverter
        .as_ref()
        .and_then(|inv| fields::first_number(inv, INVERTER_AC_POWER_FIELDS))
        .unwrap_or(40.0);
    let inverter_voltage_v = snapshot
        .selected_inverter
        .as_ref()
        .and_then(|inv| fields::first_number(inv, INVERTER_AC_VOLTAGE_FIELDS))
        .unwrap_or(400.0);
    let inverter_current_a = three_phase_current_a(inverter_power_kw, inverter_voltage_v);

    let idt_rating_mva = transformer_rating(idt_config, DEFAULT_STRING_IDT_RATING_MVA);
    let idt_output_voltage_v = transformer_secondary(idt_config, DEFAULT_IDT_SECONDARY_V);
    let pt_rating_mva = transformer_rating(pt_config, idt_rating_mva);
    let pt_output_voltage_v = transformer_secondary(pt_config, DEFAULT_PT_SECONDARY_V);

    // Per-panel power is the plant total split evenly across panels.
    let single_panel_power_kw =
        (inverters as f64 * inverter_power_kw) / lv_panel_count.max(1) as f64;
    let idt_input_current_a =
        (lv_panel_inputs as f64 * single_panel_power_kw) / (inverter_voltage_v * 1.732 / 1000.0);
    let idt_output_current_a = (idt_rating_mva * 1000.0) / (idt_output_voltage_v * 1.732 / 1000.0);
    let pt_input_current_a =
        (idt_count as f64 * idt_rating_mva * 1000.0) / (idt_output_voltage_v * 1.732 / 1000.0);
    let pt_output_current_a = (pt_rating_mva * 1000.0) / (pt_output_voltage_v * 1.732 / 1000.0);

    let pt_count = if pt_config.is_some() { 1 } else { 0 };

    HvStringInverterInputs {
        number_of_string_inverters: inverters,
        inverter_output_voltage_v: inverter_voltage_v,
        inverter_output_current_a: round2(inverter_current_a),
        inverters_per_lv_combiner_panel: if lv_panel_inputs > 0 {
            (lv_panel_inputs as f64 / lv_panel_count.max(1) as f64).ceil() as u32
        } else {
            6
        },
        total_lv_combiner_panels: lv_panel_count,
        quantity_of_idts: idt_count,
        single_idt_rating_mva: idt_rating_mva,
        idt_impedance_percent: DEFAULT_TRANSFORMER_IMPEDANCE_PERCENT,
        idt_input_voltage_v: idt_config
            .and_then(|c| c.primary_voltage_v)
            .unwrap_or(inverter_voltage_v),
        idt_input_current_a: round2(idt_input_current_a),
        idt_output_voltage_v,
        idt_output_current_a: round2(idt_output_current_a),
        quantity_of_pts: pt_count,
        single_pt_rating_mva: pt_rating_mva,
        pt_impedance_percent: DEFAULT_TRANSFORMER_IMPEDANCE_PERCENT,
        pt_input_voltage_v: idt_output_voltage_v,
        pt_input_current_a: round2(pt_input_current_a),
        pt_output_voltage_v,
        pt_output_current_a: round2(pt_output_current_a),
        inverter_to_lv_panel: inverter_to_lv_panel.stage(inverters),
        lv_panel_to_idt: lv_panel_to_idt.stage(lv_panel_count),
        idt_to_pt: idt_to_pt.stage(idt_count),
        pt_to_poc: pt_to_poc.stage(pt_count),
        combiner_income_breaker_rating_a: income_breaker,
        combiner_outgoing_breaker_rating_a: outgoing_breaker,
        cb_idt_to_pt,
        cb_pt_to_poc,
    }
}

// =============================================================================
// HV central
// =============================================================================

pub fn extract_hv_central(snapshot: &DesignSnapshot) -> HvCentralInverterInputs {
    let ac = snapshot.ac_configuration.as_ref();
    let hv = ac.and_then(|a| a.hv_central_config.as_ref());
    let inverters = snapshot.manual_inverter_count.unwrap_or(0);

    let idt_count = hv
        .and_then(|h| h.idts.as_ref())
        .map(|g| g.count)
        .filter(|c| *c > 0)
        .unwrap_or_else(|| (inverters as f64 / 2.0).ceil() as u32);
    let idt_config = hv
        .and_then(|h| h.idts.as_ref())
        .and_then(|g| g.configurations.first());
    let pt_config = hv.and_then(|h| h.power_transformer.as_ref());

    let mut inverter_to_idt = Route::provisional(CENTRAL_INVERTER_TO_IDT);
    let mut idt_to_pt = Route::provisional(CENTRAL_IDT_TO_PT);
    let mut pt_to_poc = Route::provisional(CENTRAL_PT_TO_POC);

    let mut cb_inverter_to_idt = BreakerSpec {
        kind: "VCB".to_string(),
        rating_a: DEFAULT_CENTRAL_TO_IDT_RATING_A,
    };
    let mut cb_idt_to_pt = BreakerSpec {
        kind: "VCB".to_string(),
        rating_a: DEFAULT_VCB_RATING_A,
    };
    let mut cb_pt_to_poc = BreakerSpec {
        kind: "VCB".to_string(),
        rating_a: DEFAULT_VCB_RATING_A,
    };

    if let Some(ac) = ac {
        for (key, selection) in &ac.selected_cables {
            let lower = key.to_lowercase();
            if lower.contains("output") && lower.contains("inv") && lower.contains("idt") {
                inverter_to_idt.override_from(selection, 185.0);
            } else if lower.contains("idt_to_transformer")
                || (lower.contains("idt") && lower.contains("pt"))
            {
                idt_to_pt.override_from(selection, 185.0);
            } else if lower.contains("transformer_to_poc")
                || (lower.contains("pt") && lower.contains("poc"))
            {
                pt_to_poc.override_from(selection, 240.0);
            }
        }
        for (key, selection) in &ac.selected_breakers {
            let lower = key.to_lowercase();
            if lower.contains("individual") && lower.contains("inv") && lower.contains("idt") {
                cb_inverter_to_idt = BreakerSpec {
                    kind: breaker_kind(selection),
                    rating_a: breaker_rating(selection, DEFAULT_CENTRAL_TO_IDT_RATING_A),
                };
            } else if lower.contains("idt_output") || (lower.contains("idt") && lower.contains("output")) {
                cb_idt_to_pt = BreakerSpec {
                    kind: breaker_kind(selection),
                    rating_a: breaker_rating(selection, DEFAULT_VCB_RATING_A),
                };
            } else if lower.contains("power_transformer")
                || (lower.contains("power") && lower.contains("transformer") && lower.contains("grid"))
            {
                cb_pt_to_poc = BreakerSpec {
                    kind: breaker_kind(selection),
                    rating_a: breaker_rating(selection, DEFAULT_VCB_RATING_A),
                };
            }
        }
    }

    let inverter_power_kw = DEFAULT_CENTRAL_INVERTER_KW;
    let inverter_voltage_v = DEFAULT_CENTRAL_INVERTER_V;
    let inverter_current_a = three_phase_current_a(inverter_power_kw, inverter_voltage_v);

    let idt_rating_mva = transformer_rating(idt_config, DEFAULT_CENTRAL_IDT_RATING_MVA);
    let idt_output_voltage_v = transformer_secondary(idt_config, DEFAULT_IDT_SECONDARY_V);
    let pt_rating_mva = transformer_rating(pt_config, idt_rating_mva);
    let pt_output_voltage_v = transformer_secondary(pt_config, DEFAULT_PT_SECONDARY_V);

    let inverters_per_idt = (inverters as f64 / idt_count.max(1) as f64).ceil();
    let idt_input_current_a = inverters_per_idt * inverter_current_a;
    let idt_output_current_a = (idt_rating_mva * 1000.0) / (idt_output_voltage_v * 1.732 / 1000.0);
    let pt_input_current_a =
        (idt_count as f64 * idt_rating_mva * 1000.0) / (idt_output_voltage_v * 1.732 / 1000.0);
    let pt_output_current_a = (pt_rating_mva * 1000.0) / (pt_output_voltage_v * 1.732 / 1000.0);

    let pt_count = if pt_config.is_some() { 1 } else { 0 };

    HvCentralInverterInputs {
        number_of_central_inverters: inverters,
        single_inverter_rating_kw: inverter_power_kw,
        inverter_output_voltage_v: inverter_voltage_v,
        inverter_output_current_a: round2(inverter_current_a),
        quantity_of_idts: idt_count,
        single_idt_rating_mva: idt_rating_mva,
        idt_impedance_percent: DEFAULT_TRANSFORMER_IMPEDANCE_PERCENT,
        idt_input_voltage_v: idt_config
            .and_then(|c| c.primary_voltage_v)
            .unwrap_or(inverter_voltage_v),
        idt_input_current_a: round2(idt_input_current_a),
        idt_output_voltage_v,
        idt_output_current_a: round2(idt_output_current_a),
        quantity_of_pts: pt_count,
        single_pt_rating_mva: pt_rating_mva,
        pt_impedance_percent: DEFAULT_TRANSFORMER_IMPEDANCE_PERCENT,
        pt_input_voltage_v: pt_config
            .and_then(|c| c.primary_voltage_v)
            .unwrap_or(idt_output_voltage_v),
        pt_input_current_a: round2(pt_input_current_a),
        pt_output_voltage_v,
        pt_output_current_a: round2(pt_output_current_a),
        inverter_to_idt: inverter_to_idt.stage(inverters),
        idt_to_pt: idt_to_pt.stage(idt_count),
        pt_to_poc: pt_to_poc.stage(pt_count),
        cb_inverter_to_idt,
        cb_idt_to_pt,
        cb_pt_to_poc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{HvCentralConfig, TransformerGroup};

    #[test]
    fn string_extraction_survives_an_empty_snapshot() {
        let hv = extract_hv_string(&DesignSnapshot::default());
        assert_eq!(hv.number_of_string_inverters, 0);
        assert_eq!(hv.inverter_to_lv_panel.distance_m, 50.0);
        assert_eq!(hv.inverter_to_lv_panel.cross_section.to_string(), "1R*16");
        assert_eq!(hv.pt_to_poc.cross_section.to_string(), "1R*240");
        assert_eq!(hv.cb_idt_to_pt.kind, "VCB");
        assert_eq!(hv.cb_idt_to_pt.rating_a, 630.0);
        assert_eq!(hv.idt_impedance_percent, 6.0);
    }

    #[test]
    fn string_idt_count_defaults_to_eighth_of_inverters() {
        let snapshot = DesignSnapshot {
            manual_inverter_count: Some(20),
            ..Default::default()
        };
        let hv = extract_hv_string(&snapshot);
        assert_eq!(hv.quantity_of_idts, 3);
        assert_eq!(hv.total_lv_combiner_panels, 3);
    }

    #[test]
    fn central_idt_count_defaults_to_half_of_inverters() {
        let snapshot = DesignSnapshot {
            manual_inverter_count: Some(7),
            ..Default::default()
        };
        let hv = extract_hv_central(&snapshot);
        assert_eq!(hv.quantity_of_idts, 4);
        assert_eq!(hv.single_idt_rating_mva, 2.5);
        assert_eq!(hv.cb_inverter_to_idt.rating_a, 1250.0);
    }

    #[test]
    fn central_currents_use_defaults() {
        let snapshot = DesignSnapshot {
            manual_inverter_count: Some(4),
            ..Default::default()
        };
        let hv = extract_hv_central(&snapshot);
        // 1000 / (1500 * 1.732 / 1000) = 384.91
        assert_eq!(hv.inverter_output_current_a, 384.91);
        // 2 inverters per IDT x 384.911... A, rounded after multiplying
        assert_eq!(hv.idt_input_current_a, 769.82);
    }

    #[test]
    fn configured_transformer_overrides_defaults() {
        let snapshot = DesignSnapshot {
            manual_inverter_count: Some(4),
            ac_configuration: Some(AcConfiguration {
                hv_central_config: Some(HvCentralConfig {
                    idts: Some(TransformerGroup {
                        count: 2,
                        configurations: vec![TransformerConfig {
                            power_rating_mva: Some(3.0),
                            primary_voltage_v: Some(1500.0),
                            secondary_voltage_v: Some(33_000.0),
                        }],
                    }),
                    power_transformer: Some(TransformerConfig {
                        power_rating_mva: Some(6.0),
                        primary_voltage_v: Some(33_000.0),
                        secondary_voltage_v: Some(132_000.0),
                    }),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let hv = extract_hv_central(&snapshot);
        assert_eq!(hv.quantity_of_idts, 2);
        assert_eq!(hv.single_idt_rating_mva, 3.0);
        assert_eq!(hv.single_pt_rating_mva, 6.0);
        assert_eq!(hv.pt_output_voltage_v, 132_000.0);
        assert_eq!(hv.quantity_of_pts, 1);
    }
}
