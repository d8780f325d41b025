//! Parameter extraction from a design snapshot.
//!
//! Extraction is session-scoped: an `ExtractionSession` accumulates the
//! parameter groups pulled from a snapshot and assembles them into a
//! `ParameterSet` once every required group is present. Sessions live in an
//! in-process registry so a caller can extract, inspect, clear and re-extract
//! without leaking state between sessions.

pub mod dc;
pub mod fields;
pub mod hv;
pub mod lv;

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::parameters::{
    AcCommonInputs, CalculationType, ConnectionInputs, DcInputs, FixedPreferences,
    HvCentralInverterInputs, HvStringInverterInputs, LightningProtectionInputs,
    LvConnectionInputs, ParameterSet, SubstationInputs, SystemType, TransformerEarthingInputs,
};
use crate::domain::snapshot::{ConnectionType, DesignSnapshot, SoilType};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// A required parameter group was never extracted in this session.
    #[error("required parameter group '{0}' has not been extracted")]
    IncompleteState(&'static str),
    /// LV extraction could not resolve a cable route from the AC configuration.
    #[error("no usable cable data for route '{0}' in the AC configuration")]
    MissingCableData(&'static str),
    /// LV extraction could not resolve a breaker rating.
    #[error("no usable breaker rating for '{0}' in the AC configuration")]
    MissingBreakerData(&'static str),
}

// =============================================================================
// Standalone extractors
// =============================================================================

pub fn extract_lightning(snapshot: &DesignSnapshot) -> LightningProtectionInputs {
    let total_area: f64 = snapshot.polygon_configs.iter().map(|c| c.area_m2).sum();
    LightningProtectionInputs {
        total_plant_area_m2: dc::round2(total_area),
        soil_type: snapshot.soil_type.unwrap_or(SoilType::Loam),
    }
}

pub fn extract_ac_common(snapshot: &DesignSnapshot) -> AcCommonInputs {
    let system_type = match snapshot.connection_type {
        Some(ConnectionType::Lv) => SystemType::LvConnection,
        _ => SystemType::HvConnection,
    };
    AcCommonInputs {
        system_type,
        number_of_inverters: snapshot.manual_inverter_count.unwrap_or(0),
    }
}

// =============================================================================
// Session
// =============================================================================

/// Per-session extraction context. Groups stay `None` until their extractor
/// runs; `complete` refuses to assemble a set from partial state.
#[derive(Debug, Default)]
pub struct ExtractionSession {
    session_id: String,
    dc: Option<DcInputs>,
    lightning: Option<LightningProtectionInputs>,
    ac_common: Option<AcCommonInputs>,
    lv: Option<LvConnectionInputs>,
    hv_string: Option<HvStringInverterInputs>,
    hv_central: Option<HvCentralInverterInputs>,
}

impl ExtractionSession {
    pub fn new() -> Self {
        Self {
            session_id: format!("boq_{}_{}", Utc::now().timestamp_millis(), short_id()),
            ..Default::default()
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Drops all extracted groups; the session id survives.
    pub fn clear(&mut self) {
        let session_id = std::mem::take(&mut self.session_id);
        *self = Self {
            session_id,
            ..Default::default()
        };
    }

    pub fn extract_dc(&mut self, snapshot: &DesignSnapshot) -> &DcInputs {
        self.dc.insert(dc::extract_dc(snapshot))
    }

    pub fn extract_lightning(&mut self, snapshot: &DesignSnapshot) -> &LightningProtectionInputs {
        self.lightning.insert(extract_lightning(snapshot))
    }

    pub fn extract_ac_common(&mut self, snapshot: &DesignSnapshot) -> &AcCommonInputs {
        self.ac_common.insert(extract_ac_common(snapshot))
    }

    pub fn extract_lv(&mut self, snapshot: &DesignSnapshot) -> Result<&LvConnectionInputs, ExtractionError> {
        Ok(self.lv.insert(lv::extract_lv(snapshot)?))
    }

    pub fn extract_hv_string(&mut self, snapshot: &DesignSnapshot) -> &HvStringInverterInputs {
        self.hv_string.insert(hv::extract_hv_string(snapshot))
    }

    pub fn extract_hv_central(&mut self, snapshot: &DesignSnapshot) -> &HvCentralInverterInputs {
        self.hv_central.insert(hv::extract_hv_central(snapshot))
    }

    /// Runs every extractor the calculation type needs against the snapshot.
    pub fn extract_all(
        &mut self,
        snapshot: &DesignSnapshot,
        calculation_type: CalculationType,
    ) -> Result<(), ExtractionError> {
        self.extract_dc(snapshot);
        self.extract_lightning(snapshot);
        self.extract_ac_common(snapshot);
        match calculation_type {
            CalculationType::Lv => {
                self.extract_lv(snapshot)?;
            }
            CalculationType::HvString => {
                self.extract_hv_string(snapshot);
            }
            CalculationType::HvCentral => {
                self.extract_hv_central(snapshot);
            }
        }
        Ok(())
    }

    /// Assembles the owned parameter set the workflow snapshots at run start.
    pub fn complete(&self, calculation_type: CalculationType) -> Result<ParameterSet, ExtractionError> {
        let dc = self
            .dc
            .clone()
            .ok_or(ExtractionError::IncompleteState("dc"))?;
        let lightning = self
            .lightning
            .clone()
            .ok_or(ExtractionError::IncompleteState("lightning_protection"))?;
        let ac_common = self
            .ac_common
            .clone()
            .ok_or(ExtractionError::IncompleteState("ac_common"))?;

        let (connection, transformer_earthing) = match calculation_type {
            CalculationType::Lv => {
                let lv = self
                    .lv
                    .clone()
                    .ok_or(ExtractionError::IncompleteState("lv_connection"))?;
                (ConnectionInputs::Lv(lv), None)
            }
            CalculationType::HvString => {
                let hv = self
                    .hv_string
                    .clone()
                    .ok_or(ExtractionError::IncompleteState("hv_string_inverter"))?;
                let earthing = TransformerEarthingInputs::new(hv.quantity_of_idts);
                (ConnectionInputs::HvString(hv), Some(earthing))
            }
            CalculationType::HvCentral => {
                let hv = self
                    .hv_central
                    .clone()
                    .ok_or(ExtractionError::IncompleteState("hv_central_inverter"))?;
                let earthing = TransformerEarthingInputs::new(hv.quantity_of_idts);
                (ConnectionInputs::HvCentral(hv), Some(earthing))
            }
        };

        Ok(ParameterSet {
            substation: SubstationInputs::for_system(ac_common.system_type),
            fixed_preferences: FixedPreferences::default(),
            dc,
            lightning,
            ac_common,
            connection,
            transformer_earthing,
            calculation_type,
            session_id: self.session_id.clone(),
            extracted_at: Utc::now(),
        })
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

// =============================================================================
// Registry
// =============================================================================

/// In-process store of live extraction sessions, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, ExtractionSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> String {
        let session = ExtractionSession::new();
        let id = session.session_id().to_string();
        self.sessions.lock().insert(id.clone(), session);
        id
    }

    pub fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut ExtractionSession) -> R,
    ) -> Option<R> {
        self.sessions.lock().get_mut(session_id).map(f)
    }

    pub fn clear(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .get_mut(session_id)
            .map(|s| s.clear())
            .is_some()
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.lock().remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_requires_every_group() {
        let session = ExtractionSession::new();
        assert!(matches!(
            session.complete(CalculationType::HvString),
            Err(ExtractionError::IncompleteState("dc"))
        ));
    }

    #[test]
    fn complete_requires_matching_connection_group() {
        let mut session = ExtractionSession::new();
        let snapshot = DesignSnapshot::default();
        session.extract_dc(&snapshot);
        session.extract_lightning(&snapshot);
        session.extract_ac_common(&snapshot);
        session.extract_hv_string(&snapshot);

        assert!(session.complete(CalculationType::HvString).is_ok());
        assert!(matches!(
            session.complete(CalculationType::HvCentral),
            Err(ExtractionError::IncompleteState("hv_central_inverter"))
        ));
    }

    #[test]
    fn hv_sets_carry_transformer_earthing_with_one_pt() {
        let mut session = ExtractionSession::new();
        let snapshot = DesignSnapshot {
            manual_inverter_count: Some(16),
            ..Default::default()
        };
        session
            .extract_all(&snapshot, CalculationType::HvString)
            .unwrap();
        let set = session.complete(CalculationType::HvString).unwrap();
        let earthing = set.transformer_earthing.unwrap();
        assert_eq!(earthing.number_of_idts, 2);
        assert_eq!(earthing.number_of_pts, 1);
        assert_eq!(set.substation.grid_size_m2, 1600.0);
    }

    #[test]
    fn lv_sets_have_no_transformer_earthing() {
        let mut session = ExtractionSession::new();
        let snapshot = DesignSnapshot {
            connection_type: Some(ConnectionType::Lv),
            ..Default::default()
        };
        session.extract_dc(&snapshot);
        session.extract_lightning(&snapshot);
        session.extract_ac_common(&snapshot);
        // LV strict extraction fails without AC configuration data.
        assert!(session.extract_lv(&snapshot).is_err());
        assert!(matches!(
            session.complete(CalculationType::Lv),
            Err(ExtractionError::IncompleteState("lv_connection"))
        ));
    }

    #[test]
    fn clear_resets_groups_but_keeps_identity() {
        let registry = SessionRegistry::new();
        let id = registry.create();
        registry
            .with_session(&id, |s| {
                s.extract_dc(&DesignSnapshot::default());
            })
            .unwrap();
        assert!(registry.clear(&id));
        let incomplete = registry
            .with_session(&id, |s| s.complete(CalculationType::HvCentral).is_err())
            .unwrap();
        assert!(incomplete);
    }
}
