use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{CommuneId, EstablishmentId, RegionId, UserId};

/// Deployment-wide reporting scope, loaded once from configuration and handed
/// to each report component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveillanceScope {
    /// Commune allow-list in display order.
    pub communes: Vec<CommuneId>,
    pub region: Option<RegionId>,
    pub commune_population: BTreeMap<CommuneId, u64>,
    pub region_population: Option<u64>,
    pub origins: OriginClasses,
}

impl SurveillanceScope {
    pub fn with_communes(communes: Vec<CommuneId>) -> Self {
        Self {
            communes,
            ..Self::default()
        }
    }
}

/// Establishment aliases used to split the summary report by origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginClasses {
    pub hospital: Vec<String>,
    pub private: Vec<String>,
}

impl Default for OriginClasses {
    fn default() -> Self {
        Self {
            hospital: vec!["HOSPITAL Ernesto Torres Galdames".to_string()],
            private: vec!["Clínica Tarapacá".to_string(), "Clínica Iquique".to_string()],
        }
    }
}

/// Communes and establishments assigned to the operator issuing a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorScope {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub communes: Vec<CommuneId>,
    #[serde(default)]
    pub establishments: Vec<EstablishmentId>,
}
