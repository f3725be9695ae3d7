pub mod breakdown;
pub mod evolution;
mod listings;
mod narrative;
mod positives;
pub mod views;

use std::sync::Arc;

use super::domain::Commune;
use super::scope::SurveillanceScope;
use super::store::{StoreError, SurveillanceStore};

pub use evolution::EvolutionSeries;

/// Read-only report component over a store and the deployment scope.
pub struct SurveillanceReports<S> {
    store: Arc<S>,
    scope: Arc<SurveillanceScope>,
}

impl<S> Clone for SurveillanceReports<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<S> SurveillanceReports<S>
where
    S: SurveillanceStore + 'static,
{
    pub fn new(store: Arc<S>, scope: SurveillanceScope) -> Self {
        Self {
            store,
            scope: Arc::new(scope),
        }
    }

    pub fn scope(&self) -> &SurveillanceScope {
        &self.scope
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Allow-listed communes, in configured order.
    fn scoped_communes(&self) -> Result<Vec<Commune>, StoreError> {
        self.communes_for(&self.scope.communes)
    }

    fn communes_for(&self, ids: &[super::domain::CommuneId]) -> Result<Vec<Commune>, StoreError> {
        let known = self.store.communes()?;
        Ok(ids
            .iter()
            .filter_map(|id| known.iter().find(|commune| commune.id == *id).cloned())
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("no positive cases, or no positive cases with an address, in the requested scope")]
    NoPositiveCases,
    #[error(transparent)]
    Store(#[from] StoreError),
}
