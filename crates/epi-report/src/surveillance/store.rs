use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::domain::{
    CaseId, Commune, Laboratory, PcrResult, Patient, SuspectCase, VentilatorStock,
};

/// Read/write access to the patient and case records owned by upstream intake.
///
/// Reports only read; the lab-interface webhook and the ministry submission
/// pipeline are the two writers.
pub trait SurveillanceStore: Send + Sync {
    fn patients(&self) -> Result<Vec<Patient>, StoreError>;
    fn communes(&self) -> Result<Vec<Commune>, StoreError>;
    fn laboratories(&self) -> Result<Vec<Laboratory>, StoreError>;
    fn ventilators(&self) -> Result<Option<VentilatorStock>, StoreError>;
    fn record_result(
        &self,
        case_id: CaseId,
        result: PcrResult,
        result_at: NaiveDateTime,
    ) -> Result<SuspectCase, StoreError>;
    fn assign_submission_id(&self, case_id: CaseId, submission_id: &str)
        -> Result<(), StoreError>;

    fn cases(&self) -> Result<Vec<SuspectCase>, StoreError> {
        Ok(self
            .patients()?
            .into_iter()
            .flat_map(|patient| patient.suspect_cases)
            .collect())
    }
}

impl<S: SurveillanceStore + ?Sized> SurveillanceStore for Arc<S> {
    fn patients(&self) -> Result<Vec<Patient>, StoreError> {
        (**self).patients()
    }

    fn communes(&self) -> Result<Vec<Commune>, StoreError> {
        (**self).communes()
    }

    fn laboratories(&self) -> Result<Vec<Laboratory>, StoreError> {
        (**self).laboratories()
    }

    fn ventilators(&self) -> Result<Option<VentilatorStock>, StoreError> {
        (**self).ventilators()
    }

    fn record_result(
        &self,
        case_id: CaseId,
        result: PcrResult,
        result_at: NaiveDateTime,
    ) -> Result<SuspectCase, StoreError> {
        (**self).record_result(case_id, result, result_at)
    }

    fn assign_submission_id(
        &self,
        case_id: CaseId,
        submission_id: &str,
    ) -> Result<(), StoreError> {
        (**self).assign_submission_id(case_id, submission_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("suspect case {0} not found")]
    CaseNotFound(CaseId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("snapshot file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialized form of the whole dataset, used to seed the in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveillanceSnapshot {
    #[serde(default)]
    pub communes: Vec<Commune>,
    #[serde(default)]
    pub laboratories: Vec<Laboratory>,
    #[serde(default)]
    pub ventilators: Option<VentilatorStock>,
    #[serde(default)]
    pub patients: Vec<Patient>,
}

impl SurveillanceSnapshot {
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, StoreError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Writes pretty JSON to a sibling temp file, then renames it over `path`
    /// so readers never see a half-written snapshot.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let path = path.as_ref();
        let staging = path.with_extension("json.tmp");
        let mut writer = BufWriter::new(File::create(&staging)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        drop(writer);
        std::fs::rename(&staging, path)?;
        Ok(())
    }
}

/// Mutex-guarded snapshot store used by the service binary and tests.
///
/// A store opened from a file rewrites that file after every write, so lab
/// results and submission ids survive a restart.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    data: Arc<Mutex<SurveillanceSnapshot>>,
    backing: Option<PathBuf>,
}

impl InMemoryStore {
    pub fn new(snapshot: SurveillanceSnapshot) -> Self {
        Self {
            data: Arc::new(Mutex::new(snapshot)),
            backing: None,
        }
    }

    /// Loads `path` and keeps it in sync with every later write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let snapshot = SurveillanceSnapshot::from_path(path)?;
        Ok(Self {
            data: Arc::new(Mutex::new(snapshot)),
            backing: Some(path.to_path_buf()),
        })
    }

    pub fn backing_path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    pub fn snapshot(&self) -> SurveillanceSnapshot {
        self.data.lock().expect("store mutex poisoned").clone()
    }

    fn with_case<F>(&self, case_id: CaseId, apply: F) -> Result<SuspectCase, StoreError>
    where
        F: FnOnce(&mut SuspectCase),
    {
        let mut guard = self.data.lock().expect("store mutex poisoned");
        let case = guard
            .patients
            .iter_mut()
            .flat_map(|patient| patient.suspect_cases.iter_mut())
            .find(|case| case.id == case_id)
            .ok_or(StoreError::CaseNotFound(case_id))?;
        apply(case);
        let updated = case.clone();

        // Persisted under the lock so file order matches write order.
        if let Some(path) = &self.backing {
            guard.write_to_path(path)?;
        }
        Ok(updated)
    }
}

impl SurveillanceStore for InMemoryStore {
    fn patients(&self) -> Result<Vec<Patient>, StoreError> {
        Ok(self.data.lock().expect("store mutex poisoned").patients.clone())
    }

    fn communes(&self) -> Result<Vec<Commune>, StoreError> {
        Ok(self.data.lock().expect("store mutex poisoned").communes.clone())
    }

    fn laboratories(&self) -> Result<Vec<Laboratory>, StoreError> {
        Ok(self
            .data
            .lock()
            .expect("store mutex poisoned")
            .laboratories
            .clone())
    }

    fn ventilators(&self) -> Result<Option<VentilatorStock>, StoreError> {
        Ok(self.data.lock().expect("store mutex poisoned").ventilators)
    }

    fn record_result(
        &self,
        case_id: CaseId,
        result: PcrResult,
        result_at: NaiveDateTime,
    ) -> Result<SuspectCase, StoreError> {
        self.with_case(case_id, |case| {
            case.pcr_sars_cov_2 = result;
            case.pcr_sars_cov_2_at = Some(result_at);
            case.updated_at = chrono::Local::now().naive_local();
        })
    }

    fn assign_submission_id(
        &self,
        case_id: CaseId,
        submission_id: &str,
    ) -> Result<(), StoreError> {
        self.with_case(case_id, |case| {
            case.minsal_ws_id = Some(submission_id.to_string());
        })
        .map(|_| ())
    }
}
