//! Case-tracing spreadsheet: one row per positive patient with every PCR and
//! immunology test laid out side by side.

use std::io::Write;

use chrono::{NaiveDate, NaiveDateTime};

use super::domain::{Commune, ImmunoTest, Patient, SuspectCase};
use super::filters::{PatientCriterion, PatientRule};
use super::report::{ReportError, SurveillanceReports};
use super::store::SurveillanceStore;

pub const EXPORT_FILE_NAME: &str = "seguimiento.csv";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const DELIMITER: u8 = b';';

/// Cells written for each PCR case and for each immunology test.
pub const CELLS_PER_TEST: usize = 5;

const PATIENT_COLUMNS: [&str; 8] = [
    "Paciente",
    "Identificador",
    "Edad",
    "Sexo",
    "Comuna",
    "Nacionalidad",
    "Telefonos",
    "Estado",
];

const CLINICAL_COLUMNS: [&str; 14] = [
    "Fecha IFD",
    "IFD",
    "Origen",
    "S.Epidemiológica",
    "Epivigila",
    "PAHO FLU",
    "Gestante",
    "Contacto directo",
    "Fecha envío",
    "Laboratorio",
    "Fecha Entrega Resultado",
    "Mecanismo",
    "Fecha Alta",
    "Observación",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("failed to write case tracing export: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write case tracing export: {0}")]
    Io(#[from] std::io::Error),
}

/// Fully materialized export; every row has the header's width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseTracingTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CaseTracingTable {
    pub fn build(patients: &[&Patient], communes: &[Commune], today: NaiveDate) -> Self {
        let max_cases = patients
            .iter()
            .map(|patient| patient.suspect_cases.len())
            .max()
            .unwrap_or(0);
        let max_tests = patients
            .iter()
            .map(|patient| patient.immuno_tests.len())
            .max()
            .unwrap_or(0);

        let header = header(max_cases, max_tests);
        let rows = patients
            .iter()
            .map(|patient| row(patient, communes, today, max_cases, max_tests))
            .collect();

        Self { header, rows }
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Writes the BOM, the header and every row, semicolon delimited.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        writer.write_all(UTF8_BOM)?;
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .from_writer(writer);
        csv_writer.write_record(&self.header)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }
}

impl<S> SurveillanceReports<S>
where
    S: SurveillanceStore + 'static,
{
    /// Positive patients living in the allow-listed communes; with
    /// `include_unregistered`, positive patients without a demographic record
    /// follow them.
    pub fn case_tracing(
        &self,
        today: NaiveDate,
        include_unregistered: bool,
    ) -> Result<CaseTracingTable, ExportError> {
        let patients = self.store().patients().map_err(ReportError::from)?;
        let communes = self.store().communes().map_err(ReportError::from)?;

        let mut selected = PatientCriterion::positive()
            .with(PatientRule::CommuneIn(self.scope().communes.clone()))
            .select(&patients);
        if include_unregistered {
            selected.extend(
                PatientCriterion::positive()
                    .with(PatientRule::NoDemographic)
                    .select(&patients),
            );
        }

        tracing::debug!(patients = selected.len(), "building case tracing export");
        Ok(CaseTracingTable::build(&selected, &communes, today))
    }
}

fn header(max_cases: usize, max_tests: usize) -> Vec<String> {
    let mut columns: Vec<String> = PATIENT_COLUMNS.iter().map(|c| c.to_string()).collect();
    for i in 1..=max_cases {
        columns.extend([
            format!("PCR {i}"),
            format!("Fecha Muestra {i}"),
            format!("Fecha Resultado {i}"),
            format!("Resultado {i}"),
            format!("S {i}"),
        ]);
    }
    for i in 1..=max_tests {
        columns.extend([
            format!("IgG/IgM {i}"),
            format!("Fecha Test {i}"),
            format!("IgG {i}"),
            format!("IgM {i}"),
            format!("Control {i}"),
        ]);
    }
    columns.extend(CLINICAL_COLUMNS.iter().map(|c| c.to_string()));
    columns
}

fn row(
    patient: &Patient,
    communes: &[Commune],
    today: NaiveDate,
    max_cases: usize,
    max_tests: usize,
) -> Vec<String> {
    let demographic = patient.demographic.as_ref();
    let commune = patient
        .commune_id()
        .and_then(|id| communes.iter().find(|commune| commune.id == id))
        .map(|commune| commune.name.clone());

    let mut cells = vec![
        patient.full_name(),
        patient.identifier(),
        patient
            .age_on(today)
            .map(|age| age.to_string())
            .unwrap_or_default(),
        patient.gender.label().to_string(),
        commune.unwrap_or_default(),
        demographic
            .and_then(|demo| demo.nationality.clone())
            .unwrap_or_default(),
        demographic
            .map(|demo| demo.full_telephones())
            .unwrap_or_default(),
        patient
            .status
            .map(|status| status.label().to_string())
            .unwrap_or_default(),
    ];

    for case in &patient.suspect_cases {
        cells.extend(case_cells(case));
    }
    pad(&mut cells, max_cases - patient.suspect_cases.len());

    for test in &patient.immuno_tests {
        cells.extend(immuno_cells(test));
    }
    pad(&mut cells, max_tests - patient.immuno_tests.len());

    match patient.suspect_cases.first() {
        Some(first) => cells.extend(clinical_cells(first)),
        None => cells.extend(std::iter::repeat(String::new()).take(CLINICAL_COLUMNS.len())),
    }
    cells
}

fn pad(cells: &mut Vec<String>, missing: usize) {
    cells.extend(std::iter::repeat(String::new()).take(missing * CELLS_PER_TEST));
}

fn case_cells(case: &SuspectCase) -> [String; CELLS_PER_TEST] {
    [
        case.id.to_string(),
        case.sample_at.format("%Y-%m-%d").to_string(),
        day(case.pcr_sars_cov_2_at),
        case.pcr_sars_cov_2.label().to_string(),
        case.symptoms_label().to_string(),
    ]
}

fn immuno_cells(test: &ImmunoTest) -> [String; CELLS_PER_TEST] {
    let upper = |value: &Option<String>| value.as_deref().unwrap_or_default().to_uppercase();
    [
        test.id.to_string(),
        test.register_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
        upper(&test.igg),
        upper(&test.igm),
        upper(&test.control),
    ]
}

fn clinical_cells(case: &SuspectCase) -> [String; 14] {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    let number = |value: Option<u64>| value.map(|n| n.to_string()).unwrap_or_default();
    let flag = |value: bool| if value { "Sí".to_string() } else { String::new() };
    [
        day(case.result_ifd_at),
        text(&case.result_ifd),
        text(&case.origin),
        case.epidemiological_week
            .map(|week| week.to_string())
            .unwrap_or_default(),
        number(case.epivigila),
        number(case.paho_flu),
        flag(case.gestation),
        flag(case.close_contact),
        day(case.sent_external_lab_at),
        text(&case.processing_laboratory),
        day(case.notification_at),
        text(&case.notification_mechanism),
        day(case.discharged_at),
        text(&case.observation),
    ]
}

fn day(at: Option<NaiveDateTime>) -> String {
    at.map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
