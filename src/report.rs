//! CSV reporting of model output: per-step lattice counts, the compartmental
//! time series for each scenario, and a one-row-per-scenario summary.
//!
//! Each report row type implements [`Report`] (via [`create_report_trait!`])
//! and is routed to its own CSV file by [`ReportWriters`].

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use serde_derive::{Deserialize, Serialize};

use crate::error::EpiError;

pub trait Report: 'static {
    // Returns report type
    fn type_id(&self) -> TypeId;
    // Serializes the data with the correct writer
    fn serialize(&self, writer: &mut Writer<File>);
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! create_report_trait {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(&self, writer: &mut csv::Writer<std::fs::File>) {
                writer.serialize(self).unwrap();
            }
        }
    };
}

/// One row of the lattice engine's per-step output.
#[derive(Debug, Serialize, Deserialize)]
pub struct GridCountsRow {
    pub step: u32,
    pub susceptible: usize,
    pub infected: usize,
    pub recovered: usize,
}
create_report_trait!(GridCountsRow);

/// One row of a compartmental scenario's time series.
#[derive(Debug, Serialize, Deserialize)]
pub struct SirRow {
    pub scenario: String,
    pub t: f64,
    pub s: f64,
    pub i: f64,
    pub r: f64,
}
create_report_trait!(SirRow);

/// Summary statistics for one compartmental scenario.
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryRow {
    pub scenario: String,
    pub peak_infected: f64,
    pub peak_day: f64,
    pub attack_rate: f64,
}
create_report_trait!(SummaryRow);

// Checks that the path is valid. Creates the file and all parent directories
// if they do not exist. Returns the file if successful. Called by
// `add_report`.
fn generate_validate_filepath(path: &Path) -> Result<File, EpiError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            create_dir_all(path.parent().expect("Either root or empty path provided"))?;
            let file = File::create(path)?;
            Ok(file)
        }
        _ => Err(EpiError::ReportError(
            "Report output files must be CSVs at this time".to_string(),
        )),
    }
}

/// Routes report rows to per-type CSV writers.
#[derive(Default)]
pub struct ReportWriters {
    file_writers: RefCell<HashMap<TypeId, Writer<File>>>,
}

impl ReportWriters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `add_report` with each report type, passing the complete path to
    /// which the report is written.
    ///
    /// # Errors
    /// Returns an `EpiError` if the path is not a `.csv` or the file cannot
    /// be created.
    pub fn add_report<T: Report + 'static>(&mut self, filepath: &Path) -> Result<(), EpiError> {
        let file = generate_validate_filepath(filepath)?;
        let writer = Writer::from_writer(file);
        self.file_writers
            .borrow_mut()
            .insert(TypeId::of::<T>(), writer);
        Ok(())
    }

    /// Writes a new row with columns following the items in the report
    /// struct to the file associated with the report type.
    ///
    /// # Panics
    /// Panics if no report was added for the row's type.
    pub fn send_report<T: Report>(&self, report: T) {
        let mut writers = self.file_writers.try_borrow_mut().unwrap();
        let writer = writers
            .get_mut(&report.type_id())
            .expect("No writer found for the report type");
        report.serialize(writer);
        writer.flush().expect("Failed to flush writer");
    }
}
