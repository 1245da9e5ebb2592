//! Run report output port.

use std::path::Path;

use crate::domain::error::TickloomError;
use crate::domain::runner::report::RunReport;

pub trait ReportPort {
    /// Write the report into `output_dir`, returning the files written.
    fn write(&self, report: &RunReport, output_dir: &Path) -> Result<Vec<String>, TickloomError>;
}
