//! CSV export of incidents per service

use super::ServiceIncidentCount;
use crate::error::{IncsrvError, Result};

pub const REPORT_FILENAME: &str = "report.csv";
pub const REPORT_HEADER: [&str; 2] = ["Service", "Number of Incidents"];

/// Render the incidents-per-service report, header row first
pub fn render(data: &[ServiceIncidentCount]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(REPORT_HEADER)?;
    for row in data {
        writer.write_record([row.service.as_str(), row.count.to_string().as_str()])?;
    }

    writer
        .into_inner()
        .map_err(|e| IncsrvError::ReportError(format!("csv: {}", e.error())))
}
