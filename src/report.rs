//! CSV report files produced by scrape tasks.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::engine::job::FileRef;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error writing report: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error writing report: {0}")]
    Csv(#[from] csv::Error),
}

/// An in-memory CSV report, written to disk in one shot when the task is
/// done with it.
pub struct CsvReport {
    name: String,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvReport {
    pub fn new(name: impl Into<String>, header: &[&str]) -> Self {
        Self {
            name: name.into(),
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.header.len());
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Render and write the report under `dir` as `<name>.csv`.
    ///
    /// Writes to a temp file and renames into place so a partially-written
    /// report is never listed as a result file.
    pub fn write_to(&self, dir: &Path) -> Result<FileRef, ReportError> {
        fs::create_dir_all(dir)?;

        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let body = writer.into_inner().map_err(|e| {
            ReportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;

        let file_name = format!("{}.csv", self.name);
        let path = dir.join(&file_name);
        let tmp = dir.join(format!("{file_name}.tmp"));
        fs::write(&tmp, &body)?;
        fs::rename(&tmp, &path)?;

        Ok(FileRef {
            name: file_name,
            path,
            content_type: "text/csv".to_string(),
            size_bytes: body.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows_with_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = CsvReport::new("shops", &["name", "website"]);
        report.push_row(vec!["Big Sky Anglers".into(), "https://bigskyanglers.example".into()]);
        report.push_row(vec!["Rod, Reel & Co".into(), "https://rodreel.example".into()]);
        report.push_row(vec!["say \"hi\"".into(), "line\nbreak".into()]);

        let file = report.write_to(dir.path()).unwrap();
        assert_eq!(file.name, "shops.csv");
        assert_eq!(file.content_type, "text/csv");

        let content = fs::read_to_string(&file.path).unwrap();
        assert_eq!(file.size_bytes, content.len() as u64);
        assert!(content.starts_with("name,website\n"));
        assert!(content.contains("\"Rod, Reel & Co\",https://rodreel.example"));
        assert!(content.contains("\"say \"\"hi\"\"\""));

        // Reads back as the same records, quoting included.
        let mut reader = csv::Reader::from_path(&file.path).unwrap();
        assert_eq!(
            reader.headers().unwrap(),
            &csv::StringRecord::from(vec!["name", "website"])
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][0], "Rod, Reel & Co");
        assert_eq!(&rows[2][1], "line\nbreak");
    }

    #[test]
    fn empty_report_still_produces_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let report = CsvReport::new("empty", &["url"]);
        let file = report.write_to(dir.path()).unwrap();
        let content = fs::read_to_string(&file.path).unwrap();
        assert_eq!(content, "url\n");
    }

    #[test]
    fn no_stray_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = CsvReport::new("tidy", &["url"]);
        report.push_row(vec!["https://a.example".into()]);
        report.write_to(dir.path()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["tidy.csv".to_string()]);
    }
}
