//! Backup Queue: durable CSV store for telemetry that could not be delivered
//!
//! Records are appended on upload failure and replayed oldest-first once the
//! endpoint is reachable again. The file is rewritten atomically (temp file +
//! rename) after a partial flush and removed entirely once drained, so its
//! presence alone means "something is still pending".

use super::payload::TelemetryRecord;
use crate::types::Tier;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Header row of the backup file.
pub const BACKUP_HEADER: &str =
    "timestamp,temperature,ph,ec,nitrogen,phosphorus,turbidity,quality_score,quality_status";

const COLUMNS: usize = 9;

/// Backup queue errors
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt backup row {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

impl BackupError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub struct BackupQueue {
    path: PathBuf,
    max_records: usize,
}

impl BackupQueue {
    /// Open the queue at `path`, creating the parent directory.
    ///
    /// The file itself is only created on the first append.
    pub fn open<P: AsRef<Path>>(path: P, max_records: usize) -> Result<Self, BackupError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
        }

        let queue = Self {
            path,
            max_records: max_records.max(1),
        };

        let pending = queue.pending_count()?;
        if pending > 0 {
            info!(pending, path = %queue.path.display(), "Backup queue opened with pending records");
        } else {
            debug!(path = %queue.path.display(), "Backup queue opened (empty)");
        }
        Ok(queue)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while the backing file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append one record. When the queue is at capacity the oldest record is
    /// dropped first.
    pub fn append(&self, record: &TelemetryRecord) -> Result<(), BackupError> {
        let mut records = self.load()?;
        if records.len() >= self.max_records {
            let excess = records.len() + 1 - self.max_records;
            warn!(
                max = self.max_records,
                dropped = excess,
                "Backup queue full, dropping oldest records"
            );
            records.drain(..excess);
            records.push(record.clone());
            return self.replace(&records);
        }

        let header_needed = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BackupError::io(&self.path, e))?;
        let mut out = String::new();
        if header_needed {
            out.push_str(BACKUP_HEADER);
            out.push('\n');
        }
        out.push_str(&encode_row(record));
        out.push('\n');
        file.write_all(out.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|e| BackupError::io(&self.path, e))?;

        debug!(timestamp = %record.timestamp, "Telemetry record saved to backup");
        Ok(())
    }

    /// Every stored record, oldest first. Malformed rows are skipped with a
    /// warning.
    pub fn load(&self) -> Result<Vec<TelemetryRecord>, BackupError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(&self.path, e)),
        };

        let mut records = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || (i == 0 && line == BACKUP_HEADER) {
                continue;
            }
            match decode_row(line, i + 1) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping invalid backup row"),
            }
        }
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    /// Replace the stored records. An empty list removes the file.
    pub fn replace(&self, records: &[TelemetryRecord]) -> Result<(), BackupError> {
        if records.is_empty() {
            return self.clear();
        }

        let mut out = String::with_capacity(BACKUP_HEADER.len() + records.len() * 64);
        out.push_str(BACKUP_HEADER);
        out.push('\n');
        for record in records {
            out.push_str(&encode_row(record));
            out.push('\n');
        }

        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, out).map_err(|e| BackupError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| BackupError::io(&self.path, e))?;
        debug!(remaining = records.len(), "Backup queue rewritten");
        Ok(())
    }

    /// Remove the backing file.
    pub fn clear(&self) -> Result<(), BackupError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Backup queue drained, file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackupError::io(&self.path, e)),
        }
    }

    pub fn pending_count(&self) -> Result<usize, BackupError> {
        Ok(self.load()?.len())
    }
}

fn encode_row(record: &TelemetryRecord) -> String {
    let num = |v: Option<f64>| v.filter(|x| x.is_finite()).map(|x| x.to_string()).unwrap_or_default();
    [
        record.timestamp.to_rfc3339(),
        num(record.temperature),
        num(record.ph),
        num(record.conductivity),
        num(record.nitrogen),
        num(record.phosphorus),
        num(record.turbidity),
        record.quality_score.map(|s| s.to_string()).unwrap_or_default(),
        record
            .quality_status
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
    ]
    .join(",")
}

fn decode_row(line: &str, line_no: usize) -> Result<TelemetryRecord, BackupError> {
    let corrupt = |reason: String| BackupError::Corrupt {
        line: line_no,
        reason,
    };

    let cells: Vec<&str> = line.split(',').map(str::trim).collect();
    if cells.len() < COLUMNS {
        return Err(corrupt(format!(
            "expected {COLUMNS} columns, found {}",
            cells.len()
        )));
    }

    let timestamp = DateTime::parse_from_rfc3339(cells[0])
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("bad timestamp '{}': {e}", cells[0])))?;

    let num = |i: usize| -> Result<Option<f64>, BackupError> {
        let cell = cells[i];
        if cell.is_empty() {
            return Ok(None);
        }
        cell.parse::<f64>()
            .map(Some)
            .map_err(|e| corrupt(format!("bad number '{cell}' in column {}: {e}", i + 1)))
    };

    let quality_score = match cells[7] {
        "" => None,
        cell => Some(
            cell.parse::<f64>()
                .map_err(|e| corrupt(format!("bad score '{cell}': {e}")))?
                .max(0.0)
                .round() as u32,
        ),
    };
    let quality_status = match cells[8] {
        "" => None,
        cell => Some(cell.parse::<Tier>().map_err(corrupt)?),
    };

    Ok(TelemetryRecord {
        timestamp,
        temperature: num(1)?,
        ph: num(2)?,
        conductivity: num(3)?,
        nitrogen: num(4)?,
        phosphorus: num(5)?,
        turbidity: num(6)?,
        quality_score,
        quality_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(minute: u32) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap(),
            temperature: Some(24.5),
            ph: Some(7.1),
            conductivity: None,
            nitrogen: Some(40.0),
            phosphorus: Some(30.0),
            turbidity: Some(0.2),
            quality_score: Some(10),
            quality_status: Some(Tier::Good),
        }
    }

    #[test]
    fn test_append_and_load_preserves_order_and_empty_cells() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = BackupQueue::open(tmp.path().join("backup.csv"), 100).unwrap();
        assert!(!queue.exists());

        queue.append(&record(1)).unwrap();
        queue.append(&record(2)).unwrap();
        assert!(queue.exists());

        let contents = fs::read_to_string(queue.path()).unwrap();
        assert!(contents.starts_with(BACKUP_HEADER));
        assert_eq!(contents.lines().count(), 3);

        let records = queue.load().unwrap();
        assert_eq!(records, vec![record(1), record(2)]);
        assert_eq!(records[0].conductivity, None);
    }

    #[test]
    fn test_replace_with_empty_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = BackupQueue::open(tmp.path().join("backup.csv"), 100).unwrap();
        queue.append(&record(1)).unwrap();
        queue.append(&record(2)).unwrap();

        queue.replace(&[record(2)]).unwrap();
        assert_eq!(queue.pending_count().unwrap(), 1);

        queue.replace(&[]).unwrap();
        assert!(!queue.exists());
        assert_eq!(queue.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = BackupQueue::open(tmp.path().join("backup.csv"), 3).unwrap();
        for minute in 1..=5 {
            queue.append(&record(minute)).unwrap();
        }
        let records = queue.load().unwrap();
        assert_eq!(records, vec![record(3), record(4), record(5)]);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backup.csv");
        fs::write(
            &path,
            format!(
                "{BACKUP_HEADER}\nnot-a-date,1,2,3,4,5,0,10,GOOD\n2024-06-01T12:05:00+00:00,24,7,,40,30,1,95,CRITICAL\nshort,row\n"
            ),
        )
        .unwrap();

        let queue = BackupQueue::open(&path, 100).unwrap();
        let records = queue.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].quality_status, Some(Tier::Critical));
        assert_eq!(records[0].turbidity, Some(1.0));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data").join("nested").join("backup.csv");
        let queue = BackupQueue::open(&path, 10).unwrap();
        queue.append(&record(1)).unwrap();
        assert!(path.exists());
    }
}
