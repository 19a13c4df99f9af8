// log.rs — Append-only JSONL audit log.
//
// One JSON object per line. Each record's `previous_hash` is the SHA-256 of
// the previous raw line, so inserting, deleting, or editing a line breaks
// the chain and `verify_chain` reports where.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::AuditError;
use crate::hasher;
use crate::record::AuditRecord;

/// An append-only audit log backed by a JSONL file.
pub struct AuditLog {
    writer: BufWriter<File>,
    /// Hash of the last line written, used as the next record's `previous_hash`.
    last_hash: Option<String>,
}

impl AuditLog {
    /// Open (or create) a log, recovering the chain head from existing content.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };
        if let Some(head) = &last_hash {
            tracing::debug!(path = %path.display(), head = %head, "resuming audit chain");
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            last_hash,
        })
    }

    /// Chain a record to the log and flush it.
    pub fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError> {
        record.previous_hash = self.last_hash.clone();

        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;

        // Only advance the chain head once the line is on disk.
        self.last_hash = Some(hasher::hash_str(&json));
        Ok(())
    }

    /// Read all records, oldest first. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditError> {
        let reader = Self::reader(path.as_ref())?;
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }

    /// Verify every `previous_hash` link in a log file.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<bool, AuditError> {
        let reader = Self::reader(path.as_ref())?;
        let mut previous_hash: Option<String> = None;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: AuditRecord = serde_json::from_str(&line)?;
            if record.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: record.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }

            // Hash the raw line; re-serializing could reorder fields.
            previous_hash = Some(hasher::hash_str(&line));
        }

        Ok(true)
    }

    fn reader(path: &Path) -> Result<BufReader<File>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(BufReader::new(file))
    }

    fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        let mut last_line: Option<String> = None;
        for line in Self::reader(path)?.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(policy: &str) -> AuditRecord {
        AuditRecord::new(policy, "test policy", "u1").with_outcome(true, 1.0)
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&path).unwrap();
            log.append(&mut record("p1")).unwrap();
            log.append(&mut record("p2")).unwrap();
        }

        let records = AuditLog::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].policy_id, "p1");
        assert!(records[0].previous_hash.is_none());
        assert!(records[1].previous_hash.is_some());
    }

    #[test]
    fn reopen_continues_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        AuditLog::open(&path).unwrap().append(&mut record("p1")).unwrap();
        AuditLog::open(&path).unwrap().append(&mut record("p2")).unwrap();

        assert!(AuditLog::verify_chain(&path).unwrap());
        assert_eq!(AuditLog::read_all(&path).unwrap().len(), 2);
    }

    #[test]
    fn tampering_breaks_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&path).unwrap();
            for i in 0..3 {
                log.append(&mut record(&format!("p{}", i))).unwrap();
            }
        }

        // Drop the middle line.
        let content = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        std::fs::write(&path, kept.join("\n")).unwrap();

        match AuditLog::verify_chain(&path) {
            Err(AuditError::IntegrityViolation { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected IntegrityViolation, got {:?}", other),
        }
    }
}
