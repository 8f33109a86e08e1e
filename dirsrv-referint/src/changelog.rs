//! The deferred-change log.
//!
//! In background mode every committed delete or rename is appended here as
//! one UTF-8 line: a single normalized DN for a delete, or old and new DN
//! separated by one TAB for a rename. The worker drains the log by renaming
//! it to a `.processing` sibling, replaying that file outside the lock, then
//! removing it. A `.processing` file left behind by a crash is replayed on
//! the next pass.

use crate::error::{ReferintError, ReferintResult};
use dirsrv_types::Dn;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One unit of deferred repair work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeferredChangeRecord {
    Delete(Dn),
    Rename { old_dn: Dn, new_dn: Dn },
}

impl DeferredChangeRecord {
    pub fn old_dn(&self) -> &Dn {
        match self {
            Self::Delete(dn) => dn,
            Self::Rename { old_dn, .. } => old_dn,
        }
    }

    pub fn new_dn(&self) -> Option<&Dn> {
        match self {
            Self::Delete(_) => None,
            Self::Rename { new_dn, .. } => Some(new_dn),
        }
    }

    /// The log line for this record, without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Self::Delete(dn) => dn.to_normalized_string(),
            Self::Rename { old_dn, new_dn } => format!(
                "{}\t{}",
                old_dn.to_normalized_string(),
                new_dn.to_normalized_string()
            ),
        }
    }

    pub fn parse_line(line: &str) -> ReferintResult<Self> {
        let decode = |s: &str| {
            Dn::parse(s).map_err(|e| ReferintError::Decode {
                line: line.to_string(),
                reason: e.to_string(),
            })
        };
        let mut fields = line.split('\t');
        let first = fields.next().unwrap_or_default();
        let record = match (fields.next(), fields.next()) {
            (None, _) => Self::Delete(decode(first)?),
            (Some(second), None) => Self::Rename {
                old_dn: decode(first)?,
                new_dn: decode(second)?,
            },
            (Some(_), Some(_)) => {
                return Err(ReferintError::Decode {
                    line: line.to_string(),
                    reason: "more than two fields".to_string(),
                });
            }
        };
        Ok(record)
    }
}

impl fmt::Display for DeferredChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete(dn) => write!(f, "delete {dn}"),
            Self::Rename { old_dn, new_dn } => write!(f, "rename {old_dn} -> {new_dn}"),
        }
    }
}

/// The on-disk log. All file access is serialized by one lock that is held
/// only for I/O.
#[derive(Debug)]
pub struct ChangeLog {
    path: PathBuf,
    processing_path: PathBuf,
    lock: Mutex<()>,
}

impl ChangeLog {
    /// Opens the log at `path`, creating it (and its parent directory) if
    /// missing.
    pub fn open(path: impl Into<PathBuf>) -> ReferintResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ReferintError::log_io(parent, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ReferintError::log_io(&path, e))?;

        let mut processing = path.clone().into_os_string();
        processing.push(".processing");
        Ok(Self {
            path,
            processing_path: PathBuf::from(processing),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn processing_path(&self) -> &Path {
        &self.processing_path
    }

    /// Appends records and flushes before returning.
    pub fn append(&self, records: &[DeferredChangeRecord]) -> ReferintResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ReferintError::log_io(&self.path, e))?;
        let mut writer = BufWriter::new(file);
        for record in records {
            writeln!(writer, "{}", record.to_line())
                .map_err(|e| ReferintError::log_io(&self.path, e))?;
        }
        writer
            .flush()
            .map_err(|e| ReferintError::log_io(&self.path, e))?;
        debug!(path = %self.path.display(), records = records.len(), "Deferred changes logged");
        Ok(())
    }

    /// Records in the live log, oldest first.
    pub fn pending(&self) -> ReferintResult<Vec<DeferredChangeRecord>> {
        let _guard = self.lock.lock();
        read_records(&self.path)
    }

    /// Whether there is anything to replay.
    pub fn has_pending(&self) -> bool {
        let _guard = self.lock.lock();
        self.processing_path.exists() || file_len(&self.path) > 0
    }

    /// Claims the next batch for replay.
    ///
    /// Returns the leftover `.processing` file if one exists; otherwise moves
    /// a non-empty live log aside and starts a fresh one. `None` means there
    /// is nothing to do.
    pub fn begin_batch(&self) -> ReferintResult<Option<ChangeBatch>> {
        let _guard = self.lock.lock();
        if self.processing_path.exists() {
            warn!(
                path = %self.processing_path.display(),
                "Replaying deferred changes left over from an interrupted pass"
            );
        } else {
            if file_len(&self.path) == 0 {
                return Ok(None);
            }
            fs::rename(&self.path, &self.processing_path)
                .map_err(|e| ReferintError::log_io(&self.path, e))?;
            File::create(&self.path).map_err(|e| ReferintError::log_io(&self.path, e))?;
        }
        let records = read_records(&self.processing_path)?;
        Ok(Some(ChangeBatch {
            path: self.processing_path.clone(),
            records,
        }))
    }

    /// Discards a replayed batch.
    pub fn finish_batch(&self, batch: ChangeBatch) -> ReferintResult<()> {
        let _guard = self.lock.lock();
        match fs::remove_file(&batch.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReferintError::log_io(&batch.path, e)),
        }
    }
}

/// Records claimed by [`ChangeLog::begin_batch`].
#[derive(Debug)]
pub struct ChangeBatch {
    path: PathBuf,
    pub records: Vec<DeferredChangeRecord>,
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Reads every decodable record. Undecodable lines are logged and skipped.
fn read_records(path: &Path) -> ReferintResult<Vec<DeferredChangeRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ReferintError::log_io(path, e)),
    };
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| ReferintError::log_io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match DeferredChangeRecord::parse_line(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping undecodable log record"),
        }
    }
    Ok(records)
}
