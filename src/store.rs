use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{expand_tilde, StoreConfig};
use crate::cron::{self, CronExpression};
use crate::reminder::ParsedLine;
use crate::schedule::EvaluationOutcome;

const LOCK_FILE: &str = ".tsumugi.lock";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reminder store unreadable: {path}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to persist {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("another pass holds {path} ({holder})")]
    Locked { path: PathBuf, holder: String },
}

/// Raw store lines, split on `\n` only and kept as bytes so retained lines
/// stay byte-identical, including lines that are not valid UTF-8.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreContents {
    pub lines: Vec<Vec<u8>>,
    pub trailing_newline: bool,
}

impl StoreContents {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        let trailing_newline = bytes.ends_with(b"\n");
        let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        Self {
            lines: body.split(|&b| b == b'\n').map(<[u8]>::to_vec).collect(),
            trailing_newline,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        if self.lines.is_empty() {
            return Vec::new();
        }
        let mut bytes = self.lines.join(&b'\n');
        if self.trailing_newline {
            bytes.push(b'\n');
        }
        bytes
    }
}

/// A derived expression paired with the message it schedules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub expression: CronExpression,
    pub message: String,
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  # {}", self.expression, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    pub store: StoreContents,
    /// Original line index of each line in `store`.
    pub kept: Vec<usize>,
    pub retired: Vec<String>,
    pub recurring: Vec<ScheduleEntry>,
    pub one_shot: Vec<ScheduleEntry>,
}

/// Fold the outcomes of a pass back into the store.
///
/// `outcomes` is indexed like `parsed`; `None` marks lines that were blank
/// or malformed, which are always kept verbatim.
pub fn reconcile(
    contents: &StoreContents,
    parsed: &[ParsedLine],
    outcomes: &[Option<EvaluationOutcome>],
) -> Reconciled {
    let mut out = Reconciled {
        store: StoreContents {
            lines: Vec::with_capacity(parsed.len()),
            trailing_newline: contents.trailing_newline,
        },
        ..Default::default()
    };

    for (idx, (line, outcome)) in parsed.iter().zip(outcomes).enumerate() {
        let keep = |out: &mut Reconciled| {
            out.store.lines.push(contents.lines[idx].clone());
            out.kept.push(idx);
        };
        let (Some(record), Some(outcome)) = (line.valid(), outcome) else {
            keep(&mut out);
            continue;
        };
        if let Some(expression) = outcome.schedule {
            out.recurring.push(ScheduleEntry {
                expression,
                message: record.message.clone(),
            });
        }
        if !outcome.should_retain {
            out.retired.push(line.raw.clone());
            continue;
        }
        if record.kind.is_one_shot() {
            out.one_shot.push(ScheduleEntry {
                expression: cron::derive(record),
                message: record.message.clone(),
            });
        }
        keep(&mut out);
    }
    out
}

pub struct ReminderStore {
    path: PathBuf,
    cron_path: PathBuf,
    one_time_path: PathBuf,
}

impl ReminderStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: expand_tilde(&config.reminders),
            cron_path: expand_tilde(&config.cron_schedule),
            one_time_path: expand_tilde(&config.one_time_schedule),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cron_path(&self) -> &Path {
        &self.cron_path
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path
            .parent()
            .map(|dir| dir.join(LOCK_FILE))
            .unwrap_or_else(|| PathBuf::from(LOCK_FILE))
    }

    pub fn load(&self) -> Result<StoreContents, StoreError> {
        let bytes = std::fs::read(&self.path).map_err(|source| StoreError::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        Ok(StoreContents::from_bytes(&bytes))
    }

    /// Replace the store (only when something was retired) and both
    /// schedule artifacts. Each file is swapped in whole via rename.
    pub fn persist(&self, reconciled: &Reconciled) -> Result<(), StoreError> {
        if !reconciled.retired.is_empty() {
            write_atomic(&self.path, &reconciled.store.to_bytes())?;
            tracing::info!(
                "Retired {} reminder(s) from {}",
                reconciled.retired.len(),
                self.path.display()
            );
        }
        write_atomic(&self.cron_path, render_entries(&reconciled.recurring).as_bytes())?;
        write_atomic(&self.one_time_path, render_entries(&reconciled.one_shot).as_bytes())?;
        Ok(())
    }
}

fn render_entries(entries: &[ScheduleEntry]) -> String {
    entries.iter().map(|e| format!("{e}\n")).collect()
}

pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let persist_err = |source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(persist_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };
    write().map_err(|source| {
        let _ = std::fs::remove_file(&tmp);
        persist_err(source)
    })
}

/// Exclusive `flock(2)` held for the duration of a pass.
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // SAFETY: the fd is owned by `self.file` and still open.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

pub fn acquire_run_lock(path: &Path) -> Result<RunLock, StoreError> {
    let persist_err = |source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(persist_err)?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(persist_err)?;

    // SAFETY: the fd belongs to `file`, opened above.
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret != 0 {
        let mut holder = String::new();
        let _ = file.read_to_string(&mut holder);
        let holder = match holder.trim() {
            "" => "unknown holder".to_string(),
            pid => format!("pid {pid}"),
        };
        return Err(StoreError::Locked {
            path: path.to_path_buf(),
            holder,
        });
    }

    file.set_len(0).map_err(persist_err)?;
    write!(file, "{}", std::process::id()).map_err(persist_err)?;
    Ok(RunLock {
        file,
        path: path.to_path_buf(),
    })
}
