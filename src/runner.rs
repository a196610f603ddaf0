use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};

use crate::fired::{self, FiredLog};
use crate::notify::{self, Notifier, RetryPolicy};
use crate::publish::CadencePublisher;
use crate::reminder::parse_lines;
use crate::schedule::{self, EvaluationOutcome};
use crate::store::{self, ReminderStore, ScheduleEntry};

#[derive(Debug, Default)]
pub struct PassReport {
    pub fired: usize,
    /// Notification errors, one per reminder that could not be delivered.
    pub failures: Vec<String>,
    pub suppressed: usize,
    pub malformed: usize,
    pub retired: Vec<String>,
    pub schedules: Vec<ScheduleEntry>,
}

pub struct Runner {
    store: ReminderStore,
    notifier: Box<dyn Notifier>,
    publisher: Box<dyn CadencePublisher>,
    retry: RetryPolicy,
    fired_log: Option<PathBuf>,
    persist: bool,
}

impl Runner {
    pub fn new(
        store: ReminderStore,
        notifier: Box<dyn Notifier>,
        publisher: Box<dyn CadencePublisher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            publisher,
            retry,
            fired_log: None,
            persist: true,
        }
    }

    pub fn with_fired_log(mut self, path: PathBuf) -> Self {
        self.fired_log = Some(path);
        self
    }

    /// Evaluate and notify without touching any file.
    pub fn dry_run(mut self) -> Self {
        self.persist = false;
        self
    }

    /// One evaluation pass. Only store-level failures abort it; a failed
    /// notification is logged and the reminder is kept.
    pub async fn run_pass(&self, now: DateTime<FixedOffset>) -> Result<PassReport> {
        let _lock = if self.persist {
            let lock = store::acquire_run_lock(&self.store.lock_path())?;
            tracing::debug!("Holding run lock {}", lock.path().display());
            Some(lock)
        } else {
            None
        };

        let contents = self.store.load()?;
        let parsed = parse_lines(&contents.lines);
        let keys = fired::occurrence_keys(parsed.iter().map(|line| line.raw.as_str()));
        let mut fired_log = self.fired_log.clone().map(FiredLog::load);
        let mut report = PassReport::default();

        tracing::info!(
            "Evaluating {} line(s) from {} at {}",
            parsed.len(),
            self.store.path().display(),
            now.format("%Y-%m-%d %H:%M %:z")
        );

        let mut outcomes = Vec::with_capacity(parsed.len());
        for (idx, line) in parsed.iter().enumerate() {
            let record = match &line.record {
                None => {
                    outcomes.push(None);
                    continue;
                }
                Some(Err(e)) => {
                    tracing::warn!("Skipping malformed reminder on line {}: {e} ({:?})", idx + 1, line.raw);
                    report.malformed += 1;
                    outcomes.push(None);
                    continue;
                }
                Some(Ok(record)) => record,
            };

            let mut outcome = schedule::evaluate(record, &now);
            if outcome.fired
                && fired_log
                    .as_ref()
                    .is_some_and(|log| log.already_fired(&keys[idx], &now))
            {
                tracing::debug!("Already fired this minute: {:?}", line.raw);
                report.suppressed += 1;
                outcome = EvaluationOutcome::idle(record);
            }

            if outcome.fired {
                match notify::send_with_retry(self.notifier.as_ref(), &record.message, self.retry).await
                {
                    Ok(()) => {
                        tracing::info!("Sent via {}: {}", self.notifier.name(), record.message);
                        report.fired += 1;
                        if let Some(log) = fired_log.as_mut() {
                            log.mark(&keys[idx], &now);
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to notify line {} via {}: {e:#}; keeping reminder",
                            idx + 1,
                            self.notifier.name()
                        );
                        outcome.record_failure(format!("line {}: {e:#}", idx + 1));
                    }
                }
            }
            outcomes.push(Some(outcome));
        }

        report.failures = outcomes
            .iter()
            .flatten()
            .filter_map(|o| o.notify_error.clone())
            .collect();
        let reconciled = store::reconcile(&contents, &parsed, &outcomes);

        if self.persist {
            self.store.persist(&reconciled)?;
            if let Some(mut log) = fired_log {
                let kept_keys = fired::occurrence_keys(
                    reconciled.kept.iter().map(|&idx| parsed[idx].raw.as_str()),
                );
                log.carry_over(
                    reconciled
                        .kept
                        .iter()
                        .zip(&kept_keys)
                        .map(|(&idx, key)| (keys[idx].as_str(), key.as_str())),
                );
                if let Err(e) = log.save() {
                    tracing::warn!("{e:#}");
                }
            }
            if let Err(e) = self
                .publisher
                .publish(&reconciled.recurring, self.store.cron_path())
                .await
            {
                tracing::warn!("Failed to publish schedules: {e:#}");
            }
        }

        report.retired = reconciled.retired;
        report.schedules = reconciled.recurring;
        Ok(report)
    }
}
