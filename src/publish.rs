use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;

use crate::config::PublishConfig;
use crate::store::ScheduleEntry;

/// Pushes derived schedules to whatever configures the external scheduler.
#[async_trait::async_trait]
pub trait CadencePublisher: Send + Sync {
    async fn publish(&self, schedules: &[ScheduleEntry], cron_file: &Path) -> Result<()>;
}

pub struct NoopPublisher;

#[async_trait::async_trait]
impl CadencePublisher for NoopPublisher {
    async fn publish(&self, _schedules: &[ScheduleEntry], _cron_file: &Path) -> Result<()> {
        Ok(())
    }
}

/// Runs a user-supplied shell command with the schedules in its environment.
pub struct HookPublisher {
    command: String,
    timeout: Duration,
}

impl HookPublisher {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl CadencePublisher for HookPublisher {
    async fn publish(&self, schedules: &[ScheduleEntry], cron_file: &Path) -> Result<()> {
        let expressions: Vec<String> = schedules.iter().map(|s| s.expression.to_string()).collect();
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .env("TSUMUGI_SCHEDULES", expressions.join("\n"))
            .env("TSUMUGI_CRON_FILE", cron_file)
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .with_context(|| format!("Publish hook timed out after {}s", self.timeout.as_secs()))?
            .context("Failed to spawn publish hook")?;

        if output.status.success() {
            tracing::debug!(
                "Publish hook output: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            );
            Ok(())
        } else {
            anyhow::bail!(
                "Publish hook failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
        }
    }
}

pub fn create_publisher(config: &PublishConfig) -> Box<dyn CadencePublisher> {
    match config.hook.as_deref().map(str::trim) {
        Some(hook) if !hook.is_empty() => Box::new(HookPublisher::new(
            hook,
            Duration::from_secs(config.timeout_secs),
        )),
        _ => Box::new(NoopPublisher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::CronExpression;
    use tempfile::tempdir;

    fn entries() -> Vec<ScheduleEntry> {
        vec![
            ScheduleEntry {
                expression: CronExpression::EVERY_HOUR,
                message: "a".into(),
            },
            ScheduleEntry {
                expression: CronExpression::EVERY_MINUTE,
                message: "b".into(),
            },
        ]
    }

    #[tokio::test]
    async fn test_hook_receives_schedules() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let hook = HookPublisher::new(
            format!(
                "printf '%s|%s' \"$TSUMUGI_SCHEDULES\" \"$TSUMUGI_CRON_FILE\" > '{}'",
                out.display()
            ),
            Duration::from_secs(10),
        );
        hook.publish(&entries(), Path::new("/tmp/cron.txt")).await.unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "0 * * * *\n* * * * *|/tmp/cron.txt");
    }

    #[tokio::test]
    async fn test_hook_failure_is_reported() {
        let hook = HookPublisher::new("echo nope >&2; exit 3", Duration::from_secs(10));
        let err = hook.publish(&entries(), Path::new("x")).await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
