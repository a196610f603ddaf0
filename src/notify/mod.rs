pub mod stdout;
pub mod telegram;

use std::time::Duration;

use anyhow::Result;

use crate::config::NotifyConfig;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            retries: config.retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Send with up to `policy.retries` extra attempts; returns the last error.
pub async fn send_with_retry(
    notifier: &dyn Notifier,
    text: &str,
    policy: RetryPolicy,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match notifier.send(text).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                tracing::warn!(
                    "{} send failed (attempt {attempt}/{}): {e}",
                    notifier.name(),
                    policy.retries + 1
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// --- Factory ---

pub fn create_notifier(config: &NotifyConfig) -> Result<Box<dyn Notifier>> {
    match config.provider.as_str() {
        "telegram" => Ok(Box::new(telegram::TelegramNotifier::new(config)?)),
        "stdout" => Ok(Box::new(stdout::StdoutNotifier)),
        other => anyhow::bail!("Unknown notify provider '{other}' (expected telegram or stdout)"),
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every message; fails the first `failures` sends of any
    /// message containing `fail_on`.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<String>>,
        pub attempts: Mutex<u32>,
        pub fail_on: Option<String>,
        pub failures: Mutex<u32>,
    }

    impl RecordingNotifier {
        pub fn failing(fail_on: &str, failures: u32) -> Self {
            Self {
                fail_on: Some(fail_on.to_string()),
                failures: Mutex::new(failures),
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, text: &str) -> Result<()> {
            *self.attempts.lock().unwrap() += 1;
            if self.fail_on.as_deref().is_some_and(|f| text.contains(f)) {
                let mut left = self.failures.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    anyhow::bail!("simulated outage");
                }
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }
}
