use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_reminders")]
    pub reminders: String,
    #[serde(default = "default_cron_schedule")]
    pub cron_schedule: String,
    #[serde(default = "default_one_time_schedule")]
    pub one_time_schedule: String,
    /// Fixed UTC offset reminders are written in, e.g. `+05:30`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reminders: default_reminders(),
            cron_schedule: default_cron_schedule(),
            one_time_schedule: default_one_time_schedule(),
            timezone: default_timezone(),
        }
    }
}

fn default_reminders() -> String {
    "~/.tsumugi/reminders.txt".to_string()
}

fn default_cron_schedule() -> String {
    "~/.tsumugi/cron_schedule.txt".to_string()
}

fn default_one_time_schedule() -> String {
    "~/.tsumugi/one_time_schedule.txt".to_string()
}

fn default_timezone() -> String {
    "+05:30".to_string()
}

impl StoreConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_offset(&self.timezone)
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifyConfig {
    /// `telegram` or `stdout`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Bot API base URL. Optional, defaults to the public Telegram endpoint.
    pub base_url: Option<String>,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            bot_token: None,
            chat_id: None,
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_notify_timeout(),
        }
    }
}

fn default_provider() -> String {
    "telegram".to_string()
}

fn default_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_notify_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// Skip reminders already notified within the current minute.
    #[serde(default)]
    pub dedupe: bool,
    #[serde(default = "default_fired_log")]
    pub fired_log: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dedupe: false,
            fired_log: default_fired_log(),
        }
    }
}

fn default_fired_log() -> String {
    "~/.tsumugi/fired.json".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PublishConfig {
    /// Shell command run after each pass to push derived schedules.
    pub hook: Option<String>,
    #[serde(default = "default_hook_timeout")]
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            hook: None,
            timeout_secs: default_hook_timeout(),
        }
    }
}

fn default_hook_timeout() -> u64 {
    60
}

pub fn load(path: &str) -> Result<Config> {
    let path = expand_tilde(path);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config.store.offset()?;
    Ok(config)
}

/// Like [`load`], but a missing file yields the defaults.
pub fn load_or_default(path: &str) -> Result<Config> {
    if expand_tilde(path).exists() {
        load(path)
    } else {
        tracing::debug!("No config at {path}, using defaults");
        Ok(Config::default())
    }
}

pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    let bad = || anyhow::anyhow!("Invalid timezone offset '{s}' (expected e.g. +05:30)");
    if matches!(s, "Z" | "UTC" | "utc") {
        return FixedOffset::east_opt(0).ok_or_else(bad);
    }
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(bad()),
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h: i32 = h.parse().map_err(|_| bad())?;
    let m: i32 = m.parse().map_err(|_| bad())?;
    if !(0..=23).contains(&h) || !(0..=59).contains(&m) {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60)).ok_or_else(bad)
}

pub async fn init_config_dir() -> Result<()> {
    let base = default_base_dir();
    tokio::fs::create_dir_all(&base).await?;

    let reminders = base.join("reminders.txt");
    if !reminders.exists() {
        tokio::fs::write(
            &reminders,
            "every_hour - Stand up and stretch\n\
             everyday - 9 AM - Take vitamins\n\
             sun_recur - 8 AM - Plan the week\n",
        )
        .await?;
    }

    let config_path = base.join("config.toml");
    if !config_path.exists() {
        tokio::fs::write(
            &config_path,
            r#"[store]
reminders = "~/.tsumugi/reminders.txt"
cron_schedule = "~/.tsumugi/cron_schedule.txt"
one_time_schedule = "~/.tsumugi/one_time_schedule.txt"
timezone = "+05:30"

[notify]
provider = "telegram"
# bot_token = "123456:ABC..."   # or TELEGRAM_BOT_TOKEN
# chat_id = "123456789"         # or TELEGRAM_CHAT_ID
retries = 2
retry_backoff_ms = 1000
timeout_secs = 10

# provider = "stdout"  # print instead of sending

[state]
# Suppress repeat notifications when invoked more than once in a minute.
dedupe = false
fired_log = "~/.tsumugi/fired.json"

[publish]
# Run after each pass with TSUMUGI_SCHEDULES and TSUMUGI_CRON_FILE set.
# hook = "git -C ~/reminders commit -am 'Update schedule' && git -C ~/reminders push"
timeout_secs = 60
"#,
        )
        .await?;
    }

    Ok(())
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tsumugi")
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("+05:30").unwrap().local_minus_utc(), 19800);
        assert_eq!(parse_offset("-08:00").unwrap().local_minus_utc(), -28800);
        assert_eq!(parse_offset("+9").unwrap().local_minus_utc(), 32400);
        assert_eq!(parse_offset("UTC").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn test_parse_offset_rejects_garbage() {
        for bad in ["", "05:30", "+25:00", "+05:75", "Asia/Kolkata", "+"] {
            assert!(parse_offset(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.store.reminders, "~/.tsumugi/reminders.txt");
        assert_eq!(cfg.notify.provider, "telegram");
        assert_eq!(cfg.notify.retries, 2);
        assert!(!cfg.state.dedupe);
        assert!(cfg.publish.hook.is_none());
    }

    #[test]
    fn test_partial_config() {
        let cfg: Config = toml::from_str(
            r#"
            [store]
            timezone = "-03:00"

            [notify]
            provider = "stdout"
            retries = 0

            [state]
            dedupe = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.store.offset().unwrap().local_minus_utc(), -10800);
        assert_eq!(cfg.store.cron_schedule, "~/.tsumugi/cron_schedule.txt");
        assert_eq!(cfg.notify.provider, "stdout");
        assert_eq!(cfg.notify.retries, 0);
        assert_eq!(cfg.notify.timeout_secs, 10);
        assert!(cfg.state.dedupe);
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/tmp/x.txt"), PathBuf::from("/tmp/x.txt"));
        assert_eq!(expand_tilde("rel/x.txt"), PathBuf::from("rel/x.txt"));
    }
}
