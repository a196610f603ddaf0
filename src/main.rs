mod config;
mod cron;
mod fired;
mod notify;
mod publish;
mod reminder;
mod runner;
mod schedule;
mod store;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};

use crate::reminder::parse_lines;
use crate::store::ReminderStore;

#[derive(Parser)]
#[command(
    name = "tsumugi",
    version,
    about = "Cron-driven reminder notifier"
)]
struct Cli {
    #[arg(short, long, default_value = "~/.tsumugi/config.toml")]
    config: String,
    /// Telegram bot token (overrides [notify] bot_token)
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,
    /// Telegram chat id (overrides [notify] chat_id)
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    chat_id: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one evaluation pass (meant to be invoked once a minute)
    Run {
        /// Print notifications instead of sending and leave files untouched
        #[arg(long)]
        dry_run: bool,
        /// Evaluate as of this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Validate the reminder store and show derived schedules
    Check,
    /// List reminders due at a given time without side effects
    Due {
        #[arg(long)]
        at: Option<String>,
    },
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Run {
        dry_run: false,
        at: None,
    });
    match command {
        Commands::Init => {
            config::init_config_dir().await?;
            tracing::info!("Initialized ~/.tsumugi/");
        }
        Commands::Run { dry_run, at } => run(&cli, dry_run, at.as_deref()).await?,
        Commands::Check => check(&cli)?,
        Commands::Due { at } => due(&cli, at.as_deref())?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<config::Config> {
    let mut cfg = config::load_or_default(&cli.config)?;
    if let Some(token) = &cli.bot_token {
        cfg.notify.bot_token = Some(token.clone());
    }
    if let Some(chat) = &cli.chat_id {
        cfg.notify.chat_id = Some(chat.clone());
    }
    Ok(cfg)
}

fn resolve_now(offset: FixedOffset, at: Option<&str>) -> Result<DateTime<FixedOffset>> {
    match at {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --at time '{s}' (expected RFC 3339)"))?
            .with_timezone(&offset)),
        None => Ok(Utc::now().with_timezone(&offset)),
    }
}

async fn run(cli: &Cli, dry_run: bool, at: Option<&str>) -> Result<()> {
    let cfg = load_config(cli)?;
    let now = resolve_now(cfg.store.offset()?, at)?;

    let notifier: Box<dyn notify::Notifier> = if dry_run {
        Box::new(notify::stdout::StdoutNotifier)
    } else {
        notify::create_notifier(&cfg.notify)?
    };
    let mut runner = runner::Runner::new(
        ReminderStore::new(&cfg.store),
        notifier,
        publish::create_publisher(&cfg.publish),
        notify::RetryPolicy::from_config(&cfg.notify),
    );
    if cfg.state.dedupe {
        runner = runner.with_fired_log(config::expand_tilde(&cfg.state.fired_log));
    }
    if dry_run {
        runner = runner.dry_run();
    }

    let report = runner.run_pass(now).await?;
    tracing::info!(
        "Pass complete: {} sent, {} failed, {} suppressed, {} malformed, {} retired, {} schedule(s)",
        report.fired,
        report.failures.len(),
        report.suppressed,
        report.malformed,
        report.retired.len(),
        report.schedules.len()
    );
    Ok(())
}

fn check(cli: &Cli) -> Result<()> {
    let cfg = load_config(cli)?;
    let store = ReminderStore::new(&cfg.store);
    let contents = store.load()?;

    let mut malformed = 0;
    for (idx, line) in parse_lines(&contents.lines).iter().enumerate() {
        match &line.record {
            None => {}
            Some(Ok(record)) => {
                let kind = if record.kind.recurs() { "recurring" } else { "one-shot" };
                println!(
                    "{:>4}  ok     {:<16} {:<10} {}",
                    idx + 1,
                    cron::derive(record).to_string(),
                    kind,
                    record.message
                );
            }
            Some(Err(e)) => {
                malformed += 1;
                println!("{:>4}  error  {e}: {}", idx + 1, line.raw.trim_end());
            }
        }
    }
    if malformed > 0 {
        anyhow::bail!("{malformed} malformed reminder(s) in {}", store.path().display());
    }
    Ok(())
}

fn due(cli: &Cli, at: Option<&str>) -> Result<()> {
    let cfg = load_config(cli)?;
    let now = resolve_now(cfg.store.offset()?, at)?;
    let contents = ReminderStore::new(&cfg.store).load()?;

    println!("Due at {}:", now.format("%a %Y-%m-%d %H:%M %:z"));
    for line in parse_lines(&contents.lines) {
        if let Some(record) = line.valid().filter(|r| schedule::is_due(r, &now)) {
            println!("  {}", record.message);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_now_converts_to_offset() {
        let ist = config::parse_offset("+05:30").unwrap();
        let now = resolve_now(ist, Some("2026-03-02T03:30:00Z")).unwrap();
        assert_eq!(now.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn test_resolve_now_rejects_bad_input() {
        let utc = config::parse_offset("UTC").unwrap();
        assert!(resolve_now(utc, Some("tomorrow 9am")).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["tsumugi", "run", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run { dry_run: true, .. })));
        let cli = Cli::try_parse_from(["tsumugi", "due", "--at", "2026-03-02T09:00:00+05:30"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Due { at: Some(_) })));
    }
}
