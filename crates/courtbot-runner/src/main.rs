//! `courtbot` job binary.
//!
//! Each invocation runs one pass and exits; schedule the jobs with cron.
//! Settings come from `courtbot.toml` (or `--config`) layered under
//! `COURTBOT_*` environment variables, e.g. `COURTBOT_TWILIO__AUTH_TOKEN`.
//!
//! ```text
//! courtbot load
//! courtbot send-reminders
//! courtbot send-unmatched
//! courtbot subscribe 4928456 +19075551234
//! courtbot generate-key
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use courtbot_core::{
  audit::{Action, RequestEvent},
  clock::{Clock, SystemClock},
  codec::PhoneCodec,
  gateway::Gateway,
  request::NewRequest,
  store::CourtStore,
};
use courtbot_feed::{fetch::HttpFetcher, parse_sources};
use courtbot_runner::{
  JobSummary, Runner, RunnerConfig,
  codec::AesPhoneCodec,
  dispatch::Dispatcher,
  twilio::{LogGateway, TwilioGateway},
};
use courtbot_store_sqlite::SqliteStore;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Court hearing SMS reminders")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "courtbot.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Download the court feed and replace the hearings table.
  Load {
    /// Source list overriding `data_urls` (`url[|kind],…`).
    #[arg(long)]
    sources: Option<String>,
  },
  /// Send tomorrow's hearing reminders.
  SendReminders,
  /// Announce newly matched requests and expire stale unmatched ones.
  SendUnmatched,
  /// Register a phone number for a case.
  Subscribe {
    case_id: String,
    phone:   String,
    /// Mark the case as already matched.
    #[arg(long)]
    known:   bool,
  },
  /// Remove every request for a phone number.
  Unsubscribe { phone: String },
  /// Print a fresh phone encryption key and exit.
  GenerateKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if let Command::GenerateKey = cli.command {
    println!("{}", AesPhoneCodec::generate_key());
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("COURTBOT")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read configuration")?;
  let cfg: RunnerConfig = settings
    .try_deserialize()
    .context("failed to deserialise RunnerConfig")?;

  let db_path = expand_tilde(&cfg.database_path);
  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open store at {db_path:?}"))?;
  let store = Arc::new(store);

  let codec: Arc<dyn PhoneCodec> = Arc::new(
    AesPhoneCodec::from_hex_key(&cfg.phone_encryption_key)
      .context("invalid phone_encryption_key")?,
  );
  let clock: Arc<dyn Clock> = Arc::new(SystemClock);

  match cli.command {
    Command::Load { sources } => {
      let list = sources
        .or_else(|| cfg.data_urls.clone())
        .context("no feed sources: set data_urls or pass --sources")?;
      let sources = parse_sources(&list)?;
      let fetcher = HttpFetcher::new(cfg.http_timeout()).context("failed to build HTTP client")?;
      courtbot_runner::load(store.as_ref(), &fetcher, clock.as_ref(), &sources)
        .await
        .context("load failed")?;
    }

    pass @ (Command::SendReminders | Command::SendUnmatched) => {
      let reminders = matches!(pass, Command::SendReminders);
      let summary = if cfg.dry_run {
        run_pass(&cfg, store, Arc::new(LogGateway), codec, clock, reminders).await?
      } else {
        let twilio = cfg
          .twilio
          .clone()
          .context("twilio settings are required unless dry_run is set")?;
        let gateway = TwilioGateway::new(twilio, cfg.http_timeout())
          .context("failed to build HTTP client")?;
        run_pass(&cfg, store, Arc::new(gateway), codec, clock, reminders).await?
      };
      if summary.errors > 0 {
        info!(errors = summary.errors, "some items were not delivered; see warnings above");
      }
    }

    Command::Subscribe { case_id, phone, known } => {
      let input = NewRequest::new(&case_id, codec.encrypt(phone.trim())?, known)?;
      let request = store.add_request(input, clock.now()).await?;
      info!(case_id = %request.case_id, known_case = request.known_case, "request saved");

      let action =
        if request.known_case { Action::ScheduleReminder } else { Action::ScheduleUnmatched };
      audit_event(&store, RequestEvent::new(action, request.case_id, request.phone, clock.now()))
        .await;
    }

    Command::Unsubscribe { phone } => {
      let phone = codec.encrypt(phone.trim())?;
      let removed = store.delete_requests_for_phone(phone.clone()).await?;
      info!(removed = removed.len(), case_ids = %removed.join(","), "requests removed");

      for case_id in removed {
        let event = RequestEvent::new(Action::DeleteRequest, case_id, phone.clone(), clock.now());
        audit_event(&store, event).await;
      }
    }

    Command::GenerateKey => {}
  }

  Ok(())
}

async fn run_pass<G: Gateway + 'static>(
  cfg: &RunnerConfig,
  store: Arc<SqliteStore>,
  gateway: Arc<G>,
  codec: Arc<dyn PhoneCodec>,
  clock: Arc<dyn Clock>,
  reminders: bool,
) -> anyhow::Result<JobSummary> {
  let runner = Runner {
    dispatcher:      Dispatcher::new(
      store,
      gateway,
      codec,
      clock,
      cfg.message_context()?,
      cfg.sender()?,
    ),
    max_concurrency: cfg.max_concurrency,
    queue_ttl:       cfg.queue_ttl(),
  };

  let summary = if reminders {
    runner.send_reminders().await.context("send-reminders failed")?
  } else {
    runner.send_unmatched().await.context("send-unmatched failed")?
  };
  Ok(summary)
}

async fn audit_event(store: &SqliteStore, event: RequestEvent) {
  if let Err(e) = store.record_event(event).await {
    warn!(error = %e, "audit event not recorded");
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
