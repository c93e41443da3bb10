//! Example: run one polling cycle with tracing enabled.
//!
//! Every message in the mailbox is deleted after it is fetched, so use a dedicated
//! mailbox.
//!
//! # Usage
//!
//! ```bash
//! export MAIL_HOST="imap.example.com"
//! export MAIL_USERNAME="scanner@example.com"
//! export MAIL_PASSWORD="your-app-password"
//! export MAIL_DROP_DIR="/srv/consume"
//! # Optional
//! export MAIL_PORT="993"
//! export MAIL_INBOX="INBOX"
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=mail_drop=debug
//!
//! cargo run --example pull_once
//! ```
//!
//! An empty or missing `MAIL_HOST` disables polling; the cycle is then a no-op.

use mail_drop::{MailPoller, MailboxConfig};
use std::env;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> mail_drop::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mail_drop=info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let mut builder = MailboxConfig::builder()
        .host(env::var("MAIL_HOST").unwrap_or_default())
        .username(env::var("MAIL_USERNAME").unwrap_or_default())
        .password(env::var("MAIL_PASSWORD").unwrap_or_default());

    if let Some(port) = env::var("MAIL_PORT").ok().and_then(|p| p.parse().ok()) {
        builder = builder.port(port);
    }
    if let Ok(inbox) = env::var("MAIL_INBOX") {
        builder = builder.mailbox(inbox);
    }

    let config = builder.build()?;
    let drop_dir = env::var("MAIL_DROP_DIR").unwrap_or_else(|_| ".".to_string());

    tracing::info!(enabled = config.is_enabled(), drop_dir = %drop_dir, "Starting mail-drop cycle");

    let poller = MailPoller::new(config, &drop_dir);

    match poller.pull().await {
        Ok(report) => {
            for path in &report.stored {
                println!("stored {}", path.display());
            }
            for failure in &report.failures {
                eprintln!("failed: {failure}");
            }
            println!(
                "{} stored, {} rejected, {} failed (last checked {})",
                report.stored.len(),
                report.rejected,
                report.failures.len(),
                poller.last_checked_at()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("cycle failed [{}]: {e}", e.code());
            Err(e)
        }
    }
}
