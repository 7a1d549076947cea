mod args;
mod logging;
mod output;

use anyhow::Result;
use args::Args;
use clap::Parser;
use futures::StreamExt;
use intake_core::ops::Reason;
use output::JsonLines;
use providers::{HttpTransport, IntakeConfig, IntakePump, IntakeRequest};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = logging::init(args.log_file.as_deref())?;

    let mut cfg = IntakeConfig::load(args.dialect)?;
    args.apply(&mut cfg);
    debug!(target: "cli", config = ?cfg, "configuration resolved");

    let history = args.conversation()?;
    let pump = IntakePump::new(HttpTransport::from_config(&cfg)?, cfg.pump_options());
    let request = IntakeRequest { access: cfg.access(), opts: cfg.chat_opts(), history };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "cli", "interrupt received, canceling");
            on_interrupt.cancel();
        }
    });

    let mut out = JsonLines::new(std::io::stdout().lock());
    let items = pump.run(request, cancel);
    futures::pin_mut!(items);
    let mut failed = false;
    while let Some(item) = items.next().await {
        failed |= item.reason().is_some_and(Reason::is_error);
        out.write(&item)?;
    }
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
