use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pondview_app::{TerminalUi, TraceSource, ViewerOptions, ViewerState};
use tracing::info;

/// Terminal replay viewer for pond-crossing contest traces.
#[derive(Debug, Parser)]
#[command(name = "pondview", version, about)]
struct Cli {
    /// Trace JSON file to open.
    #[arg(value_name = "TRACE", conflicts_with = "data_url")]
    trace: Option<PathBuf>,

    /// Fetch the trace over HTTP instead of from disk.
    #[arg(long, env = "PONDVIEW_DATA_URL", value_name = "URL")]
    data_url: Option<String>,

    /// Delay between automatic turn advances, in milliseconds.
    #[arg(long, default_value_t = 50, value_name = "MS")]
    interval_ms: u64,

    /// Stage to open with.
    #[arg(long, default_value_t = 0, value_name = "N")]
    stage: i64,

    /// Start with the info overlay enabled.
    #[arg(long)]
    show_info: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let source = TraceSource::from_cli(cli.trace, cli.data_url)?;
    let trace = source.load()?;
    info!(
        source = %source.describe(),
        stages = trace.stage_count(),
        "trace loaded"
    );

    let options = ViewerOptions {
        interval: Duration::from_millis(cli.interval_ms),
        start_stage: cli.stage,
        show_info: cli.show_info,
    };
    let viewer = ViewerState::new(trace, source, options);
    TerminalUi::default().run(viewer)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
