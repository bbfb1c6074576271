//! range-scout CLI: run the date-range pipeline against recorded pages.
//!
//! Usage:
//!   range-scout extract <element.json> [--path <location path>]
//!   range-scout replay <session.json>
//!
//! Every report is printed to stdout as one `DATES_FOUND` JSON line. Logs go
//! to stderr and follow `RUST_LOG` (default `warn`).

mod fixture;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use range_scout::relay::TOP_FRAME;
use range_scout::{
    resort_id_from_path, ChannelSink, DatesReport, ExtractionChain, FormatMode, FrameRelay,
    LogSink, MemoryElement, MemoryPage, Message, Origin, ResultSink, ResyncController,
    ScoutConfig, TopFrameReporter,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::{sleep, sleep_until};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use fixture::{ElementFixture, PageAction, SessionFixture};

const REPLAY_TAB: u32 = 1;
const NESTED_FRAME: u32 = 1;

/// Time given to the last triggered cycle before the implicit unload.
const SETTLE: Duration = Duration::from_millis(1);

#[derive(Parser)]
#[command(name = "range-scout")]
#[command(version, about = "Extract check-in/check-out ranges from range-picker pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file (every field optional)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format: utc-clock, utc-midnight or civil-midnight:<zone>
    #[arg(long, global = true)]
    format_mode: Option<FormatMode>,

    /// Omit the trailing `Z` on UTC renderings
    #[arg(long, global = true)]
    no_zone_suffix: bool,

    /// IANA zone used to read MM/DD/YYYY values
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// How long to wait for a missing picker, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the extraction chain once against a static element
    Extract {
        /// Element description (JSON)
        element: PathBuf,

        /// Location path used to derive the resort identifier
        #[arg(long)]
        path: Option<String>,
    },

    /// Replay a recorded page session through the resync controller
    Replay {
        /// Session description (JSON)
        session: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Extract { element, path } => {
            let fixture: ElementFixture = read_json(&element)?;
            extract(&config, fixture, path.as_deref())
        }
        Commands::Replay { session } => {
            let fixture: SessionFixture = read_json(&session)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .context("failed to start runtime")?;
            runtime.block_on(replay(&config, fixture))
        }
    }
}

fn load_config(cli: &Cli) -> Result<ScoutConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            ScoutConfig::from_json_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => ScoutConfig::default(),
    };
    if let Some(mode) = cli.format_mode {
        config.format_mode = mode;
    }
    if cli.no_zone_suffix {
        config.zone_suffix = false;
    }
    if let Some(zone) = &cli.timezone {
        config.local_timezone = Some(zone.clone());
    }
    if let Some(ms) = cli.timeout_ms {
        config.wait_timeout_ms = ms;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid fixture {}", path.display()))
}

// ── Output ──────────────────────────────────────────────────────────────────

/// Logs each report and prints it as one wire message line.
struct StdoutSink {
    log: LogSink,
}

impl ResultSink for StdoutSink {
    fn emit(&mut self, report: &DatesReport) {
        self.log.emit(report);
        match serde_json::to_string(&Message::DatesFound(report.clone())) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%err, "failed to serialize report"),
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

fn extract(config: &ScoutConfig, fixture: ElementFixture, path: Option<&str>) -> Result<()> {
    let chain = ExtractionChain::from_config(config)?;
    let element = fixture.build(&config.picker_tag);
    let result = chain.extract(&element);
    let report = DatesReport::new(path.and_then(resort_id_from_path), &result, &config.formatter());
    let mut sink = StdoutSink {
        log: LogSink::new("extract"),
    };
    sink.emit(&report);
    Ok(())
}

async fn replay(config: &ScoutConfig, session: SessionFixture) -> Result<()> {
    let page = Arc::new(MemoryPage::new(&session.path));
    let mut picker = session.picker.map(|fixture| {
        let element = fixture.build(&config.picker_tag);
        page.insert(element.clone());
        element
    });

    let origin = Origin {
        tab_id: Some(REPLAY_TAB),
        frame_id: if session.top_path.is_some() { NESTED_FRAME } else { TOP_FRAME },
    };
    let top_path = session.top_path.as_deref().unwrap_or(&session.path);

    let (top_tx, top_rx) = unbounded_channel();
    let mut relay = FrameRelay::new();
    relay.register_top_frame(REPLAY_TAB, top_tx);
    let top = TopFrameReporter::new(
        top_path,
        StdoutSink {
            log: LogSink::new("top"),
        },
    );
    let reporter = tokio::spawn(top.run(top_rx));

    let (frame_tx, mut frame_rx) = unbounded_channel();
    let forwarder = tokio::spawn(async move {
        while let Some(message) = frame_rx.recv().await {
            relay.forward(origin, message);
        }
    });

    let controller = ResyncController::new(config, page.clone(), ChannelSink::new(frame_tx))?;
    let controller = tokio::spawn(controller.run());

    let start = tokio::time::Instant::now();
    let mut unloaded = false;
    for timed in session.actions {
        sleep_until(start + Duration::from_millis(timed.at_ms)).await;
        debug!(at_ms = timed.at_ms, action = ?timed.action, "applying page action");
        unloaded |= apply(&page, &mut picker, timed.action, &config.picker_tag);
    }
    if !unloaded {
        sleep(SETTLE).await;
        page.unload();
    }

    // Dropping the returned sink closes the frame channel, which winds down
    // the relay and then the top frame.
    drop(controller.await.context("controller task failed")?);
    forwarder.await.context("relay task failed")?;
    reporter.await.context("top frame task failed")?;
    Ok(())
}

/// Apply one action to the page. Returns `true` for unload.
fn apply(
    page: &MemoryPage,
    picker: &mut Option<MemoryElement>,
    action: PageAction,
    default_tag: &str,
) -> bool {
    match action {
        PageAction::Insert { element } => {
            let element = element.build(default_tag);
            page.insert(element.clone());
            *picker = Some(element);
        }
        PageAction::Remove => {
            if let Some(element) = target(picker.take()) {
                page.remove(&element);
            }
        }
        PageAction::SetAttribute { name, value } => {
            if let Some(element) = target(picker.clone()) {
                page.set_attribute(&element, &name, &value);
            }
        }
        PageAction::RemoveAttribute { name } => {
            if let Some(element) = target(picker.clone()) {
                page.remove_attribute(&element, &name);
            }
        }
        PageAction::SetProperty { name, value } => {
            if let Some(element) = target(picker.clone()) {
                element.set_property(&name, value);
            }
        }
        PageAction::AttachEncapsulated { inputs } => {
            if let Some(element) = target(picker.clone()) {
                page.attach_encapsulated(&element, inputs);
            }
        }
        PageAction::SetInput {
            index,
            value,
            commit,
        } => {
            if let Some(element) = target(picker.clone()) {
                page.set_input_value(&element, index, &value, commit);
            }
        }
        PageAction::Navigate { path, kind } => page.navigate(&path, kind),
        PageAction::Unload => {
            page.unload();
            return true;
        }
    }
    false
}

fn target(picker: Option<MemoryElement>) -> Option<MemoryElement> {
    if picker.is_none() {
        warn!("no picker inserted, skipping element action");
    }
    picker
}
