use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

use tvplay::media::MediaSink;
use tvplay::player::{PlaybackController, PlaybackEvent, PlaybackEventHandler, PlaybackStatus};
use tvplay::sim::{Scenario, ScenarioRig, SimulatedFactory, SimulatedSink};
use tvplay::timer::{ManualClock, TokioScheduler};
use tvplay::utils::{self, format_position, PlaybackConfig};

/// tvplay - adaptive stream playback controller, driven against simulated collaborators
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stream URL to attach (overrides the scenario's source)
    #[arg(value_name = "URL")]
    source: Option<String>,

    /// Configuration file instead of the standard locations
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// TOML fault scenario to replay
    #[arg(short, long, value_name = "FILE")]
    scenario: Option<PathBuf>,

    /// Run timers on the wall clock instead of virtual time
    #[arg(long)]
    realtime: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PlaybackConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => utils::load_config()?,
    };

    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting tvplay v{}", env!("CARGO_PKG_VERSION"));

    let mut scenario = match &args.scenario {
        Some(path) => Scenario::from_file(path)
            .with_context(|| format!("Failed to load scenario from {}", path.display()))?,
        None => match &args.source {
            Some(source) => Scenario::plain(source),
            None => bail!("Nothing to play: pass a stream URL or --scenario"),
        },
    };
    if let Some(source) = &args.source {
        scenario.source = source.clone();
    }

    let sink = Arc::new(SimulatedSink::new());
    let factory = Arc::new(SimulatedFactory::new());
    let clock = (!args.realtime).then(|| Arc::new(ManualClock::new()));

    let builder = PlaybackController::builder(sink.clone(), factory.clone())
        .with_config(config)
        .with_event_handler(Box::new(PrintingEventHandler { json: args.json }));
    let controller = match &clock {
        Some(clock) => builder.with_scheduler(clock.clone()).build()?,
        None => builder.with_scheduler(Arc::new(TokioScheduler::current()?)).build()?,
    };

    let rig = ScenarioRig {
        controller: &controller,
        sink: &sink,
        factory: &factory,
    };
    scenario.run(&rig, clock.as_deref()).await?;

    let status = controller.status();
    info!(
        "Scenario finished: {} at {} (network retries: {})",
        status,
        format_position(sink.position()),
        controller.network_retry_count()
    );

    if status == PlaybackStatus::Failed {
        let message = controller.last_error_message().unwrap_or_default();
        error!("{}", message);
        bail!("Session failed: {}", message);
    }

    controller.teardown();
    Ok(())
}

/// Prints every controller event to stdout
struct PrintingEventHandler {
    json: bool,
}

impl PlaybackEventHandler for PrintingEventHandler {
    fn handle_event(&mut self, event: PlaybackEvent) {
        if self.json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to serialize event: {}", e),
            }
            return;
        }

        match event {
            PlaybackEvent::StatusChanged { epoch, from, to } => {
                println!("[session {}] {} -> {}", epoch, from, to)
            }
            PlaybackEvent::Failed { epoch, message, .. } => println!("[session {}] {}", epoch, message),
            PlaybackEvent::GesturePrompt { epoch, visible: true } => {
                println!("[session {}] press OK to start playback", epoch)
            }
            other => log::debug!("{:?}", other),
        }
    }
}
