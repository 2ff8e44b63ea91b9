mod api;
mod clock;
mod controller;
mod report;
mod timer;
mod ui;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiServer, ApiServerConfig, DEFAULT_API_PORT, SharedController};
use crate::clock::{ClockSourceKind, parse_local_datetime, select_clock};
use crate::controller::WidgetController;
use crate::timer::config::load_widget_config;

#[derive(Parser, Debug)]
#[command(
    name = "delaystart",
    version,
    about = "Delay-start timer widget for appliances with a fixed-step countdown"
)]
struct Cli {
    #[arg(long, default_value = "widget.json")]
    config: PathBuf,

    /// Print one report and exit instead of opening the widget.
    #[arg(long)]
    once: bool,

    /// With --once, print the report as JSON.
    #[arg(long, requires = "once")]
    json: bool,

    /// Pin "now" to a local datetime (YYYY-MM-DDTHH:MM[:SS]).
    #[arg(long)]
    now: Option<String>,

    /// Seconds until the cheapest window, as the price entity reports it.
    #[arg(long, allow_hyphen_values = true)]
    price_seconds: Option<String>,

    #[arg(long, default_value = "0.0.0.0")]
    api_bind: String,

    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    api_port: u16,

    #[arg(long)]
    no_api: bool,

    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    mdns_enabled: bool,

    #[arg(long, default_value = "delaystart")]
    mdns_instance: String,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("delaystart=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_widget_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let clock_kind = match cli.now.as_deref() {
        Some(raw) => ClockSourceKind::Fixed(parse_local_datetime(raw)?),
        None => ClockSourceKind::System,
    };
    let clock = select_clock(clock_kind)?;
    let mut controller = WidgetController::new(config, clock);

    if let Some(raw) = cli.price_seconds.as_deref() {
        if !controller.config().price_configured() {
            bail!("--price-seconds requires price_entity in {}", cli.config.display());
        }
        match controller.apply_price_state(raw) {
            Some(_) => {
                controller.set_toggle(true);
            }
            None => warn!(value = raw, "price signal unknown; best-price toggle stays off"),
        }
    }

    if cli.once {
        let snapshot = controller.snapshot();
        let output = if cli.json {
            report::render_json(&snapshot)?
        } else {
            report::render_text(&snapshot)
        };
        print!("{output}");
        if cli.json {
            println!();
        }
        return Ok(());
    }

    let shared: SharedController = Arc::new(Mutex::new(controller));

    let api_server = if cli.no_api {
        info!("widget API disabled");
        None
    } else {
        let server = ApiServer::start(
            ApiServerConfig {
                bind_addr: cli.api_bind.clone(),
                port: cli.api_port,
                mdns_enabled: cli.mdns_enabled,
                mdns_instance: cli.mdns_instance,
            },
            Arc::clone(&shared),
        )
        .with_context(|| {
            format!(
                "failed to start local API at {}:{}",
                cli.api_bind, cli.api_port
            )
        })?;
        Some(server)
    };
    let api_url = api_server
        .as_ref()
        .map(|_| format!("http://{}:{}", cli.api_bind, cli.api_port));

    let ui_result = ui::app::run_gui(shared, api_url);

    drop(api_server);
    ui_result
}
