use std::path::Path;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use vps_watch::{
    ServerSnapshot,
    actors::HubEvent,
    config::{Config, read_config_file},
    hub::Hub,
    storage,
    util::{format_bytes, get_api_key, get_config_path},
};

#[derive(Debug, Clone, Parser)]
#[command(name = "vps-watch")]
#[command(about = "Watch and alert on hosted virtual servers")]
struct Cli {
    /// Config file (defaults to $VPS_WATCH_CONFIG or ./vps-watch.json)
    #[arg(short, long)]
    file: Option<String>,

    /// Log engine internals at trace level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List all servers of the account
    Servers,

    /// Poll one server in the foreground and print what happens
    Watch { server_id: String },

    /// Run the background monitor over every monitored server
    Monitor,

    /// Send start, restart, stop or kill
    Power { server_id: String, action: String },

    /// Show or clear the event history of a server
    History {
        server_id: String,
        #[arg(long)]
        clear: bool,
    },

    /// Show or change the settings of a server
    Settings(SettingsArgs),
}

#[derive(Debug, Clone, Args)]
struct SettingsArgs {
    server_id: String,

    #[arg(long)]
    cpu_alerts: Option<bool>,

    #[arg(long)]
    cpu_threshold: Option<u8>,

    #[arg(long)]
    notify_offline: Option<bool>,

    #[arg(long)]
    notify_online: Option<bool>,

    #[arg(long)]
    agent: Option<bool>,

    #[arg(long)]
    agent_host: Option<String>,

    #[arg(long)]
    agent_port: Option<u16>,

    #[arg(long)]
    agent_token: Option<String>,
}

impl SettingsArgs {
    fn touches_alerts(&self) -> bool {
        self.cpu_alerts.is_some()
            || self.cpu_threshold.is_some()
            || self.notify_offline.is_some()
            || self.notify_online.is_some()
    }

    fn touches_agent(&self) -> bool {
        self.agent.is_some()
            || self.agent_host.is_some()
            || self.agent_port.is_some()
            || self.agent_token.is_some()
    }
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![("vps_watch", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        read_config_file(path)
    } else {
        debug!("no config file at {path}, using defaults");
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init(cli.verbose);
    trace!("started with args: {cli:?}");

    let config = load_config(&cli.file.clone().unwrap_or_else(get_config_path))?;
    let token = get_api_key().context("VPS_WATCH_API_KEY is not set")?;
    let store = storage::open(&config.storage.clone().unwrap_or_default())
        .await
        .context("failed to open settings store")?;

    let hub = Hub::connect(&config, &token, store)
        .await
        .context("failed to connect to the control panel")?;
    println!("Signed in as {}", hub.account().name);

    let result = run(&hub, cli.command).await;
    hub.shutdown().await?;
    result
}

async fn run(hub: &Hub, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Servers => {
            for server in hub.list_servers().await? {
                print_server(&server);
            }
        }

        Command::Watch { server_id } => {
            let events = hub.subscribe();
            hub.select_server(&server_id).await;
            follow(events).await?;
        }

        Command::Monitor => {
            if !hub.is_monitoring().await {
                bail!("no server has alerts enabled, see `vps-watch settings --help`");
            }
            follow(hub.subscribe()).await?;
        }

        Command::Power { server_id, action } => {
            hub.power_action(&server_id, &action).await?;
            println!("{action} sent to {server_id}");
        }

        Command::History { server_id, clear } => {
            if clear {
                hub.clear_history(&server_id).await?;
                println!("History of {server_id} cleared");
            } else {
                for event in hub.history(&server_id).await? {
                    println!(
                        "{} [{}] {}",
                        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        event.severity,
                        event.message
                    );
                }
            }
        }

        Command::Settings(args) => {
            let mut settings = hub.settings(&args.server_id).await?;

            if args.touches_alerts() {
                let mut alerts = settings.alerts.clone();
                alerts.cpu_enabled = args.cpu_alerts.unwrap_or(alerts.cpu_enabled);
                alerts.cpu_threshold = args.cpu_threshold.unwrap_or(alerts.cpu_threshold);
                alerts.notify_offline = args.notify_offline.unwrap_or(alerts.notify_offline);
                alerts.notify_online = args.notify_online.unwrap_or(alerts.notify_online);
                hub.update_alert_settings(&args.server_id, alerts).await?;
            }

            if args.touches_agent() {
                let mut agent = settings.agent.clone();
                agent.enabled = args.agent.unwrap_or(agent.enabled);
                agent.host = args.agent_host.clone().unwrap_or(agent.host);
                agent.port = args.agent_port.unwrap_or(agent.port);
                agent.token = args.agent_token.clone().unwrap_or(agent.token);
                hub.save_agent_settings(&args.server_id, agent).await?;
            }

            settings = hub.settings(&args.server_id).await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

/// Print hub events until Ctrl-C or a rejected API key
async fn follow(mut events: broadcast::Receiver<HubEvent>) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),

            event = events.recv() => match event {
                Ok(HubEvent::Sample(sample)) => print_server(&sample.snapshot),
                Ok(HubEvent::Notification(notification)) => {
                    println!("!! {}: {}", notification.title, notification.message);
                }
                Ok(HubEvent::HistoryAppended { server_id, event }) => {
                    println!("   {server_id} [{}] {}", event.severity, event.message);
                }
                Ok(HubEvent::AuthFailed { .. }) => bail!("the API key was rejected, signing out"),
                Err(RecvError::Lagged(skipped)) => warn!("skipped {skipped} events"),
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

fn print_server(server: &ServerSnapshot) {
    let sample = &server.sample;
    let mut line = format!("{:>8}  {:<24} {:<10}", server.info.id, server.info.name, sample.status);

    if let Some(cpu) = sample.cpu_display() {
        line.push_str(&format!(" cpu {cpu}"));
    }
    if let Some(memory) = sample.memory {
        line.push_str(&format!(" mem {}", memory.display()));
    } else if let Some(allocated) = server.info.memory {
        line.push_str(&format!(" mem {}", format_bytes(allocated)));
    }
    if let Some(disk) = sample.disk {
        line.push_str(&format!(" disk {}", disk.display()));
    }
    if let Some(uptime) = sample.uptime_display() {
        line.push_str(&format!(" up {uptime}"));
    }
    if let Some(network) = sample.network {
        line.push_str(&format!(
            " rx {} tx {}",
            format_bytes(network.rx),
            format_bytes(network.tx)
        ));
    }

    println!("{line}");
}
