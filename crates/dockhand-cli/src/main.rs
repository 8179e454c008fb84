mod cmd;
mod output;
mod settings_path;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use dockhand_core::types::{Action, ActorId, RoleId};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dockhand",
    about = "Start, stop and restart containers on behalf of chat users",
    version,
    propagate_version = true
)]
struct Cli {
    /// Settings file (default: settings/settings.yaml, searched upward from cwd)
    #[arg(long, global = true, env = "DOCKHAND_SETTINGS")]
    settings: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Who is asking. Shared by every command that runs the permission model.
#[derive(clap::Args, Clone)]
struct ActorArgs {
    /// Chat user id of the requester
    #[arg(long)]
    actor: ActorId,

    /// Role id the requester holds (repeatable)
    #[arg(long = "group")]
    groups: Vec<RoleId>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default settings file
    Init,

    /// Validate or print the settings file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run the HTTP server the chat gateway talks to
    Serve {
        /// Port to listen on (default: server.port from settings)
        #[arg(long)]
        port: Option<u16>,

        /// Bearer token the gateway must present
        #[arg(long, env = "DOCKHAND_GATEWAY_TOKEN", hide_env_values = true)]
        gateway_token: Option<String>,
    },

    /// List the units an actor may start or stop, grouped by section
    List {
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Start a unit
    Start {
        unit: String,
        #[command(flatten)]
        actor: ActorArgs,
        /// Mention prefixed to the final message
        #[arg(long)]
        mention: Option<String>,
    },

    /// Stop a unit
    Stop {
        unit: String,
        #[command(flatten)]
        actor: ActorArgs,
        /// Mention prefixed to the final message
        #[arg(long)]
        mention: Option<String>,
    },

    /// Restart a unit
    Restart {
        unit: String,
        #[command(flatten)]
        actor: ActorArgs,
        /// Mention prefixed to the final message
        #[arg(long)]
        mention: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = settings_path::resolve_settings(cli.settings.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&settings),
        Commands::Config { subcommand } => cmd::config::run(&settings, subcommand, cli.json),
        Commands::Serve {
            port,
            gateway_token,
        } => cmd::serve::run(&settings, port, gateway_token),
        Commands::List { actor } => cmd::list::run(&settings, actor.actor, &actor.groups, cli.json),
        Commands::Start {
            unit,
            actor,
            mention,
        } => unit_flow(&settings, Action::Start, unit, actor, mention, cli.json),
        Commands::Stop {
            unit,
            actor,
            mention,
        } => unit_flow(&settings, Action::Stop, unit, actor, mention, cli.json),
        Commands::Restart {
            unit,
            actor,
            mention,
        } => unit_flow(&settings, Action::Restart, unit, actor, mention, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn unit_flow(
    settings: &std::path::Path,
    action: Action,
    unit: String,
    actor: ActorArgs,
    mention: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let request = cmd::unit::FlowArgs {
        action,
        unit,
        actor: actor.actor,
        groups: actor.groups,
        mention,
    };
    cmd::unit::run(settings, request, json)
}
