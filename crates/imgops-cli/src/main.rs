//! imgops - container image build/push/inspect CLI

mod commands;

use clap::{Parser, Subcommand};
use commands::parse_key_val;
use imgops_config::{EngineConfig, HostEnv};
use imgops_engine::EngineClient;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "imgops")]
#[command(author, version, about = "Container image build, push and inspect", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the engine executable (e.g. podman)
    #[arg(long, global = true)]
    engine: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the engine daemon is running and healthy
    Info,

    /// Print the engine server platform as os/arch
    Platform,

    /// Report whether the ecr-login credential helper serves a registry
    CredHelper {
        /// Repository URI, e.g. 123456789012.dkr.ecr.us-west-2.amazonaws.com/app
        uri: String,
    },

    /// Build an image
    Build {
        /// Repository URI
        #[arg(long)]
        uri: String,
        /// Tag to apply (repeatable, first one is canonical)
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,
        /// Path to the Dockerfile
        #[arg(short = 'f', long)]
        dockerfile: PathBuf,
        /// Build context (defaults to the Dockerfile's directory)
        #[arg(long)]
        context: Option<PathBuf>,
        /// Target build stage
        #[arg(long)]
        target: Option<String>,
        /// Cache source image (repeatable)
        #[arg(long)]
        cache_from: Vec<String>,
        /// Target platform as os/arch
        #[arg(long)]
        platform: Option<String>,
        /// Build argument KEY=VALUE (repeatable)
        #[arg(long = "build-arg", value_parser = parse_key_val)]
        build_args: Vec<(String, String)>,
        /// Image label KEY=VALUE (repeatable)
        #[arg(long = "label", value_parser = parse_key_val)]
        labels: Vec<(String, String)>,
    },

    /// Log in to a registry, reading the password from stdin
    Login {
        /// Registry or repository URI
        #[arg(long)]
        uri: String,
        #[arg(short, long)]
        username: String,
    },

    /// Push tags of a repository and print the image digest
    Push {
        /// Repository URI
        #[arg(long)]
        uri: String,
        /// Tag to push (repeatable)
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,
    },

    /// Run a single container
    Run {
        /// Image reference
        image: String,
        /// Container name
        #[arg(long)]
        name: Option<String>,
        /// Published port HOST:CONTAINER (repeatable)
        #[arg(short, long = "publish", value_parser = commands::parse_port)]
        ports: Vec<(String, String)>,
        /// Container whose network namespace to join
        #[arg(long)]
        network: Option<String>,
        /// Environment variable KEY=VALUE (repeatable)
        #[arg(short, long = "env", value_parser = parse_key_val)]
        env: Vec<(String, String)>,
        /// Secret environment variable KEY=VALUE (repeatable)
        #[arg(long = "secret", value_parser = parse_key_val)]
        secrets: Vec<(String, String)>,
        /// Command override
        #[arg(trailing_var_arg = true)]
        cmd: Vec<String>,
    },

    /// Exit 0 if a container with this name is running, 1 otherwise
    Ps {
        /// Container name filter
        name: String,
    },

    /// Show the engine configuration
    Config {
        /// Write the default configuration if no config file exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Handle config command separately (doesn't need an engine)
    if let Commands::Config { init } = cli.command {
        commands::config(init)?;
        return Ok(0);
    }

    let mut config = match EngineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring config: {}", e);
            EngineConfig::default()
        }
    };
    if let Some(engine) = cli.engine {
        config.engine.program = engine;
    }

    let client = EngineClient::from_config(&config, HostEnv::from_process());

    // Ctrl-C cancels the running engine command
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping engine command");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Info => commands::info(&client).await?,
        Commands::Platform => commands::platform(&client).await?,
        Commands::CredHelper { uri } => commands::cred_helper(&client, &uri),
        Commands::Build {
            uri,
            tags,
            dockerfile,
            context,
            target,
            cache_from,
            platform,
            build_args,
            labels,
        } => {
            let intent = imgops_engine::BuildIntent {
                uri,
                tags,
                dockerfile,
                context,
                target,
                cache_from,
                platform,
                args: build_args.into_iter().collect(),
                labels: labels.into_iter().collect(),
            };
            commands::build(&client, &cancel, &intent).await?;
        }
        Commands::Login { uri, username } => commands::login(&client, &uri, &username).await?,
        Commands::Push { uri, tags } => commands::push(&client, &cancel, &uri, &tags).await?,
        Commands::Run {
            image,
            name,
            ports,
            network,
            env,
            secrets,
            cmd,
        } => {
            let intent = imgops_engine::RunIntent {
                image,
                name,
                ports: ports.into_iter().collect(),
                command: cmd,
                env_vars: env.into_iter().collect(),
                secrets: secrets.into_iter().collect(),
                network,
            };
            commands::run(&client, &cancel, &intent).await?;
        }
        Commands::Config { .. } => unreachable!("handled before the engine client is built"),
        Commands::Ps { name } => {
            if !commands::ps(&client, &name).await? {
                return Ok(1);
            }
        }
    }

    Ok(0)
}
