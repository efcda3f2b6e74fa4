// LXD Driver - Command Line Entry Point
//
// Exposes every session operation as a subcommand so a host can be driven
// (and the session exercised) without the surrounding compute service.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lxd_driver::config::Config;
use lxd_driver::instance::Instance;
use lxd_driver::lxd::{LxdResponse, OperationMetadata};
use lxd_driver::metrics;
use lxd_driver::session::LxdSession;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// LXD Driver: compute instance lifecycle on LXD hosts
#[derive(Parser, Debug)]
#[command(name = "lxd-driver")]
#[command(author = "LXD Driver Contributors")]
#[command(version)]
#[command(about = "Drive LXD containers through the compute driver session", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: ~/.config/lxd-driver/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics after the command
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List containers on the host
    List,
    /// Check whether a container exists
    Defined { name: String },
    /// Check whether a container is running
    Running { name: String },
    /// Show the state of a container
    State { name: String },
    /// Start a container and wait for it
    Start { name: String },
    /// Stop a container and wait for it
    Stop { name: String },
    /// Restart a container
    Reboot { name: String },
    /// Freeze a container
    Pause { name: String },
    /// Thaw a frozen container
    Unpause { name: String },
    /// Stop and delete a container
    Destroy { name: String },
    /// Create a container from an image
    Init {
        name: String,

        /// Image alias to create the container from
        #[arg(long)]
        image: String,

        /// JSON container definition (default: image source with the default profile)
        #[arg(long)]
        config_file: Option<PathBuf>,
    },
    /// Replace a container definition
    Update {
        name: String,

        /// JSON container definition
        #[arg(long)]
        config_file: PathBuf,
    },
    /// Wait for a background operation to succeed
    Wait { operation: String },
    /// Show a background operation
    Operation { operation: String },
    /// Check whether an image alias exists
    ImageDefined { image: String },
    /// Create an image alias
    AliasCreate {
        /// JSON alias definition ({"name": ..., "target": ...})
        #[arg(long)]
        config_file: PathBuf,
    },
    /// Manage profiles
    #[command(subcommand)]
    Profile(ProfileCommands),
}

#[derive(Subcommand, Debug)]
enum ProfileCommands {
    /// List profiles on the host
    List,
    /// Check whether the profile for an instance exists
    Defined { name: String },
    /// Create the profile for an instance
    Create {
        name: String,

        /// JSON profile definition
        #[arg(long)]
        config_file: PathBuf,
    },
    /// Delete the profile for an instance
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config, args.verbose)?;
    metrics::init().context("Failed to register metrics")?;

    let session =
        LxdSession::from_config(&config.lxd).context("Failed to create LXD session")?;
    run(&session, args.command).await?;

    if args.metrics {
        print!("{}", metrics::gather()?);
    }

    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}

async fn run(session: &LxdSession, command: Commands) -> Result<()> {
    match command {
        Commands::List => {
            for name in session.container_list().await? {
                println!("{}", name);
            }
        }
        Commands::Defined { name } => {
            let instance = Instance::new(&name, "");
            println!("{}", session.container_defined(&name, &instance).await?);
        }
        Commands::Running { name } => {
            let instance = Instance::new(&name, "");
            println!("{}", session.container_running(&name, &instance).await?);
        }
        Commands::State { name } => {
            let instance = Instance::new(&name, "");
            print_response(&session.container_state(&name, &instance).await?)?;
        }
        Commands::Start { name } => {
            let instance = Instance::new(&name, "");
            session.container_start(&name, &instance).await?;
            println!("Started {}", name);
        }
        Commands::Stop { name } => {
            let instance = Instance::new(&name, "");
            session.container_stop(&name, &instance).await?;
            println!("Stopped {}", name);
        }
        Commands::Reboot { name } => {
            let instance = Instance::new(&name, "");
            session.container_reboot(&name, &instance).await?;
            println!("Rebooted {}", name);
        }
        Commands::Pause { name } => {
            let instance = Instance::new(&name, "");
            session.container_pause(&name, &instance).await?;
            println!("Paused {}", name);
        }
        Commands::Unpause { name } => {
            let instance = Instance::new(&name, "");
            session.container_unpause(&name, &instance).await?;
            println!("Unpaused {}", name);
        }
        Commands::Destroy { name } => {
            let instance = Instance::new(&name, "");
            session.container_destroy(&name, &instance).await?;
            println!("Destroyed {}", name);
        }
        Commands::Init {
            name,
            image,
            config_file,
        } => {
            let instance = Instance::new(&name, image);
            let container = match config_file {
                Some(path) => read_json(&path)?,
                None => default_container_config(&instance),
            };
            info!("Creating {} from {}", instance.name, instance.image_ref);
            session.container_init(&container, &instance).await?;
            println!("Created {}", name);
        }
        Commands::Update { name, config_file } => {
            let instance = Instance::new(&name, "");
            session
                .container_update(&read_json(&config_file)?, &instance)
                .await?;
            println!("Updated {}", name);
        }
        Commands::Wait { operation } => {
            let instance = Instance::new("cli", "");
            session.operation_wait(&operation, &instance).await?;
            println!("Operation {} succeeded", operation);
        }
        Commands::Operation { operation } => {
            let instance = Instance::new("cli", "");
            let response = session.operation_info(&operation, &instance).await?;
            print_operation(&response)?;
        }
        Commands::ImageDefined { image } => {
            let instance = Instance::new("cli", image);
            println!("{}", session.image_defined(&instance).await?);
        }
        Commands::AliasCreate { config_file } => {
            let alias = read_json(&config_file)?;
            let instance = Instance::new("cli", "");
            println!("{}", session.create_alias(&alias, &instance).await?);
        }
        Commands::Profile(profile) => run_profile(session, profile).await?,
    }

    Ok(())
}

async fn run_profile(session: &LxdSession, command: ProfileCommands) -> Result<()> {
    match command {
        ProfileCommands::List => {
            for name in session.profile_list().await? {
                println!("{}", name);
            }
        }
        ProfileCommands::Defined { name } => {
            let instance = Instance::new(&name, "");
            println!("{}", session.profile_defined(&instance).await?);
        }
        ProfileCommands::Create { name, config_file } => {
            let instance = Instance::new(&name, "");
            let response = session
                .profile_create(&read_json(&config_file)?, &instance)
                .await?;
            print_response(&response)?;
        }
        ProfileCommands::Delete { name } => {
            let instance = Instance::new(&name, "");
            session.profile_delete(&instance).await?;
            println!("Deleted profile {}", name);
        }
    }

    Ok(())
}

/// Container definition used when `init` is not given one
fn default_container_config(instance: &Instance) -> Value {
    json!({
        "name": instance.name,
        "profiles": ["default"],
        "source": {
            "type": "image",
            "alias": instance.image_ref
        }
    })
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON from {:?}", path))
}

fn print_response(response: &LxdResponse) -> Result<()> {
    println!("status: {}", response.status);
    println!("{}", serde_json::to_string_pretty(&response.payload)?);
    Ok(())
}

fn print_operation(response: &LxdResponse) -> Result<()> {
    let metadata = response
        .metadata()
        .cloned()
        .context("Operation response carried no metadata")?;
    let operation: OperationMetadata =
        serde_json::from_value(metadata).context("Failed to decode operation metadata")?;

    println!("id: {}", operation.id);
    println!("class: {}", operation.class);
    println!("status: {} ({})", operation.status, operation.status_code);
    let finished = operation.state().is_some_and(|state| state.is_final());
    println!("finished: {}", finished);
    if let Some(created) = operation.created_at {
        println!("created: {}", created.to_rfc3339());
    }
    if let Some(elapsed) = operation.elapsed() {
        println!("elapsed: {}ms", elapsed.num_milliseconds());
    }
    if !operation.err.is_empty() {
        println!("error: {}", operation.err);
    }
    Ok(())
}
