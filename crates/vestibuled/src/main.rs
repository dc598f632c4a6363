use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vestibule_server::store::{SettingsRepository, Store, DB_VERSION_KEY, SCHEMA_VERSION};

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "vestibuled",
    about = "Vestibuled — bootstrap gate server daemon",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Vestibule HTTP server
    Serve {
        /// Port to listen on (default: $VESTIBULE_PORT or 8080)
        #[arg(long, env = "VESTIBULE_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $VESTIBULE_HOST or 0.0.0.0)
        #[arg(long, env = "VESTIBULE_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Log level: error, warn, info, debug, verbose (default: $VESTIBULE_LOG_LEVEL or warn)
        #[arg(long, env = "VESTIBULE_LOG_LEVEL")]
        log_level: Option<String>,
    },
    /// Mark the settings store installed at this build's schema version (offline).
    Install,
    /// Write a single setting (offline).
    SetSetting { key: String, value: String },
    /// Print a single setting (offline).
    GetSetting { key: String },
    /// Remove a single setting (offline).
    DeleteSetting { key: String },
    /// Print every setting as `key = value`, ordered by key (offline).
    ListSettings,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let effective_log_level = if let Commands::Serve { ref log_level, .. } = cli.command {
        let raw = log_level
            .clone()
            .or_else(|| std::env::var("VESTIBULE_LOG_LEVEL").ok())
            .unwrap_or_else(|| "warn".into());
        if raw.eq_ignore_ascii_case("verbose") {
            "debug".to_owned()
        } else {
            raw
        }
    } else {
        std::env::var("VESTIBULE_LOG_LEVEL").unwrap_or_else(|_| "warn".into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&effective_log_level))
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            log_level: _,
        } => cmd_serve(host, port, effective_log_level).await,

        Commands::Install => cmd_install(),
        Commands::SetSetting { key, value } => cmd_set_setting(&key, &value),
        Commands::GetSetting { key } => cmd_get_setting(&key),
        Commands::DeleteSetting { key } => cmd_delete_setting(&key),
        Commands::ListSettings => cmd_list_settings(),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16, log_level: String) -> Result<()> {
    let cfg = vestibule_server::ServerConfig {
        host,
        port,
        log_level,
        ..Default::default()
    };

    vestibule_server::run(cfg).await
}

fn open_store() -> Result<Store> {
    let data_dir_env = std::env::var("VESTIBULE_DATA_DIR").ok().map(Into::into);
    let data_dir = vestibule_server::resolve_data_dir(data_dir_env.as_ref())?;
    Store::open(&data_dir.join("vestibule.db")).context("open store — is the server running?")
}

fn cmd_install() -> Result<()> {
    let store = open_store()?;
    if store.check_if_installed()? {
        let current = store.get(DB_VERSION_KEY)?;
        println!(
            "already installed (schema {})",
            current.as_deref().unwrap_or("unknown")
        );
        return Ok(());
    }
    store.install(SCHEMA_VERSION)?;
    println!("installed at schema {SCHEMA_VERSION}");
    Ok(())
}

fn cmd_set_setting(key: &str, value: &str) -> Result<()> {
    let store = open_store()?;
    store.put(key, value)?;
    println!("{key} = {value}");
    Ok(())
}

fn cmd_get_setting(key: &str) -> Result<()> {
    let store = open_store()?;
    match store.get(key)? {
        Some(value) => println!("{value}"),
        None => anyhow::bail!("setting not found: {key}"),
    }
    Ok(())
}

fn cmd_delete_setting(key: &str) -> Result<()> {
    let store = open_store()?;
    if !store.delete(key)? {
        anyhow::bail!("setting not found: {key}");
    }
    println!("deleted {key}");
    Ok(())
}

fn cmd_list_settings() -> Result<()> {
    let store = open_store()?;
    let settings = store.list()?;
    if settings.is_empty() {
        println!("(no settings)");
        return Ok(());
    }
    for (key, value) in settings {
        println!("{key} = {value}");
    }
    Ok(())
}
