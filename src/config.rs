use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub session_ttl_secs: u64,
    pub reap_interval_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File Upload Service API")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_SERVICE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_SERVICE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where files are stored (overrides UPLOAD_SERVICE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Idle seconds before a chunked session is reaped (overrides UPLOAD_SERVICE_SESSION_TTL_SECS)
    #[arg(long)]
    pub session_ttl_secs: Option<u64>,

    /// Seconds between reaper sweeps (overrides UPLOAD_SERVICE_REAP_INTERVAL_SECS)
    #[arg(long)]
    pub reap_interval_secs: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("UPLOAD_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("UPLOAD_SERVICE_PORT", 8000u16)?;
        let env_storage =
            env::var("UPLOAD_SERVICE_STORAGE_DIR").unwrap_or_else(|_| "./storage".into());
        let env_ttl = parse_env("UPLOAD_SERVICE_SESSION_TTL_SECS", 3600u64)?;
        let env_reap = parse_env("UPLOAD_SERVICE_REAP_INTERVAL_SECS", 300u64)?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            session_ttl_secs: args.session_ttl_secs.unwrap_or(env_ttl),
            reap_interval_secs: args.reap_interval_secs.unwrap_or(env_reap),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
