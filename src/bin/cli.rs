//! Telemetry Bridge CLI
//!
//! Operator tools for the bridge:
//! - Generate shared keys
//! - Seal and open sensor envelopes
//! - Check topic classification
//! - Print a default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use telemetry_bridge::config::{generate_default_config, Config};
use telemetry_bridge::crypto::{AssociatedData, Decryptor, SharedKey};
use telemetry_bridge::readings::ReadingKind;

#[derive(Parser)]
#[command(name = "telemetry-bridge-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator tools for the telemetry bridge")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Base64 shared key, overriding the configured one
    #[arg(long, global = true)]
    pub key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a fresh base64 256-bit key
    Keygen,

    /// Encrypt a number the way sensor nodes do
    Seal {
        /// Reading value
        value: f64,
        /// Wrap the envelope as {"data": "..."}
        #[arg(long)]
        wrap: bool,
    },

    /// Decrypt a payload and print the number
    Open {
        /// Raw payload: a bare envelope or {"data": "..."}
        payload: String,
    },

    /// Show which reading kind a topic is logged as
    Classify {
        /// Broker topic, e.g. device7/sensor/temp
        topic: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => {
            println!("{}", SharedKey::generate().to_base64());
        }

        Commands::Seal { value, wrap } => {
            let decryptor = decryptor(cli.config.as_deref(), cli.key.as_deref())?;
            let envelope = decryptor
                .seal(value.to_string().as_bytes())
                .map_err(|e| format!("Encryption failed: {}", e))?;

            if wrap {
                println!("{}", serde_json::json!({ "data": envelope }));
            } else {
                println!("{}", envelope);
            }
        }

        Commands::Open { payload } => {
            let decryptor = decryptor(cli.config.as_deref(), cli.key.as_deref())?;
            match decryptor.open(payload.as_bytes()) {
                Ok(value) => println!("{}", value),
                Err(e) => {
                    eprintln!("{}: {}", e.kind(), e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Classify { topic } => match ReadingKind::classify(&topic) {
            Some(kind) => println!("{}", kind),
            None => {
                println!("unclassified (broadcast only, not logged)");
            }
        },

        Commands::Config { output } => {
            let config = generate_default_config();
            if let Some(path) = output {
                std::fs::write(&path, &config)?;
                println!("Config written to: {}", path.display());
            } else {
                print!("{}", config);
            }
        }
    }

    Ok(())
}

/// Build a decryptor from the key override or the loaded config
fn decryptor(
    config_path: Option<&std::path::Path>,
    key: Option<&str>,
) -> Result<Decryptor, Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    let key = match key {
        Some(encoded) => SharedKey::from_base64(encoded)?,
        None => config.crypto.shared_key()?,
    };
    let aad: AssociatedData = config.crypto.associated_data();

    Ok(Decryptor::new(key, aad))
}
