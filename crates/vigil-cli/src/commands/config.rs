use std::path::PathBuf;

use clap::Subcommand;
use vigil_core::EngineConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Target path (defaults to the user config directory)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration as TOML
    Show {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Load a configuration file and check every invariant
    Validate {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Init { path, force } => {
            let path = resolve_path(path)?;
            if path.exists() && !force {
                return Err(format!("{} already exists (use --force)", path.display()).into());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let config = EngineConfig::default();
            std::fs::write(&path, config.to_toml_string()?)?;
            println!("wrote {}", path.display());
            Ok(())
        }
        ConfigAction::Show { path } => {
            let config = load(path)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigAction::Validate { path } => {
            let path = resolve_path(path)?;
            let config = load(Some(path.clone()))?;
            config.validate()?;
            println!("{} is valid", path.display());
            Ok(())
        }
    }
}

/// Load the config at `path`, or the defaults when no file exists yet.
pub fn load(path: Option<PathBuf>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let path = resolve_path(path)?;
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let raw = std::fs::read_to_string(&path)?;
    Ok(EngineConfig::from_toml_str(&raw)?)
}

fn resolve_path(path: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return Ok(path);
    }
    let base = dirs::config_dir().ok_or("no user config directory")?;
    Ok(base.join("vigil").join("config.toml"))
}
