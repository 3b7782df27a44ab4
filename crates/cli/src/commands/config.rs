use clap::{Subcommand, ValueEnum};
use routeslot_core::config::AppConfig;
use std::path::Path;

use super::utils::{mask_secret, print_info, print_success, CliError, CliResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Toml,
    Json,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to config file
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show the resolved configuration, defaults and environment overrides included
    Show {
        /// Path to config file
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        #[arg(long, value_enum, default_value = "toml")]
        format: OutputFormat,

        /// Show the controller secret
        #[arg(long)]
        show_sensitive: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, format, show_sensitive } => {
            let config = load(&file)?;
            println!("{}", render_config(&config, format, show_sensitive)?);
            Ok(())
        }
    }
}

fn load(file: &str) -> CliResult<AppConfig> {
    AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading configuration from {file}..."));
    let config = load(file)?;
    config.validate().map_err(CliError::Config)?;
    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Environment: {}", config.environment);
    println!(
        "  Slots: {} ({} others, {} dedicated)",
        config.slots.total(),
        config.slots.others,
        config.slots.dedicated
    );
    println!("  Provider: {}", config.provider_base_url());
    println!("  Admin port: {}", config.server.admin_port);
    println!("  Store: {}", config.store.database_url);
    println!("  Engine: {} (controller {})", config.engine.binary.display(), config.engine.controller_url());

    Ok(())
}

/// Serializes the configuration, masking the controller secret unless asked not to.
///
/// # Errors
/// Returns `CliError::General` if serialization fails.
pub fn render_config(config: &AppConfig, format: OutputFormat, show_sensitive: bool) -> CliResult<String> {
    let mut config = config.clone();
    if !show_sensitive {
        config.engine.controller_secret = config.engine.controller_secret.as_deref().map(mask_secret);
    }

    match format {
        OutputFormat::Toml => toml::to_string_pretty(&config).map_err(|e| CliError::General(e.to_string())),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&config)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_masks_secret() {
        let mut config = AppConfig::default();
        config.engine.controller_secret = Some("topsecret".to_string());

        let rendered = render_config(&config, OutputFormat::Json, false).unwrap();
        assert!(rendered.contains("t****"));
        assert!(!rendered.contains("topsecret"));

        let rendered = render_config(&config, OutputFormat::Json, true).unwrap();
        assert!(rendered.contains("topsecret"));
    }

    #[test]
    fn test_render_toml_has_sections() {
        let rendered = render_config(&AppConfig::default(), OutputFormat::Toml, false).unwrap();
        assert!(rendered.contains("[slots]"));
        assert!(rendered.contains("[engine]"));
    }

    #[test]
    fn test_validate_missing_file() {
        let err = validate_config("/nonexistent/config.toml").unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[slots]\nothers = 0\ndedicated = 0\n").unwrap();

        let err = validate_config(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("At least one slot"));
    }
}
