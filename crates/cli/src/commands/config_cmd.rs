//! `copycat config`: configuration management commands.

use copycat_config::AppConfig;

/// Non-fatal problems worth reporting.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if !config.has_api_key() {
        warnings.push("No API key set (set COPYCAT_API_KEY or OPENAI_API_KEY)");
    }

    if config.agent.deadline_secs == 0 {
        warnings.push("agent.deadline_secs = 0 disables the run deadline");
    }

    if config.tools.shell.enabled && config.tools.shell.allowed_commands.is_empty() {
        warnings.push("executeCommand is enabled with an empty allowlist (all commands allowed)");
    }

    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway bound to 0.0.0.0; the API has no authentication");
    }

    warnings
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Provider:   {} ({})", config.provider.name, config.provider.base_url);
            println!("   Model:      {}", config.provider.model);
            println!(
                "   Gateway:    {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!("   Clone root: {}", config.cloner.output_root.display());
            println!(
                "   Shell tool: {}",
                if config.tools.shell.enabled { "enabled" } else { "disabled" }
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("[REDACTED]".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
