//! `copycat gateway`: start the HTTP API server.

use copycat_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("CopyCat Gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:      {}", config.provider.model);
    println!("   Clone root: {}", config.cloner.output_root.display());

    copycat_gateway::start(config).await?;

    Ok(())
}
