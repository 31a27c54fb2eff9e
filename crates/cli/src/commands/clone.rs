//! `copycat clone`: run the site cloner without the agent.

use std::path::PathBuf;

use copycat_cloner::{AssetKind, new_site_id};
use copycat_config::AppConfig;
use tokio_util::sync::CancellationToken;

pub async fn run(
    url: &str,
    out: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let target = copycat_tools::web_cloner::parse_target(url)?;
    let output_dir = out.unwrap_or_else(|| config.cloner.output_root.join(new_site_id()));

    let cloner = copycat_cloner::from_config(&config.cloner);

    // Ctrl+C cancels the clone and still closes the browser.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let site = cloner
        .clone_site(target.as_str(), &output_dir, &cancel)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&site)?);
        return Ok(());
    }

    println!("Cloned {}", site.base_url);
    println!("   Site id:     {}", site.site_id);
    println!("   Index:       {}", site.index_path().display());
    println!(
        "   Stylesheets: {}  Scripts: {}  Images: {}",
        site.count(AssetKind::Stylesheet),
        site.count(AssetKind::Script),
        site.count(AssetKind::Image)
    );
    println!(
        "   Localized:   {}/{}",
        site.localized(),
        site.manifest.len()
    );

    Ok(())
}
