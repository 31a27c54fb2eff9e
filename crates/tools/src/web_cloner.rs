//! Website cloning tool.
//!
//! Each call clones into a fresh `{output_root}/{siteId}` directory, so
//! concurrent clones never share files.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use copycat_cloner::{AssetKind, SiteCloner, new_site_id};
use copycat_core::error::{CloneError, ToolError};
use copycat_core::tool::{Tool, ToolContext, ToolOutput};
use tracing::info;
use url::Url;

pub const NAME: &str = "webCloner";

pub struct WebClonerTool {
    cloner: Arc<SiteCloner>,
    output_root: PathBuf,
}

impl WebClonerTool {
    pub fn new(cloner: Arc<SiteCloner>, output_root: PathBuf) -> Self {
        Self {
            cloner,
            output_root,
        }
    }
}

/// Accept `https://x`, `http://x`, or a bare host like `example.com`.
pub fn parse_target(input: &str) -> Result<Url, ToolError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(ToolError::InvalidInput("a URL is required".into()));
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => Url::parse(&format!("https://{raw}"))
            .map_err(|e| ToolError::InvalidInput(format!("invalid URL '{raw}': {e}")))?,
    };

    if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
        Ok(url)
    } else {
        Err(ToolError::InvalidInput(format!(
            "only http(s) URLs can be cloned, got '{url}'"
        )))
    }
}

#[async_trait]
impl Tool for WebClonerTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Clones the given website and saves it locally (pixel-perfect copy). Note: URL FORMAT -> https://www.example.com"
    }

    fn input_description(&self) -> &str {
        "url: string"
    }

    async fn invoke(&self, input: &str, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let url = parse_target(input)?;
        let site_id = new_site_id();
        let output_dir = self.output_root.join(&site_id);

        let site = self
            .cloner
            .clone_site(url.as_str(), &output_dir, &ctx.cancel)
            .await
            .map_err(|e| match e {
                CloneError::Cancelled => ToolError::Cancelled(NAME.into()),
                other => ToolError::ExecutionFailed {
                    tool_name: NAME.into(),
                    reason: other.to_string(),
                },
            })?;

        info!(site_id = %site_id, url = %url, "Site cloned");

        let output_dir = site.output_dir.display().to_string();
        let data = serde_json::json!({
            "siteId": site_id,
            "outputDir": output_dir,
            "success": true,
            "baseUrl": site.base_url,
            "assets": {
                "stylesheets": site.count(AssetKind::Stylesheet),
                "scripts": site.count(AssetKind::Script),
                "images": site.count(AssetKind::Image),
                "localized": site.localized(),
            },
        });

        Ok(ToolOutput::structured(
            format!(
                "Cloned {url} into {output_dir} ({} of {} assets localized)",
                site.localized(),
                site.manifest.len()
            ),
            data,
        ))
    }
}
