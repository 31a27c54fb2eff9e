//! GitHub public profile lookup.

use async_trait::async_trait;
use copycat_core::error::ToolError;
use copycat_core::tool::{Tool, ToolContext, ToolOutput};
use serde::{Deserialize, Serialize};
use tracing::debug;

const NAME: &str = "getGithubUserInfoByUsername";

/// The subset of the GitHub user object handed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubUser {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
    pub location: Option<String>,
    pub twitter_username: Option<String>,
    pub public_repos: u64,
    pub public_gists: u64,
    pub followers: u64,
    pub following: u64,
}

pub struct GithubUserTool {
    base_url: String,
    user_agent: String,
    client: reqwest::Client,
}

impl GithubUserTool {
    pub fn new(base_url: &str, user_agent: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Tool for GithubUserTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Returns public GitHub user info."
    }

    fn input_description(&self) -> &str {
        "username: string"
    }

    async fn invoke(&self, input: &str, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let username = input.trim().trim_start_matches('@');
        if username.is_empty() {
            return Err(ToolError::InvalidInput("a GitHub username is required".into()));
        }

        let url = format!(
            "{}/users/{}",
            self.base_url,
            urlencoding::encode(&username.to_lowercase())
        );
        debug!(url = %url, "Fetching GitHub user");

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(failed(format!("GitHub user '{username}' not found")));
        }
        if !response.status().is_success() {
            return Err(failed(format!("GitHub API returned HTTP {status}")));
        }

        let user: GithubUser = response
            .json()
            .await
            .map_err(|e| failed(format!("unexpected GitHub response: {e}")))?;

        let data = serde_json::to_value(&user).map_err(|e| failed(e.to_string()))?;
        Ok(ToolOutput::structured(data.to_string(), data))
    }
}
