//! Weather lookup via a wttr.in-compatible endpoint.

use async_trait::async_trait;
use copycat_core::error::ToolError;
use copycat_core::tool::{Tool, ToolContext, ToolOutput};
use tracing::debug;

const NAME: &str = "getWeatherDetailsByCity";

pub struct WeatherTool {
    base_url: String,
    client: reqwest::Client,
}

impl WeatherTool {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url_for(&self, city: &str) -> String {
        format!(
            "{}/{}?format=%C+%t",
            self.base_url,
            urlencoding::encode(&city.to_lowercase())
        )
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Returns the current weather of a given city."
    }

    fn input_description(&self) -> &str {
        "cityname: string"
    }

    async fn invoke(&self, input: &str, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let city = input.trim();
        if city.is_empty() {
            return Err(ToolError::InvalidInput("a city name is required".into()));
        }

        let url = self.url_for(city);
        debug!(url = %url, "Fetching weather");

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!(
                "weather service returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let data = response.text().await.map_err(|e| failed(e.to_string()))?;
        Ok(ToolOutput::text(format!(
            "The current weather of {city} is {}",
            data.trim()
        )))
    }
}
