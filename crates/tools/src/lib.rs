//! Built-in tool implementations for CopyCat.
//!
//! Tools give the agent the ability to interact with the world:
//! check the weather, look up a GitHub user, run a command, and clone a
//! website for offline editing.

pub mod github;
pub mod shell;
pub mod weather;
pub mod web_cloner;

use std::sync::Arc;

use copycat_config::AppConfig;
use copycat_core::tool::ToolRegistry;

/// Create the tool registry described by `config`.
///
/// Security defaults:
/// - Shell: only read-only inspection commands, no shell operators,
///   bounded runtime and output, pinned working directory
/// - Cloner: every clone lands in a fresh directory under `output_root`
pub fn default_registry(config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(weather::WeatherTool::new(
        &config.tools.weather_base_url,
    )));
    registry.register(Box::new(github::GithubUserTool::new(
        &config.tools.github_base_url,
        &config.cloner.user_agent,
    )));

    if config.tools.shell.enabled {
        let working_dir = config
            .tools
            .shell
            .working_dir
            .clone()
            .unwrap_or_else(|| config.cloner.output_root.clone());
        registry.register(Box::new(shell::ShellTool::from_config(
            &config.tools.shell,
            working_dir,
        )));
    }

    registry.register(Box::new(web_cloner::WebClonerTool::new(
        Arc::new(copycat_cloner::from_config(&config.cloner)),
        config.cloner.output_root.clone(),
    )));

    registry
}
