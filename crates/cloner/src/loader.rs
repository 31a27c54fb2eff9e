//! Page loading through a headless browser.
//!
//! A [`PageLoader`] hands out a [`PageSession`] per clone. The session must
//! be closed on every path; [`crate::SiteCloner`] does that for you.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use copycat_config::ClonerConfig;
use copycat_core::error::CloneError;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::idle::{Idle, NetworkActivity, wait_for_network_idle};

/// Opens browser sessions.
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageSession>, CloneError>;
}

/// One live browser session.
#[async_trait]
pub trait PageSession: Send {
    /// Navigate to `url`, wait for it to load, and return the serialized
    /// document.
    async fn navigate(&mut self, url: &str) -> Result<String, CloneError>;

    /// Release the session's resources.
    async fn close(self: Box<Self>);
}

/// Launches a local Chromium per session.
#[derive(Debug, Clone)]
pub struct ChromiumLoader {
    executable: Option<PathBuf>,
    headless: bool,
    user_agent: String,
    load_timeout: Duration,
    settle: Duration,
}

impl ChromiumLoader {
    pub fn from_config(config: &ClonerConfig) -> Self {
        Self {
            executable: config.chrome_executable.clone(),
            headless: config.headless,
            user_agent: config.user_agent.clone(),
            load_timeout: Duration::from_secs(config.load_timeout_secs),
            settle: Duration::from_millis(config.settle_millis),
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, CloneError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.load_timeout)
            .arg(format!("--user-agent={}", self.user_agent));

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(CloneError::Browser)
    }
}

#[async_trait]
impl PageLoader for ChromiumLoader {
    async fn open(&self) -> Result<Box<dyn PageSession>, CloneError> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| CloneError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(CloneError::Browser(format!("failed to open page: {e}")));
            }
        };

        debug!("Chromium session opened");
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
            load_timeout: self.load_timeout,
            settle: self.settle,
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    load_timeout: Duration,
    settle: Duration,
}

fn observe_error(e: impl std::fmt::Display) -> CloneError {
    CloneError::Browser(format!("cannot observe network activity: {e}"))
}

impl ChromiumSession {
    /// Request start/end events for the page, merged into one stream.
    async fn network_activity(&self) -> Result<BoxStream<'static, NetworkActivity>, CloneError> {
        let started = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(observe_error)?
            .map(|e| NetworkActivity::Started(e.request_id.inner().clone()));
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(observe_error)?
            .map(|e| NetworkActivity::Finished(e.request_id.inner().clone()));
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(observe_error)?
            .map(|e| NetworkActivity::Finished(e.request_id.inner().clone()));

        Ok(futures::stream::select(started, futures::stream::select(finished, failed)).boxed())
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<String, CloneError> {
        let page_load = |reason: String| CloneError::PageLoad {
            url: url.to_string(),
            reason,
        };

        // Subscribe first so requests made during the load are counted.
        let activity = self.network_activity().await?;
        let started = Instant::now();

        // `goto` resolves once the frame has fired its load event.
        let load = async { self.page.goto(url).await.map(|_| ()).map_err(|e| e.to_string()) };

        match tokio::time::timeout(self.load_timeout, load).await {
            Err(_) => {
                return Err(page_load(format!(
                    "timed out after {}s",
                    self.load_timeout.as_secs()
                )));
            }
            Ok(Err(reason)) => return Err(page_load(reason)),
            Ok(Ok(())) => {}
        }

        // Late requests (XHR, lazy images, fonts) get the rest of the load
        // budget, and at least one quiet window, to finish.
        let limit = self
            .load_timeout
            .saturating_sub(started.elapsed())
            .max(self.settle * 2);
        match wait_for_network_idle(activity, self.settle, limit).await {
            Idle::Reached => debug!(url = %url, "Network idle"),
            Idle::TimedOut => {
                warn!(url = %url, "Network still busy at load timeout, serializing anyway")
            }
        }

        self.page
            .content()
            .await
            .map_err(|e| page_load(e.to_string()))
    }

    async fn close(self: Box<Self>) {
        let mut session = self;
        if let Err(e) = session.browser.close().await {
            warn!(error = %e, "Failed to close browser cleanly");
        }
        let _ = session.browser.wait().await;
        session.handler_task.abort();
        debug!("Chromium session closed");
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
