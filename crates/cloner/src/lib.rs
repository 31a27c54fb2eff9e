//! # CopyCat Cloner
//!
//! Produces a self-contained offline copy of a web page:
//!
//! 1. load the page in a headless browser ([`PageLoader`]) and wait for
//!    the network to go idle
//! 2. follow a body-level iframe wrapper to the real document
//! 3. download stylesheets, scripts and images ([`AssetFetcher`])
//! 4. point every localized reference at `assets/<file>`
//! 5. write a normalized `index.html`
//!
//! Loading and fetching sit behind traits so the pipeline can be driven
//! without a browser or network.

pub mod cloner;
pub mod document;
pub mod fetcher;
pub mod idle;
pub mod loader;
pub mod resolver;
pub mod site;

pub use cloner::SiteCloner;
pub use fetcher::{AssetFetcher, HttpFetcher};
pub use loader::{ChromiumLoader, PageLoader, PageSession};
pub use site::{AssetKind, AssetRecord, ClonedSite, new_site_id};

use std::sync::Arc;

use copycat_config::ClonerConfig;

/// Build the production cloner (Chromium + reqwest) from config.
pub fn from_config(config: &ClonerConfig) -> SiteCloner {
    SiteCloner::new(
        Arc::new(ChromiumLoader::from_config(config)),
        Arc::new(HttpFetcher::from_config(config)),
    )
}
