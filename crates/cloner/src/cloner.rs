//! The cloning pipeline.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use copycat_core::error::CloneError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::document::{self, Replacements};
use crate::fetcher::AssetFetcher;
use crate::loader::{PageLoader, PageSession};
use crate::resolver::{image_extension, is_web_url, resolve};
use crate::site::{AssetKind, AssetRecord, ClonedSite};

const ASSET_KINDS: [AssetKind; 3] = [AssetKind::Stylesheet, AssetKind::Script, AssetKind::Image];

/// Clones pages into `output_dir/index.html` + `output_dir/assets/`.
///
/// Only a page that cannot be loaded fails the clone. Individual asset
/// failures leave the original reference in place.
pub struct SiteCloner {
    loader: Arc<dyn PageLoader>,
    fetcher: Arc<dyn AssetFetcher>,
}

impl SiteCloner {
    pub fn new(loader: Arc<dyn PageLoader>, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { loader, fetcher }
    }

    /// Clone `url` into `output_dir`.
    ///
    /// The browser session is closed before returning, whatever the outcome.
    pub async fn clone_site(
        &self,
        url: &str,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ClonedSite, CloneError> {
        let mut session = cancellable(cancel, self.loader.open()).await?;
        let result = self
            .clone_with(session.as_mut(), url, output_dir, cancel)
            .await;
        session.close().await;
        result
    }

    async fn clone_with(
        &self,
        session: &mut dyn PageSession,
        url: &str,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ClonedSite, CloneError> {
        info!(url = %url, output = %output_dir.display(), "Cloning site");

        let mut base_url = url.to_string();
        let mut html = cancellable(cancel, session.navigate(url)).await?;
        let mut page = document::scan(&html)?;

        if let Some(src) = page.iframe_source() {
            let target = resolve(&base_url, src);
            if is_web_url(&target) {
                info!(iframe = %target, "Page is an iframe wrapper, loading its source");
                html = cancellable(cancel, session.navigate(&target)).await?;
                page = document::scan(&html)?;
                base_url = target;
            } else {
                debug!(iframe = %target, "Ignoring non-http iframe source");
            }
        }

        let assets_dir = output_dir.join("assets");
        tokio::fs::create_dir_all(&assets_dir)
            .await
            .map_err(|e| io_error(&assets_dir, e))?;

        let mut manifest = Vec::new();
        let mut replacements = Replacements::new();

        for kind in ASSET_KINDS {
            for (index, reference) in page.references(kind).iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(CloneError::Cancelled);
                }
                if reference.trim().is_empty() {
                    continue;
                }

                let resolved_url = resolve(&base_url, reference);
                let ext = match kind {
                    AssetKind::Image => image_extension(&resolved_url),
                    _ => String::new(),
                };
                let file_name = kind.file_name(index, &ext);
                let target = assets_dir.join(&file_name);

                let local_path = match self.download(&resolved_url, &target, cancel).await {
                    Ok(bytes) => {
                        debug!(kind = ?kind, index, url = %resolved_url, bytes, "Localized asset");
                        let local = format!("assets/{file_name}");
                        replacements.insert((kind, index), local.clone());
                        Some(local)
                    }
                    Err(CloneError::Cancelled) => return Err(CloneError::Cancelled),
                    Err(e) => {
                        warn!(kind = ?kind, index, error = %e, "Keeping original reference");
                        None
                    }
                };

                manifest.push(AssetRecord {
                    kind,
                    index,
                    reference: reference.clone(),
                    resolved_url,
                    local_path,
                });
            }
        }

        let rewritten = document::rewrite(&html, &replacements)?;
        let index_path = output_dir.join("index.html");
        tokio::fs::write(&index_path, document::normalize_html(&rewritten))
            .await
            .map_err(|e| io_error(&index_path, e))?;

        let site = ClonedSite {
            site_id: output_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            output_dir: output_dir.to_path_buf(),
            base_url,
            manifest,
        };

        info!(
            site_id = %site.site_id,
            found = site.manifest.len(),
            localized = site.localized(),
            "Clone written"
        );
        Ok(site)
    }

    /// Fetch one asset and write it to `target`. Returns the byte count.
    async fn download(
        &self,
        url: &str,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<usize, CloneError> {
        let bytes = cancellable(cancel, self.fetcher.fetch(url)).await?;
        tokio::fs::write(target, &bytes)
            .await
            .map_err(|e| io_error(target, e))?;
        Ok(bytes.len())
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, CloneError>>,
) -> Result<T, CloneError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CloneError::Cancelled),
        result = fut => result,
    }
}

fn io_error(path: &Path, e: std::io::Error) -> CloneError {
    CloneError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed HTML per URL and counts session lifecycle calls.
    #[derive(Default)]
    struct StaticPages {
        pages: HashMap<String, String>,
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl StaticPages {
        fn with(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    struct StaticSession {
        pages: HashMap<String, String>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PageLoader for StaticPages {
        async fn open(&self) -> Result<Box<dyn PageSession>, CloneError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StaticSession {
                pages: self.pages.clone(),
                closed: self.closed.clone(),
            }))
        }
    }

    #[async_trait]
    impl PageSession for StaticSession {
        async fn navigate(&mut self, url: &str) -> Result<String, CloneError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| CloneError::PageLoad {
                    url: url.to_string(),
                    reason: "net::ERR_NAME_NOT_RESOLVED".into(),
                })
        }

        async fn close(self: Box<Self>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MapFetcher {
        assets: HashMap<String, Vec<u8>>,
    }

    impl MapFetcher {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.assets.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }
    }

    #[async_trait]
    impl AssetFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, CloneError> {
            self.assets
                .get(url)
                .cloned()
                .ok_or_else(|| CloneError::Fetch {
                    url: url.to_string(),
                    reason: "HTTP 404".into(),
                })
        }
    }

    const SHOP: &str = r#"<!DOCTYPE html>
<html><head>
<link rel="stylesheet" href="/css/main.css">
<link rel="stylesheet" href="https://cdn.example.net/theme.css">
<script src="js/app.js"></script>
</head><body>
<h1>Shop</h1>
<img src="img/a.jpg">
<img src="img/b">
<img src="//cdn.example.net/c.svg">
</body></html>"#;

    fn shop_fetcher() -> MapFetcher {
        MapFetcher::default()
            .with("https://shop.example.com/css/main.css", "body{}")
            .with("https://cdn.example.net/theme.css", ".x{}")
            .with("https://shop.example.com/js/app.js", "run()")
            .with("https://shop.example.com/img/a.jpg", "A")
            .with("https://shop.example.com/img/b", "B")
            .with("https://cdn.example.net/c.svg", "<svg/>")
    }

    fn cloner(pages: StaticPages, fetcher: MapFetcher) -> (SiteCloner, Arc<AtomicUsize>) {
        let closed = pages.closed.clone();
        (SiteCloner::new(Arc::new(pages), Arc::new(fetcher)), closed)
    }

    #[tokio::test]
    async fn localizes_every_reachable_asset() {
        let pages = StaticPages::default().with("https://shop.example.com/", SHOP);
        let (cloner, closed) = cloner(pages, shop_fetcher());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("site-1");

        let site = cloner
            .clone_site("https://shop.example.com/", &out, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(site.site_id, "site-1");
        assert_eq!(site.count(AssetKind::Stylesheet), 2);
        assert_eq!(site.count(AssetKind::Script), 1);
        assert_eq!(site.count(AssetKind::Image), 3);
        assert_eq!(site.localized(), 6);

        let files: Vec<String> = std::fs::read_dir(out.join("assets"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 6);
        for expected in [
            "style-0.css",
            "style-1.css",
            "script-0.js",
            "image-0.jpg",
            "image-1.png",
            "image-2.svg",
        ] {
            assert!(files.contains(&expected.to_string()), "missing {expected}");
        }

        let index = std::fs::read_to_string(site.index_path()).unwrap();
        assert_eq!(index.matches("assets/").count(), 6);
        assert!(index.contains(r#"href="assets/style-1.css""#));
        assert!(index.contains(r#"src="assets/image-1.png""#));
        assert!(index.ends_with("</html>\n"));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_asset_keeps_original_reference() {
        let html = r#"<html><body>
<img src="/one.png"><img src="/two.png"><img src="/three.png">
</body></html>"#;
        let pages = StaticPages::default().with("https://example.com/", html);
        let fetcher = MapFetcher::default()
            .with("https://example.com/one.png", "1")
            .with("https://example.com/three.png", "3");
        let (cloner, _) = cloner(pages, fetcher);
        let dir = tempfile::tempdir().unwrap();

        let site = cloner
            .clone_site("https://example.com/", dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(site.localized(), 2);
        assert!(site.manifest[1].local_path.is_none());

        let index = std::fs::read_to_string(site.index_path()).unwrap();
        assert!(index.contains(r#"src="assets/image-0.png""#));
        assert!(index.contains(r#"src="/two.png""#));
        assert!(index.contains(r#"src="assets/image-2.png""#));
        assert!(!dir.path().join("assets/image-1.png").exists());
    }

    #[tokio::test]
    async fn follows_iframe_wrapper() {
        let wrapper = r#"<html><head></head><body>
<iframe src="https://real.example.com" style="border:0"></iframe>
<script src="/tracker.js"></script>
</body></html>"#;
        let real = r#"<html><head><link rel="stylesheet" href="/main.css"></head><body><p>real</p></body></html>"#;
        let pages = StaticPages::default()
            .with("https://wrapper.example.com/", wrapper)
            .with("https://real.example.com/", real);
        let fetcher = MapFetcher::default().with("https://real.example.com/main.css", "p{}");
        let (cloner, _) = cloner(pages, fetcher);
        let dir = tempfile::tempdir().unwrap();

        let site = cloner
            .clone_site(
                "https://wrapper.example.com/",
                dir.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(site.base_url, "https://real.example.com/");
        assert_eq!(site.manifest.len(), 1);
        assert_eq!(
            site.manifest[0].resolved_url,
            "https://real.example.com/main.css"
        );
        let index = std::fs::read_to_string(site.index_path()).unwrap();
        assert!(index.contains("<p>real</p>"));
        assert!(!index.contains("iframe"));
    }

    #[tokio::test]
    async fn non_web_iframe_source_is_not_followed() {
        for src in ["about:blank", "javascript:void(0)"] {
            let wrapper = format!(
                r#"<html><head><link rel="stylesheet" href="/main.css"></head><body><iframe src="{src}"></iframe></body></html>"#
            );
            let pages = StaticPages::default().with("https://wrapper.example.com/", &wrapper);
            let fetcher =
                MapFetcher::default().with("https://wrapper.example.com/main.css", "p{}");
            let (cloner, _) = cloner(pages, fetcher);
            let dir = tempfile::tempdir().unwrap();

            let site = cloner
                .clone_site(
                    "https://wrapper.example.com/",
                    dir.path(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            assert_eq!(site.base_url, "https://wrapper.example.com/", "src: {src}");
            assert_eq!(site.localized(), 1);
            let index = std::fs::read_to_string(site.index_path()).unwrap();
            assert!(index.contains(&format!(r#"<iframe src="{src}">"#)));
        }
    }

    #[tokio::test]
    async fn cloning_twice_gives_equivalent_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut indexes = Vec::new();
        let mut listings = Vec::new();

        for name in ["first", "second"] {
            let pages = StaticPages::default().with("https://shop.example.com/", SHOP);
            let (cloner, _) = cloner(pages, shop_fetcher());
            let out = dir.path().join(name);
            let site = cloner
                .clone_site("https://shop.example.com/", &out, &CancellationToken::new())
                .await
                .unwrap();

            let mut files: Vec<(String, Vec<u8>)> = std::fs::read_dir(out.join("assets"))
                .unwrap()
                .map(|e| {
                    let e = e.unwrap();
                    (
                        e.file_name().to_string_lossy().into_owned(),
                        std::fs::read(e.path()).unwrap(),
                    )
                })
                .collect();
            files.sort();
            listings.push(files);
            indexes.push(std::fs::read_to_string(site.index_path()).unwrap());
        }

        assert_eq!(listings[0], listings[1]);
        assert_eq!(indexes[0], indexes[1]);
    }

    #[tokio::test]
    async fn unreachable_page_fails_and_releases_session() {
        let pages = StaticPages::default();
        let opened = pages.opened.clone();
        let (cloner, closed) = cloner(pages, MapFetcher::default());
        let dir = tempfile::tempdir().unwrap();

        let err = cloner
            .clone_site(
                "https://nowhere.invalid/",
                &dir.path().join("x"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CloneError::PageLoad { .. }));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("x").exists());
    }

    #[tokio::test]
    async fn cancelled_clone_stops() {
        let pages = StaticPages::default().with("https://shop.example.com/", SHOP);
        let (cloner, _) = cloner(pages, shop_fetcher());
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cloner
            .clone_site("https://shop.example.com/", dir.path(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::Cancelled));
    }
}
