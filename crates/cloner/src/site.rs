//! The record of one finished clone.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Generate a fresh site id (UUID v4, simple form).
pub fn new_site_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// The three asset kinds the cloner localizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Stylesheet,
    Script,
    Image,
}

impl AssetKind {
    /// Local filename for the `index`-th asset of this kind.
    ///
    /// `ext` is only used for images and must include the leading dot.
    pub fn file_name(&self, index: usize, ext: &str) -> String {
        match self {
            AssetKind::Stylesheet => format!("style-{index}.css"),
            AssetKind::Script => format!("script-{index}.js"),
            AssetKind::Image => format!("image-{index}{ext}"),
        }
    }
}

/// One reference found in the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub kind: AssetKind,
    /// Position among elements of the same kind, in document order.
    pub index: usize,
    /// The attribute value as found in the page.
    pub reference: String,
    pub resolved_url: String,
    /// `assets/<file>` when the asset was downloaded, `None` when the
    /// original reference was kept.
    pub local_path: Option<String>,
}

/// A clone written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClonedSite {
    pub site_id: String,
    pub output_dir: PathBuf,
    /// The URL assets were resolved against (differs from the requested
    /// URL when an iframe wrapper was followed).
    pub base_url: String,
    pub manifest: Vec<AssetRecord>,
}

impl ClonedSite {
    pub fn count(&self, kind: AssetKind) -> usize {
        self.manifest.iter().filter(|a| a.kind == kind).count()
    }

    /// Number of references that now point at a local file.
    pub fn localized(&self) -> usize {
        self.manifest
            .iter()
            .filter(|a| a.local_path.is_some())
            .count()
    }

    pub fn index_path(&self) -> PathBuf {
        self.output_dir.join("index.html")
    }
}
