//! Links appended to a reply after a successful clone.

/// Preview and download links for a cloned site, appended to the final
/// reply. `output_dir` is the clone directory the download endpoint zips.
pub fn clone_links(site_id: &str, output_dir: &str) -> String {
    let download_dir = urlencoding::encode(output_dir);
    format!(
        r#"

<div class="flex gap-3 mt-2">
  <a href="/editor/{site_id}" target="_blank" class="inline-flex items-center justify-center px-4 py-2 text-sm font-medium text-white bg-blue-600 rounded-lg shadow hover:bg-blue-700">Preview Site</a>
  <a href="/api/download-zip?dir={download_dir}" target="_blank" class="inline-flex items-center justify-center px-4 py-2 text-sm font-medium text-white bg-green-600 rounded-lg shadow hover:bg-green-700">Download ZIP</a>
</div>
"#
    )
}

/// The default on-disk location of a clone, as the download endpoint
/// expects it.
pub fn default_clone_dir(site_id: &str) -> String {
    format!("./public/cloned-sites/{site_id}")
}
