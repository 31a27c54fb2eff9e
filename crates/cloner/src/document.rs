//! HTML scanning, rewriting and normalization.
//!
//! Both passes use the same selectors in the same document order, so the
//! `index`-th element seen by [`scan`] is the `index`-th element seen by
//! [`rewrite`].

use std::collections::HashMap;

use copycat_core::error::CloneError;
use lol_html::{RewriteStrSettings, element, rewrite_str};

use crate::site::AssetKind;

const STYLESHEET_SELECTOR: &str = r#"link[rel~="stylesheet"]"#;
const SCRIPT_SELECTOR: &str = "script[src]";
const IMAGE_SELECTOR: &str = "img[src]";

/// Body children that do not count when deciding whether a page is only
/// an iframe wrapper.
const NON_CONTENT_TAGS: &[&str] = &["script", "noscript", "style", "link", "template"];

/// Replacement attribute values keyed by asset kind and index.
pub type Replacements = HashMap<(AssetKind, usize), String>;

#[derive(Debug, Clone)]
struct BodyChild {
    tag: String,
    src: Option<String>,
}

/// References found in one page, per kind, in document order.
///
/// An element with an empty or missing reference still occupies its
/// index; its entry is the empty string.
#[derive(Debug, Clone, Default)]
pub struct PageScan {
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
    pub images: Vec<String>,
    body_children: Vec<BodyChild>,
}

impl PageScan {
    pub fn references(&self, kind: AssetKind) -> &[String] {
        match kind {
            AssetKind::Stylesheet => &self.stylesheets,
            AssetKind::Script => &self.scripts,
            AssetKind::Image => &self.images,
        }
    }

    /// The `src` of the iframe when it is the body's only content element.
    pub fn iframe_source(&self) -> Option<&str> {
        let mut content = self
            .body_children
            .iter()
            .filter(|c| !NON_CONTENT_TAGS.contains(&c.tag.as_str()));

        let only = content.next()?;
        if content.next().is_some() || only.tag != "iframe" {
            return None;
        }
        only.src.as_deref().filter(|s| !s.trim().is_empty())
    }
}

fn rewrite_error(e: impl std::fmt::Display) -> CloneError {
    CloneError::Rewrite(e.to_string())
}

/// Collect asset references and body structure from `html`.
pub fn scan(html: &str) -> Result<PageScan, CloneError> {
    let mut stylesheets = Vec::new();
    let mut scripts = Vec::new();
    let mut images = Vec::new();
    let mut body_children = Vec::new();

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(STYLESHEET_SELECTOR, |el| {
                    stylesheets.push(el.get_attribute("href").unwrap_or_default());
                    Ok(())
                }),
                element!(SCRIPT_SELECTOR, |el| {
                    scripts.push(el.get_attribute("src").unwrap_or_default());
                    Ok(())
                }),
                element!(IMAGE_SELECTOR, |el| {
                    images.push(el.get_attribute("src").unwrap_or_default());
                    Ok(())
                }),
                element!("body > *", |el| {
                    body_children.push(BodyChild {
                        tag: el.tag_name().to_ascii_lowercase(),
                        src: el.get_attribute("src"),
                    });
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)?;

    Ok(PageScan {
        stylesheets,
        scripts,
        images,
        body_children,
    })
}

/// Point every element with an entry in `replacements` at its new value.
/// Everything else is left byte-for-byte as it was.
pub fn rewrite(html: &str, replacements: &Replacements) -> Result<String, CloneError> {
    let mut style_index = 0usize;
    let mut script_index = 0usize;
    let mut image_index = 0usize;

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(STYLESHEET_SELECTOR, |el| {
                    if let Some(path) = replacements.get(&(AssetKind::Stylesheet, style_index)) {
                        el.set_attribute("href", path)?;
                    }
                    style_index += 1;
                    Ok(())
                }),
                element!(SCRIPT_SELECTOR, |el| {
                    if let Some(path) = replacements.get(&(AssetKind::Script, script_index)) {
                        el.set_attribute("src", path)?;
                    }
                    script_index += 1;
                    Ok(())
                }),
                element!(IMAGE_SELECTOR, |el| {
                    if let Some(path) = replacements.get(&(AssetKind::Image, image_index)) {
                        el.set_attribute("src", path)?;
                    }
                    image_index += 1;
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)
}

fn has_doctype(html: &str) -> bool {
    html.trim_start()
        .get(..9)
        .is_some_and(|s| s.eq_ignore_ascii_case("<!doctype"))
}

/// Elements whose text content is whitespace-sensitive.
const VERBATIM_TAGS: &[&str] = &["pre", "textarea", "script", "style"];

/// Byte ranges of `VERBATIM_TAGS` elements, open tag through close tag, in
/// document order. An unclosed element runs to the end of the input.
fn verbatim_ranges(html: &str) -> Vec<(usize, usize)> {
    let lower = html.to_ascii_lowercase();
    let mut ranges = Vec::new();
    let mut pos = 0;

    loop {
        let next = VERBATIM_TAGS
            .iter()
            .filter_map(|tag| find_open_tag(&lower, pos, tag).map(|at| (at, *tag)))
            .min_by_key(|(at, _)| *at);
        let Some((start, tag)) = next else { break };

        let close = format!("</{tag}");
        let body = start + tag.len() + 1;
        let end = match lower[body..].find(&close) {
            Some(rel) => {
                let close_at = body + rel;
                lower[close_at..]
                    .find('>')
                    .map_or(lower.len(), |gt| close_at + gt + 1)
            }
            None => lower.len(),
        };
        ranges.push((start, end));
        pos = end;
    }

    ranges
}

/// Position of `<tag` at or after `from`, where the name is not just a
/// prefix of a longer one (`<pre` but not `<preview`).
fn find_open_tag(lower: &str, from: usize, tag: &str) -> Option<usize> {
    let needle = format!("<{tag}");
    let mut pos = from;
    while let Some(rel) = lower[pos..].find(&needle) {
        let at = pos + rel;
        let after = at + needle.len();
        match lower[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_ascii_whitespace() => return Some(at),
            None => return Some(at),
            _ => pos = after,
        }
    }
    None
}

/// Line state carried across verbatim elements.
struct LineCleaner {
    out: String,
    at_line_start: bool,
    previous_blank: bool,
}

impl LineCleaner {
    fn markup(&mut self, text: &str) {
        for piece in text.split_inclusive('\n') {
            match piece.strip_suffix('\n') {
                Some(line) => {
                    let line = line.trim_end();
                    if self.at_line_start && line.is_empty() {
                        if self.previous_blank {
                            continue;
                        }
                        self.previous_blank = true;
                    } else {
                        self.previous_blank = false;
                    }
                    self.out.push_str(line);
                    self.out.push('\n');
                    self.at_line_start = true;
                }
                None => self.verbatim(piece),
            }
        }
    }

    fn verbatim(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.out.push_str(text);
        self.at_line_start = text.ends_with('\n');
        self.previous_blank = false;
    }
}

/// Stable textual form of a page: doctype present, `\n` line endings, no
/// trailing whitespace, no runs of blank lines, one final newline.
///
/// The contents of `pre`, `textarea`, `script` and `style` are left as they
/// are. Applying it twice gives the same result as applying it once.
pub fn normalize_html(html: &str) -> String {
    let unified = html.replace("\r\n", "\n").replace('\r', "\n");
    let mut cleaner = LineCleaner {
        out: String::with_capacity(unified.len() + 16),
        at_line_start: true,
        // Start as if after a blank line so leading blanks are dropped.
        previous_blank: true,
    };

    if !has_doctype(&unified) {
        cleaner.out.push_str("<!DOCTYPE html>\n");
    }

    let mut pos = 0;
    for (start, end) in verbatim_ranges(&unified) {
        cleaner.markup(&unified[pos..start]);
        cleaner.verbatim(&unified[start..end]);
        pos = end;
    }
    cleaner.markup(&unified[pos..]);

    let mut out = cleaner.out;
    while out.ends_with("\n\n") {
        out.pop();
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
