//! Rich-text translation between the tracker's delta format and CRM HTML.
//!
//! The tracker stores task descriptions as a delta: an ordered list of
//! `insert` operations, optionally carrying a `link` attribute. The CRM stores
//! bodies as HTML. Conversion is best-effort and lossy by design: text and
//! links survive, everything else degrades to plain text. Every function here
//! is total — unparsable input falls back to plain text, it never errors.
//!
//! A single embedded media-share link (a clip recording) is special-cased:
//! it is carried across systems as a "watch clip" call-to-action rather than
//! being flattened with the rest of the formatting.

use std::sync::OnceLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Host of the media-share service whose links are preserved verbatim.
pub const CLIP_SHARE_HOST: &str = "fathom.video";

/// Label used for the clip call-to-action in both systems.
pub const CLIP_CTA_LABEL: &str = "WATCH FATHOM CLIP";

fn clip_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"https://fathom\.video/share/[^\s"<]+"#).expect("clip URL pattern is valid")
    })
}

/// A delta rich-text document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub ops: Vec<DeltaOp>,
}

/// One insert operation of a delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaOp {
    #[serde(default)]
    pub insert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<OpAttributes>,
}

/// Attributes attached to an insert operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Delta {
    /// Concatenate the text of all insert operations.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.ops.iter().map(|op| op.insert.as_str()).collect()
    }
}

impl DeltaOp {
    fn text(insert: impl Into<String>) -> Self {
        DeltaOp {
            insert: insert.into(),
            attributes: None,
        }
    }

    fn linked(insert: impl Into<String>, link: impl Into<String>) -> Self {
        DeltaOp {
            insert: insert.into(),
            attributes: Some(OpAttributes {
                link: Some(link.into()),
            }),
        }
    }

    fn link(&self) -> Option<&str> {
        self.attributes.as_ref()?.link.as_deref()
    }
}

/// Whether a JSON value has the shape of a delta document.
#[must_use]
pub fn is_likely_delta(value: &serde_json::Value) -> bool {
    value.get("ops").is_some_and(serde_json::Value::is_array)
}

/// Convert an HTML fragment into a delta.
///
/// Text nodes become plain inserts; anchor elements become inserts carrying a
/// `link` attribute equal to the href. All other markup is dropped. Deltas are
/// newline-terminated by convention, so a trailing newline op is always
/// appended. Malformed HTML degrades to a single tag-stripped insert.
#[must_use]
pub fn delta_from_html(html: &str) -> Delta {
    let mut ops = Vec::new();
    let mut reader = Reader::from_str(html);
    reader.config_mut().check_end_names = false;

    let mut link_depth = 0usize;
    let mut current_link: Option<String> = None;
    let mut degraded = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"a" {
                    link_depth += 1;
                    if link_depth == 1 {
                        current_link = e.attributes().flatten().find_map(|attr| {
                            (attr.key.as_ref() == b"href")
                                .then(|| attr.unescape_value().unwrap_or_default().to_string())
                        });
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"a" && link_depth > 0 {
                    link_depth -= 1;
                    if link_depth == 0 {
                        current_link = None;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|cow| cow.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                if !text.is_empty() {
                    push_text(&mut ops, text, current_link.as_deref());
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                if !text.is_empty() {
                    push_text(&mut ops, text, current_link.as_deref());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => {
                degraded = true;
                break;
            }
            Ok(_) => {}
        }
    }

    if degraded {
        ops.clear();
        let stripped = strip_tags(html);
        if !stripped.is_empty() {
            ops.push(DeltaOp::text(stripped));
        }
    }

    ops.push(DeltaOp::text("\n"));
    Delta { ops }
}

fn push_text(ops: &mut Vec<DeltaOp>, text: String, link: Option<&str>) {
    match link {
        Some(href) => ops.push(DeltaOp::linked(text, href)),
        None => ops.push(DeltaOp::text(text)),
    }
}

/// Render a delta as HTML, if and only if it embeds a media-share link.
///
/// Returns a single anchor labelled as the clip call-to-action. Deltas without
/// a clip link return `None`; callers fall back to plain concatenation.
#[must_use]
pub fn html_from_delta(delta: &Delta) -> Option<String> {
    let href = delta
        .ops
        .iter()
        .find_map(|op| op.link().filter(|link| clip_url_regex().is_match(link)))?;
    Some(format!(
        r#"<a href="{href}" target="_blank" style="font-size: 18.5px;">{CLIP_CTA_LABEL}</a>"#
    ))
}

/// The canonical clip call-to-action document for a share URL.
#[must_use]
pub fn build_clip_delta(url: &str) -> Delta {
    Delta {
        ops: vec![DeltaOp::linked(CLIP_CTA_LABEL, url), DeltaOp::text("\n")],
    }
}

/// Whether a delta is a clip call-to-action produced by [`build_clip_delta`].
#[must_use]
pub fn is_clip_content(delta: &Delta) -> bool {
    delta.ops.iter().any(|op| {
        op.insert.contains(CLIP_CTA_LABEL)
            && op.link().is_some_and(|link| link.contains(CLIP_SHARE_HOST))
    })
}

/// Extract the media-share URL from any rich-text representation.
///
/// Accepts a delta object, a JSON-encoded delta, an HTML fragment, or plain
/// text; the same URL pattern is matched in all cases.
#[must_use]
pub fn extract_media_link(content: &serde_json::Value) -> Option<String> {
    match content {
        serde_json::Value::String(s) => {
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(s) {
                if is_likely_delta(&parsed) {
                    if let Some(url) = link_from_delta_value(&parsed) {
                        return Some(url);
                    }
                }
            }
            clip_url_regex().find(s).map(|m| m.as_str().to_string())
        }
        value if is_likely_delta(value) => link_from_delta_value(value).or_else(|| {
            // Links can also sit in insert text rather than attributes.
            clip_url_regex()
                .find(&to_plain_text(value))
                .map(|m| m.as_str().to_string())
        }),
        _ => None,
    }
}

fn link_from_delta_value(value: &serde_json::Value) -> Option<String> {
    let ops = value.get("ops")?.as_array()?;
    ops.iter().find_map(|op| {
        let link = op.get("attributes")?.get("link")?.as_str()?;
        link.contains(CLIP_SHARE_HOST).then(|| link.to_string())
    })
}

/// Flatten any rich-text representation to plain text.
#[must_use]
pub fn to_plain_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => {
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(s) {
                if is_likely_delta(&parsed) {
                    return delta_value_text(&parsed);
                }
            }
            if s.contains('<') {
                return delta_from_html(s).plain_text().trim().to_string();
            }
            s.trim().to_string()
        }
        value if is_likely_delta(value) => delta_value_text(value),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn delta_value_text(value: &serde_json::Value) -> String {
    let Some(ops) = value.get("ops").and_then(serde_json::Value::as_array) else {
        return String::new();
    };
    ops.iter()
        .filter_map(|op| op.get("insert").and_then(serde_json::Value::as_str))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Remove markup without parsing: everything between angle brackets is dropped.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}
