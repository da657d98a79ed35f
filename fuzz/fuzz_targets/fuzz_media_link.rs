//! Fuzz target for media-link extraction and plain-text flattening.
//!
//! Both operations accept any rich-text representation (delta, JSON-encoded
//! delta, HTML, plain text) and must degrade gracefully on all of them.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_media_link -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use tasklink_core::richtext;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if text.len() > 64 * 1024 {
        return;
    }

    // Exercise the string path and, when the input parses, the JSON path.
    let as_string = serde_json::Value::String(text.to_string());
    if let Some(url) = richtext::extract_media_link(&as_string) {
        assert!(url.contains(richtext::CLIP_SHARE_HOST));
    }
    let _ = richtext::to_plain_text(&as_string);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if let Some(url) = richtext::extract_media_link(&value) {
            assert!(url.contains(richtext::CLIP_SHARE_HOST));
        }
        let _ = richtext::to_plain_text(&value);
    }
});
