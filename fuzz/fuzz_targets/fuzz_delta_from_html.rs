//! Fuzz target for the HTML → delta converter.
//!
//! The converter is total by contract: any byte soup must produce a
//! newline-terminated delta, never a panic.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_delta_from_html -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use tasklink_core::richtext;

fuzz_target!(|data: &[u8]| {
    let Ok(html) = std::str::from_utf8(data) else {
        return;
    };
    if html.len() > 64 * 1024 {
        return;
    }

    let delta = richtext::delta_from_html(html);

    // Deltas are newline-terminated by convention.
    assert_eq!(delta.ops.last().map(|op| op.insert.as_str()), Some("\n"));

    // Flattening the result must also be total.
    let _ = delta.plain_text();
    let _ = richtext::html_from_delta(&delta);
});
