//! Deterministic text transform used to produce job output.
//!
//! The output has two segments joined by a single `/`:
//!
//! - left: for every distinct character of the input, in ascending code-point
//!   order, the character followed by its occurrence count in decimal;
//! - right: the standard (padded) base64 encoding of the input's UTF-8 bytes.
//!
//! Counting is case-sensitive and operates on Unicode scalar values, so `'A'`
//! (U+0041) sorts before `'a'` (U+0061).

use crate::common::error::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use core::fmt::Write as _;
use std::collections::BTreeMap;

/// Builds the output string for `input`.
///
/// Total over all inputs; the empty string maps to `"/"`.
pub fn build_output(input: &str) -> String {
    let mut tally: BTreeMap<char, usize> = BTreeMap::new();
    for ch in input.chars() {
        *tally.entry(ch).or_default() += 1;
    }

    let encoded = STANDARD.encode(input.as_bytes());
    let mut out = String::with_capacity(tally.len() * 2 + 1 + encoded.len());
    for (ch, count) in &tally {
        out.push(*ch);
        // Writing into a `String` cannot fail.
        let _ = write!(out, "{count}");
    }
    out.push('/');
    out.push_str(&encoded);
    out
}

/// Like [`build_output`], but for an input that may be absent.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when `input` is `None`. An empty string
/// is a valid, distinct input.
pub fn try_build_output(input: Option<&str>) -> Result<String> {
    input.map(build_output).ok_or_else(|| Error::absent("input"))
}

/// Number of units a job created from `input` will emit.
pub fn output_len(input: &str) -> usize {
    build_output(input).chars().count()
}

/// Canonical form of user-submitted text: trimmed, with `\r\n` and lone `\r`
/// folded into `\n`.
///
/// Server-sent events cannot carry a carriage return inside an event, so job
/// payloads are always built from normalized text.
pub fn normalize_input(raw: &str) -> String {
    raw.trim().replace("\r\n", "\n").replace('\r', "\n")
}
