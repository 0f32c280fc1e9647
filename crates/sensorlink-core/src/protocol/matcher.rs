//! Response line matchers
//!
//! Each matcher maps one response line to at most one [`FieldUpdate`]. The
//! exchange loop folds the updates of every line into an [`ExchangeResult`].

use regex::Regex;
use std::sync::OnceLock;

use super::ExchangeResult;

/// Marker preceding the X prediction
pub const PREDICTED_X_MARKER: &str = "Predicted X:";
/// Marker preceding the Y prediction
pub const PREDICTED_Y_MARKER: &str = "Predicted Y:";
/// Marker preceding the inference timing
pub const INFERENCE_TIME_MARKER: &str = "Inference time:";

/// A single field value extracted from a line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldUpdate {
    /// Value after `Predicted X:`
    PredictedX(f64),
    /// Value after `Predicted Y:`
    PredictedY(f64),
    /// Value after `Inference time:`, in microseconds
    InferenceTimeUs(u64),
}

/// Maps a line to zero or one field update
pub type Matcher = fn(&str) -> Option<FieldUpdate>;

/// All matchers, applied independently to every line
pub const MATCHERS: [Matcher; 3] = [match_predicted_x, match_predicted_y, match_inference_time];

struct Patterns {
    predicted_x: Regex,
    predicted_y: Regex,
    time_us: Regex,
    time_ms: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Patterns are literals; a failure here is a programming error.
        let compile = |p: &str| Regex::new(p).expect("static response pattern");
        Patterns {
            predicted_x: compile(r"Predicted X:\s*([-+]?\d*\.?\d+)"),
            predicted_y: compile(r"Predicted Y:\s*([-+]?\d*\.?\d+)"),
            // u, Greek mu, micro sign, or the replacement char a Latin-1 micro sign decodes to
            time_us: compile(r"Inference time:\s*(\d+)\s*[uμµ\x{FFFD}]s"),
            time_ms: compile(r"Inference time:\s*([-+]?\d*\.?\d+)\s*ms"),
        }
    })
}

fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line)?.get(1).map(|m| m.as_str())
}

/// `Predicted X: <number>`
pub fn match_predicted_x(line: &str) -> Option<FieldUpdate> {
    if !line.contains(PREDICTED_X_MARKER) {
        return None;
    }
    let value = capture(&patterns().predicted_x, line)?.parse().ok()?;
    Some(FieldUpdate::PredictedX(value))
}

/// `Predicted Y: <number>`
pub fn match_predicted_y(line: &str) -> Option<FieldUpdate> {
    if !line.contains(PREDICTED_Y_MARKER) {
        return None;
    }
    let value = capture(&patterns().predicted_y, line)?.parse().ok()?;
    Some(FieldUpdate::PredictedY(value))
}

/// `Inference time: <int> us`, or failing that `Inference time: <decimal> ms`
pub fn match_inference_time(line: &str) -> Option<FieldUpdate> {
    if !line.contains(INFERENCE_TIME_MARKER) {
        return None;
    }
    let p = patterns();
    if let Some(us) = capture(&p.time_us, line) {
        return us.parse().ok().map(FieldUpdate::InferenceTimeUs);
    }
    let ms = capture(&p.time_ms, line)?;
    millis_to_micros(ms).map(FieldUpdate::InferenceTimeUs)
}

/// Convert a decimal millisecond string to whole microseconds, truncating
///
/// Works on the digits rather than through f64, so "15.23" is exactly 15230.
/// Negative values yield `None`.
pub fn millis_to_micros(text: &str) -> Option<u64> {
    let text = text.strip_prefix('+').unwrap_or(text);
    if let Some(rest) = text.strip_prefix('-') {
        // inference_time_us is unsigned, so a negative reading is dropped
        // and the field stays unset. "-0" and friends are still zero.
        return match millis_to_micros(rest)? {
            0 => Some(0),
            _ => None,
        };
    }

    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole_ms: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut frac_us = 0u64;
    let mut scale = 100;
    for digit in frac.bytes().take(3) {
        frac_us += u64::from(digit - b'0') * scale;
        scale /= 10;
    }
    whole_ms.checked_mul(1000)?.checked_add(frac_us)
}

/// Run every matcher over `line` and fold the updates into `result`
///
/// Returns the number of fields the line set.
pub fn apply_line(result: &mut ExchangeResult, line: &str) -> usize {
    let mut applied = 0;
    for update in MATCHERS.iter().filter_map(|matcher| matcher(line)) {
        result.apply(update);
        applied += 1;
    }
    applied
}
