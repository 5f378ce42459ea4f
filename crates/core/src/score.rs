use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-+]?\d*\.?\d+").expect("valid regex"));

/// The magnitude above which a bare value is assumed to be a percentage.
/// Exactly 1.5 is kept as-is (strict comparison); similarity scores live
/// in [0, 1], so anything clearly above that range must have been "72" or
/// "72%" rather than "0.72".
pub const PERCENT_THRESHOLD: f64 = 1.5;

/// Parses a score cell into a fraction. Accepts bare floats ("0.65"),
/// decimal commas ("0,65"), and percent strings ("72%"). Unparseable
/// cells come back as 0.0, which callers treat as "recompute from scratch".
pub fn parse_score(raw: &str) -> f32 {
    let cleaned = raw.replace('%', "").replace(',', ".");
    let Some(m) = NUMBER.find(cleaned.trim()) else {
        return 0.0;
    };
    let Ok(value) = m.as_str().parse::<f64>() else {
        return 0.0;
    };
    if value.abs() > PERCENT_THRESHOLD {
        round_to(value / 100.0, 6) as f32
    } else {
        round_to(value, 6) as f32
    }
}

/// Rounds to `places` decimal places, half away from zero.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
