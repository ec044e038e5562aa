use std::sync::LazyLock;

use regex::Regex;

const API_KEY: &str = "VPS_WATCH_API_KEY";

/// API key for the control panel, with stray line breaks and whitespace removed
pub fn get_api_key() -> Option<String> {
    std::env::var(API_KEY)
        .ok()
        .map(|key| sanitize_token(&key))
        .filter(|key| !key.is_empty())
}

pub fn sanitize_token(token: &str) -> String {
    token.replace(['\n', '\r'], "").trim().to_string()
}

const CONFIG_PATH: &str = "VPS_WATCH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./vps-watch.json";

pub fn get_config_path() -> String {
    std::env::var(CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Scale a byte count with binary prefixes, returning the value and its unit.
pub fn scale_bytes(bytes: u64) -> (f64, &'static str) {
    if bytes < 1024 {
        return (bytes as f64, "B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    (value, UNITS[unit])
}

pub fn format_bytes(bytes: u64) -> String {
    match scale_bytes(bytes) {
        (value, "B") => format!("{value} B"),
        (value, unit) => format!("{value:.1} {unit}"),
    }
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if hours > 0 || days > 0 {
        out.push_str(&format!("{hours}h "));
    }
    out.push_str(&format!("{minutes}m"));
    out
}

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([0-9]+(?:\.[0-9]+)?)\s*([KMGTP]?i?B)?\s*$").expect("valid regex")
});

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)").expect("valid regex"));

/// Parse panel capacity strings such as `"1024 MB"` or `"20 GB"` into bytes.
///
/// The panel uses decimal-looking units with binary meaning, so every
/// prefix is treated as a power of 1024.
pub fn parse_capacity(text: &str) -> Option<u64> {
    let captures = QUANTITY.captures(text)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let exponent = match captures
        .get(2)
        .map(|unit| unit.as_str().to_ascii_uppercase())
        .as_deref()
        .and_then(|unit| unit.chars().next())
    {
        None | Some('B') => 0,
        Some('K') => 1,
        Some('M') => 2,
        Some('G') => 3,
        Some('T') => 4,
        Some('P') => 5,
        Some(_) => return None,
    };
    Some((value * 1024f64.powi(exponent)) as u64)
}

/// Parse the leading number of strings like `"0.3 %"` or `"2 Core"`.
pub fn parse_leading_number(text: &str) -> Option<f64> {
    LEADING_NUMBER
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}
