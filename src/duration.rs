//! Human-readable durations for command-line options.

use std::time::Duration;

/// Parse a duration such as `10s`, `1m`, `500ms` or `2h`.
///
/// A bare number is interpreted as seconds.
///
/// # Examples
/// ```
/// use inkbird2mqtt::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" must be tried before "m" and "s".
    let (num, unit, to_duration): (&str, &str, fn(u64) -> Option<Duration>) =
        if let Some(num) = src.strip_suffix("ms") {
            (num, "milliseconds", |n: u64| Some(Duration::from_millis(n)))
        } else if let Some(num) = src.strip_suffix('h') {
            (num, "hours", |n: u64| n.checked_mul(3600).map(Duration::from_secs))
        } else if let Some(num) = src.strip_suffix('m') {
            (num, "minutes", |n: u64| n.checked_mul(60).map(Duration::from_secs))
        } else if let Some(num) = src.strip_suffix('s') {
            (num, "seconds", |n: u64| Some(Duration::from_secs(n)))
        } else {
            (src, "duration", |n: u64| Some(Duration::from_secs(n)))
        };

    let value: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid {unit}: {num}"))?;

    to_duration(value).ok_or_else(|| format!("duration too large: {src}"))
}
