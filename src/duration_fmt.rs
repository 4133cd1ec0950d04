//! Parsing and formatting for the harness's duration grammar:
//! concatenated `<number><unit>` tokens, units `h|m|s|ms|us|µs`, e.g.
//! `1s500ms`, `10ms`, `2h`. Used for `delay.duration`, `max_latency`,
//! `reset_time`, `wait_time`, and `errdelta`.

use std::time::Duration;

/// Parse a duration string made of one or more concatenated
/// `<number><unit>` tokens. Unknown units are a hard error.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let mut total = Duration::ZERO;
    let mut rest = s.trim();
    if rest.is_empty() {
        return Err("empty duration string".to_string());
    }

    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {s:?}"))?;
        if num_end == 0 {
            return Err(format!("expected a number at start of {rest:?} in duration {s:?}"));
        }
        let (num_str, after_num) = rest.split_at(num_end);
        let value: f64 = num_str
            .parse()
            .map_err(|_| format!("invalid number {num_str:?} in duration {s:?}"))?;

        let unit_end = after_num
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(after_num.len());
        let (unit, tail) = after_num.split_at(unit_end);

        let unit_secs = match unit {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            other => return Err(format!("unknown time unit {other:?} in duration {s:?}")),
        };
        let nanos = value * unit_secs * 1e9;
        total += Duration::from_nanos(nanos.round() as u64);
        rest = tail;
    }

    Ok(total)
}

/// Format a [`Duration`] back into the canonical concatenated form, the
/// inverse of [`parse_duration`] for the canonical strings the harness
/// itself produces (hours, minutes, seconds, milliseconds, microseconds,
/// largest unit first, zero components omitted).
pub fn format_duration(d: Duration) -> String {
    let mut nanos = d.as_nanos();
    let mut out = String::new();

    const UNITS: &[(&str, u128)] = &[
        ("h", 3_600_000_000_000),
        ("m", 60_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
    ];

    for (name, unit_nanos) in UNITS {
        let count = nanos / unit_nanos;
        if count > 0 {
            out.push_str(&count.to_string());
            out.push_str(name);
            nanos %= unit_nanos;
        }
    }

    if out.is_empty() {
        "0s".to_string()
    } else {
        out
    }
}
