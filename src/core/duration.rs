//! Duration text used in the `Durée` / `duree` columns
//!
//! Durations are written as `H:MM:SS`, or `N day(s), H:MM:SS` from 24 hours on.

/// Format whole seconds as `H:MM:SS`, prefixed with the day count past 24 hours
pub fn format_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let rem = total_seconds % 86_400;
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);

    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

/// Parse a duration written by [`format_duration`] or a plain number of seconds
///
/// Fractional seconds are truncated. Returns `None` for anything else.
pub fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if !text.contains(':') {
        let seconds: f64 = text.parse().ok()?;
        return (seconds.is_finite() && seconds >= 0.0).then(|| seconds.floor() as u64);
    }

    let (days, clock) = match text.split_once(',') {
        Some((day_part, clock)) => {
            let count = day_part
                .trim()
                .strip_suffix("days")
                .or_else(|| day_part.trim().strip_suffix("day"))?;
            (count.trim().parse::<u64>().ok()?, clock.trim())
        }
        None => (0, text),
    };

    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = parts.next()?.trim().parse().ok()?;
    let seconds: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    Some(days * 86_400 + hours * 3600 + minutes * 60 + seconds.floor() as u64)
}
