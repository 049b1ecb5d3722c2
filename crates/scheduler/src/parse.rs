//! Parsing for human-friendly poll schedules.

use tracing::warn;

use feedrelay_storage::DEFAULT_SCHEDULE_MINUTES;

/// Parse a schedule string into minutes between polls.
///
/// Supported suffixes: `m` (minutes), `h` (hours), `d` (days). A bare
/// number is taken as minutes. Anything unparseable falls back to the
/// default interval rather than failing, so a bad schedule in a config
/// file degrades instead of stopping the relay.
#[must_use]
pub fn parse_schedule(input: &str) -> u32 {
    match try_parse_schedule(input) {
        Some(minutes) => minutes,
        None => {
            warn!(
                schedule = input,
                default_minutes = DEFAULT_SCHEDULE_MINUTES,
                "unparseable schedule, using default"
            );
            DEFAULT_SCHEDULE_MINUTES
        },
    }
}

fn try_parse_schedule(input: &str) -> Option<u32> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let (num_str, suffix) = match input.find(|c: char| c.is_alphabetic()) {
        Some(i) => (&input[..i], &input[i..]),
        None => (input, "m"),
    };

    let value: u32 = num_str.trim().parse().ok()?;
    if value == 0 {
        return None;
    }

    match suffix {
        "m" => Some(value),
        "h" => value.checked_mul(60),
        "d" => value.checked_mul(1_440),
        _ => None,
    }
}
