//! Presentation helpers.
//!
//! Zone conversion and parsing of user-typed durations. Nothing in here is
//! used to compute instants; the engine stays in UTC.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;

/// Format used for finish instants, e.g. `14:30 - 02/03/2025`.
pub const FINISH_FORMAT: &str = "%H:%M - %d/%m/%Y";

pub fn parse_timezone(name: &str) -> Result<Tz, ValidationError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ValidationError::UnknownTimezone(name.to_string()))
}

/// Render `instant` in `timezone` with [`FINISH_FORMAT`]. Unknown zones fall
/// back to UTC.
pub fn format_local(instant: DateTime<Utc>, timezone: &str) -> String {
    match parse_timezone(timezone) {
        Ok(tz) => instant.with_timezone(&tz).format(FINISH_FORMAT).to_string(),
        Err(_) => format!("{} UTC", instant.format(FINISH_FORMAT)),
    }
}

/// `27h 30m`, `12m 05s`, `40s`.
pub fn format_remaining(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Parse a carry time typed as `m:ss` (as shown by in-game timers) or as
/// plain seconds.
pub fn parse_carry(input: &str) -> Result<u32, ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        field: "carry".into(),
        message: format!("expected m:ss or seconds, got '{input}'"),
    };
    let input = input.trim();
    match input.split_once(':') {
        Some((m, s)) => {
            let minutes: u32 = m.parse().map_err(|_| invalid())?;
            let seconds: u32 = s.parse().map_err(|_| invalid())?;
            if s.len() != 2 || seconds >= 60 {
                return Err(invalid());
            }
            minutes
                .checked_mul(60)
                .and_then(|v| v.checked_add(seconds))
                .ok_or_else(invalid)
        }
        None => input.parse().map_err(|_| invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_in_user_zone() {
        let at = DateTime::parse_from_rfc3339("2025-03-02T17:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_local(at, "America/Sao_Paulo"), "14:30 - 02/03/2025");
        assert_eq!(format_local(at, "UTC"), "17:30 - 02/03/2025");
        assert_eq!(format_local(at, "Nowhere/Special"), "17:30 - 02/03/2025 UTC");
    }

    #[test]
    fn remaining_durations() {
        assert_eq!(format_remaining(99_000), "27h 30m");
        assert_eq!(format_remaining(725), "12m 05s");
        assert_eq!(format_remaining(40), "40s");
        assert_eq!(format_remaining(-5), "0s");
    }

    #[test]
    fn carry_forms() {
        assert_eq!(parse_carry("2:05").unwrap(), 125);
        assert_eq!(parse_carry("125").unwrap(), 125);
        assert_eq!(parse_carry(" 0:00 ").unwrap(), 0);
        assert!(parse_carry("2:5").is_err());
        assert!(parse_carry("2:75").is_err());
        assert!(parse_carry("-3").is_err());
        assert!(parse_carry("soon").is_err());
    }

    #[test]
    fn timezone_names() {
        assert_eq!(parse_timezone("Europe/Lisbon").unwrap().name(), "Europe/Lisbon");
        assert!(matches!(
            parse_timezone("Mars/Base"),
            Err(ValidationError::UnknownTimezone(_))
        ));
    }
}
