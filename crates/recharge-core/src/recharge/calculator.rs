//! Amount/time conversions.
//!
//! Everything here is pure and works on absolute UTC instants. Time zones
//! only come into play when rendering, see [`crate::display`].

use chrono::{DateTime, Duration, Utc};

use crate::error::ValidationError;

fn unit_ms(rate_minutes: u32) -> i64 {
    i64::from(rate_minutes) * 60 * 1000
}

fn check_bounds(max_capacity: u32, rate_minutes: u32) -> Result<(), ValidationError> {
    if max_capacity == 0 {
        return Err(ValidationError::CapacityOutOfRange {
            capacity: 0,
            limit: super::MAX_CAPACITY_LIMIT,
        });
    }
    if rate_minutes == 0 {
        return Err(ValidationError::ZeroRate);
    }
    Ok(())
}

/// Time needed to go from `current` to `max_capacity`.
///
/// `carry_secs` is the time still left on the unit currently regenerating.
/// When given, the first missing unit costs `carry_secs` instead of a full
/// unit. Without it every missing unit costs `rate_minutes`.
///
/// # Errors
/// `current > max_capacity`, a zero capacity or rate, or a carry longer than
/// one unit.
pub fn time_to_full(
    current: u32,
    max_capacity: u32,
    rate_minutes: u32,
    carry_secs: Option<u32>,
) -> Result<Duration, ValidationError> {
    check_bounds(max_capacity, rate_minutes)?;
    if current > max_capacity {
        return Err(ValidationError::AmountOutOfRange {
            amount: current,
            max_capacity,
        });
    }
    let unit_secs = i64::from(rate_minutes) * 60;
    if let Some(carry) = carry_secs {
        if i64::from(carry) > unit_secs {
            return Err(ValidationError::CarryOutOfRange {
                carry_secs: carry,
                unit_secs: unit_secs as u64,
            });
        }
    }

    let missing = i64::from(max_capacity - current);
    if missing == 0 {
        return Ok(Duration::zero());
    }
    let secs = match carry_secs {
        Some(carry) => i64::from(carry) + (missing - 1) * unit_secs,
        None => missing * unit_secs,
    };
    Ok(Duration::seconds(secs))
}

/// Amount regenerated at `now` for a timer finishing at `finish_at`.
///
/// Rounds missing units up, so a unit only counts once it is complete.
pub fn amount_now(
    finish_at: DateTime<Utc>,
    max_capacity: u32,
    rate_minutes: u32,
    now: DateTime<Utc>,
) -> u32 {
    if now >= finish_at || rate_minutes == 0 {
        return max_capacity;
    }
    let remaining_ms = (finish_at - now).num_milliseconds();
    let unit = unit_ms(rate_minutes);
    let units_missing = (remaining_ms + unit - 1) / unit;
    let units_missing = u32::try_from(units_missing).unwrap_or(u32::MAX);
    max_capacity.saturating_sub(units_missing)
}

/// Time until the next unit completes, or `None` once full.
///
/// Feeding this back as the carry of a new report reproduces the same
/// finish instant.
pub fn time_until_next_unit(
    finish_at: DateTime<Utc>,
    rate_minutes: u32,
    now: DateTime<Utc>,
) -> Option<Duration> {
    if now >= finish_at || rate_minutes == 0 {
        return None;
    }
    let remaining_ms = (finish_at - now).num_milliseconds();
    let unit = unit_ms(rate_minutes);
    let partial = remaining_ms % unit;
    Some(Duration::milliseconds(if partial == 0 { unit } else { partial }))
}
