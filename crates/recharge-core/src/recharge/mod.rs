//! Recharge timer engine.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Recharging -> Full
//!            ^            |
//!            +-- report --+
//! ```
//!
//! The [`TimerController`] moves a user into `Recharging` (or straight to
//! `Full`) on a report; the [`Sweeper`] is the only component that moves a
//! record from `Recharging` to `Full` on its own.

pub mod calculator;
mod controller;
mod record;
mod status;
mod sweeper;

/// Hard upper bound on a user's configurable capacity.
pub const MAX_CAPACITY_LIMIT: u32 = 10_000;

pub use calculator::{amount_now, time_to_full, time_until_next_unit};
pub use controller::TimerController;
pub use record::{RechargeSettings, RechargeStatus, UserRechargeRecord};
pub use status::{StatusReporter, StatusSnapshot};
pub use sweeper::{SweepReport, Sweeper};
