use chrono::Utc;
use recharge_core::display::{format_local, format_remaining, parse_carry};
use recharge_core::{RechargeStatus, StatusSnapshot};

use crate::common::{CliResult, Context};

fn describe(snap: &StatusSnapshot) -> String {
    match snap.status {
        RechargeStatus::Idle => format!(
            "{}: no amount reported yet (max {})",
            snap.user_id, snap.max_capacity
        ),
        RechargeStatus::Full => {
            format!("{}: full ({max}/{max})", snap.user_id, max = snap.max_capacity)
        }
        RechargeStatus::Recharging => {
            let mut line = format!(
                "{}: {}/{}",
                snap.user_id,
                snap.amount.unwrap_or(0),
                snap.max_capacity
            );
            if let Some(finish_at) = snap.finish_at {
                line.push_str(&format!(", full at {}", format_local(finish_at, &snap.timezone)));
            }
            if let Some(remaining) = snap.remaining_secs {
                line.push_str(&format!(" (in {})", format_remaining(remaining)));
            }
            if let Some(next) = snap.next_unit_secs {
                line.push_str(&format!(", next unit in {}", format_remaining(next)));
            }
            line
        }
    }
}

pub fn report(user: &str, amount: u32, carry: Option<&str>) -> CliResult {
    let carry_secs = carry.map(parse_carry).transpose()?;
    let ctx = Context::load()?;
    let now = Utc::now();
    let record = ctx.controller().report_at(user, amount, carry_secs, now)?;
    println!("{}", describe(&StatusSnapshot::from_record(user, &record, now)));
    Ok(())
}

pub fn status(user: &str, json: bool) -> CliResult {
    let ctx = Context::load()?;
    let snap = ctx.reporter().status_of(user, Utc::now())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snap)?);
    } else {
        println!("{}", describe(&snap));
    }
    Ok(())
}

pub fn capacity(user: &str, max: u32) -> CliResult {
    let ctx = Context::load()?;
    let now = Utc::now();
    let record = ctx.controller().set_max_capacity_at(user, max, now)?;
    println!("{}", describe(&StatusSnapshot::from_record(user, &record, now)));
    Ok(())
}

pub fn timezone(user: &str, tz: &str) -> CliResult {
    let ctx = Context::load()?;
    let record = ctx.controller().set_timezone(user, tz)?;
    println!("{user}: time zone set to {}", record.timezone);
    Ok(())
}

pub fn panel(user: &str, message_id: Option<String>) -> CliResult {
    let ctx = Context::load()?;
    let record = ctx.controller().set_panel_message(user, message_id)?;
    match record.last_panel_message {
        Some(id) => println!("{user}: panel message {id}"),
        None => println!("{user}: panel message cleared"),
    }
    Ok(())
}

pub fn list(json: bool) -> CliResult {
    let ctx = Context::load()?;
    let snapshots = ctx.reporter().all(Utc::now())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }
    if snapshots.is_empty() {
        println!("no users");
    }
    for snap in &snapshots {
        println!("{}", describe(snap));
    }
    Ok(())
}
