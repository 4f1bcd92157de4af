//! `stagegate clean` command implementation.

use crate::engine::Engine;
use crate::error::{Error, Result};
use chrono::{Duration, Utc};

/// Run the clean command.
///
/// Sweeps expired records, then ends sessions idle for longer than
/// `before` (or every session with `all`).
///
/// # Errors
///
/// Returns an error if the duration is invalid or storage fails.
pub async fn run(engine: &Engine, before: &str, all: bool) -> Result<()> {
    let idle = if all {
        Duration::zero() // Clean everything
    } else {
        parse_duration(before)?
    };

    let swept = engine.sweep().await?;
    let ended = end_idle_sessions(engine, idle).await?;

    if swept == 0 && ended == 0 {
        println!("No sessions to clean.");
    } else {
        println!("Swept {swept} expired record(s), ended {ended} session(s).");
    }

    Ok(())
}

/// Parse a duration string like "7d", "30d", "24h".
///
/// # Errors
///
/// Returns an error if the duration format is invalid.
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Ok(Duration::days(7)); // Default
    }

    let invalid = || Error::Config(format!("Invalid duration: {s}"));

    let (digits, unit): (&str, fn(i64) -> Option<Duration>) =
        if let Some(stripped) = s.strip_suffix('d') {
            (stripped, Duration::try_days)
        } else if let Some(stripped) = s.strip_suffix('h') {
            (stripped, Duration::try_hours)
        } else if let Some(stripped) = s.strip_suffix('m') {
            (stripped, Duration::try_minutes)
        } else {
            // Default to days if no unit
            (s, Duration::try_days)
        };

    let num: i64 = digits.parse().map_err(|_| invalid())?;
    unit(num).ok_or_else(invalid)
}

/// End sessions whose last access is older than `idle`.
async fn end_idle_sessions(engine: &Engine, idle: Duration) -> Result<usize> {
    // A cutoff before the representable range means nothing is old enough.
    let Some(cutoff) = Utc::now().checked_sub_signed(idle) else {
        return Ok(0);
    };
    let mut ended = 0;

    for session in engine.workflow().list_sessions().await? {
        if session.last_accessed_at > cutoff {
            continue; // Too recent
        }
        engine.end_session(&session.session_id).await?;
        ended += 1;
    }

    Ok(ended)
}
