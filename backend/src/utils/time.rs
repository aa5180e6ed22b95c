use anyhow::anyhow;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Absolute expiry `ttl` after `now`.
pub fn expires_after(now: DateTime<Utc>, ttl: Duration) -> anyhow::Result<DateTime<Utc>> {
    let ttl = ChronoDuration::from_std(ttl)?;
    now.checked_add_signed(ttl)
        .ok_or_else(|| anyhow!("expiry out of range: now + {}", ttl))
}

pub fn expires_in(ttl: Duration) -> anyhow::Result<DateTime<Utc>> {
    expires_after(Utc::now(), ttl)
}
