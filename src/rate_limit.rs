// Three-window sliding counter over the rate_events log. One aggregate
// query answers all three windows.

use std::env;

use crate::db::Db;
use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct WindowLimits {
    pub per_minute: i64,
    pub per_hour: i64,
    pub per_day: i64,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 100,
            per_day: 300,
        }
    }
}

impl WindowLimits {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            per_minute: env_limit("RATE_LIMIT_PER_MINUTE", default.per_minute),
            per_hour: env_limit("RATE_LIMIT_PER_HOUR", default.per_hour),
            per_day: env_limit("RATE_LIMIT_PER_DAY", default.per_day),
        }
    }
}

fn env_limit(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[derive(sqlx::FromRow)]
struct WindowCounts {
    minute: i64,
    hour: i64,
    day: i64,
}

/// Checks the caller's recent event counts against all three windows and,
/// when within limits, records the new event. Exceeding any window yields
/// a rate-limited error naming it.
pub async fn check_and_record(
    db: &Db,
    user_id: &str,
    action: &str,
    limits: WindowLimits,
) -> Result<(), AppError> {
    let counts: WindowCounts = sqlx::query_as(
        r#"
        SELECT
            count(*) FILTER (WHERE created_at > now() - interval '1 minute') AS minute,
            count(*) FILTER (WHERE created_at > now() - interval '1 hour')   AS hour,
            count(*) FILTER (WHERE created_at > now() - interval '1 day')    AS day
        FROM rate_events
        WHERE user_id = $1 AND action = $2
        "#,
    )
    .bind(user_id)
    .bind(action)
    .fetch_one(db)
    .await?;

    let exceeded = [
        (counts.minute, limits.per_minute, "minute"),
        (counts.hour, limits.per_hour, "hour"),
        (counts.day, limits.per_day, "day"),
    ]
    .into_iter()
    .find(|(count, limit, _)| count >= limit);

    if let Some((_, limit, window)) = exceeded {
        return Err(AppError::RateLimited(format!(
            "limit of {limit} {action} requests per {window} reached"
        )));
    }

    sqlx::query("INSERT INTO rate_events (user_id, action) VALUES ($1, $2)")
        .bind(user_id)
        .bind(action)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_limits_fall_back_to_defaults() {
        let limits = WindowLimits::from_env();
        assert_eq!(limits.per_minute, 10);
        assert_eq!(limits.per_hour, 100);
        assert_eq!(limits.per_day, 300);
    }
}
