use std::sync::Arc;
use std::time::Duration;

use redis::{AsyncCommands, Client as RedisClient};
use sha2::{Digest, Sha256};

use crate::config::Config;

/// Lockout policy: `max_attempts` failures inside `window` lock the account
/// until the window expires.
#[derive(Debug, Clone, Copy)]
pub struct LoginThrottle {
    pub max_attempts: u32,
    pub window: Duration,
}

impl LoginThrottle {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.login_max_attempts,
            window: config.login_lockout(),
        }
    }

    pub fn is_locked(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }

    pub fn attempts_left(&self, failures: u32) -> u32 {
        self.max_attempts.saturating_sub(failures)
    }
}

/// Emails are hashed so addresses never sit in Redis in clear text.
fn attempts_key(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("login_attempts:{:x}", digest)
}

pub struct LoginAttempts;

impl LoginAttempts {
    /// Current failure count and the seconds until it resets.
    pub async fn failures(
        redis: &Arc<RedisClient>,
        email: &str,
    ) -> Result<(u32, u64), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let key = attempts_key(email);

        let count: Option<u32> = conn.get(&key).await?;
        let ttl: i64 = conn.ttl(&key).await?;

        Ok((count.unwrap_or(0), ttl.max(0) as u64))
    }

    pub async fn record_failure(
        redis: &Arc<RedisClient>,
        email: &str,
        throttle: &LoginThrottle,
    ) -> Result<u32, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let key = attempts_key(email);

        let count: u32 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn
                .expire(&key, throttle.window.as_secs() as i64)
                .await?;
        }

        Ok(count)
    }

    pub async fn clear(redis: &Arc<RedisClient>, email: &str) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let _: () = conn.del(attempts_key(email)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> LoginThrottle {
        LoginThrottle {
            max_attempts: 5,
            window: Duration::from_secs(900),
        }
    }

    #[test]
    fn locks_once_threshold_reached() {
        let t = throttle();
        assert!(!t.is_locked(0));
        assert!(!t.is_locked(4));
        assert!(t.is_locked(5));
        assert!(t.is_locked(9));
    }

    #[test]
    fn attempts_left_never_underflows() {
        let t = throttle();
        assert_eq!(t.attempts_left(3), 2);
        assert_eq!(t.attempts_left(7), 0);
    }

    #[test]
    fn key_ignores_case_and_whitespace() {
        assert_eq!(attempts_key(" Owner@Shop.co.za "), attempts_key("owner@shop.co.za"));
        assert!(!attempts_key("owner@shop.co.za").contains("owner"));
    }
}
