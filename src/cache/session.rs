use std::sync::Arc;

use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A login session, one per issued token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CachedSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: i64, // Unix timestamp
    pub expires_at: i64, // Unix timestamp
}

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

fn user_sessions_key(user_id: Uuid) -> String {
    format!("user_sessions:{}", user_id)
}

fn to_json(session: &CachedSession) -> Result<String, redis::RedisError> {
    serde_json::to_string(session).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::IoError, "serialize error", e.to_string()))
    })
}

/// Session storage keyed by the token's `jti`, with a per-user index set.
pub struct SessionCacheOperations;

impl SessionCacheOperations {
    pub async fn store_session(
        redis: &Arc<RedisClient>,
        session: &CachedSession,
    ) -> Result<(), redis::RedisError> {
        let ttl = session.expires_at - chrono::Utc::now().timestamp();
        if ttl <= 0 {
            return Ok(());
        }

        let mut conn = redis.get_multiplexed_async_connection().await?;
        let json = to_json(session)?;
        let index = user_sessions_key(session.user_id);

        let _: () = redis::pipe()
            .atomic()
            .set_ex(session_key(&session.session_id), json, ttl as u64)
            .sadd(&index, &session.session_id)
            .expire(&index, ttl)
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn get_session(
        redis: &Arc<RedisClient>,
        session_id: &str,
    ) -> Result<Option<CachedSession>, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.get(session_key(session_id)).await?;

        match result {
            Some(json) => {
                let session = serde_json::from_str(&json).map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "deserialize error",
                        e.to_string(),
                    ))
                })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Live sessions of a user, oldest first. Expired ids are pruned from the index.
    pub async fn get_user_sessions(
        redis: &Arc<RedisClient>,
        user_id: Uuid,
    ) -> Result<Vec<CachedSession>, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let index = user_sessions_key(user_id);
        let ids: Vec<String> = conn.smembers(&index).await?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            let result: Option<String> = conn.get(session_key(&id)).await?;
            match result.and_then(|json| serde_json::from_str::<CachedSession>(&json).ok()) {
                Some(session) => sessions.push(session),
                None => {
                    let _: () = conn.srem(&index, &id).await?;
                }
            }
        }

        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    pub async fn remove_session(
        redis: &Arc<RedisClient>,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let removed: i64 = conn.del(session_key(session_id)).await?;
        let _: () = conn.srem(user_sessions_key(user_id), session_id).await?;
        Ok(removed > 0)
    }

    /// Revokes every session of the user except `keep`. Returns how many were removed.
    pub async fn remove_user_sessions(
        redis: &Arc<RedisClient>,
        user_id: Uuid,
        keep: Option<&str>,
    ) -> Result<usize, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let index = user_sessions_key(user_id);
        let ids: Vec<String> = conn.smembers(&index).await?;

        let mut removed = 0;
        for id in ids.iter().filter(|id| Some(id.as_str()) != keep) {
            let n: i64 = conn.del(session_key(id)).await?;
            let _: () = conn.srem(&index, id).await?;
            removed += n as usize;
        }

        Ok(removed)
    }
}
