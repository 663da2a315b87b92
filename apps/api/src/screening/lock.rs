//! Per-user in-flight guard for analyses, held in Redis.
//!
//! One analysis at a time per account. The key expires on its own if the
//! process dies mid-analysis, and release only deletes the key while it still
//! holds this lock's token.

use anyhow::Result;
use redis::Client as RedisClient;
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct AnalysisLock {
    client: RedisClient,
    key: String,
    token: String,
}

pub fn lock_key(user_id: Uuid) -> String {
    format!("screener:analysis-lock:{user_id}")
}

impl AnalysisLock {
    /// Returns `None` when another analysis already holds the lock.
    pub async fn acquire(
        client: &RedisClient,
        user_id: Uuid,
        ttl_secs: u64,
    ) -> Result<Option<AnalysisLock>> {
        let key = lock_key(user_id);
        let token = Uuid::new_v4().to_string();

        let mut conn = client.get_multiplexed_async_connection().await?;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;

        Ok(acquired.map(|_| AnalysisLock {
            client: client.clone(),
            key,
            token,
        }))
    }

    pub async fn release(self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
