//! Redis storage backend.
//!
//! Grant records are stored as JSON under `<ns>:grant:<id>`. Each populated
//! secondary value gets an index key `<ns>:grant_idx:<kind>:<value>` holding
//! the record id, and `<ns>:grant_keys:<id>` lists the index keys a record
//! owns. Saves and removals run as Lua scripts so the record and its indexes
//! change together and uniqueness is checked by the server.

use super::observe;
use crate::clients::{ClientRegistry, RegisteredClient};
use crate::consent::{ConsentRecord, ConsentStore};
use crate::error::AuthError;
use crate::grants::{GrantRecord, GrantRecordStore, LookupKind};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::instrument;

static SAVE_GRANT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        for i = 3, #ARGV, 2 do
            local owner = redis.call('GET', ARGV[i + 1])
            if owner and owner ~= ARGV[1] then
                return ARGV[i]
            end
        end
        for _, key in ipairs(redis.call('SMEMBERS', KEYS[2])) do
            if redis.call('GET', key) == ARGV[1] then
                redis.call('DEL', key)
            end
        end
        redis.call('DEL', KEYS[2])
        for i = 3, #ARGV, 2 do
            redis.call('SET', ARGV[i + 1], ARGV[1])
            redis.call('SADD', KEYS[2], ARGV[i + 1])
        end
        redis.call('SET', KEYS[1], ARGV[2])
        return ''
        ",
    )
});

static REMOVE_GRANT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        for _, key in ipairs(redis.call('SMEMBERS', KEYS[2])) do
            if redis.call('GET', key) == ARGV[1] then
                redis.call('DEL', key)
            end
        end
        redis.call('DEL', KEYS[1], KEYS[2])
        return 1
        ",
    )
});

static FIND_GRANT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        local id = redis.call('GET', KEYS[1])
        if not id then
            return false
        end
        return redis.call('GET', ARGV[1] .. id)
        ",
    )
});

static SAVE_CLIENT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        local owner = redis.call('GET', KEYS[2])
        if owner and owner ~= ARGV[1] then
            return 0
        end
        local previous = redis.call('GET', KEYS[1])
        if previous then
            local old_key = ARGV[3] .. cjson.decode(previous)['client_id']
            if old_key ~= KEYS[2] and redis.call('GET', old_key) == ARGV[1] then
                redis.call('DEL', old_key)
            end
        end
        redis.call('SET', KEYS[1], ARGV[2])
        redis.call('SET', KEYS[2], ARGV[1])
        return 1
        ",
    )
});

/// Redis-backed grant, client and consent storage.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, namespace: &str) -> Result<Self, AuthError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AuthError::storage(format!("Invalid Redis URL: {}", e)))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AuthError::storage(format!("Redis connection failed: {}", e)))?;

        Ok(RedisStore {
            conn,
            namespace: namespace.to_string(),
        })
    }

    fn grant_key(&self, id: &str) -> String {
        format!("{}:grant:{}", self.namespace, id)
    }

    fn grant_prefix(&self) -> String {
        format!("{}:grant:", self.namespace)
    }

    fn index_key(&self, kind: LookupKind, value: &str) -> String {
        format!("{}:grant_idx:{}:{}", self.namespace, kind, value)
    }

    fn owned_keys_key(&self, id: &str) -> String {
        format!("{}:grant_keys:{}", self.namespace, id)
    }

    fn client_key(&self, id: &str) -> String {
        format!("{}:client:{}", self.namespace, id)
    }

    fn client_index_prefix(&self) -> String {
        format!("{}:client_idx:", self.namespace)
    }

    fn consent_key(&self, client_id: &str, principal_name: &str) -> String {
        format!("{}:consent:{}:{}", self.namespace, client_id, principal_name)
    }

    async fn save_grant(&self, record: &GrantRecord) -> Result<(), AuthError> {
        let payload = serde_json::to_string(record)?;

        let mut invocation = SAVE_GRANT.prepare_invoke();
        invocation
            .key(self.grant_key(&record.id))
            .key(self.owned_keys_key(&record.id))
            .arg(&record.id)
            .arg(payload);
        for (kind, value) in record.secondary_values() {
            invocation.arg(kind.as_str()).arg(self.index_key(kind, value));
        }

        let mut conn = self.conn.clone();
        let conflict: String = invocation.invoke_async(&mut conn).await?;
        if conflict.is_empty() {
            return Ok(());
        }

        let kind = LookupKind::SECONDARY
            .into_iter()
            .find(|k| k.as_str() == conflict)
            .ok_or_else(|| AuthError::storage(format!("Unexpected save result: {}", conflict)))?;
        Err(AuthError::DuplicateLookupKey { kind })
    }

    async fn find_grant(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<Option<GrantRecord>, AuthError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = match kind {
            LookupKind::Id => conn.get(self.grant_key(value)).await?,
            _ => {
                FIND_GRANT
                    .key(self.index_key(kind, value))
                    .arg(self.grant_prefix())
                    .invoke_async(&mut conn)
                    .await?
            }
        };

        payload
            .map(|p| serde_json::from_str(&p).map_err(AuthError::from))
            .transpose()
    }
}

#[async_trait]
impl GrantRecordStore for RedisStore {
    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn save(&self, record: &GrantRecord) -> Result<(), AuthError> {
        observe("save", self.save_grant(record).await)
    }

    async fn find_by(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<Option<GrantRecord>, AuthError> {
        observe("find", self.find_grant(kind, value).await)
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn remove(&self, record: &GrantRecord) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        let result: Result<i32, AuthError> = REMOVE_GRANT
            .key(self.grant_key(&record.id))
            .key(self.owned_keys_key(&record.id))
            .arg(&record.id)
            .invoke_async(&mut conn)
            .await
            .map_err(AuthError::from);
        observe("remove", result.map(|_| ()))
    }
}

#[async_trait]
impl ClientRegistry for RedisStore {
    async fn save(&self, client: &RegisteredClient) -> Result<(), AuthError> {
        let payload = serde_json::to_string(client)?;
        let mut conn = self.conn.clone();

        let saved: i32 = SAVE_CLIENT
            .key(self.client_key(&client.id))
            .key(format!("{}{}", self.client_index_prefix(), client.client_id))
            .arg(&client.id)
            .arg(payload)
            .arg(self.client_index_prefix())
            .invoke_async(&mut conn)
            .await?;

        if saved == 0 {
            return Err(AuthError::DuplicateClientId(client.client_id.clone()));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RegisteredClient>, AuthError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(self.client_key(id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(AuthError::from))
            .transpose()
    }

    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<RegisteredClient>, AuthError> {
        let mut conn = self.conn.clone();
        let id: Option<String> = conn
            .get(format!("{}{}", self.client_index_prefix(), client_id))
            .await?;
        match id {
            Some(id) => ClientRegistry::find_by_id(self, &id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConsentStore for RedisStore {
    async fn save(&self, consent: &ConsentRecord) -> Result<(), AuthError> {
        let payload = serde_json::to_string(consent)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(
            self.consent_key(&consent.client_id, &consent.principal_name),
            payload,
        )
        .await?;
        Ok(())
    }

    async fn find_by_client_and_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> Result<Option<ConsentRecord>, AuthError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(self.consent_key(client_id, principal_name)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(AuthError::from))
            .transpose()
    }

    async fn delete_by_client_and_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.consent_key(client_id, principal_name))
            .await?;
        Ok(())
    }
}
