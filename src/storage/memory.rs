//! Process-local storage backend.
//!
//! Each entity lives in one primary map; secondary lookups go through index
//! maps from value to primary id. A single lock per entity keeps the primary
//! map and its indexes consistent.

use super::observe;
use crate::clients::{ClientRegistry, RegisteredClient};
use crate::consent::{ConsentRecord, ConsentStore};
use crate::error::AuthError;
use crate::grants::{GrantRecord, GrantRecordStore, LookupKind};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct GrantTables {
    records: HashMap<String, GrantRecord>,
    /// lookup kind -> value -> record id
    index: HashMap<LookupKind, HashMap<String, String>>,
}

impl GrantTables {
    fn owner(&self, kind: LookupKind, value: &str) -> Option<&String> {
        self.index.get(&kind).and_then(|values| values.get(value))
    }

    fn unindex(&mut self, record: &GrantRecord) {
        for (kind, value) in record.secondary_values() {
            if let Some(values) = self.index.get_mut(&kind) {
                values.remove(value);
            }
        }
    }

    fn index(&mut self, record: &GrantRecord) {
        for (kind, value) in record.secondary_values() {
            self.index
                .entry(kind)
                .or_default()
                .insert(value.to_string(), record.id.clone());
        }
    }
}

#[derive(Default)]
struct ClientTables {
    by_id: HashMap<String, RegisteredClient>,
    /// client_id -> id
    client_ids: HashMap<String, String>,
}

/// In-memory grant, client and consent storage.
#[derive(Default)]
pub struct MemoryStore {
    grants: RwLock<GrantTables>,
    clients: RwLock<ClientTables>,
    consents: RwLock<HashMap<(String, String), ConsentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored grant records.
    pub fn grant_count(&self) -> usize {
        self.grants.read().records.len()
    }
}

#[async_trait]
impl GrantRecordStore for MemoryStore {
    async fn save(&self, record: &GrantRecord) -> Result<(), AuthError> {
        let result = {
            let mut tables = self.grants.write();

            let conflict = record.secondary_values().find_map(|(kind, value)| {
                tables
                    .owner(kind, value)
                    .filter(|owner| **owner != record.id)
                    .map(|_| kind)
            });

            match conflict {
                Some(kind) => Err(AuthError::DuplicateLookupKey { kind }),
                None => {
                    if let Some(previous) = tables.records.remove(&record.id) {
                        tables.unindex(&previous);
                    }
                    tables.index(record);
                    tables.records.insert(record.id.clone(), record.clone());
                    Ok(())
                }
            }
        };
        observe("save", result)
    }

    async fn find_by(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<Option<GrantRecord>, AuthError> {
        let tables = self.grants.read();
        let id = match kind {
            LookupKind::Id => Some(value),
            _ => tables.owner(kind, value).map(String::as_str),
        };
        let found = id.and_then(|id| tables.records.get(id)).cloned();
        observe("find", Ok(found))
    }

    async fn remove(&self, record: &GrantRecord) -> Result<(), AuthError> {
        let mut tables = self.grants.write();
        if let Some(previous) = tables.records.remove(&record.id) {
            tables.unindex(&previous);
        }
        observe("remove", Ok(()))
    }
}

#[async_trait]
impl ClientRegistry for MemoryStore {
    async fn save(&self, client: &RegisteredClient) -> Result<(), AuthError> {
        let mut tables = self.clients.write();

        if let Some(owner) = tables.client_ids.get(&client.client_id) {
            if *owner != client.id {
                return Err(AuthError::DuplicateClientId(client.client_id.clone()));
            }
        }

        if let Some(previous) = tables.by_id.remove(&client.id) {
            tables.client_ids.remove(&previous.client_id);
        }
        tables
            .client_ids
            .insert(client.client_id.clone(), client.id.clone());
        tables.by_id.insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RegisteredClient>, AuthError> {
        Ok(self.clients.read().by_id.get(id).cloned())
    }

    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<RegisteredClient>, AuthError> {
        let tables = self.clients.read();
        Ok(tables
            .client_ids
            .get(client_id)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }
}

#[async_trait]
impl ConsentStore for MemoryStore {
    async fn save(&self, consent: &ConsentRecord) -> Result<(), AuthError> {
        self.consents.write().insert(
            (consent.client_id.clone(), consent.principal_name.clone()),
            consent.clone(),
        );
        Ok(())
    }

    async fn find_by_client_and_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> Result<Option<ConsentRecord>, AuthError> {
        Ok(self
            .consents
            .read()
            .get(&(client_id.to_string(), principal_name.to_string()))
            .cloned())
    }

    async fn delete_by_client_and_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> Result<(), AuthError> {
        self.consents
            .write()
            .remove(&(client_id.to_string(), principal_name.to_string()));
        Ok(())
    }
}
