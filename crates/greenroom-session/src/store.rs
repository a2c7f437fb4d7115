//! The session store: per-client key/value records.
//!
//! In production this is a shared cache (one record per connection, plus a
//! few namespaced objects such as `gdata:<GID>`); the engine only needs
//! get/set/delete on string fields and an atomic counter. [`MemoryStore`]
//! implements the same contract in-process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;

use crate::StoreError;

/// Field names the engine reads and writes on a client record.
pub mod fields {
    /// Authenticated user id, written by the login tier.
    pub const USER_ID: &str = "uID";
    /// Display name of the logged-in user.
    pub const USERNAME: &str = "username";
    /// Id of the game this client advertises, if any.
    pub const GAME_ID: &str = "gdata:GID";
}

/// Key conventions for namespaced records.
pub mod keys {
    use std::fmt::Display;

    /// Counter used to allocate game ids.
    pub const COUNTER_GID: &str = "counters:GID";

    /// Cached object describing an advertised game.
    pub fn game(gid: impl Display) -> String {
        format!("gdata:{gid}")
    }

    /// Permission set of a user; each field is a permission name.
    pub fn permissions(user_id: &str) -> String {
        format!("permissions:{user_id}")
    }

    /// Pending join of a player waiting for the game server's answer.
    pub fn join(player_id: impl Display) -> String {
        format!("join:{player_id}")
    }
}

/// Async key/value store holding session records.
///
/// Each record is a flat map of field names to string values. Implementors
/// must be safe to call from many handler tasks at once.
pub trait SessionStore: Send + Sync + 'static {
    /// Reads one field. `Ok(None)` if the record or field is missing.
    fn get(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Writes one field, creating the record if needed.
    fn set(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Writes several fields at once.
    fn set_many(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads a whole record. Empty when missing.
    fn get_all(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<HashMap<String, String>, StoreError>> + Send;

    /// Deletes a record. Returns whether it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Atomically increments a counter and returns the new value.
    fn increment(&self, key: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

impl<T: SessionStore> SessionStore for Arc<T> {
    fn get(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send {
        (**self).get(key, field)
    }

    fn set(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set(key, field, value)
    }

    fn set_many(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set_many(key, fields)
    }

    fn get_all(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<HashMap<String, String>, StoreError>> + Send {
        (**self).get_all(key)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send {
        (**self).delete(key)
    }

    fn increment(&self, key: &str) -> impl Future<Output = Result<u64, StoreError>> + Send {
        (**self).increment(key)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process [`SessionStore`] backed by [`DashMap`].
///
/// Suitable for a single-process deployment and for tests. Counters live in
/// their own map, so a counter key never collides with a record key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, HashMap<String, String>>,
    counters: DashMap<String, u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record exists.
    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Number of records (counters excluded).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .records
            .get(key)
            .and_then(|record| record.get(field).cloned()))
    }

    async fn set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.records
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        let mut record = self.records.entry(key.to_string()).or_default();
        for (field, value) in fields {
            record.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .records
            .get(key)
            .map(|record| record.value().clone())
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(key).is_some())
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_record_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("session:1", fields::USER_ID).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get_field() {
        let store = MemoryStore::new();
        store.set("session:1", fields::USER_ID, "42").await.unwrap();
        assert_eq!(
            store.get("session:1", fields::USER_ID).await.unwrap().as_deref(),
            Some("42")
        );
        assert_eq!(store.get("session:1", fields::USERNAME).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_many_merges_into_record() {
        let store = MemoryStore::new();
        store.set("gdata:7", "NAME", "old").await.unwrap();
        store
            .set_many(
                "gdata:7",
                &[
                    ("NAME".to_string(), "new".to_string()),
                    ("PORT".to_string(), "1".to_string()),
                ],
            )
            .await
            .unwrap();
        let record = store.get_all("gdata:7").await.unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record["NAME"], "new");
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryStore::new();
        store.set("session:1", "x", "y").await.unwrap();
        assert!(store.delete("session:1").await.unwrap());
        assert!(!store.delete("session:1").await.unwrap());
        assert!(!store.contains("session:1"));
    }

    #[tokio::test]
    async fn test_increment_counts_from_one() {
        let store = MemoryStore::new();
        assert_eq!(store.increment(keys::COUNTER_GID).await.unwrap(), 1);
        assert_eq!(store.increment(keys::COUNTER_GID).await.unwrap(), 2);
        // Counters are not records.
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_arc_store_shares_state() {
        let store = Arc::new(MemoryStore::new());
        let handle = Arc::clone(&store);
        handle.set("k", "f", "v").await.unwrap();
        assert!(store.contains("k"));
    }

    #[test]
    fn test_key_helpers() {
        assert_eq!(keys::game(7), "gdata:7");
        assert_eq!(keys::permissions("42"), "permissions:42");
        assert_eq!(keys::join(9), "join:9");
    }
}
