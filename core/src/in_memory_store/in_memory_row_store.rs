// Copyright 2025 The TreeDb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::interface::{RowList, RowStore, StoreClock, StoreError, SystemClock, UidSource};
use crate::models::{KeyScope, Row, RowDraft, RowId, RowTimestamp};
use crate::path_solver;
use crate::uid::TimeOrderedUids;

/// Row backend over a plain vector behind an async lock.
///
/// Rows keep insertion order; `find` sorts its result instead of the
/// collection, so a query never perturbs the order ids were minted in.
pub struct InMemoryRowStore {
    rows: RwLock<Vec<Row>>,
    clock: Arc<dyn StoreClock>,
    uids: Arc<dyn UidSource>,
}

impl Default for InMemoryRowStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(TimeOrderedUids::new()))
    }
}

impl InMemoryRowStore {
    pub fn new(clock: Arc<dyn StoreClock>, uids: Arc<dyn UidSource>) -> Self {
        InMemoryRowStore {
            rows: RwLock::new(Vec::new()),
            clock,
            uids,
        }
    }

    /// Seeds the backend with pre-built rows, for tests and restores.
    pub fn from_rows(
        rows: Vec<Row>,
        clock: Arc<dyn StoreClock>,
        uids: Arc<dyn UidSource>,
    ) -> Self {
        InMemoryRowStore {
            rows: RwLock::new(rows),
            clock,
            uids,
        }
    }

    fn in_time(row: &Row, t: Option<RowTimestamp>) -> bool {
        match t {
            Some(cutoff) => row.t < cutoff,
            None => true,
        }
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn find(
        &self,
        scope: KeyScope<'_>,
        t: Option<RowTimestamp>,
    ) -> Result<RowList, StoreError> {
        let rows = self.rows.read().await;
        let mut found: Vec<Row> = rows
            .iter()
            .filter(|row| match scope {
                KeyScope::All => true,
                KeyScope::Key(key) => path_solver::is_related(&row.k, key),
            })
            .filter(|row| Self::in_time(row, t))
            .cloned()
            .collect();
        found.sort_by_key(|row| row.t);
        Ok(found)
    }

    async fn find_ids(
        &self,
        ids: &[RowId],
        t: Option<RowTimestamp>,
    ) -> Result<RowList, StoreError> {
        let wanted: HashSet<&str> = ids.iter().map(|id| id.as_ref()).collect();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| wanted.contains(row.z.as_ref()) && Self::in_time(row, t))
            .cloned()
            .collect())
    }

    async fn find_expiring(&self, e: Option<RowTimestamp>) -> Result<RowList, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| match (row.e, e) {
                (Some(expiry), Some(cutoff)) => expiry < cutoff,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .cloned()
            .collect())
    }

    async fn find_duplicates(&self) -> Result<RowList, StoreError> {
        let rows = self.rows.read().await;
        let mut winners: HashMap<&str, &Row> = HashMap::new();
        for row in rows.iter().filter(|row| row.e.is_none()) {
            match winners.get(row.k.as_ref()) {
                Some(best) if (best.t, best.z.as_ref()) >= (row.t, row.z.as_ref()) => {}
                _ => {
                    winners.insert(row.k.as_ref(), row);
                }
            }
        }
        Ok(rows
            .iter()
            .filter(|row| {
                row.e.is_none()
                    && winners
                        .get(row.k.as_ref())
                        .map(|best| best.z != row.z)
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_keys(&self, t: Option<RowTimestamp>) -> Result<Vec<RowId>, StoreError> {
        let rows = self.rows.read().await;
        let mut seen = HashSet::new();
        Ok(rows
            .iter()
            .filter(|row| Self::in_time(row, t))
            .filter(|row| seen.insert(row.k.clone()))
            .map(|row| row.k.clone())
            .collect())
    }

    async fn root_keys(&self, t: Option<RowTimestamp>) -> Result<Vec<RowId>, StoreError> {
        let rows = self.rows.read().await;
        let mut seen = HashSet::new();
        let mut roots = Vec::new();
        for row in rows.iter().filter(|row| Self::in_time(row, t)) {
            let root = path_solver::root_key(&row.k);
            if seen.insert(root.to_string()) {
                roots.push(Arc::from(root));
            }
        }
        Ok(roots)
    }

    async fn insert(&self, draft: RowDraft) -> Result<Row, StoreError> {
        let t = draft.t.unwrap_or_else(|| self.clock.now());
        let row = Row {
            k: draft.k,
            d: draft.d,
            t,
            e: draft.e,
            z: self.uids.new_uid(t),
        };
        let mut rows = self.rows.write().await;
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, row: &Row) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if let Some(stored) = rows.iter_mut().find(|stored| stored.z == row.z) {
            stored.d = row.d.clone();
            stored.t = row.t;
            stored.e = row.e;
        }
        Ok(())
    }

    async fn remove_by_ids(&self, ids: &[RowId]) -> Result<usize, StoreError> {
        let wanted: HashSet<&str> = ids.iter().map(|id| id.as_ref()).collect();
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| !wanted.contains(row.z.as_ref()));
        Ok(before - rows.len())
    }

    async fn remove_all(&self, t: RowTimestamp) -> Result<usize, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| row.t >= t);
        Ok(before - rows.len())
    }

    async fn remove(
        &self,
        name: &str,
        t: Option<RowTimestamp>,
        e: Option<RowTimestamp>,
    ) -> Result<usize, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| {
            let covered = row.k.as_ref() == name || path_solver::is_ancestor(name, &row.k);
            if !covered {
                return true;
            }
            if let (Some(cutoff), Some(expiry)) = (e, row.e) {
                if expiry <= cutoff {
                    return true;
                }
            }
            if let Some(cutoff) = t {
                if row.t >= cutoff {
                    return true;
                }
            }
            false
        });
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ManualClock;
    use crate::models::Value;

    fn backend(now: RowTimestamp) -> InMemoryRowStore {
        InMemoryRowStore::new(Arc::new(ManualClock::new(now)), Arc::new(TimeOrderedUids::new()))
    }

    #[tokio::test]
    async fn insert_stamps_time_and_id() {
        let store = backend(500);
        let row = store
            .insert(RowDraft::new("user.name", Some(Value::from("ada"))))
            .await
            .unwrap();
        assert_eq!(row.k.as_ref(), "user.name");
        assert_eq!(row.t, 500);
        assert_eq!(row.z.len(), 20);
        let explicit = store
            .insert(RowDraft::new("user.name", None).at(42))
            .await
            .unwrap();
        assert_eq!(explicit.t, 42);
    }

    #[tokio::test]
    async fn find_scopes_to_related_keys_sorted_by_time() {
        let store = backend(0);
        store
            .insert(RowDraft::new("user.name", Some(Value::from("ada"))).at(3))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("user", Some(Value::from("x"))).at(1))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("other", Some(Value::from("y"))).at(2))
            .await
            .unwrap();

        let related = store.find(KeyScope::Key("user.name"), None).await.unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].k.as_ref(), "user");
        assert_eq!(related[1].k.as_ref(), "user.name");

        let early = store.find(KeyScope::All, Some(2)).await.unwrap();
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].k.as_ref(), "user");
    }

    #[tokio::test]
    async fn find_does_not_match_sibling_prefixes() {
        let store = backend(0);
        store
            .insert(RowDraft::new("user", Some(Value::from(1))).at(1))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("username", Some(Value::from(2))).at(2))
            .await
            .unwrap();
        let related = store.find(KeyScope::Key("user"), None).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].k.as_ref(), "user");
    }

    #[tokio::test]
    async fn find_ids_filters_by_id_and_time() {
        let store = backend(0);
        let first = store
            .insert(RowDraft::new("a", Some(Value::from(1))).at(1))
            .await
            .unwrap();
        let second = store
            .insert(RowDraft::new("b", Some(Value::from(2))).at(5))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("c", Some(Value::from(3))).at(2))
            .await
            .unwrap();

        let ids = [first.z.clone(), second.z.clone()];
        let found = store.find_ids(&ids, None).await.unwrap();
        let keys: Vec<&str> = found.iter().map(|row| row.k.as_ref()).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let early = store.find_ids(&ids, Some(3)).await.unwrap();
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].k.as_ref(), "a");
    }

    #[tokio::test]
    async fn duplicates_keep_the_latest_row_per_key() {
        let store = backend(0);
        let old = store
            .insert(RowDraft::new("a", Some(Value::from(1))).at(1))
            .await
            .unwrap();
        let tie_first = store
            .insert(RowDraft::new("a", Some(Value::from(2))).at(5))
            .await
            .unwrap();
        let tie_second = store
            .insert(RowDraft::new("a", Some(Value::from(3))).at(5))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("a", Some(Value::from(4))).at(3).expiring(Some(100)))
            .await
            .unwrap();

        let dups = store.find_duplicates().await.unwrap();
        let ids: Vec<&str> = dups.iter().map(|row| row.z.as_ref()).collect();
        assert_eq!(dups.len(), 2);
        assert!(ids.contains(&old.z.as_ref()));
        assert!(ids.contains(&tie_first.z.as_ref()));
        assert!(!ids.contains(&tie_second.z.as_ref()));
    }

    #[tokio::test]
    async fn expiring_rows_respect_the_cutoff() {
        let store = backend(0);
        store
            .insert(RowDraft::new("a", Some(Value::from(1))).at(1).expiring(Some(100)))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("b", Some(Value::from(2))).at(1).expiring(Some(200)))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("c", Some(Value::from(3))).at(1))
            .await
            .unwrap();

        assert_eq!(store.find_expiring(None).await.unwrap().len(), 2);
        let due = store.find_expiring(Some(150)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].k.as_ref(), "a");
        assert!(store.find_expiring(Some(100)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_skips_protected_rows() {
        let store = backend(0);
        store
            .insert(RowDraft::new("user.a", Some(Value::from(1))).at(1))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("user.b", Some(Value::from(2))).at(5))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("user.c", Some(Value::from(3))).at(2).expiring(Some(50)))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("user.d", Some(Value::from(4))).at(2).expiring(Some(70)))
            .await
            .unwrap();
        store
            .insert(RowDraft::new("userx", Some(Value::from(5))).at(1))
            .await
            .unwrap();

        // t filter keeps rows at or after the cutoff, e filter keeps
        // rows expiring at or before it.
        let removed = store.remove("user", Some(4), Some(60)).await.unwrap();
        assert_eq!(removed, 2);
        let left = store.find(KeyScope::All, None).await.unwrap();
        let keys: Vec<&str> = left.iter().map(|row| row.k.as_ref()).collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"user.b"));
        assert!(keys.contains(&"user.c"));
        assert!(keys.contains(&"userx"));
    }

    #[tokio::test]
    async fn keys_listing_preserves_first_occurrence_order() {
        let store = backend(0);
        for (k, t) in [("b.x", 1), ("a", 2), ("b.x", 3), ("c.y.z", 4)] {
            store
                .insert(RowDraft::new(k, Some(Value::from(1))).at(t))
                .await
                .unwrap();
        }
        let keys = store.list_keys(None).await.unwrap();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_ref()).collect();
        assert_eq!(keys, vec!["b.x", "a", "c.y.z"]);

        let roots = store.root_keys(Some(3)).await.unwrap();
        let roots: Vec<&str> = roots.iter().map(|k| k.as_ref()).collect();
        assert_eq!(roots, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn update_rewrites_in_place() {
        let store = backend(0);
        let mut row = store
            .insert(RowDraft::new("a", Some(Value::from(1))).at(1))
            .await
            .unwrap();
        row.d = Some(Value::from(2));
        row.e = Some(99);
        store.update(&row).await.unwrap();
        let found = store.find(KeyScope::Key("a"), None).await.unwrap();
        assert_eq!(found[0].d, Some(Value::from(2)));
        assert_eq!(found[0].e, Some(99));
    }
}
