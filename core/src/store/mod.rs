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

mod expiry;
mod notify;
mod scoped;

pub use notify::{DeepSubscription, ListenerId};
pub use scoped::ScopedStore;

use std::sync::{Arc, Weak};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::in_memory_store::InMemoryRowStore;
use crate::interface::{RowCodec, RowStore, StoreClock, StoreError, SystemClock, UidSource};
use crate::models::{is_empty, KeyScope, PropertyMap, Row, RowDraft, RowTimestamp, Value};
use crate::path_solver;
use crate::uid::TimeOrderedUids;

use expiry::SchedulerState;
use notify::{BusState, EmitSource};

pub(crate) struct StoreInner {
    rows: Arc<dyn RowStore>,
    clock: Arc<dyn StoreClock>,
    uids: Arc<dyn UidSource>,
    bus: Mutex<BusState>,
    sched: Mutex<SchedulerState>,
    // Serializes compound mutations so no reader observes a half-applied
    // insert-then-supersede or remove-then-rewrite sequence.
    write_guard: Mutex<()>,
    weak: Weak<StoreInner>,
}

/// Hierarchical object store over dot-separated path keys.
///
/// Values written at overlapping depths merge at read time in write
/// order; deletes of nested fields cascade upward through emptied
/// ancestors; rows written with a TTL are reclaimed by a timer owned by
/// the store. Cheap to clone, all clones share state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let clock: Arc<dyn StoreClock> = Arc::new(SystemClock);
        let uids: Arc<dyn UidSource> = Arc::new(TimeOrderedUids::new());
        let rows = Arc::new(InMemoryRowStore::new(clock.clone(), uids.clone()));
        Self::with_parts(rows, clock, uids)
    }

    /// Builds a store over explicit collaborators. Tests inject a
    /// manual clock here; alternative row backends plug in the same way.
    pub fn with_parts(
        rows: Arc<dyn RowStore>,
        clock: Arc<dyn StoreClock>,
        uids: Arc<dyn UidSource>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| StoreInner {
            rows,
            clock,
            uids,
            bus: Mutex::new(BusState::default()),
            sched: Mutex::new(SchedulerState::default()),
            write_guard: Mutex::new(()),
            weak: weak.clone(),
        });
        Store { inner }
    }

    /// Resolves `name` against the merged state of all related rows.
    /// Supports the `$keys` and `$type` suffix modifiers; `"$keys"`
    /// alone lists root keys. Unknown paths resolve to `None`.
    pub async fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(name).await
    }

    /// Stores `data` at `name`, superseding older writes covering the
    /// same path. `expire` is a TTL in seconds; non-finite or
    /// non-positive means permanent. Empty permanent data is a delete.
    pub async fn set(
        &self,
        name: &str,
        data: Option<Value>,
        expire: Option<f64>,
    ) -> Result<(), StoreError> {
        self.inner.set(name, data, expire).await
    }

    /// Batch form of `set`. A `"<key>$expire"` entry overrides the
    /// shared TTL for its key; `$`-keys themselves are not stored.
    pub async fn set_many(
        &self,
        batch: &PropertyMap,
        expire: Option<f64>,
    ) -> Result<(), StoreError> {
        for (key, value) in batch.iter() {
            if key.contains('$') {
                continue;
            }
            let per_key = batch
                .get(&format!("{key}$expire"))
                .and_then(|v| v.as_f64());
            self.inner
                .set(key, Some(value.clone()), per_key.or(expire))
                .await?;
        }
        Ok(())
    }

    /// Stores `data` under a generated (or supplied) child segment of
    /// `name` and returns the segment.
    pub async fn add(
        &self,
        name: &str,
        data: Option<Value>,
        expire: Option<f64>,
        id: Option<&str>,
    ) -> Result<Arc<str>, StoreError> {
        let id: Arc<str> = match id {
            Some(id) => Arc::from(id),
            None => self.inner.uids.new_uid(self.inner.clock.now()),
        };
        let child = path_solver::join(name, &id);
        self.inner.set(&child, data, expire).await?;
        Ok(id)
    }

    /// Deletes `name` and everything below it, splicing the field out
    /// of any ancestor row and dropping ancestors that become empty.
    /// Deleting an absent path is a silent no-op.
    pub async fn del(&self, name: &str) -> Result<(), StoreError> {
        self.inner.del(name).await
    }

    /// Removes every row. Subscribers see deletions and `$keys`
    /// listeners an empty key list.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await
    }

    /// One reclamation pass: drops expired rows and superseded
    /// permanent duplicates, then notifies the affected paths.
    pub async fn clean(&self) -> Result<(), StoreError> {
        self.inner.clean().await
    }

    /// Starts the expiry scheduler, runs an initial reclamation pass,
    /// and replays a change notification for every existing root key.
    pub async fn start(&self) {
        self.inner.start_scheduler().await;
        match self.inner.rows.root_keys(None).await {
            Ok(roots) => {
                for root in roots {
                    self.inner.trigger(&root).await;
                }
            }
            Err(err) => log::error!("startup key scan failed: {err}"),
        }
    }

    /// Disarms the expiry scheduler. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.inner.stop_scheduler().await;
    }

    /// Reclaims, then hands the full row list to the codec.
    pub async fn backup(
        &self,
        codec: &dyn RowCodec,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), StoreError> {
        self.inner.clean().await?;
        let rows = self.inner.rows.find(KeyScope::All, None).await?;
        codec.backup(writer, &rows).await?;
        Ok(())
    }

    /// Replaces the store contents with a decoded backup. The stream is
    /// decoded in full before anything is touched, so a codec failure
    /// leaves the store as it was. The swap to the decoded rows happens
    /// in one step; rows already past their expiry are skipped, the
    /// rest keep their deadline.
    pub async fn restore(
        &self,
        codec: &dyn RowCodec,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(), StoreError> {
        let decoded = codec.restore(reader).await?;
        self.inner.restore_rows(decoded).await?;
        self.inner.clean().await
    }

    /// A view of the subtree under `prefix`, sharing this store.
    pub fn scoped(&self, prefix: &str) -> ScopedStore {
        ScopedStore::new(self.clone(), prefix)
    }

    /// Subscribes to changes of `name`, replaying the current value
    /// immediately when it is not absent.
    pub async fn on(
        &self,
        name: &str,
        cb: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Result<ListenerId, StoreError> {
        self.inner.on_raw(name, false, Arc::new(cb)).await
    }

    /// Like `on`, but the listener is removed after its first delivery.
    pub async fn once(
        &self,
        name: &str,
        cb: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Result<ListenerId, StoreError> {
        self.inner.on_raw(name, true, Arc::new(cb)).await
    }

    pub async fn off(&self, name: &str, id: ListenerId) {
        self.inner.off(name, id).await;
    }

    pub async fn off_all(&self, name: &str) {
        self.inner.off_all(name).await;
    }

    /// Subscribes to every leaf `depth` segments below `name`,
    /// following keys as they appear. The callback receives the leaf
    /// path relative to `name` and its new value.
    pub async fn deep(
        &self,
        name: &str,
        depth: usize,
        cb: impl Fn(&str, Option<Value>) + Send + Sync + 'static,
    ) -> Result<DeepSubscription, StoreError> {
        self.inner.deep(name, depth, Arc::new(cb)).await
    }

    /// Debounce-emits `value` to the listeners of `name`.
    pub async fn emit(&self, name: &str, value: Option<Value>) {
        self.inner.emit_source(name, EmitSource::Value(value)).await;
    }

    /// Announces that `name` changed, fanning out to every related
    /// subscription with one shared read per resolved path.
    pub async fn trigger(&self, name: &str) {
        self.inner.trigger(name).await;
    }
}

impl StoreInner {
    pub(crate) async fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        if name == "$keys" {
            let roots = self.rows.root_keys(None).await?;
            return Ok(Some(Value::List(
                roots.into_iter().map(Value::String).collect(),
            )));
        }
        let query = path_solver::parse(name);
        if query.key.is_empty() {
            return Ok(None);
        }
        let related = self.rows.find(KeyScope::Key(query.key), None).await?;
        let mut tree = PropertyMap::new();
        for row in related {
            match row.d {
                Some(value) if !value.is_empty() => {
                    path_solver::set_tree(&mut tree, &row.k, value)
                }
                _ => {
                    path_solver::del_tree(&mut tree, &row.k);
                }
            }
        }
        Ok(path_solver::resolve(&tree, name))
    }

    pub(crate) async fn set(
        &self,
        name: &str,
        data: Option<Value>,
        expire: Option<f64>,
    ) -> Result<(), StoreError> {
        if name.is_empty() || name.contains('$') {
            return Ok(());
        }
        let expire = expire.filter(|secs| secs.is_finite() && *secs > 0.0);
        if expire.is_none() && is_empty(data.as_ref()) {
            return self.del(name).await;
        }
        let now = self.clock.now();
        let e = expire.map(|secs| now + (secs * 1000.0).ceil() as RowTimestamp);
        {
            let _guard = self.write_guard.lock().await;
            self.rows
                .insert(RowDraft::new(name, data).at(now).expiring(e))
                .await?;
            self.del_inner(name, now, e).await?;
        }
        if let Some(deadline) = e {
            self.schedule_expiry(deadline).await;
        }
        self.emit_source("$set", EmitSource::Value(None)).await;
        self.trigger(name).await;
        Ok(())
    }

    pub(crate) async fn del(&self, name: &str) -> Result<(), StoreError> {
        if name.is_empty() || name.contains('$') {
            return Ok(());
        }
        let t = self.clock.now() + 1;
        let count = {
            let _guard = self.write_guard.lock().await;
            self.del_inner(name, t, None).await?
        };
        if count > 0 {
            self.emit_source("$del", EmitSource::Value(None)).await;
            self.trigger(name).await;
        }
        Ok(())
    }

    /// Deletion body, caller holds the write guard. Removes `name` and
    /// its descendants, then splices the field out of ancestor rows,
    /// dropping an ancestor whose map empties (tombstone cascade).
    /// Returns how many rows changed.
    async fn del_inner(
        &self,
        name: &str,
        t: RowTimestamp,
        e: Option<RowTimestamp>,
    ) -> Result<usize, StoreError> {
        let mut count = self.rows.remove(name, Some(t), e).await?;
        let related = self.rows.find(KeyScope::Key(name), Some(t)).await?;
        for row in related {
            if !path_solver::is_ancestor(&row.k, name) {
                continue;
            }
            if let (Some(cutoff), Some(expiry)) = (e, row.e) {
                if expiry <= cutoff {
                    continue;
                }
            }
            let mut map = match &row.d {
                Some(Value::Object(map)) => map.clone(),
                _ => continue,
            };
            if !path_solver::del_tree(&mut map, path_solver::relative(name, &row.k)) {
                continue;
            }
            count += 1;
            if map.is_empty() {
                self.rows.remove_by_ids(&[row.z.clone()]).await?;
            } else {
                let mut updated = row.clone();
                updated.d = Some(Value::Object(map));
                self.rows.update(&updated).await?;
            }
        }
        Ok(count)
    }

    pub(crate) async fn clear(&self) -> Result<(), StoreError> {
        let t = self.clock.now() + 1;
        let removed = {
            let _guard = self.write_guard.lock().await;
            self.rows.remove_all(t).await?
        };
        if removed > 0 {
            self.emit_source("$del", EmitSource::Value(None)).await;
            let previous = { self.bus.lock().await.root_keys().to_vec() };
            for root in previous {
                self.trigger(&root).await;
            }
        }
        Ok(())
    }

    /// Swaps the whole row set for `decoded` inside one guarded section,
    /// so no reader observes the wiped-but-not-yet-refilled state. Rows
    /// already past their expiry are skipped; the rest keep their
    /// absolute deadline. Notifications go out after the swap commits.
    pub(crate) async fn restore_rows(&self, decoded: Vec<Row>) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut earliest: Option<RowTimestamp> = None;
        let mut inserted: Vec<Arc<str>> = Vec::new();
        let removed = {
            let _guard = self.write_guard.lock().await;
            let removed = self.rows.remove_all(now + 1).await?;
            for row in decoded {
                if row.k.contains('$') || matches!(row.e, Some(e) if e <= now) {
                    continue;
                }
                if let Some(e) = row.e {
                    earliest = Some(earliest.map_or(e, |cur| cur.min(e)));
                }
                let key = row.k.clone();
                self.rows
                    .insert(RowDraft::new(&key, row.d).at(now).expiring(row.e))
                    .await?;
                if !inserted.contains(&key) {
                    inserted.push(key);
                }
            }
            removed
        };
        if let Some(deadline) = earliest {
            self.schedule_expiry(deadline).await;
        }
        let previous = if removed > 0 {
            self.emit_source("$del", EmitSource::Value(None)).await;
            self.bus.lock().await.root_keys().to_vec()
        } else {
            Vec::new()
        };
        if !inserted.is_empty() {
            self.emit_source("$set", EmitSource::Value(None)).await;
        }
        for root in previous {
            self.trigger(&root).await;
        }
        for key in inserted {
            self.trigger(&key).await;
        }
        Ok(())
    }

    pub(crate) async fn clean(&self) -> Result<(), StoreError> {
        let now = self.clock.now();
        let (removed, keys) = {
            let _guard = self.write_guard.lock().await;
            let mut doomed = self.rows.find_expiring(Some(now)).await?;
            doomed.extend(self.rows.find_duplicates().await?);
            let mut keys: Vec<Arc<str>> = Vec::new();
            for row in &doomed {
                if !keys.contains(&row.k) {
                    keys.push(row.k.clone());
                }
            }
            let ids: Vec<_> = doomed.into_iter().map(|row| row.z).collect();
            let removed = if ids.is_empty() {
                0
            } else {
                self.rows.remove_by_ids(&ids).await?
            };
            (removed, keys)
        };
        if removed > 0 {
            self.emit_source("$del", EmitSource::Value(None)).await;
            for key in keys {
                self.trigger(&key).await;
            }
        }
        Ok(())
    }
}
