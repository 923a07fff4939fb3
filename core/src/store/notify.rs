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

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{Mutex, Notify};

use crate::models::Value;
use crate::path_solver;

use super::StoreInner;

// Debounce window per emitted path.
pub(crate) const EMIT_WAIT: Duration = Duration::from_millis(10);

type Callback = Arc<dyn Fn(Option<Value>) + Send + Sync>;
type DeepCallback = Arc<dyn Fn(&str, Option<Value>) + Send + Sync>;

/// Handle returned by `on`/`once`, consumed by `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: u64,
    once: bool,
    cb: Callback,
}

#[derive(Default)]
pub(crate) struct BusState {
    next_id: u64,
    listeners: HashMap<String, Vec<Listener>>,
    // A pending entry means a flush task is sleeping for that path;
    // later emits within the window just replace the source.
    pending: HashMap<String, EmitSource>,
    key_signatures: HashMap<String, String>,
    root_keys: Vec<Arc<str>>,
}

impl BusState {
    pub(crate) fn root_keys(&self) -> &[Arc<str>] {
        &self.root_keys
    }
}

pub(crate) enum EmitSource {
    Value(Option<Value>),
    Lazy(Arc<TriggerMemo>),
}

/// Read cache shared by all emits of one trigger: each distinct path is
/// fetched at most once, and a path below an already-fetched ancestor
/// navigates the cached value instead of re-reading the store.
#[derive(Default)]
pub(crate) struct TriggerMemo {
    cache: Mutex<HashMap<String, Option<Value>>>,
}

impl TriggerMemo {
    async fn resolve(&self, inner: &StoreInner, name: &str) -> Option<Value> {
        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache.get(name) {
            return hit.clone();
        }
        for (cached, value) in cache.iter() {
            if path_solver::is_ancestor(cached, name) {
                let rel = path_solver::relative(name, cached);
                return value
                    .as_ref()
                    .and_then(|v| path_solver::descend(v, rel))
                    .cloned();
            }
        }
        let value = match inner.get(name).await {
            Ok(value) => value,
            Err(err) => {
                log::error!("subscriber read of {name} failed: {err}");
                None
            }
        };
        cache.insert(name.to_string(), value.clone());
        value
    }
}

/// Handle for a recursive subtree subscription. `close` unregisters
/// every listener the subscription created and is safe to call twice.
pub struct DeepSubscription {
    inner: Weak<StoreInner>,
    registrations: Arc<Mutex<Option<Vec<(String, ListenerId)>>>>,
    shutdown: Arc<Notify>,
}

impl DeepSubscription {
    pub async fn close(&self) {
        self.shutdown.notify_one();
        let taken = self.registrations.lock().await.take();
        if let (Some(inner), Some(list)) = (self.inner.upgrade(), taken) {
            for (name, id) in list {
                inner.off(&name, id).await;
            }
        }
    }
}

type KeysEvent = (String, Option<Value>);

impl StoreInner {
    pub(crate) async fn on_raw(
        &self,
        name: &str,
        once: bool,
        cb: Callback,
    ) -> Result<ListenerId, crate::interface::StoreError> {
        let id = {
            let mut bus = self.bus.lock().await;
            bus.next_id += 1;
            let id = bus.next_id;
            bus.listeners.entry(name.to_string()).or_default().push(Listener {
                id,
                once,
                cb: cb.clone(),
            });
            id
        };
        // Replay the current value to the new listener.
        let current = self.get(name).await?;
        if current.is_some() {
            if once {
                self.off(name, ListenerId(id)).await;
            }
            cb(current);
        }
        Ok(ListenerId(id))
    }

    pub(crate) async fn off(&self, name: &str, id: ListenerId) {
        let mut bus = self.bus.lock().await;
        if let Some(list) = bus.listeners.get_mut(name) {
            list.retain(|listener| listener.id != id.0);
            if list.is_empty() {
                bus.listeners.remove(name);
            }
        }
    }

    pub(crate) async fn off_all(&self, name: &str) {
        self.bus.lock().await.listeners.remove(name);
    }

    pub(crate) async fn emit_source(&self, name: &str, source: EmitSource) {
        let mut bus = self.bus.lock().await;
        if let Some(slot) = bus.pending.get_mut(name) {
            *slot = source;
            return;
        }
        bus.pending.insert(name.to_string(), source);
        let weak = self.weak.clone();
        let path = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(EMIT_WAIT).await;
            if let Some(inner) = weak.upgrade() {
                inner.flush(&path).await;
            }
        });
    }

    async fn flush(&self, name: &str) {
        let source = { self.bus.lock().await.pending.remove(name) };
        let Some(source) = source else { return };
        let value = match source {
            EmitSource::Value(value) => value,
            EmitSource::Lazy(memo) => memo.resolve(self, name).await,
        };
        self.deliver(name, value.clone()).await;

        // Sub-notify `name$keys` listeners, suppressed while the child
        // key shape stays the same.
        if name.contains('$') {
            return;
        }
        let keys: Vec<Arc<str>> = match &value {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        let signature = keys
            .iter()
            .map(|k| k.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        let changed = {
            let mut bus = self.bus.lock().await;
            if bus.key_signatures.get(name) == Some(&signature) {
                false
            } else {
                bus.key_signatures.insert(name.to_string(), signature);
                true
            }
        };
        if changed {
            let keys_value = Some(Value::List(keys.into_iter().map(Value::String).collect()));
            self.deliver(&format!("{name}$keys"), keys_value).await;
        }
    }

    /// Immediate delivery to the listeners of `name`, dropping one-shot
    /// listeners first.
    async fn deliver(&self, name: &str, value: Option<Value>) {
        let callbacks: Vec<Callback> = {
            let mut bus = self.bus.lock().await;
            match bus.listeners.get_mut(name) {
                Some(list) => {
                    let callbacks = list.iter().map(|l| l.cb.clone()).collect();
                    list.retain(|l| !l.once);
                    if list.is_empty() {
                        bus.listeners.remove(name);
                    }
                    callbacks
                }
                None => Vec::new(),
            }
        };
        for cb in callbacks {
            cb(value.clone());
        }
    }

    pub(crate) async fn trigger(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        self.emit_source("$change", EmitSource::Value(None)).await;

        let subscribed: BTreeSet<String> = {
            let bus = self.bus.lock().await;
            bus.listeners
                .keys()
                .map(|sub| path_solver::parse(sub).key)
                .filter(|base| !base.is_empty() && path_solver::is_related(base, name))
                .map(str::to_string)
                .collect()
        };
        if !subscribed.is_empty() {
            let memo = Arc::new(TriggerMemo::default());
            for base in subscribed {
                self.emit_source(&base, EmitSource::Lazy(memo.clone())).await;
            }
        }

        // Keep the root key set current and tell `$keys` listeners when
        // it changes shape.
        match self.rows.root_keys(None).await {
            Ok(current) => {
                let changed = {
                    let mut bus = self.bus.lock().await;
                    if bus.root_keys == current {
                        false
                    } else {
                        bus.root_keys = current.clone();
                        true
                    }
                };
                if changed {
                    let value =
                        Some(Value::List(current.into_iter().map(Value::String).collect()));
                    self.deliver("$keys", value).await;
                }
            }
            Err(err) => log::error!("root key refresh failed: {err}"),
        }
    }

    pub(crate) async fn deep(
        &self,
        name: &str,
        depth: usize,
        cb: DeepCallback,
    ) -> Result<DeepSubscription, crate::interface::StoreError> {
        let depth = depth.max(1);
        let max_segments = if name.is_empty() {
            depth
        } else {
            depth + path_solver::depth(name)
        };
        let (tx, rx) = mpsc::unbounded_channel::<KeysEvent>();
        let registrations = Arc::new(Mutex::new(Some(Vec::new())));
        let shutdown = Arc::new(Notify::new());

        tokio::spawn(deep_driver(
            self.weak.clone(),
            name.to_string(),
            max_segments,
            cb,
            tx.clone(),
            rx,
            registrations.clone(),
            shutdown.clone(),
        ));

        let keys_name = format!("{name}$keys");
        let node = name.to_string();
        let sender = tx.clone();
        let id = self
            .on_raw(
                &keys_name,
                false,
                Arc::new(move |value| {
                    let _ = sender.send((node.clone(), value));
                }),
            )
            .await?;
        if let Some(list) = registrations.lock().await.as_mut() {
            list.push((keys_name, id));
        }

        Ok(DeepSubscription {
            inner: self.weak.clone(),
            registrations,
            shutdown,
        })
    }
}

/// Consumes `$keys` meta-events and grows the listener tree: one
/// `$keys` listener per interior node, one value listener per leaf.
/// Exits when the subscription closes or the store drops.
#[allow(clippy::too_many_arguments)]
async fn deep_driver(
    weak: Weak<StoreInner>,
    root: String,
    max_segments: usize,
    cb: DeepCallback,
    tx: UnboundedSender<KeysEvent>,
    mut rx: mpsc::UnboundedReceiver<KeysEvent>,
    registrations: Arc<Mutex<Option<Vec<(String, ListenerId)>>>>,
    shutdown: Arc<Notify>,
) {
    loop {
        let (node, keys) = tokio::select! {
            _ = shutdown.notified() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(inner) = weak.upgrade() else { break };
        let keys: Vec<String> = match keys {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(key) => Some(key.to_string()),
                    _ => None,
                })
                .collect(),
            _ => continue,
        };
        let mut guard = registrations.lock().await;
        let Some(list) = guard.as_mut() else { break };
        for key in keys {
            let child = path_solver::join(&node, &key);
            if path_solver::depth(&child) >= max_segments {
                if list.iter().any(|(n, _)| n == &child) {
                    continue;
                }
                let rel = if root.is_empty() {
                    child.clone()
                } else {
                    path_solver::relative(&child, &root).to_string()
                };
                let cb = cb.clone();
                let leaf: Callback = Arc::new(move |value| cb(&rel, value));
                match inner.on_raw(&child, false, leaf).await {
                    Ok(id) => list.push((child, id)),
                    Err(err) => log::error!("deep leaf subscribe of {child} failed: {err}"),
                }
            } else {
                let keys_name = format!("{child}$keys");
                if list.iter().any(|(n, _)| n == &keys_name) {
                    continue;
                }
                let sender = tx.clone();
                let node = child.clone();
                let watcher: Callback = Arc::new(move |value| {
                    let _ = sender.send((node.clone(), value));
                });
                match inner.on_raw(&keys_name, false, watcher).await {
                    Ok(id) => list.push((keys_name, id)),
                    Err(err) => log::error!("deep key subscribe of {child} failed: {err}"),
                }
            }
        }
    }
}
