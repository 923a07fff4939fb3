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

use std::sync::Arc;

use crate::interface::StoreError;
use crate::models::Value;
use crate::path_solver;

use super::{DeepSubscription, ListenerId, Store};

/// Capability-restricted view of the subtree under a fixed prefix.
/// Every operation prepends the prefix before delegating; subscribers
/// of the underlying store still see the changes.
#[derive(Clone)]
pub struct ScopedStore {
    store: Store,
    prefix: String,
}

impl ScopedStore {
    pub(crate) fn new(store: Store, prefix: &str) -> Self {
        ScopedStore {
            store,
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// An empty name addresses the prefix itself; a leading `$` keeps
    /// the modifier attached to the prefix (`"$keys"` lists the
    /// prefix's children).
    fn full(&self, name: &str) -> String {
        if name.starts_with('$') {
            format!("{}{}", self.prefix, name)
        } else {
            path_solver::join(&self.prefix, name)
        }
    }

    pub async fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        self.store.get(&self.full(name)).await
    }

    pub async fn set(
        &self,
        name: &str,
        data: Option<Value>,
        expire: Option<f64>,
    ) -> Result<(), StoreError> {
        self.store.set(&self.full(name), data, expire).await
    }

    pub async fn add(
        &self,
        name: &str,
        data: Option<Value>,
        expire: Option<f64>,
        id: Option<&str>,
    ) -> Result<Arc<str>, StoreError> {
        self.store.add(&self.full(name), data, expire, id).await
    }

    pub async fn del(&self, name: &str) -> Result<(), StoreError> {
        self.store.del(&self.full(name)).await
    }

    pub async fn on(
        &self,
        name: &str,
        cb: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Result<ListenerId, StoreError> {
        self.store.on(&self.full(name), cb).await
    }

    pub async fn once(
        &self,
        name: &str,
        cb: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Result<ListenerId, StoreError> {
        self.store.once(&self.full(name), cb).await
    }

    pub async fn off(&self, name: &str, id: ListenerId) {
        self.store.off(&self.full(name), id).await;
    }

    pub async fn off_all(&self, name: &str) {
        self.store.off_all(&self.full(name)).await;
    }

    pub async fn deep(
        &self,
        name: &str,
        depth: usize,
        cb: impl Fn(&str, Option<Value>) + Send + Sync + 'static,
    ) -> Result<DeepSubscription, StoreError> {
        self.store.deep(&self.full(name), depth, cb).await
    }

    pub async fn emit(&self, name: &str, value: Option<Value>) {
        self.store.emit(&self.full(name), value).await;
    }

    pub async fn trigger(&self, name: &str) {
        self.store.trigger(&self.full(name)).await;
    }
}
