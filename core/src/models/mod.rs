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

mod value;

pub use value::is_empty;
pub use value::PropertyMap;
pub use value::Value;

/// Milliseconds since the Unix epoch.
pub type RowTimestamp = u64;

/// Unique row identifier, lexicographically sortable by creation time.
pub type RowId = Arc<str>;

/// The only persisted entity. `k` and `z` never change after insertion;
/// `d`, `t`, `e` may be rewritten in place by the tombstone-cascade update.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub k: Arc<str>,
    pub d: Option<Value>,
    pub t: RowTimestamp,
    pub e: Option<RowTimestamp>,
    pub z: RowId,
}

/// Input to `RowStore::insert`. The store assigns `t` (when not supplied)
/// and always assigns a fresh `z`.
#[derive(Debug, Clone)]
pub struct RowDraft {
    pub k: Arc<str>,
    pub d: Option<Value>,
    pub t: Option<RowTimestamp>,
    pub e: Option<RowTimestamp>,
}

impl RowDraft {
    pub fn new(k: &str, d: Option<Value>) -> Self {
        RowDraft {
            k: Arc::from(k),
            d,
            t: None,
            e: None,
        }
    }

    pub fn at(mut self, t: RowTimestamp) -> Self {
        self.t = Some(t);
        self
    }

    pub fn expiring(mut self, e: Option<RowTimestamp>) -> Self {
        self.e = e;
        self
    }
}

/// Target of a `RowStore::find`: either every row, or all rows related to
/// one key (the key itself, its ancestors, and its descendants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope<'a> {
    All,
    Key(&'a str),
}

