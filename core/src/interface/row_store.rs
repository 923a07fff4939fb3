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

use async_trait::async_trait;

use crate::models::{KeyScope, Row, RowDraft, RowId, RowTimestamp};

use super::StoreError;

pub type RowList = Vec<Row>;

/// Primitive, path-unaware operations over the row collection.
///
/// All operations are total: acting on a missing key or id is a
/// successful no-op returning a zero count. Every method has a default
/// body failing with [`StoreError::NotSupported`] so a partial backend
/// fails fast at the first unimplemented call.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Rows related to the scope (equal key, ancestors, descendants; or
    /// every row for [`KeyScope::All`]), restricted to `row.t < t` when a
    /// cutoff is given, stably sorted ascending by `t`.
    async fn find(
        &self,
        scope: KeyScope<'_>,
        t: Option<RowTimestamp>,
    ) -> Result<RowList, StoreError> {
        let _ = (scope, t);
        Err(StoreError::NotSupported)
    }

    /// Rows whose `z` is in `ids`, restricted to `row.t < t` when given.
    async fn find_ids(
        &self,
        ids: &[RowId],
        t: Option<RowTimestamp>,
    ) -> Result<RowList, StoreError> {
        let _ = (ids, t);
        Err(StoreError::NotSupported)
    }

    /// Rows with an expiry set; with a cutoff, only those with
    /// `row.e < e`.
    async fn find_expiring(&self, e: Option<RowTimestamp>) -> Result<RowList, StoreError> {
        let _ = e;
        Err(StoreError::NotSupported)
    }

    /// Superseded permanent rows: among rows with no expiry, everything
    /// except the per-key winner. The winner is the greatest `(t, z)`,
    /// so ties at identical timestamps go to the last inserted row.
    async fn find_duplicates(&self) -> Result<RowList, StoreError> {
        Err(StoreError::NotSupported)
    }

    /// Distinct keys among rows passing the time filter, first-occurrence
    /// order preserved.
    async fn list_keys(&self, t: Option<RowTimestamp>) -> Result<Vec<RowId>, StoreError> {
        let _ = t;
        Err(StoreError::NotSupported)
    }

    /// Distinct root segments among rows passing the time filter.
    async fn root_keys(&self, t: Option<RowTimestamp>) -> Result<Vec<RowId>, StoreError> {
        let _ = t;
        Err(StoreError::NotSupported)
    }

    /// Assigns `t` (when absent) and a fresh `z`, appends, returns the
    /// stored row.
    async fn insert(&self, draft: RowDraft) -> Result<Row, StoreError> {
        let _ = draft;
        Err(StoreError::NotSupported)
    }

    /// Rewrites `d`, `t`, `e` of the row with matching `z` in place;
    /// no-op when absent.
    async fn update(&self, row: &Row) -> Result<(), StoreError> {
        let _ = row;
        Err(StoreError::NotSupported)
    }

    /// Deletes all rows whose `z` is in `ids`; returns the count removed.
    async fn remove_by_ids(&self, ids: &[RowId]) -> Result<usize, StoreError> {
        let _ = ids;
        Err(StoreError::NotSupported)
    }

    /// Deletes all rows with `row.t < t`; returns the count removed.
    async fn remove_all(&self, t: RowTimestamp) -> Result<usize, StoreError> {
        let _ = t;
        Err(StoreError::NotSupported)
    }

    /// Deletes rows at `name` or below it, skipping rows with
    /// `row.e <= e` when the `e` filter is set and rows with
    /// `row.t >= t` when the `t` filter is set; returns the count.
    async fn remove(
        &self,
        name: &str,
        t: Option<RowTimestamp>,
        e: Option<RowTimestamp>,
    ) -> Result<usize, StoreError> {
        let _ = (name, t, e);
        Err(StoreError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBackend;

    impl RowStore for NullBackend {}

    #[tokio::test]
    async fn unimplemented_operations_fail_fast() {
        let backend = NullBackend;
        assert!(matches!(
            backend.find(KeyScope::All, None).await,
            Err(StoreError::NotSupported)
        ));
        assert!(matches!(
            backend.find_duplicates().await,
            Err(StoreError::NotSupported)
        ));
        assert!(matches!(
            backend.insert(RowDraft::new("a", None)).await,
            Err(StoreError::NotSupported)
        ));
        assert!(matches!(
            backend.remove("a", None, None).await,
            Err(StoreError::NotSupported)
        ));
    }
}
