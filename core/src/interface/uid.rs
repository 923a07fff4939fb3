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

use crate::models::RowTimestamp;

/// Produces row ids. Ids minted at a later `now` must sort after ids
/// minted earlier, since duplicate resolution breaks timestamp ties by
/// comparing ids lexicographically.
pub trait UidSource: Send + Sync {
    fn new_uid(&self, now: RowTimestamp) -> Arc<str>;
}
