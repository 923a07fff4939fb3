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

mod clock;
mod codec;
mod row_store;
mod uid;

pub use clock::ManualClock;
pub use clock::StoreClock;
pub use clock::SystemClock;
pub use codec::CodecError;
pub use codec::RowCodec;
pub use row_store::RowList;
pub use row_store::RowStore;
pub use uid::UidSource;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A backend left a `RowStore` operation unimplemented. This is a
    /// construction-time programmer error, never retried.
    #[error("row store operation not implemented")]
    NotSupported,

    #[error("corrupted row data")]
    CorruptedData,

    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn other<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        StoreError::Other(Box::new(e))
    }
}
