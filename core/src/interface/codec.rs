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
use tokio::io::{AsyncRead, AsyncWrite};

use crate::models::Row;

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed backup data: {0}")]
    Malformed(String),
}

/// Serializes the row collection for backup and reads it back.
///
/// `restore` decodes the whole stream before returning, so a failure
/// partway through yields an error and no rows rather than a truncated
/// list.
#[async_trait]
pub trait RowCodec: Send + Sync {
    async fn backup(
        &self,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        rows: &[Row],
    ) -> Result<(), CodecError>;

    async fn restore(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Vec<Row>, CodecError>;
}
