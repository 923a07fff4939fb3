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

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::interface::{CodecError, RowCodec};
use crate::models::{Row, Value};

/// One row per line as a JSON object, the `d` and `e` fields omitted
/// when absent. Blank lines are tolerated on the way back in.
#[derive(Debug, Default)]
pub struct JsonLinesCodec;

impl JsonLinesCodec {
    pub fn new() -> Self {
        JsonLinesCodec
    }
}

/// On-the-wire shape of a row.
#[derive(Debug, Serialize, Deserialize)]
struct WireRow {
    k: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<serde_json::Value>,
    t: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<u64>,
    z: String,
}

impl From<&Row> for WireRow {
    fn from(row: &Row) -> Self {
        WireRow {
            k: row.k.to_string(),
            d: row.d.as_ref().map(Into::into),
            t: row.t,
            e: row.e,
            z: row.z.to_string(),
        }
    }
}

impl WireRow {
    fn into_row(self) -> Option<Row> {
        if self.k.is_empty() || self.z.is_empty() {
            return None;
        }
        Some(Row {
            k: Arc::from(self.k.as_str()),
            d: self.d.as_ref().map(Value::from),
            t: self.t,
            e: self.e,
            z: Arc::from(self.z.as_str()),
        })
    }
}

#[async_trait]
impl RowCodec for JsonLinesCodec {
    async fn backup(
        &self,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        rows: &[Row],
    ) -> Result<(), CodecError> {
        for row in rows {
            let line = serde_json::to_string(&WireRow::from(row))
                .map_err(|err| CodecError::Malformed(err.to_string()))?;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }

    async fn restore(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Vec<Row>, CodecError> {
        let mut lines = BufReader::new(reader).lines();
        let mut rows = Vec::new();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let wire: WireRow = serde_json::from_str(&line)
                .map_err(|err| CodecError::Malformed(format!("line {line_no}: {err}")))?;
            let row = wire
                .into_row()
                .ok_or_else(|| CodecError::Malformed(format!("line {line_no}: empty key or id")))?;
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use super::*;
    use crate::models::{RowDraft, Value};

    fn row(k: &str, d: Option<Value>, t: u64, e: Option<u64>) -> Row {
        let draft = RowDraft::new(k, d).at(t).expiring(e);
        Row {
            k: draft.k,
            d: draft.d,
            t,
            e,
            z: Arc::from(format!("id-{t}").as_str()),
        }
    }

    #[tokio::test]
    async fn backup_then_restore_preserves_rows() {
        let rows = vec![
            row("user.name", Some(Value::from("ada")), 10, None),
            row("session", Some(Value::from(true)), 20, Some(5_000)),
            row("user.name", None, 30, None),
        ];
        let codec = JsonLinesCodec::new();
        let mut buffer = Vec::new();
        codec.backup(&mut buffer, &rows).await.unwrap();
        assert_eq!(buffer.iter().filter(|b| **b == b'\n').count(), 3);

        let mut reader = Cursor::new(buffer);
        let restored = codec.restore(&mut reader).await.unwrap();
        assert_eq!(restored, rows);
    }

    #[tokio::test]
    async fn wire_format_omits_absent_fields() {
        let codec = JsonLinesCodec::new();
        let mut buffer = Vec::new();
        codec
            .backup(&mut buffer, &[row("a", None, 5, None)])
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "{\"k\":\"a\",\"t\":5,\"z\":\"id-5\"}\n"
        );
    }

    #[tokio::test]
    async fn restore_skips_blank_lines() {
        let codec = JsonLinesCodec::new();
        let data = b"\n{\"k\":\"a\",\"d\":1,\"t\":7,\"z\":\"id-7\"}\n\n".to_vec();
        let mut reader = Cursor::new(data);
        let restored = codec.restore(&mut reader).await.unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].k.as_ref(), "a");
        assert_eq!(restored[0].t, 7);
    }

    #[tokio::test]
    async fn restore_rejects_malformed_lines() {
        let codec = JsonLinesCodec::new();

        let mut not_json = Cursor::new(b"not json at all\n".to_vec());
        assert!(matches!(
            codec.restore(&mut not_json).await,
            Err(CodecError::Malformed(_))
        ));

        let mut missing_key = Cursor::new(b"{\"t\":1,\"z\":\"id\"}\n".to_vec());
        assert!(matches!(
            codec.restore(&mut missing_key).await,
            Err(CodecError::Malformed(_))
        ));

        let mut empty_key = Cursor::new(b"{\"k\":\"\",\"t\":1,\"z\":\"id\"}\n".to_vec());
        assert!(matches!(
            codec.restore(&mut empty_key).await,
            Err(CodecError::Malformed(_))
        ));
    }
}
