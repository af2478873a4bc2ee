//! PayloadCodec - ペイロードと配送 bytes の相互変換
//!
//! JSON（フィールド名タグ付き）で固定する。decode 時に未知フィールドは無視するので、
//! フィールド追加は前方互換になる。

use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json encode: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("json decode: {0}")]
    Decode(#[source] serde_json::Error),
}

pub struct PayloadCodec;

impl PayloadCodec {
    pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(CodecError::Encode)
    }

    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}
