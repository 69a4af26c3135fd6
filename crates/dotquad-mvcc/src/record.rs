//! `mvccpb.KeyValue` decoding.
//!
//! Decoding is strict: a field number outside the message definition is a
//! decode error rather than being skipped.

use dotquad_error::{DotquadError, Result};
use prost::encoding::{self, DecodeContext};
use tracing::trace;

/// A logical etcd key-value record.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct KeyValue {
    /// User key.
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    /// Revision of the last creation of this key.
    #[prost(int64, tag = "2")]
    pub create_revision: i64,
    /// Revision of the last modification of this key.
    #[prost(int64, tag = "3")]
    pub mod_revision: i64,
    /// Number of modifications since creation; reset by deletion.
    #[prost(int64, tag = "4")]
    pub version: i64,
    /// User value.
    #[prost(bytes = "vec", tag = "5")]
    pub value: Vec<u8>,
    /// Attached lease id, 0 when none.
    #[prost(int64, tag = "6")]
    pub lease: i64,
}

/// Decode a raw bucket value into a [`KeyValue`].
pub fn decode_record(raw: &[u8]) -> Result<KeyValue> {
    let mut buf = raw;
    let mut kv = KeyValue::default();
    let ctx = DecodeContext::default();

    while !buf.is_empty() {
        let offset = raw.len() - buf.len();
        let (tag, wire_type) = encoding::decode_key(&mut buf)
            .map_err(|e| DotquadError::malformed(format!("field key at byte {offset}: {e}")))?;
        let merged = match tag {
            1 => encoding::bytes::merge(wire_type, &mut kv.key, &mut buf, ctx.clone()),
            2 => encoding::int64::merge(wire_type, &mut kv.create_revision, &mut buf, ctx.clone()),
            3 => encoding::int64::merge(wire_type, &mut kv.mod_revision, &mut buf, ctx.clone()),
            4 => encoding::int64::merge(wire_type, &mut kv.version, &mut buf, ctx.clone()),
            5 => encoding::bytes::merge(wire_type, &mut kv.value, &mut buf, ctx.clone()),
            6 => encoding::int64::merge(wire_type, &mut kv.lease, &mut buf, ctx.clone()),
            other => {
                return Err(DotquadError::malformed(format!(
                    "unknown field {other} ({wire_type:?}) at byte {offset}"
                )));
            }
        };
        merged.map_err(|e| DotquadError::malformed(format!("field {tag} at byte {offset}: {e}")))?;
    }

    trace!(
        key_len = kv.key.len(),
        value_len = kv.value.len(),
        mod_revision = kv.mod_revision,
        "decoded record"
    );
    Ok(kv)
}
