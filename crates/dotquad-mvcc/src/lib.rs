//! etcd MVCC on-disk record layout.
//!
//! The `key` bucket of an etcd backend maps a revision key to a
//! protobuf-encoded `mvccpb.KeyValue`. This crate decodes both halves.

pub mod record;
pub mod revision;

pub use record::{KeyValue, decode_record};
pub use revision::{REVISION_KEY_LEN, Revision};
