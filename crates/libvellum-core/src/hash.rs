use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ciborium::Value;

use crate::error::{StoreError, VellumError};
use crate::logbook::entry::EntryKind;
use crate::types::ids::{ActorId, EntryId};
use crate::types::snapshot::Snapshot;

/// Schema version for entry hashing
pub const SCHEMA_VERSION: u8 = 1;

/// Prefix of every snapshot path
pub const PATH_PREFIX: &str = "/blake2b/";

fn blake2b_256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Compute the content path of a snapshot: BLAKE2b-256 over the canonical
/// CBOR of every field except `path` itself.
pub fn compute_snapshot_path(snapshot: &Snapshot) -> Result<String, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(&snapshot.without_path(), &mut buf)
        .map_err(|e| StoreError::Cbor(e.to_string()))?;
    Ok(format!("{}{}", PATH_PREFIX, hex::encode(blake2b_256(&buf))))
}

/// Compute an entry id using canonical CBOR + BLAKE2b-256
pub fn compute_entry_id(
    prev: Option<&EntryId>,
    actor: &ActorId,
    ts_unix_ms: u64,
    kind: &EntryKind,
) -> Result<EntryId, VellumError> {
    let preimage = build_canonical_cbor(prev, actor, ts_unix_ms, kind)?;
    Ok(blake2b_256(&preimage))
}

/// Build the canonical CBOR preimage for hashing
/// Format: [schema_version, prev, actor, ts_unix_ms, kind_tag, kind_payload]
pub fn build_canonical_cbor(
    prev: Option<&EntryId>,
    actor: &ActorId,
    ts_unix_ms: u64,
    kind: &EntryKind,
) -> Result<Vec<u8>, VellumError> {
    let (kind_tag, kind_payload) = kind_to_tag_and_payload(kind);

    let prev_value = match prev {
        Some(p) => Value::Bytes(p.to_vec()),
        None => Value::Null,
    };

    let array = Value::Array(vec![
        Value::Integer(SCHEMA_VERSION.into()),
        prev_value,
        Value::Bytes(actor.to_vec()),
        Value::Integer(ts_unix_ms.into()),
        Value::Integer(kind_tag.into()),
        kind_payload,
    ]);

    let mut buf = Vec::new();
    ciborium::into_writer(&array, &mut buf)
        .map_err(|e| VellumError::Internal(format!("CBOR serialization failed: {}", e)))?;
    Ok(buf)
}

/// Convert EntryKind to (tag, payload) for CBOR encoding
pub fn kind_to_tag_and_payload(kind: &EntryKind) -> (u32, Value) {
    match kind {
        EntryKind::Init { name, nonce } => (
            1,
            Value::Array(vec![
                Value::Text(name.clone()),
                Value::Integer((*nonce).into()),
            ]),
        ),
        EntryKind::Commit {
            snapshot_ref,
            summary,
        } => (
            2,
            Value::Array(vec![
                Value::Text(snapshot_ref.clone()),
                Value::Text(summary.clone()),
            ]),
        ),
        EntryKind::DeleteRevisions { count } => (
            3,
            Value::Array(vec![Value::Integer((*count as u64).into())]),
        ),
        EntryKind::DeleteAll => (4, Value::Array(vec![])),
    }
}
