//! Backend-independent checks every [`BlobStore`] must pass.
//!
//! The checks return a [`ConformanceError`] instead of panicking so they can
//! be driven from any test harness. Each expects an empty store.

use crate::context::OpContext;
use crate::error::StorageError;
use crate::traits::{BlobStore, BlobStoreExt};
use bytes::Bytes;
use futures::TryStreamExt;
use stash_core::{BlobId, ErrorKind};
use std::collections::BTreeMap;
use thiserror::Error;

/// A failed conformance check.
#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error("{step}: {source}")]
    Storage {
        step: String,
        #[source]
        source: StorageError,
    },

    #[error("{step}: {detail}")]
    Mismatch { step: String, detail: String },
}

pub type ConformanceResult<T> = Result<T, ConformanceError>;

trait Step<T> {
    fn step(self, step: &str) -> ConformanceResult<T>;
}

impl<T> Step<T> for Result<T, StorageError> {
    fn step(self, step: &str) -> ConformanceResult<T> {
        self.map_err(|source| ConformanceError::Storage {
            step: step.to_string(),
            source,
        })
    }
}

fn mismatch(step: &str, detail: impl Into<String>) -> ConformanceError {
    ConformanceError::Mismatch {
        step: step.to_string(),
        detail: detail.into(),
    }
}

fn expect_kind<T>(step: &str, result: Result<T, StorageError>, kind: ErrorKind) -> ConformanceResult<()> {
    match result {
        Ok(_) => Err(mismatch(step, format!("expected {kind} error, got success"))),
        Err(e) if e.kind() == kind => Ok(()),
        Err(e) => Err(mismatch(step, format!("expected {kind} error, got {e}"))),
    }
}

/// Deterministic payload of `len` bytes.
fn payload(seed: u8, len: usize) -> Bytes {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect::<Vec<u8>>()
        .into()
}

fn blob_id(s: &str) -> ConformanceResult<BlobId> {
    BlobId::new(s).map_err(|e| mismatch("fixture", e.to_string()))
}

/// Sizes chosen to cover empty blobs and multi-chunk streams.
const FIXTURES: &[(&str, usize)] = &[
    ("abcdef0123", 10),
    ("abcdef4567", 0),
    ("abcxyz0000", 4096),
    ("fedcba9876", 200_000),
];

/// Exercise put, get, range reads, streaming, overwrite, list and delete.
///
/// Ids are ten characters long, so any shard spec consuming at most nine
/// characters is supported.
pub async fn verify_storage(cx: &OpContext, store: &dyn BlobStore) -> ConformanceResult<()> {
    let mut blobs = BTreeMap::new();
    for (seed, (id, len)) in FIXTURES.iter().enumerate() {
        blobs.insert(blob_id(id)?, payload(seed as u8, *len));
    }

    if !store.list_all(cx, "").await.step("initial list")?.is_empty() {
        return Err(mismatch("initial list", "store is not empty"));
    }

    for id in blobs.keys() {
        expect_kind("get before put", store.get_blob(cx, id).await, ErrorKind::NotFound)?;
    }

    for (id, data) in &blobs {
        store.put_blob(cx, id, data.clone()).await.step("put")?;
    }
    for (id, data) in &blobs {
        let got = store.get_blob(cx, id).await.step("get")?;
        if &got != data {
            return Err(mismatch(
                "get",
                format!("{id}: got {} bytes, want {}", got.len(), data.len()),
            ));
        }
    }

    verify_ranges(cx, store, &blobs).await?;
    verify_streams(cx, store, &blobs).await?;

    let first = blob_id(FIXTURES[0].0)?;
    let replacement = payload(99, 33);
    store
        .put_blob(cx, &first, replacement.clone())
        .await
        .step("overwrite")?;
    if store.get_blob(cx, &first).await.step("get after overwrite")? != replacement {
        return Err(mismatch("get after overwrite", "old content returned"));
    }
    blobs.insert(first.clone(), replacement);

    verify_listing(cx, store, &blobs).await?;

    store.delete_blob(cx, &first).await.step("delete")?;
    expect_kind("get after delete", store.get_blob(cx, &first).await, ErrorKind::NotFound)?;
    store
        .delete_blob(cx, &first)
        .await
        .step("delete of missing blob")?;
    blobs.remove(&first);
    verify_listing(cx, store, &blobs).await?;

    for id in blobs.keys() {
        store.delete_blob(cx, id).await.step("delete all")?;
    }
    let remaining = store.list_all(cx, "").await.step("final list")?;
    if !remaining.is_empty() {
        return Err(mismatch(
            "final list",
            format!("{} blobs left after deleting everything", remaining.len()),
        ));
    }

    Ok(())
}

async fn verify_ranges(
    cx: &OpContext,
    store: &dyn BlobStore,
    blobs: &BTreeMap<BlobId, Bytes>,
) -> ConformanceResult<()> {
    for (id, data) in blobs {
        let len = data.len() as u64;
        let mut cases = vec![(0, len), (0, 0)];
        if len > 4 {
            cases.extend([(1, 3), (len - 4, 4), (len / 2, len - len / 2)]);
        }
        for (offset, length) in cases {
            let got = store
                .get_blob_range(cx, id, offset, length)
                .await
                .step("range read")?;
            let want = data.slice(offset as usize..(offset + length) as usize);
            if got != want {
                return Err(mismatch(
                    "range read",
                    format!("{id} [{offset}, +{length}): wrong content"),
                ));
            }
        }
        expect_kind(
            "range read past end",
            store.get_blob_range(cx, id, len, 1).await,
            ErrorKind::Precondition,
        )?;
    }
    Ok(())
}

async fn verify_streams(
    cx: &OpContext,
    store: &dyn BlobStore,
    blobs: &BTreeMap<BlobId, Bytes>,
) -> ConformanceResult<()> {
    for (id, data) in blobs {
        let chunks: Vec<Bytes> = store
            .get_blob_stream(cx, id)
            .await
            .step("open stream")?
            .try_collect()
            .await
            .step("read stream")?;
        if chunks.concat() != data.as_ref() {
            return Err(mismatch("stream", format!("{id}: wrong content")));
        }
    }
    Ok(())
}

async fn verify_listing(
    cx: &OpContext,
    store: &dyn BlobStore,
    blobs: &BTreeMap<BlobId, Bytes>,
) -> ConformanceResult<()> {
    for prefix in ["", "a", "abc", "abcdef", "abcdef0123", "f", "zzz"] {
        let listed = store.list_all(cx, prefix).await.step("list")?;
        let mut got = BTreeMap::new();
        for meta in listed {
            if got.insert(meta.id.clone(), meta.length).is_some() {
                return Err(mismatch("list", format!("{} reported twice", meta.id)));
            }
        }
        let want: BTreeMap<BlobId, u64> = blobs
            .iter()
            .filter(|(id, _)| id.has_prefix(prefix))
            .map(|(id, data)| (id.clone(), data.len() as u64))
            .collect();
        if got != want {
            return Err(mismatch(
                "list",
                format!("prefix '{prefix}': got {got:?}, want {want:?}"),
            ));
        }
    }
    Ok(())
}

/// Persist the store's connection info, reconnect with it, and verify both
/// handles see the same blobs.
pub async fn assert_connection_info_round_trips(
    cx: &OpContext,
    store: &dyn BlobStore,
) -> ConformanceResult<()> {
    let info = store.connection_info();
    let json = serde_json::to_string(&info)
        .map_err(|e| mismatch("serialize connection info", e.to_string()))?;
    let restored = serde_json::from_str(&json)
        .map_err(|e| mismatch("deserialize connection info", e.to_string()))?;
    if info != restored {
        return Err(mismatch(
            "connection info",
            format!("{info:?} changed to {restored:?}"),
        ));
    }

    let reconnected = crate::connect(cx, &restored).await.step("reconnect")?;
    if reconnected.connection_info() != info {
        return Err(mismatch("reconnect", "connection info differs"));
    }

    let id = blob_id("roundtrip0001")?;
    let data = payload(7, 123);
    store.put_blob(cx, &id, data.clone()).await.step("put via original")?;
    let got = reconnected
        .get_blob(cx, &id)
        .await
        .step("get via reconnected")?;
    if got != data {
        return Err(mismatch("get via reconnected", "wrong content"));
    }
    reconnected
        .delete_blob(cx, &id)
        .await
        .step("delete via reconnected")?;
    expect_kind(
        "get via original after delete",
        store.get_blob(cx, &id).await,
        ErrorKind::NotFound,
    )?;
    reconnected.close(cx).await.step("close reconnected")?;
    Ok(())
}

/// Close the store and verify it refuses further work.
pub async fn verify_close(cx: &OpContext, store: &dyn BlobStore) -> ConformanceResult<()> {
    let id = blob_id("closed00001")?;
    store.close(cx).await.step("close")?;

    expect_kind("get after close", store.get_blob(cx, &id).await, ErrorKind::Precondition)?;
    expect_kind(
        "put after close",
        store.put_blob(cx, &id, Bytes::from_static(b"x")).await,
        ErrorKind::Precondition,
    )?;
    expect_kind(
        "list after close",
        store.list_all(cx, "").await,
        ErrorKind::Precondition,
    )?;
    expect_kind("second close", store.close(cx).await, ErrorKind::Precondition)?;
    Ok(())
}
