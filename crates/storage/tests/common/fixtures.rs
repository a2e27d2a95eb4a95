use bytes::Bytes;
use stash_core::{BlobId, ShardSpec};

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Hex blob id derived from `n`, twelve characters long.
#[allow(dead_code)]
pub fn blob_id(n: u64) -> BlobId {
    BlobId::new(format!("{:012x}", n.wrapping_mul(0x9e37_79b9_7f4a_7c15) >> 16)).unwrap()
}

/// Shard configurations every backend is exercised with.
#[allow(dead_code)]
pub fn shard_specs() -> Vec<ShardSpec> {
    [
        vec![],
        vec![1],
        vec![2],
        vec![3, 3],
        vec![1, 1],
        vec![1, 2],
        vec![2, 2, 2],
    ]
    .into_iter()
    .map(|widths| ShardSpec::new(widths).unwrap())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }

    #[test]
    fn test_blob_ids_are_distinct() {
        assert_ne!(blob_id(1), blob_id(2));
        assert_eq!(blob_id(7).len(), 12);
    }
}
