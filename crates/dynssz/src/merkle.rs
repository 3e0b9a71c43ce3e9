//! Merkleization primitives.
//!
//! SHA-256 is consumed through the `digest` trait; a precomputed zero-hash
//! table serves virtual padding so merkleizing a short chunk array to a
//! large leaf limit costs `O(count + log limit)`, not `O(limit)`.

use std::sync::LazyLock;

use digest::Digest;
use dynssz_primitives::Hash256;
use sha2::Sha256;

/// Number of bytes per merkle chunk.
pub const BYTES_PER_CHUNK: usize = 32;

/// Deepest zero-hash kept in the table; covers every reachable leaf count.
pub const ZERO_HASHES_MAX_DEPTH: usize = 64;

/// `ZERO_HASHES[d]` is the root of a depth-`d` tree of zero chunks.
pub static ZERO_HASHES: LazyLock<Vec<Hash256>> = LazyLock::new(|| {
    let mut hashes = vec![Hash256::ZERO; ZERO_HASHES_MAX_DEPTH + 1];
    for i in 0..ZERO_HASHES_MAX_DEPTH {
        hashes[i + 1] = hash32_concat(hashes[i].as_slice(), hashes[i].as_slice());
    }
    hashes
});

/// `sha256(data)`.
pub fn hash_fixed(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash256::from_slice(&hasher.finalize())
}

/// `sha256(left || right)` over two 32-byte nodes.
pub fn hash32_concat(left: &[u8], right: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    Hash256::from_slice(&hasher.finalize())
}

fn zero_hash(depth: usize) -> Hash256 {
    ZERO_HASHES[depth.min(ZERO_HASHES_MAX_DEPTH)]
}

fn chunkify(chunks: &[u8]) -> Vec<Hash256> {
    chunks
        .chunks(BYTES_PER_CHUNK)
        .map(Hash256::from_slice)
        .collect()
}

/// Merkleizes a packed chunk region, padding the leaf count to the next
/// power of two of `max(chunk_count, leaf_limit)`. A `leaf_limit` of 0
/// means "as many leaves as there are chunks". A trailing partial chunk
/// is zero-padded.
pub fn merkleize_chunks(chunks: &[u8], leaf_limit: usize) -> Hash256 {
    let count = chunks.len().div_ceil(BYTES_PER_CHUNK);
    let leaves = count.max(leaf_limit).max(1).next_power_of_two();

    if leaves == 1 {
        return if count == 0 {
            Hash256::ZERO
        } else {
            Hash256::from_slice(chunks)
        };
    }

    let mut level = chunkify(chunks);
    let mut depth = 0usize;
    while (1usize << depth) < leaves {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let node = if pair.len() == 2 {
                hash32_concat(pair[0].as_slice(), pair[1].as_slice())
            } else {
                hash32_concat(pair[0].as_slice(), zero_hash(depth).as_slice())
            };
            next.push(node);
        }
        level = next;
        depth += 1;
    }
    level.first().copied().unwrap_or_else(|| zero_hash(depth))
}

/// Progressive merkleization: the chunk array is split into subtrees of
/// 1, 4, 16, ... leaves; each level hashes the recursion over the rest
/// with the merkleization of its head. An empty region is the zero chunk.
pub fn merkleize_progressive(chunks: &[u8]) -> Hash256 {
    merkleize_progressive_at(chunks, 1)
}

fn merkleize_progressive_at(chunks: &[u8], num_leaves: usize) -> Hash256 {
    if chunks.is_empty() {
        return Hash256::ZERO;
    }
    let head_bytes = (num_leaves * BYTES_PER_CHUNK).min(chunks.len());
    let head = &chunks[..head_bytes];
    let rest = &chunks[head_bytes..];
    let left = merkleize_progressive_at(rest, num_leaves * 4);
    let right = merkleize_chunks(head, num_leaves);
    hash32_concat(left.as_slice(), right.as_slice())
}

/// Mixes a length into a root: `hash(root || little_endian(length))`.
pub fn mix_in_length(root: &Hash256, length: u64) -> Hash256 {
    let mut chunk = [0u8; BYTES_PER_CHUNK];
    chunk[..8].copy_from_slice(&length.to_le_bytes());
    hash32_concat(root.as_slice(), &chunk)
}

/// Mixes a union selector into a root.
pub fn mix_in_selector(root: &Hash256, selector: u8) -> Hash256 {
    let mut chunk = [0u8; BYTES_PER_CHUNK];
    chunk[0] = selector;
    hash32_concat(root.as_slice(), &chunk)
}

/// Mixes an auxiliary node (e.g. an active-fields chunk) into a root.
pub fn mix_in_aux(root: &Hash256, aux: &Hash256) -> Hash256 {
    hash32_concat(root.as_slice(), aux.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_table_is_consistent() {
        assert_eq!(ZERO_HASHES[0], Hash256::ZERO);
        assert_eq!(
            ZERO_HASHES[1],
            hash32_concat(&[0u8; 32], &[0u8; 32])
        );
        assert_eq!(
            ZERO_HASHES[2],
            hash32_concat(ZERO_HASHES[1].as_slice(), ZERO_HASHES[1].as_slice())
        );
    }

    #[test]
    fn single_chunk_is_identity() {
        let mut chunk = [0u8; 32];
        chunk[0] = 7;
        assert_eq!(merkleize_chunks(&chunk, 0), Hash256::from_slice(&chunk));
        assert_eq!(merkleize_chunks(&chunk, 1), Hash256::from_slice(&chunk));
    }

    #[test]
    fn partial_chunk_is_zero_padded() {
        let root_short = merkleize_chunks(&[7u8], 0);
        let mut chunk = [0u8; 32];
        chunk[0] = 7;
        assert_eq!(root_short, Hash256::from_slice(&chunk));
    }

    #[test]
    fn two_chunks_hash_pairwise() {
        let mut chunks = [0u8; 64];
        chunks[0] = 1;
        chunks[32] = 2;
        assert_eq!(
            merkleize_chunks(&chunks, 0),
            hash32_concat(&chunks[..32], &chunks[32..])
        );
    }

    #[test]
    fn limit_pads_with_zero_subtrees() {
        let mut chunk = [0u8; 32];
        chunk[0] = 3;
        // One chunk with a limit of 4 leaves: two levels of zero padding.
        let expected = hash32_concat(
            hash32_concat(&chunk, ZERO_HASHES[0].as_slice()).as_slice(),
            ZERO_HASHES[1].as_slice(),
        );
        assert_eq!(merkleize_chunks(&chunk, 4), expected);
    }

    #[test]
    fn empty_region_with_limit_is_zero_tree() {
        assert_eq!(merkleize_chunks(&[], 8), ZERO_HASHES[3]);
        assert_eq!(merkleize_chunks(&[], 0), Hash256::ZERO);
    }

    #[test]
    fn progressive_empty_is_zero_chunk() {
        assert_eq!(merkleize_progressive(&[]), Hash256::ZERO);
    }

    #[test]
    fn progressive_single_chunk() {
        let mut chunk = [0u8; 32];
        chunk[0] = 9;
        // hash(recursion-on-empty, merkleize(head, 1))
        let expected = hash32_concat(Hash256::ZERO.as_slice(), &chunk);
        assert_eq!(merkleize_progressive(&chunk), expected);
    }

    #[test]
    fn progressive_two_levels() {
        // 3 chunks: head of 1, then a 4-leaf subtree holding the other 2.
        let mut chunks = [0u8; 96];
        chunks[0] = 1;
        chunks[32] = 2;
        chunks[64] = 3;
        let tail = hash32_concat(
            Hash256::ZERO.as_slice(),
            merkleize_chunks(&chunks[32..], 4).as_slice(),
        );
        let expected = hash32_concat(tail.as_slice(), &chunks[..32]);
        assert_eq!(merkleize_progressive(&chunks), expected);
    }

    #[test]
    fn length_mixin() {
        let root = Hash256::from_slice(&[42u8; 32]);
        let mut len_chunk = [0u8; 32];
        len_chunk[0] = 5;
        assert_eq!(
            mix_in_length(&root, 5),
            hash32_concat(root.as_slice(), &len_chunk)
        );
    }
}
