//! Merkle root computation and validation

use crate::codec::{double_sha256, reversed};
use crate::types::{Block, Hash};

/// BuildMerkleRoot: ℍ* → ℍ
///
/// Leaves and result are display-order hashes.
/// 1. One leaf: return it unchanged
/// 2. Reverse every leaf to internal order
/// 3. Per level: pair adjacent hashes, pairing an odd last hash with itself,
///    and replace each pair with SHA256d(a ‖ b)
/// 4. Reverse the single remaining hash back to display order
///
/// An empty leaf list yields the all-zero hash.
pub fn build_root(leaves: &[Hash]) -> Hash {
    match leaves {
        [] => [0u8; 32],
        [single] => *single,
        _ => {
            let mut level: Vec<Hash> = leaves.iter().map(reversed).collect();
            while level.len() > 1 {
                level = level
                    .chunks(2)
                    .map(|pair| {
                        let left = &pair[0];
                        let right = pair.get(1).unwrap_or(left);
                        let mut combined = [0u8; 64];
                        combined[..32].copy_from_slice(left);
                        combined[32..].copy_from_slice(right);
                        double_sha256(&combined)
                    })
                    .collect();
            }
            reversed(&level[0])
        }
    }
}

/// Recompute the root from every transaction of `block` and compare it to the header.
pub fn validate(block: &Block) -> bool {
    build_root(&block.tx_hashes()) == block.header.merkle_root
}
