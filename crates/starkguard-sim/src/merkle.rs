//! Binary BLAKE3 Merkle tree over 32-byte leaves.
//!
//! Odd nodes are paired with themselves. Authentication paths are the sibling
//! hashes from leaf to root, concatenated.

use blake3::Hasher;

/// 32-byte node.
pub type Node = [u8; 32];

#[inline]
fn parent(a: &Node, b: &Node) -> Node {
    let mut h = Hasher::new();
    h.update(b"node");
    h.update(a);
    h.update(b);
    *h.finalize().as_bytes()
}

/// Full tree, level by level from the leaves up.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Node>>,
}

impl MerkleTree {
    /// Build a tree; an empty leaf set hashes to the all-zero root.
    #[must_use]
    pub fn build(leaves: Vec<Node>) -> Self {
        let mut levels = vec![leaves];
        while levels.last().is_some_and(|l| l.len() > 1) {
            let prev = levels.last().map_or(&[][..], Vec::as_slice);
            let next = prev
                .chunks(2)
                .map(|pair| parent(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// Root hash.
    #[must_use]
    pub fn root(&self) -> Node {
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    /// Sibling path for leaf `index`, concatenated; empty if out of range.
    #[must_use]
    pub fn path(&self, mut index: usize) -> Vec<u8> {
        let mut out = Vec::new();
        if self.levels.first().map_or(true, |l| index >= l.len()) {
            return out;
        }
        for level in &self.levels[..self.levels.len() - 1] {
            let sib = index ^ 1;
            let node = level.get(sib).unwrap_or(&level[index]);
            out.extend_from_slice(node);
            index /= 2;
        }
        out
    }
}

/// Check `path` authenticates `leaf` at `index` under `root`.
#[must_use]
pub fn verify_path(root: &Node, leaf: &Node, mut index: usize, path: &[u8]) -> bool {
    if path.len() % 32 != 0 {
        return false;
    }
    let mut acc = *leaf;
    for sib in path.chunks_exact(32) {
        let mut s = [0u8; 32];
        s.copy_from_slice(sib);
        acc = if index % 2 == 0 {
            parent(&acc, &s)
        } else {
            parent(&s, &acc)
        };
        index /= 2;
    }
    &acc == root
}
