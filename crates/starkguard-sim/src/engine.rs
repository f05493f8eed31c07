//! Deterministic reference engine.
//!
//! Proof shape for an input of `length = n`:
//!
//! | index          | kind       | content                                   |
//! |----------------|------------|-------------------------------------------|
//! | 0              | `puzzle`   | input encoding                            |
//! | 1..=4          | `m-root`   | column commitments                        |
//! | 5              | `comp-m`   | composition commitment                    |
//! | 6.. (2 per row)| `codeword`, `m-path` | row value and its authentication path |
//! | tail           | `terms`, `evals`, `poly` | transcript challenges           |
//!
//! `9 + 2n` objects in total. The proof hash is BLAKE3 over the tagged objects.

use crate::merkle::{verify_path, MerkleTree, Node};
use crate::transcript::{Label, Transcript};
use blake3::Hasher;
use starkguard_core::config::EngineConfig;
use starkguard_core::{
    ExpectedLayout, ObjectKind, OracleFailure, ProofLayout, ProofObject, ProofOutput, ProveInput,
    ProvingEngine, ProvingFailure, VerificationOracle,
};
use tracing::debug;

/// Transcript domain.
const DOMAIN: &str = "starkguard.sim.v1";

/// Committed trace columns.
pub const COLUMNS: usize = 4;

/// Largest `length` the engine accepts.
pub const MAX_LENGTH: u64 = 1 << 16;

/// Objects that do not scale with `length`.
const FIXED_OBJECTS: usize = 1 + COLUMNS + 1 + 3;

/// Tunables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimConfig {
    /// Extra BLAKE3 rounds per trace row.
    pub grind_rounds: u32,
    /// Absorbed first; changes every proof.
    pub salt: String,
}

impl From<&EngineConfig> for SimConfig {
    fn from(c: &EngineConfig) -> Self {
        Self {
            grind_rounds: c.grind_rounds,
            salt: c.salt.clone(),
        }
    }
}

/// Reference proving engine, oracle and layout in one.
#[derive(Debug, Clone, Default)]
pub struct SimEngine {
    config: SimConfig,
}

impl SimEngine {
    /// Engine with `config`.
    #[must_use]
    pub const fn new(config: SimConfig) -> Self {
        Self { config }
    }

    fn rows(input: &ProveInput) -> Result<usize, ProvingFailure> {
        if input.length == 0 {
            return Err(ProvingFailure::new("length must be at least 1"));
        }
        if input.length > MAX_LENGTH {
            return Err(ProvingFailure::new(format!(
                "length {} exceeds the supported maximum of {MAX_LENGTH}",
                input.length
            )));
        }
        usize::try_from(input.length)
            .map_err(|_| ProvingFailure::new("length does not fit in usize"))
    }

    fn row_seed(&self, input: &ProveInput, row: usize) -> Node {
        let mut h = Hasher::new();
        h.update(b"row");
        h.update(&input.to_le_bytes());
        h.update(&(row as u64).to_le_bytes());
        let mut x = *h.finalize().as_bytes();
        for _ in 0..self.config.grind_rounds {
            x = *blake3::hash(&x).as_bytes();
        }
        x
    }

    /// Derive the full proof for `input`.
    fn derive(&self, input: &ProveInput) -> Result<Vec<ProofObject>, ProvingFailure> {
        let n = Self::rows(input)?;
        let mut objects = Vec::with_capacity(FIXED_OBJECTS + 2 * n);

        let mut t = Transcript::new(DOMAIN);
        t.absorb(Label::Salt, self.config.salt.as_bytes());
        let puzzle = input.to_le_bytes();
        t.absorb(Label::Input, &puzzle);
        objects.push(ProofObject::new(ObjectKind::Puzzle, puzzle));

        let seeds: Vec<Node> = (0..n).map(|i| self.row_seed(input, i)).collect();
        let columns: Vec<Vec<Node>> = (0..COLUMNS)
            .map(|c| seeds.iter().map(|s| column_leaf(c, s)).collect())
            .collect();
        for col in &columns {
            let root = MerkleTree::build(col.clone()).root();
            t.absorb(Label::ColumnRoot, &root);
            objects.push(ProofObject::new(ObjectKind::MerkleRoot, root.to_vec()));
        }

        let alpha = t.challenge32(Label::Composition);
        let composed: Vec<Node> = (0..n)
            .map(|i| {
                let mut h = Hasher::new();
                h.update(&alpha);
                for col in &columns {
                    h.update(&col[i]);
                }
                *h.finalize().as_bytes()
            })
            .collect();
        let comp_tree = MerkleTree::build(composed.clone());
        let comp_root = comp_tree.root();
        t.absorb(Label::Composition, &comp_root);
        objects.push(ProofObject::new(ObjectKind::CompositionMerkle, comp_root.to_vec()));

        for (i, word) in composed.iter().enumerate() {
            t.absorb(Label::Codeword, word);
            objects.push(ProofObject::new(ObjectKind::Codeword, word.to_vec()));
            objects.push(ProofObject::new(ObjectKind::MerklePath, comp_tree.path(i)));
        }

        objects.push(ProofObject::new(
            ObjectKind::Terms,
            t.challenge_bytes(Label::Terms, 8 * COLUMNS),
        ));

        let z = t.challenge32(Label::Evals);
        let mut evals = Vec::with_capacity(8 * COLUMNS);
        for obj in &objects[1..=COLUMNS] {
            let mut h = Hasher::new();
            h.update(&z);
            h.update(&obj.data);
            evals.extend_from_slice(&h.finalize().as_bytes()[..8]);
        }
        t.absorb(Label::Evals, &evals);
        objects.push(ProofObject::new(ObjectKind::Evals, evals));

        objects.push(ProofObject::new(ObjectKind::Poly, t.challenge32(Label::Poly).to_vec()));
        Ok(objects)
    }
}

fn column_leaf(column: usize, seed: &Node) -> Node {
    let mut h = Hasher::new();
    h.update(b"col");
    h.update(&(column as u64).to_le_bytes());
    h.update(seed);
    *h.finalize().as_bytes()
}

fn as_node(bytes: &[u8]) -> Option<Node> {
    bytes.try_into().ok()
}

/// Hex BLAKE3 over `(tag, data)` pairs, length prefixed.
#[must_use]
pub fn proof_digest(objects: &[ProofObject]) -> String {
    let mut h = Hasher::new();
    h.update(b"starkguard.proof.v1");
    for o in objects {
        let tag = o.kind.tag().as_bytes();
        h.update(&(tag.len() as u64).to_le_bytes());
        h.update(tag);
        h.update(&(o.data.len() as u64).to_le_bytes());
        h.update(&o.data);
    }
    h.finalize().to_hex().to_string()
}

impl ProvingEngine for SimEngine {
    fn prove(&self, input: &ProveInput) -> Result<ProofOutput, ProvingFailure> {
        let objects = self.derive(input)?;
        let proof_hash = proof_digest(&objects);
        debug!(objects = objects.len(), %proof_hash, "reference proof derived");
        Ok(ProofOutput { objects, proof_hash })
    }
}

impl VerificationOracle for SimEngine {
    /// Check the authentication paths, then replay the transcript and compare.
    fn verify(&self, input: &ProveInput, objects: &[ProofObject]) -> Result<bool, OracleFailure> {
        let n = Self::rows(input).map_err(|f| OracleFailure::new(f.diagnostic))?;
        if objects.len() != FIXED_OBJECTS + 2 * n {
            return Ok(false);
        }

        let Some(comp_root) = as_node(&objects[1 + COLUMNS].data) else {
            return Ok(false);
        };
        for i in 0..n {
            let word = &objects[2 + COLUMNS + 2 * i];
            let path = &objects[3 + COLUMNS + 2 * i];
            let authentic = as_node(&word.data)
                .is_some_and(|leaf| verify_path(&comp_root, &leaf, i, &path.data));
            if !authentic {
                debug!(row = i, "authentication path rejected");
                return Ok(false);
            }
        }

        let replay = self
            .derive(input)
            .map_err(|f| OracleFailure::new(f.diagnostic))?;
        match replay.iter().zip(objects).position(|(a, b)| a != b) {
            None => Ok(true),
            Some(index) => {
                debug!(index, "proof object differs from transcript replay");
                Ok(false)
            }
        }
    }
}

impl ProofLayout for SimEngine {
    fn expected_layout(&self, input: &ProveInput) -> ExpectedLayout {
        let n = usize::try_from(input.length).unwrap_or(usize::MAX);
        ExpectedLayout::with_count(n.saturating_mul(2).saturating_add(FIXED_OBJECTS))
            .require(ObjectKind::MerkleRoot, COLUMNS)
            .require(ObjectKind::CompositionMerkle, 1)
            .require(ObjectKind::Codeword, n)
            .require(ObjectKind::MerklePath, n)
            .require(ObjectKind::Terms, 1)
            .require(ObjectKind::Evals, 1)
            .require(ObjectKind::Poly, 1)
            .binding_input()
    }

    fn digest(&self, objects: &[ProofObject]) -> Option<String> {
        Some(proof_digest(objects))
    }
}
