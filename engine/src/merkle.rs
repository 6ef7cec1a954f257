//! Account commitment tree.
//!
//! A binary SHA-256 hash tree over account leaves. Leaves are sorted by
//! account id before hashing, so the root is independent of input ordering.
//! A level with an odd node count pairs its last node with itself; the
//! convention uses no leaf/internal domain separation, a known
//! second-preimage caveat of naive Merkle constructions that is kept here
//! as the documented wire convention.
//!
//! The tree is not built for concurrent mutation: `update_leaf` takes
//! `&mut self` and rebuilds wholesale. Callers that share a tree across
//! tasks must serialize writers (e.g. behind an `RwLock`).

use crate::errors::EngineError;
use crate::models::Account;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Hash = [u8; 32];

/// One node of the tree. Nodes are owned exclusively by the tree that built
/// them; only leaves carry a raw value.
#[derive(Debug, Clone)]
pub struct MerkleNode {
    pub hash: Hash,
    /// Canonical JSON encoding of the account; leaves only.
    pub value: Option<String>,
    pub index: usize,
    pub is_leaf: bool,
}

/// Self-contained inclusion proof; verification needs no tree access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf_hash: Hash,
    pub leaf_value: String,
    pub siblings: Vec<Hash>,
    /// Parallel to `siblings`; true means the sibling sits on the right.
    pub directions: Vec<bool>,
    pub root: Hash,
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` is the leaf level; the last level holds the single root.
    levels: Vec<Vec<MerkleNode>>,
}

impl MerkleTree {
    /// Build a tree over a non-empty account set.
    pub fn build(accounts: &[Account]) -> Result<Self, EngineError> {
        if accounts.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        let mut sorted: Vec<Account> = accounts.to_vec();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let mut leaves = Vec::with_capacity(sorted.len());
        for (index, account) in sorted.iter().enumerate() {
            let value = serde_json::to_string(account)
                .map_err(|e| EngineError::LeafParse(format!("encode account: {e}")))?;
            leaves.push(MerkleNode {
                hash: leaf_hash(account),
                value: Some(value),
                index,
                is_leaf: true,
            });
        }

        let mut levels = vec![leaves];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let current = levels.last().map(|l| l.as_slice()).unwrap_or_default();
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in 0..current.len().div_ceil(2) {
                let left = &current[pair * 2];
                // Odd tail pairs with itself.
                let right = current.get(pair * 2 + 1).unwrap_or(left);
                next.push(MerkleNode {
                    hash: hash_pair(&left.hash, &right.hash),
                    value: None,
                    index: pair,
                    is_leaf: false,
                });
            }
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The committed root. Construction guarantees at least one leaf.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .map(|node| node.hash)
            .unwrap_or_default()
    }

    pub fn root_hex(&self) -> String {
        hex::encode(self.root())
    }

    pub fn height(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Inclusion proof for the leaf at `index`. Path length equals the tree
    /// height.
    pub fn proof_for_index(&self, index: usize) -> Result<MerkleProof, EngineError> {
        let len = self.leaf_count();
        if index >= len {
            return Err(EngineError::IndexOutOfRange { index, len });
        }

        let leaf = &self.levels[0][index];
        let mut siblings = Vec::with_capacity(self.height());
        let mut directions = Vec::with_capacity(self.height());

        let mut current = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling, sibling_is_right) = if current % 2 == 0 {
                // The odd tail duplicates itself, so an even index without a
                // right neighbour is its own sibling.
                ((current + 1).min(level.len() - 1), true)
            } else {
                (current - 1, false)
            };
            siblings.push(level[sibling].hash);
            directions.push(sibling_is_right);
            current /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            leaf_hash: leaf.hash,
            leaf_value: leaf.value.clone().unwrap_or_default(),
            siblings,
            directions,
            root: self.root(),
        })
    }

    /// Stateless verification: recompute the root from the leaf hash and the
    /// sibling path, compare against the claimed root.
    pub fn verify_proof(proof: &MerkleProof) -> bool {
        if proof.siblings.len() != proof.directions.len() {
            return false;
        }

        let mut current = proof.leaf_hash;
        for (sibling, sibling_is_right) in proof.siblings.iter().zip(&proof.directions) {
            current = if *sibling_is_right {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
        }
        current == proof.root
    }

    /// Exact-decimal sum of all leaf balances in `currency`.
    pub fn total_balance(&self, currency: &str) -> Result<Decimal, EngineError> {
        let mut total = Decimal::ZERO;
        for leaf in &self.levels[0] {
            let account = decode_leaf(leaf)?;
            if account.currency == currency {
                total += account.balance;
            }
        }
        Ok(total)
    }

    /// Replace one leaf and rebuild the whole tree: O(total leaves), never
    /// incremental. Exclusive access is enforced by the `&mut` receiver.
    pub fn update_leaf(&mut self, index: usize, account: Account) -> Result<(), EngineError> {
        let len = self.leaf_count();
        if index >= len {
            return Err(EngineError::IndexOutOfRange { index, len });
        }

        let mut accounts = Vec::with_capacity(len);
        for leaf in &self.levels[0] {
            accounts.push(decode_leaf(leaf)?);
        }
        accounts[index] = account;

        *self = Self::build(&accounts)?;
        Ok(())
    }
}

fn decode_leaf(leaf: &MerkleNode) -> Result<Account, EngineError> {
    let raw = leaf
        .value
        .as_deref()
        .ok_or_else(|| EngineError::LeafParse(format!("leaf {} has no raw value", leaf.index)))?;
    serde_json::from_str(raw).map_err(|e| EngineError::LeafParse(e.to_string()))
}

/// Leaf hash over `id|balance|currency|nonce`, fixed order and separator.
/// The balance is normalized so `10` and `10.00` commit identically.
fn leaf_hash(account: &Account) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(account.id.as_bytes());
    hasher.update(b"|");
    hasher.update(account.balance.normalize().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(account.currency.as_bytes());
    hasher.update(b"|");
    hasher.update(account.nonce.to_string().as_bytes());
    hasher.finalize().into()
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}
