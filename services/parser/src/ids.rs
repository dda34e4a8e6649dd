//! Identifier generation.
//!
//! Dimension records get name-based UUIDv3 ids. Emissions factor rows get
//! random UUIDv4 ids drawn from a generator seeded by a hash of a seed
//! string: ids repeat across runs only when both the seed string and the
//! order of generated rows are identical. This is for reproducible output,
//! not for uniqueness guarantees or security.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic id for a named dimension record
pub fn name_based_id(name: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// First 8 bytes of SHA-256, big-endian
pub fn seed_from_name(name: &str) -> u64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

pub struct IdGenerator {
    rng: StdRng,
}

impl IdGenerator {
    pub fn seeded(seed_name: &str) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed_from_name(seed_name)),
        }
    }

    pub fn next_id(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}
