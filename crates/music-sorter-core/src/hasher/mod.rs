mod content;

pub use content::{full_hash, partial_hash, verify_copy, FULL_HASH_BLOCK_SIZE};
