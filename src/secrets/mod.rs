//! Secret custody and hash-lock derivation

mod hashlock;
mod types;
mod vault;

pub use hashlock::{HashLock, HashLockBuilder};
pub use types::{keccak256, Hash32, Secret};
pub use vault::SecretVault;
