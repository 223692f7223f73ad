pub mod hash;

pub use hash::{hash_key, hash_str, hash_u64};
