// src/load_balancer/mod.rs
mod hash;
mod key;
mod router;

pub use hash::{fnv1a_32, hash_key};
pub use key::routing_key;
pub use router::{first_healthy_from, home_index, Router, Selection};
