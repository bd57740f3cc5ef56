//! The delta-transfer round (§4.5): U checks whether it's already in sync
//! with A's whole-file checksum, and if not, exchanges Delta-1/Delta-2 to
//! reconstruct A's content out of U's own blocks plus a literal remainder.

pub mod engine;
pub mod types;
