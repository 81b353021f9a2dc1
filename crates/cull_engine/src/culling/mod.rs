//! Fine culling stage
//!
//! Exact sphere-vs-frustum testing of the coarse stage's candidates in a
//! structure-of-arrays layout, processed in SIMD batches and optionally
//! fanned out across a fixed worker pool.

mod soa;

pub use soa::{CullingSoa, LANES};
