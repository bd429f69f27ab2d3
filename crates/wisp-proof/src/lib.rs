//! # wisp-proof
//!
//! Usage-proof hashing and the points policy.
//!
//! Both halves are pure functions: the same sample always produces the same
//! proof hash and the same point credit, which is what makes duplicate
//! submission and retry idempotent everywhere downstream.
//!
//! ## Modules
//!
//! - [`hash`] — Domain-separated BLAKE3 proof hashing
//! - [`points`] — Bytes-to-points conversion policy

pub mod hash;
pub mod points;
