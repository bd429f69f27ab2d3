//! Integration test crate for the Wisp pipeline.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end flows across multiple workspace crates:
//! measurement through proof generation, proof anchoring through the
//! submission queue, and full settlement cycles through the reward agent.
//!
//! All tests run against in-memory SQLite and the stub gateway:
//! ```sh
//! cargo test -p wisp-integration-tests
//! ```
