//! Chain reorganization detection.
//!
//! The pipeline assumes that a delivered header is final. This module does not
//! change that assumption; it makes violations visible:
//!
//! 1. **Parent Hash Verification**: each routed header's parent hash is compared
//!    with the hash of the previously routed header
//! 2. **Gap Detection**: headers that skip block numbers are reported
//! 3. **Fork Detection**: headers that replace already routed heights are
//!    counted and logged with the depth of the replaced branch
//!
//! Downstream consumers already tolerate at-least-once delivery; blocks of a
//! replacing branch are processed like any other header.

pub mod detector;

pub use detector::{Linkage, ReorgDetector};
