//! Parent-hash linkage checks over the routed header sequence.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::BlockHeader;

/// How a header relates to the previously observed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    /// Nothing observed before this header
    First,
    /// Direct child of the previous header
    Linked,
    /// Same header delivered again
    Duplicate,
    /// Header skips ahead; `missing` blocks were never seen
    Gap {
        /// Number of skipped blocks
        missing: u64,
    },
    /// Header replaces already observed blocks
    Fork {
        /// Number of observed blocks replaced by the new branch
        depth: u64,
    },
}

/// Chain continuity tracker.
///
/// Remembers the last observed header and classifies each new one by number
/// and parent hash. Forks are counted and reported; nothing is rolled back,
/// delivered headers are treated as final.
///
/// ## Example
///
/// ```
/// use eth_log_observer::reorg::{Linkage, ReorgDetector};
/// use eth_log_observer::types::BlockHeader;
/// use alloy::primitives::B256;
///
/// let mut detector = ReorgDetector::new();
/// let h1 = BlockHeader::new(1, B256::repeat_byte(1), B256::ZERO, 0);
/// let h2 = BlockHeader::new(2, B256::repeat_byte(2), h1.hash, 12);
///
/// assert_eq!(detector.observe(&h1), Linkage::First);
/// assert_eq!(detector.observe(&h2), Linkage::Linked);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReorgDetector {
    /// Last observed header
    last_block: Option<BlockHeader>,

    /// Total number of forks detected
    reorg_count: u64,
}

impl ReorgDetector {
    /// Create a detector with no observed header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector anchored at a known header, e.g. a stored checkpoint.
    #[must_use]
    pub const fn with_block(block: BlockHeader) -> Self {
        Self {
            last_block: Some(block),
            reorg_count: 0,
        }
    }

    /// Last observed header.
    #[must_use]
    pub const fn last_block(&self) -> Option<&BlockHeader> {
        self.last_block.as_ref()
    }

    /// Total number of forks detected.
    #[must_use]
    pub const fn reorg_count(&self) -> u64 {
        self.reorg_count
    }

    /// Classify `header` against the last observed one and make it the new tip.
    pub fn observe(&mut self, header: &BlockHeader) -> Linkage {
        let linkage = match &self.last_block {
            None => Linkage::First,
            Some(last) if last.hash == header.hash => Linkage::Duplicate,
            Some(last) if header.number == last.number + 1 => {
                if header.parent_hash == last.hash {
                    Linkage::Linked
                } else {
                    Linkage::Fork { depth: 1 }
                }
            }
            Some(last) if header.number > last.number => Linkage::Gap {
                missing: header.number - last.number - 1,
            },
            Some(last) => Linkage::Fork {
                depth: last.number + 1 - header.number,
            },
        };

        match linkage {
            Linkage::First | Linkage::Linked => {
                debug!(block = header.number, hash = %header.hash, "Tracking block");
            }
            Linkage::Duplicate => {
                debug!(block = header.number, "Duplicate header");
                return linkage;
            }
            Linkage::Gap { missing } => {
                warn!(
                    block = header.number,
                    missing,
                    "Header sequence gap, intermediate blocks were not delivered"
                );
            }
            Linkage::Fork { depth } => {
                self.reorg_count += 1;
                warn!(
                    block = header.number,
                    hash = %header.hash,
                    parent = %header.parent_hash,
                    depth,
                    reorgs = self.reorg_count,
                    "REORG DETECTED, already delivered blocks are treated as final"
                );
            }
        }

        self.last_block = Some(header.clone());
        linkage
    }

    /// Reset the reorg count (useful for testing).
    pub fn reset_reorg_count(&mut self) {
        self.reorg_count = 0;
    }
}
