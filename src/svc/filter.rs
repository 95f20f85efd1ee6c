//! Contract-of-interest predicates applied to fetched logs.
//!
//! Topic filtering already happens at the source when logs are fetched; the
//! predicate here decides whether a log comes from a contract we care about.

use std::collections::HashSet;

use alloy::primitives::Address;

use crate::types::EventLog;

/// Decides whether a fetched log is forwarded to the event queue.
pub trait ContractFilter: Send + Sync {
    /// `true` if the log belongs to a contract of interest.
    fn is_of_interest(&self, log: &EventLog) -> bool;
}

/// Forwards logs whose emitting address is in a fixed set of contracts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    contracts: HashSet<Address>,
}

impl WatchList {
    /// Watch the given contract addresses.
    #[must_use]
    pub fn new(contracts: impl IntoIterator<Item = Address>) -> Self {
        Self {
            contracts: contracts.into_iter().collect(),
        }
    }

    /// Number of watched contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Whether nothing is watched (no log will ever be forwarded).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Whether `address` is watched.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.contracts.contains(address)
    }
}

impl ContractFilter for WatchList {
    fn is_of_interest(&self, log: &EventLog) -> bool {
        self.contracts.contains(&log.address)
    }
}

impl<F> ContractFilter for F
where
    F: Fn(&EventLog) -> bool + Send + Sync,
{
    fn is_of_interest(&self, log: &EventLog) -> bool {
        self(log)
    }
}
