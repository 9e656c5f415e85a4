//! Ledger, content-store, and wallet adapters for the funding-pool submission pipeline.

#![deny(unsafe_code)]

pub mod ledger;
pub mod storage;

use fundpool_core::connectors::WalletProvider;
use fundpool_core::types::WalletAddress;
use std::sync::RwLock;

pub use ledger::{CampaignRecord, ChainFault, InMemoryLedger, DEFAULT_CONTRACT_ADDRESS};
pub use storage::{FailingContentStore, InMemoryContentStore, PinningServiceStore, StoredObject};

/// Wallet session whose address can be connected or dropped at runtime.
#[derive(Debug, Default)]
pub struct StaticWallet {
    address: RwLock<Option<WalletAddress>>,
}

impl StaticWallet {
    pub fn connected(address: WalletAddress) -> Self {
        Self {
            address: RwLock::new(Some(address)),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn connect(&self, address: WalletAddress) {
        if let Ok(mut slot) = self.address.write() {
            *slot = Some(address);
        }
    }

    pub fn disconnect(&self) {
        if let Ok(mut slot) = self.address.write() {
            *slot = None;
        }
    }
}

impl WalletProvider for StaticWallet {
    fn connected_address(&self) -> Option<WalletAddress> {
        self.address.read().ok().and_then(|slot| slot.clone())
    }
}
