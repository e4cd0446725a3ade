//! Chain-specific `BlockSource` implementations over the node clients.

mod btc;
mod evm;

pub use self::{btc::BtcFetcher, evm::EvmFetcher};
