//! Contract vs. externally-owned account classification.
//!
//! An address is a contract when the node returns non-empty code for it. Lookups are
//! retried a bounded number of times with a fixed wait; when every attempt fails the
//! address is reported as [`CodeCheck::Unresolved`] and treated as a plain account by
//! [`AddressClassification::is_contract`]. Under-counting contract holders is acceptable,
//! aborting discovery is not.

use ethers::types::Address;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::errors::RpcError;
use crate::metrics;
use crate::rpc_client::ChainRpc;
use crate::settings::ScanSettings;

/// Outcome of looking up the code at one address.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeCheck {
    Contract,
    Account,
    Unresolved { attempts: usize, error: RpcError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddressClassification {
    pub address: Address,
    pub check: CodeCheck,
}

impl AddressClassification {
    pub fn is_contract(&self) -> bool {
        matches!(self.check, CodeCheck::Contract)
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.check, CodeCheck::Unresolved { .. })
    }
}

pub struct AddressClassifier {
    rpc: Arc<dyn ChainRpc>,
    retries: usize,
    retry_wait: Duration,
    batch_size: usize,
    batch_delay: Duration,
}

impl AddressClassifier {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        retries: usize,
        retry_wait: Duration,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            rpc,
            retries,
            retry_wait,
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    pub fn from_settings(rpc: Arc<dyn ChainRpc>, scan: &ScanSettings) -> Self {
        Self::new(
            rpc,
            scan.classify_retries,
            Duration::from_millis(scan.classify_retry_wait_ms),
            scan.classify_batch_size,
            Duration::from_millis(scan.classify_batch_delay_ms),
        )
    }

    /// Looks up the code at `address`, retrying failed lookups.
    pub async fn classify(&self, address: Address) -> AddressClassification {
        let mut attempts = 0usize;
        let strategy = FixedInterval::new(self.retry_wait).take(self.retries);
        let result = Retry::spawn(strategy, || {
            attempts += 1;
            self.rpc.code_at(address)
        })
        .await;

        let check = match result {
            Ok(code) if code.as_ref().is_empty() => CodeCheck::Account,
            Ok(_) => CodeCheck::Contract,
            Err(error) => {
                warn!(
                    "[{}] Could not read code at {:?} after {} attempts, treating as account: {}",
                    self.rpc.chain_name(),
                    address,
                    attempts,
                    error
                );
                metrics::increment_unresolved_address(self.rpc.chain_name());
                CodeCheck::Unresolved { attempts, error }
            }
        };
        AddressClassification { address, check }
    }

    pub async fn is_contract(&self, address: Address) -> bool {
        self.classify(address).await.is_contract()
    }

    /// Classifies `addresses` in concurrent batches, pausing between batches.
    /// Output order matches input order.
    pub async fn classify_all(&self, addresses: &[Address]) -> Vec<AddressClassification> {
        let chain = self.rpc.chain_name();
        let batches = addresses.chunks(self.batch_size);
        let total = batches.len();
        let mut out = Vec::with_capacity(addresses.len());

        for (i, batch) in batches.enumerate() {
            let results = join_all(batch.iter().map(|addr| self.classify(*addr))).await;
            out.extend(results);
            debug!("[{}] Classified batch {}/{}", chain, i + 1, total);

            if i + 1 < total && !self.batch_delay.is_zero() {
                sleep(self.batch_delay).await;
            }
        }

        let contracts = out.iter().filter(|c| c.is_contract()).count();
        info!(
            "[{}] Classified {} addresses: {} contracts",
            chain,
            out.len(),
            contracts
        );
        out
    }
}
