//! Batched deposit fetching
//!
//! Splits the deposit-ID universe into fixed-size batches and reads them one at
//! a time. A failed batch contributes nothing; the remaining batches still run.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::chains::{ChainReader, RawDepositView};

/// A raw tuple together with the ID it was requested under.
///
/// `getDepositFromIds` answers in request order, so the requested ID is known
/// whenever a batch returns exactly one tuple per ID. It is `None` when the
/// lengths disagree and the tuples cannot be attributed.
#[derive(Debug, Clone)]
pub struct FetchedDeposit {
    pub requested_id: Option<u64>,
    pub raw: RawDepositView,
}

/// Deposit IDs in `[0, deposit_counter)` that are not already pruned, ascending.
pub fn pending_deposit_ids(deposit_counter: u64, pruned: &BTreeSet<u64>) -> Vec<u64> {
    (0..deposit_counter).filter(|id| !pruned.contains(id)).collect()
}

/// Splits `ids` into consecutive batches of at most `batch_size` IDs.
pub fn partition(ids: &[u64], batch_size: usize) -> Vec<Vec<u64>> {
    ids.chunks(batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Reads every batch sequentially and concatenates the results in issue order.
///
/// # Arguments
///
/// * `reader` - Chain reader to issue bulk reads against
/// * `escrow` - Escrow contract address
/// * `ids` - Deposit IDs to fetch
/// * `batch_size` - Maximum IDs per bulk read
///
/// # Returns
///
/// Raw deposit tuples from every batch that succeeded, paired with their requested IDs.
pub async fn fetch_deposit_batches(
    reader: &dyn ChainReader,
    escrow: &str,
    ids: &[u64],
    batch_size: usize,
) -> Vec<FetchedDeposit> {
    let batches = partition(ids, batch_size);
    let total = batches.len();
    let mut deposits = Vec::with_capacity(ids.len());

    for (index, batch) in batches.iter().enumerate() {
        match reader.get_deposit_from_ids(escrow, batch).await {
            Ok(views) => {
                debug!(
                    "Fetched deposit batch {}/{} ({} ids, {} views)",
                    index + 1,
                    total,
                    batch.len(),
                    views.len()
                );
                if views.len() == batch.len() {
                    deposits.extend(views.into_iter().zip(batch.iter()).map(|(raw, id)| FetchedDeposit {
                        requested_id: Some(*id),
                        raw,
                    }));
                } else {
                    warn!(
                        "Deposit batch {}/{} returned {} view(s) for {} id(s); results will not be pruned",
                        index + 1,
                        total,
                        views.len(),
                        batch.len()
                    );
                    deposits.extend(views.into_iter().map(|raw| FetchedDeposit {
                        requested_id: None,
                        raw,
                    }));
                }
            }
            Err(e) => {
                warn!(
                    "Failed to fetch deposit batch {}/{} (ids {:?}..{:?}): {:#}",
                    index + 1,
                    total,
                    batch.first(),
                    batch.last(),
                    e
                );
            }
        }
    }

    deposits
}
