//! Escrow State Store
//!
//! Keeps a derived view of active deposits, and of the intents open against
//! them, in sync with the escrow contract.
//!
//! Flow of one reconciliation pass:
//! 1. Load the pruned-ID set for the current escrow contract.
//! 2. Fetch every not-yet-pruned ID in `[0, depositCounter)` in batches.
//! 3. Parse; deposits matching the prune predicate are added to the pruned set
//!    (and persisted), the rest are active.
//! 4. Sort active deposits by available liquidity, descending (stable).
//! 5. Publish the deposits, then read and publish the intents they reference.
//!
//! Passes run one at a time. A pass that started before the escrow contract
//! was switched (or before teardown) is discarded instead of published.

use anyhow::{Context, Result};
use ethereum_types::Address;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::batch::{fetch_deposit_batches, pending_deposit_ids};
use super::parser::{normalize_address, parse_address, parse_deposit_view, parse_intent_view};
use super::pruning::{should_prune, DepositPruningCache};
use super::refresh::{RefreshScheduler, RefreshState};
use super::types::{DepositView, IntentView};
use crate::chains::ChainReader;
use crate::config::ReconciliationConfig;
use crate::storage::KeyValueStore;

/// Outcome of a single reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Deposit IDs requested from the chain
    pub requested: usize,
    /// Raw deposit tuples actually returned
    pub fetched: usize,
    /// Deposits published as active
    pub active: usize,
    /// IDs added to the pruned set by this pass
    pub newly_pruned: usize,
    /// Intent views published (None when the intent read failed and the previous list was kept)
    pub intents: Option<usize>,
    /// False when the pass was discarded because the escrow changed mid-flight
    pub published: bool,
}

/// Derived escrow view with a timer-driven refresh window.
///
/// Cheap to clone; clones share state. Call [`EscrowStateStore::init`] to start
/// the background poller and [`EscrowStateStore::dispose`] to stop it.
#[derive(Clone)]
pub struct EscrowStateStore {
    /// Chain reader for escrow view calls
    reader: Arc<dyn ChainReader>,
    /// Persistent pruned-ID registry
    cache: DepositPruningCache,
    /// Batch size and refresh timing
    config: ReconciliationConfig,
    /// Token every published deposit/intent must hold
    target_token: Address,
    /// Escrow contract currently reconciled, normalized
    escrow: Arc<RwLock<String>>,
    /// Bumped on escrow switch and teardown while the deposit and intent locks are held;
    /// passes compare against it under the same locks before publishing
    generation: Arc<AtomicU64>,
    deposits: Arc<RwLock<Vec<DepositView>>>,
    intents: Arc<RwLock<Vec<IntentView>>>,
    /// Last deposit counter observed
    last_counter: Arc<RwLock<Option<u64>>>,
    scheduler: Arc<Mutex<RefreshScheduler>>,
    /// Wakes the poller when a window opens or restarts
    wake: Arc<Notify>,
    reconcile_lock: Arc<Mutex<()>>,
    poller: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EscrowStateStore {
    /// Creates a new store for `escrow_address`.
    ///
    /// # Arguments
    ///
    /// * `reader` - Chain reader for the escrow contract
    /// * `storage` - Durable key-value store backing the pruning cache
    /// * `escrow_address` - Escrow contract to reconcile
    /// * `target_token` - Token address deposits must hold to be published
    /// * `config` - Reconciliation settings
    ///
    /// # Returns
    ///
    /// * `Ok(EscrowStateStore)` - Store ready for `init()`
    /// * `Err(anyhow::Error)` - Target token is not a valid non-zero address
    pub fn new(
        reader: Arc<dyn ChainReader>,
        storage: Arc<dyn KeyValueStore>,
        escrow_address: &str,
        target_token: &str,
        config: ReconciliationConfig,
    ) -> Result<Self> {
        let target = parse_address(target_token);
        if target.is_zero() {
            anyhow::bail!("Invalid target token address: {}", target_token);
        }

        let scheduler = RefreshScheduler::new(config.poll_interval(), config.poll_window());

        Ok(Self {
            reader,
            cache: DepositPruningCache::new(storage),
            config,
            target_token: target,
            escrow: Arc::new(RwLock::new(normalize_address(escrow_address))),
            generation: Arc::new(AtomicU64::new(0)),
            deposits: Arc::new(RwLock::new(Vec::new())),
            intents: Arc::new(RwLock::new(Vec::new())),
            last_counter: Arc::new(RwLock::new(None)),
            scheduler: Arc::new(Mutex::new(scheduler)),
            wake: Arc::new(Notify::new()),
            reconcile_lock: Arc::new(Mutex::new(())),
            poller: Arc::new(Mutex::new(None)),
        })
    }

    /// Starts the background poller. Idempotent.
    pub async fn init(&self) {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            return;
        }
        let store = self.clone();
        *poller = Some(tokio::spawn(async move { store.run_poll_loop().await }));
        info!(
            "Escrow state store started for {} (batch size {})",
            self.escrow_address().await,
            self.config.batch_size
        );
    }

    /// Stops the poller and closes any open refresh window.
    ///
    /// A reconciliation already in flight finishes its chain reads but does not publish.
    pub async fn dispose(&self) {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
        }
        self.scheduler.lock().await.cancel();
        {
            let _deposits = self.deposits.write().await;
            let _intents = self.intents.write().await;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        info!("Escrow state store disposed");
    }

    pub fn pruning_cache(&self) -> &DepositPruningCache {
        &self.cache
    }

    pub async fn escrow_address(&self) -> String {
        self.escrow.read().await.clone()
    }

    /// Active deposits, sorted by available liquidity descending.
    pub async fn deposits(&self) -> Vec<DepositView> {
        self.deposits.read().await.clone()
    }

    pub async fn intents(&self) -> Vec<IntentView> {
        self.intents.read().await.clone()
    }

    pub async fn deposit_by_id(&self, deposit_id: u64) -> Option<DepositView> {
        let deposits = self.deposits.read().await;
        deposits.iter().find(|d| d.deposit_id == deposit_id).cloned()
    }

    /// Published intents owned by `owner`.
    pub async fn intents_for_owner(&self, owner: &str) -> Vec<IntentView> {
        let owner = parse_address(owner);
        let intents = self.intents.read().await;
        intents
            .iter()
            .filter(|view| view.intent.owner == owner)
            .cloned()
            .collect()
    }

    pub async fn last_deposit_counter(&self) -> Option<u64> {
        *self.last_counter.read().await
    }

    pub async fn refresh_state(&self) -> RefreshState {
        self.scheduler.lock().await.state_at(Instant::now())
    }

    /// Switches to another escrow contract and reconciles it from scratch.
    ///
    /// Published views are cleared immediately; any pass still running for the
    /// previous contract is discarded.
    pub async fn set_escrow_address(&self, escrow_address: &str) -> Option<ReconcileSummary> {
        let escrow_address = normalize_address(escrow_address);
        {
            let mut escrow = self.escrow.write().await;
            if *escrow == escrow_address {
                return None;
            }
            info!("Switching escrow contract {} -> {}", escrow.as_str(), escrow_address);

            let mut deposits = self.deposits.write().await;
            let mut intents = self.intents.write().await;
            *escrow = escrow_address;
            self.generation.fetch_add(1, Ordering::SeqCst);
            deposits.clear();
            intents.clear();
        }
        *self.last_counter.write().await = None;

        self.refresh().await
    }

    /// Reconciles only if the deposit counter moved since the last observation.
    pub async fn on_deposit_counter(&self, deposit_counter: u64) -> Option<ReconcileSummary> {
        {
            let mut last = self.last_counter.write().await;
            if *last == Some(deposit_counter) {
                return None;
            }
            *last = Some(deposit_counter);
        }
        Some(self.reconcile(deposit_counter).await)
    }

    /// Opens (or restarts) the refresh window and refetches immediately.
    pub async fn trigger_deposit_refresh(&self) -> Option<ReconcileSummary> {
        self.scheduler.lock().await.trigger(Instant::now());
        self.wake.notify_one();
        debug!(
            "Deposit refresh triggered: polling every {:?} for {:?}",
            self.config.poll_interval(),
            self.config.poll_window()
        );
        self.refresh().await
    }

    /// Reads the deposit counter and reconciles.
    ///
    /// # Returns
    ///
    /// * `Some(ReconcileSummary)` - A pass ran
    /// * `None` - The counter could not be read; the published view is left as is
    pub async fn refresh(&self) -> Option<ReconcileSummary> {
        let escrow = self.escrow_address().await;
        match self.reader.deposit_counter(&escrow).await {
            Ok(counter) => {
                *self.last_counter.write().await = Some(counter);
                Some(self.reconcile(counter).await)
            }
            Err(e) => {
                warn!("Failed to read deposit counter for {}: {:#}", escrow, e);
                None
            }
        }
    }

    /// Runs one reconciliation pass against `deposit_counter`.
    pub async fn reconcile(&self, deposit_counter: u64) -> ReconcileSummary {
        let _guard = self.reconcile_lock.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);
        let escrow = self.escrow_address().await;

        let mut pruned: BTreeSet<u64> = self.cache.load(&escrow);
        let ids = pending_deposit_ids(deposit_counter, &pruned);
        let raw = fetch_deposit_batches(self.reader.as_ref(), &escrow, &ids, self.config.batch_size).await;

        let mut summary = ReconcileSummary {
            requested: ids.len(),
            fetched: raw.len(),
            ..Default::default()
        };

        let mut active = Vec::with_capacity(raw.len());
        for fetched in &raw {
            let deposit = parse_deposit_view(&fetched.raw);
            if !should_prune(&deposit, &self.target_token) {
                active.push(deposit);
                continue;
            }
            // Prune by the requested ID: a malformed tuple parses its own ID as 0
            match fetched.requested_id {
                Some(id) => {
                    if id != deposit.deposit_id {
                        debug!("Deposit {} came back with id {}", id, deposit.deposit_id);
                    }
                    if pruned.insert(id) {
                        summary.newly_pruned += 1;
                    }
                }
                None => debug!("Not pruning unattributed deposit tuple (id {})", deposit.deposit_id),
            }
        }

        if summary.newly_pruned > 0 {
            self.cache.save(&escrow, &pruned);
        }

        // sort_by is stable: equal liquidity keeps fetch order
        active.sort_by(|a, b| b.available_liquidity.cmp(&a.available_liquidity));
        summary.active = active.len();

        {
            let mut deposits = self.deposits.write().await;
            if !self.is_current(generation) {
                info!("Discarding reconciliation for {}: superseded", escrow);
                return summary;
            }
            *deposits = active.clone();
        }

        let fetched_intents = self.fetch_intents(&escrow, &active).await;
        {
            let mut intents = self.intents.write().await;
            if !self.is_current(generation) {
                info!("Discarding intent refresh for {}: superseded", escrow);
                return summary;
            }
            if let Some(fetched) = fetched_intents {
                summary.intents = Some(fetched.len());
                *intents = fetched;
            }
        }
        summary.published = true;

        debug!(
            "Reconciled {}: counter={}, requested={}, fetched={}, active={}, newly_pruned={}, intents={:?}",
            escrow,
            deposit_counter,
            summary.requested,
            summary.fetched,
            summary.active,
            summary.newly_pruned,
            summary.intents
        );
        summary
    }

    /// Parsed deposits created by `owner`, sorted like the active list.
    ///
    /// The pruning predicate is not applied: a depositor sees their closed deposits too.
    pub async fn account_deposits(&self, owner: &str) -> Result<Vec<DepositView>> {
        let escrow = self.escrow_address().await;
        let raw = self
            .reader
            .get_account_deposits(&escrow, owner)
            .await
            .with_context(|| format!("Failed to read deposits of {}", owner))?;
        let mut deposits: Vec<DepositView> = raw.iter().map(parse_deposit_view).collect();
        deposits.sort_by(|a, b| b.available_liquidity.cmp(&a.available_liquidity));
        Ok(deposits)
    }

    /// Only meaningful while the deposit or intent write lock is held.
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Reads the intents referenced by `deposits`.
    ///
    /// Returns `None` on a failed read so the caller keeps the previous list.
    async fn fetch_intents(&self, escrow: &str, deposits: &[DepositView]) -> Option<Vec<IntentView>> {
        let hashes: Vec<String> = deposits
            .iter()
            .flat_map(|d| d.intent_hashes.iter().cloned())
            .collect();
        if hashes.is_empty() {
            return Some(Vec::new());
        }

        match self.reader.get_intents(escrow, &hashes).await {
            Ok(raw) => {
                if raw.len() != hashes.len() {
                    warn!(
                        "getIntents returned {} view(s) for {} hash(es)",
                        raw.len(),
                        hashes.len()
                    );
                }
                Some(
                    raw.iter()
                        .zip(hashes.iter())
                        .map(|(view, hash)| parse_intent_view(view, hash))
                        .filter(|view| {
                            !view.deposit.depositor.is_zero() && view.deposit.token == self.target_token
                        })
                        .collect(),
                )
            }
            Err(e) => {
                warn!("Failed to fetch {} intent(s) for {}: {:#}", hashes.len(), escrow, e);
                None
            }
        }
    }

    /// Background loop: idle until a window opens, then refresh every interval until it closes.
    async fn run_poll_loop(&self) {
        loop {
            let interval = self.scheduler.lock().await.poll_interval(Instant::now());
            match interval {
                Some(interval) => {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            let polling = self
                                .scheduler
                                .lock()
                                .await
                                .poll_interval(Instant::now())
                                .is_some();
                            if polling {
                                self.refresh().await;
                            } else {
                                debug!("Refresh window closed; polling stopped");
                            }
                        }
                        _ = self.wake.notified() => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }
}
