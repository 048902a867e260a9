//! The wallet: one object owning every piece of account and key state.
//!
//! Nothing here is global. A [`Wallet`] is built from its configuration, a
//! node and a signer, and hands out the [`Orchestrator`] for transactions and
//! the [`Synchronizer`] for keeping state current.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use troll_crypto::generate_seed;
use troll_node_client::{NodeRpc, SubscriptionClient};
use troll_signer::{BlockSigner, ConfiguredSigner, DeviceTransport, HardwareSigner, KeyRing, LocalSigner};
use troll_types::{AccountAddress, RawAmount};
use troll_work::{WorkCache, WorkGenerator};

use crate::config::{SignerKind, WalletConfig};
use crate::keystore::{decrypt_seed, encrypt_seed, EncryptedSeed, KdfParams};
use crate::migration::PersistedState;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::representatives::{
    overview, recommended, RecommendedRepresentative, RepresentativeBook, RepresentativeOverview,
};
use crate::store::LedgerStore;
use crate::sync::Synchronizer;
use crate::WalletError;

const PUSH_EVENT_BUFFER: usize = 256;

/// Something the user should be told when the wallet opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartupNotice {
    /// Funds are waiting but the wallet must be unlocked to receive them.
    LockedWithPending {
        accounts: Vec<AccountAddress>,
        total: RawAmount,
    },
    /// The configured signing device cannot be reached from this
    /// environment at all.
    SigningEnvironmentUnsupported,
}

/// Background tasks started by [`Wallet::start_sync`].
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Signal every task to stop and wait for them.
    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "sync task panicked");
            }
        }
    }
}

pub struct Wallet<N, S> {
    config: WalletConfig,
    node: Arc<N>,
    signer: Arc<S>,
    /// Present when keys come from the local seed.
    keyring: Option<Arc<KeyRing>>,
    keystore: Mutex<Option<EncryptedSeed>>,
    store: Arc<LedgerStore>,
    cache: WorkCache,
    book: Arc<Mutex<RepresentativeBook>>,
    watched: watch::Sender<Vec<AccountAddress>>,
    orchestrator: Orchestrator<N, S>,
    synchronizer: Synchronizer<N>,
}

impl<N: NodeRpc> Wallet<N, LocalSigner> {
    /// A new wallet with a fresh random seed, encrypted under `password`.
    pub async fn create_local(
        config: WalletConfig,
        node: Arc<N>,
        password: &str,
        kdf: KdfParams,
    ) -> Result<Self, WalletError> {
        let seed = Zeroizing::new(generate_seed());
        Self::import_seed(config, node, seed, password, kdf).await
    }

    /// A wallet for an existing seed, encrypted under `password`. Account 0
    /// is added right away.
    pub async fn import_seed(
        config: WalletConfig,
        node: Arc<N>,
        seed: Zeroizing<[u8; 32]>,
        password: &str,
        kdf: KdfParams,
    ) -> Result<Self, WalletError> {
        let keystore = encrypt_seed(&seed, password, kdf)?;
        let keyring = Arc::new(KeyRing::unlocked(seed));
        let signer = Arc::new(LocalSigner::new(keyring.clone()));
        let state = PersistedState {
            keystore: Some(keystore),
            ..PersistedState::new()
        };
        let wallet = Self::from_state(config, node, signer, Some(keyring), state)?;
        wallet.add_account().await?;
        Ok(wallet)
    }

    /// Open the wallet saved at the configured state path. It starts locked.
    pub fn open_local(config: WalletConfig, node: Arc<N>) -> Result<Self, WalletError> {
        let keyring = Arc::new(KeyRing::locked());
        let signer = Arc::new(LocalSigner::new(keyring.clone()));
        Self::load(config, node, signer, Some(keyring))
    }
}

impl<N: NodeRpc, T: DeviceTransport> Wallet<N, ConfiguredSigner<T>> {
    /// Open the saved wallet with the signing backend named in the
    /// configuration. The hardware backend signs through `device`.
    pub fn open_configured(
        config: WalletConfig,
        node: Arc<N>,
        device: Option<T>,
    ) -> Result<Self, WalletError> {
        match config.signer {
            SignerKind::Local => {
                let keyring = Arc::new(KeyRing::locked());
                let signer = ConfiguredSigner::Local(LocalSigner::new(keyring.clone()));
                Self::load(config, node, Arc::new(signer), Some(keyring))
            }
            SignerKind::Hardware => {
                let device = device.ok_or_else(|| {
                    WalletError::Config("hardware signer configured without a signing device".into())
                })?;
                let signer = ConfiguredSigner::Hardware(HardwareSigner::new(device));
                Self::load(config, node, Arc::new(signer), None)
            }
        }
    }
}

impl<N: NodeRpc, S: BlockSigner> Wallet<N, S> {
    /// Open the wallet saved at the configured state path, or an empty one
    /// if nothing was saved yet. Older state is migrated on the way in.
    pub fn load(
        config: WalletConfig,
        node: Arc<N>,
        signer: Arc<S>,
        keyring: Option<Arc<KeyRing>>,
    ) -> Result<Self, WalletError> {
        let state = PersistedState::load(&config.state_path)?.unwrap_or_else(PersistedState::new);
        Self::from_state(config, node, signer, keyring, state)
    }

    pub fn from_state(
        config: WalletConfig,
        node: Arc<N>,
        signer: Arc<S>,
        keyring: Option<Arc<KeyRing>>,
        state: PersistedState,
    ) -> Result<Self, WalletError> {
        config.validate()?;
        let thresholds = config.work_thresholds()?;

        let store = Arc::new(LedgerStore::new());
        store.restore(state.accounts);

        let cache = WorkCache::new(
            Arc::new(WorkGenerator),
            thresholds.highest(),
            config.work_cache_capacity,
        );
        cache.restore(state.work, &store.frontiers());

        let book = Arc::new(Mutex::new(state.representatives));
        let settings = OrchestratorSettings {
            thresholds,
            remote_work_fallback: config.remote_work_fallback,
            default_representative: config.default_representative.clone(),
        };
        let orchestrator = Orchestrator::new(
            node.clone(),
            signer.clone(),
            store.clone(),
            cache.clone(),
            book.clone(),
            settings,
        );
        let synchronizer = Synchronizer::new(node.clone(), store.clone(), cache.clone());
        let watched = watch::channel(store.addresses()).0;

        tracing::info!(accounts = store.accounts().len(), "wallet opened");
        Ok(Self {
            config,
            node,
            signer,
            keyring,
            keystore: Mutex::new(state.keystore),
            store,
            cache,
            book,
            watched,
            orchestrator,
            synchronizer,
        })
    }

    fn keystore(&self) -> MutexGuard<'_, Option<EncryptedSeed>> {
        self.keystore.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn book(&self) -> MutexGuard<'_, RepresentativeBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator<N, S> {
        &self.orchestrator
    }

    pub fn synchronizer(&self) -> &Synchronizer<N> {
        &self.synchronizer
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    pub fn work_cache(&self) -> &WorkCache {
        &self.cache
    }

    pub fn representative_book(&self) -> RepresentativeBook {
        self.book().clone()
    }

    /// Derive the next account and start precomputing its first work.
    pub async fn add_account(&self) -> Result<AccountAddress, WalletError> {
        let index = self.store.next_index();
        let account = self.signer.account(index).await?;
        let address = account.address.clone();
        self.store.insert(account);
        let root = self.store.get(&address)?.work_root();
        self.cache.frontier_changed(None, root);
        self.watched.send_replace(self.store.addresses());
        tracing::info!(account = %address, index, "account added");
        Ok(address)
    }

    pub fn is_locked(&self) -> bool {
        self.keyring.as_ref().is_some_and(|ring| ring.is_locked())
    }

    /// Drop the seed from memory. Every signing capability stops working.
    pub fn lock(&self) {
        if let Some(ring) = &self.keyring {
            ring.lock();
        }
        self.store.clear_signers();
    }

    /// Decrypt the seed with `password` and re-issue signing capabilities.
    pub async fn unlock(&self, password: &str) -> Result<(), WalletError> {
        let ring = self
            .keyring
            .as_ref()
            .ok_or_else(|| WalletError::Keystore("wallet keys are not held locally".into()))?;
        let keystore = self
            .keystore()
            .clone()
            .ok_or_else(|| WalletError::Keystore("no encrypted seed stored".into()))?;
        let seed = decrypt_seed(&keystore, password)?;
        ring.unlock(seed);

        for view in self.store.accounts() {
            let account = self.signer.account(view.index).await?;
            if account.public_key != view.public_key {
                return Err(WalletError::Keystore(format!(
                    "seed does not derive stored account {}",
                    view.address
                )));
            }
            self.store.insert(account);
        }
        Ok(())
    }

    /// Warnings to show when the wallet opens.
    pub fn startup_notices(&self) -> Vec<StartupNotice> {
        let mut notices = Vec::new();
        if self.is_locked() {
            let waiting: Vec<_> = self
                .store
                .accounts()
                .into_iter()
                .filter(|v| !v.state.pending.is_zero())
                .collect();
            if !waiting.is_empty() {
                let total = waiting
                    .iter()
                    .fold(RawAmount::ZERO, |sum, v| sum.saturating_add(v.state.pending));
                notices.push(StartupNotice::LockedWithPending {
                    accounts: waiting.into_iter().map(|v| v.address).collect(),
                    total,
                });
            }
        }
        if !self.signer.environment_supported() {
            tracing::warn!("signing device transport is not supported in this environment");
            notices.push(StartupNotice::SigningEnvironmentUnsupported);
        }
        notices
    }

    /// The node's representatives with their share of the supply.
    pub async fn recommended_representatives(
        &self,
    ) -> Result<Vec<RecommendedRepresentative>, WalletError> {
        let weights = self.node.representatives_with_weight().await?;
        Ok(recommended(&weights, &self.book()))
    }

    /// Representatives the wallet's accounts delegate to.
    pub async fn representative_overview(&self) -> Result<Vec<RepresentativeOverview>, WalletError> {
        let weights = self.node.representatives_with_weight().await?;
        Ok(overview(&self.store.accounts(), &weights, &self.book()))
    }

    /// Current state in its persisted form.
    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            keystore: self.keystore().clone(),
            accounts: self.store.snapshot(),
            work: self.cache.snapshot(),
            representatives: self.book().clone(),
            ..PersistedState::new()
        }
    }

    /// Write state to the configured path.
    pub fn save(&self) -> Result<(), WalletError> {
        self.persisted_state().save(&self.config.state_path)
    }

    /// Start the push subscription, the push event handler and the poller.
    pub fn start_sync(&self) -> SyncHandle {
        let (shutdown, stop) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(PUSH_EVENT_BUFFER);

        let subscription =
            SubscriptionClient::new(self.config.websocket_url.clone(), self.config.reconnect_interval());
        let tasks = vec![
            tokio::spawn(subscription.run(self.watched.subscribe(), events_tx, stop.clone())),
            tokio::spawn(self.synchronizer.clone().run_events(events_rx, stop.clone())),
            tokio::spawn(
                self.synchronizer
                    .clone()
                    .run_poller(self.config.refresh_interval(), stop),
            ),
        ];
        tracing::info!(url = %self.config.websocket_url, "sync started");
        SyncHandle { shutdown, tasks }
    }
}
