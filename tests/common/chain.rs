//! [`TestChain`], a node's data directory that tests build up, crash, and repair.

use std::{
    fs,
    path::{Path, PathBuf},
};

use state_repair::{
    app::AppInstance,
    config::Configuration,
    consistency::{ConsistencyChecks, RepairContext},
    executor::BlockExecutor,
    repair::{repair_state, RepairError, RepairOutcome},
    stores::{
        app_store::{CommitMode, VersionedAppStore},
        consensus_store::ConsensusStore,
        ledger::BlockLedger,
        lock::{lock_path, LockPolicy},
        pluggables::{KVStore, WriteBatch},
        StoreKind,
    },
    types::{
        block::Block,
        consensus_params::ConsensusParams,
        crypto_primitives::SigningKey,
        data_types::{AppVersion, BlockHeight, ChainID, CryptoHash, Power, Timestamp},
        snapshot::{ConsensusSnapshot, Genesis},
        update_sets::VerifyingKeyBytes,
        validator_set::ValidatorSet,
    },
};
use tempfile::TempDir;

use crate::common::{
    file_db::{FileDB, FileWriteBatch, DB_FILE},
    number_app::{NumberApp, NumberAppTransaction},
};

pub(crate) const CHAIN_ID: ChainID = ChainID::new(7);

/// Process id written into lock markers left by a crashed process. Larger than any pid the kernel
/// hands out, so it never names a running process.
pub(crate) const STALE_PID: u32 = u32::MAX;

pub(crate) const STORE_KINDS: [StoreKind; 3] =
    [StoreKind::Application, StoreKind::BlockStore, StoreKind::State];

/// A data directory holding the three stores of a single node running a [`NumberApp`].
///
/// Creating a `TestChain` writes the genesis state: the number app's initial app state as app version
/// 0, and the genesis consensus snapshot. Blocks are then appended to the ledger with
/// [`append_blocks`](Self::append_blocks) and executed, the way a running node would, with
/// [`execute_up_to`](Self::execute_up_to). Stopping execution short of the ledger height is how tests
/// simulate a crash.
pub(crate) struct TestChain {
    data_dir: TempDir,
    genesis: Genesis,
    signing_keys: Vec<SigningKey>,
}

impl TestChain {
    /// Create a chain whose genesis validator set holds only `signing_keys[0]`.
    pub(crate) fn new(signing_keys: Vec<SigningKey>) -> TestChain {
        let data_dir = tempfile::tempdir().unwrap();

        let mut validators = ValidatorSet::new();
        validators.put(&signing_keys[0].verifying_key(), Power::new(1));

        let mut app_store =
            VersionedAppStore::<FileDB>::open(data_dir.path(), LockPolicy::Exclusive).unwrap();
        let app_hash = app_store
            .initialize(&NumberApp::initial_app_state(), AppVersion::new(0))
            .unwrap();

        let genesis = Genesis {
            chain_id: CHAIN_ID,
            initial_height: BlockHeight::new(1),
            genesis_time: Timestamp::new(0),
            validators,
            consensus_params: ConsensusParams::default(),
            app_hash,
        };

        let mut consensus_store =
            ConsensusStore::<FileDB>::open(data_dir.path(), LockPolicy::Exclusive).unwrap();
        consensus_store
            .save_snapshot(&genesis.clone().into_snapshot())
            .unwrap();

        TestChain {
            data_dir,
            genesis,
            signing_keys,
        }
    }

    pub(crate) fn data_dir(&self) -> &Path {
        self.data_dir.path()
    }

    pub(crate) fn genesis(&self) -> Genesis {
        self.genesis.clone()
    }

    pub(crate) fn verifying_key(&self, index: usize) -> VerifyingKeyBytes {
        self.signing_keys[index].verifying_key().to_bytes()
    }

    /// A configuration for repairing this chain, with every other option left at its default.
    pub(crate) fn config(&self) -> Configuration {
        Configuration::builder()
            .data_dir(self.data_dir())
            .build()
    }

    /// Append one block per entry of `blocks` to the ledger, without executing them.
    pub(crate) fn append_blocks(&self, blocks: &[Vec<NumberAppTransaction>]) {
        let mut ledger =
            BlockLedger::<FileDB>::open(self.data_dir(), LockPolicy::Exclusive).unwrap();
        for transactions in blocks {
            let latest_height = ledger.height().unwrap();
            let prev_hash = ledger
                .block(latest_height)
                .unwrap()
                .map(|block| block.hash)
                .unwrap_or(CryptoHash::zero());
            let height = latest_height + 1;
            let block = Block::new(
                CHAIN_ID,
                height,
                prev_hash,
                Timestamp::new(height.int() * 1000),
                NumberApp::data(transactions),
            );
            ledger.append_block(&block).unwrap();
        }
    }

    /// Execute ledger blocks on top of the saved snapshot until the snapshot reaches `height`.
    ///
    /// After each block, the app's async commit pipeline is flushed up to `flush_lag` versions behind
    /// the block.
    pub(crate) fn execute_up_to(
        &self,
        height: u64,
        mode: CommitMode,
        flush_lag: u64,
        parallel_txs: bool,
    ) {
        let ledger = BlockLedger::<FileDB>::open(self.data_dir(), LockPolicy::Exclusive).unwrap();
        let app_store =
            VersionedAppStore::<FileDB>::open(self.data_dir(), LockPolicy::Exclusive).unwrap();
        let mut consensus_store =
            ConsensusStore::<FileDB>::open(self.data_dir(), LockPolicy::Exclusive).unwrap();
        let mut app = AppInstance::new(NumberApp, app_store);

        let mut snapshot = consensus_store.load_snapshot().unwrap().unwrap();
        while snapshot.last_block_height < BlockHeight::new(height) {
            let next_height = snapshot.last_block_height + 1;
            let block = ledger.block(next_height).unwrap().unwrap();
            let block_meta = ledger.block_meta(next_height).unwrap().unwrap();

            let mut executor = BlockExecutor::new(
                &mut app,
                &mut consensus_store,
                ConsistencyChecks::STRICT,
                parallel_txs,
                mode,
            );
            snapshot = executor
                .apply_block(&snapshot, &block_meta.block_id, &block)
                .unwrap();

            if next_height.int() > flush_lag {
                app.flush(AppVersion::new(next_height.int() - flush_lag))
                    .unwrap();
            }
        }
    }

    /// Run [`repair_state`] with a fresh (strict) [`RepairContext`].
    pub(crate) fn repair(&self, config: Configuration) -> Result<RepairOutcome, RepairError> {
        let genesis = self.genesis();
        repair_state::<FileDB, NumberApp>(config, &mut RepairContext::new(), NumberApp, move || {
            genesis
        })
    }

    /// Call `f` with this chain's app store.
    pub(crate) fn with_app_store<R>(&self, f: impl FnOnce(&VersionedAppStore<FileDB>) -> R) -> R {
        let app_store =
            VersionedAppStore::<FileDB>::open(self.data_dir(), LockPolicy::Exclusive).unwrap();
        f(&app_store)
    }

    /// Call `f` with this chain's consensus store.
    pub(crate) fn with_consensus_store<R>(&self, f: impl FnOnce(&ConsensusStore<FileDB>) -> R) -> R {
        let consensus_store =
            ConsensusStore::<FileDB>::open(self.data_dir(), LockPolicy::Exclusive).unwrap();
        f(&consensus_store)
    }

    pub(crate) fn snapshot(&self) -> ConsensusSnapshot {
        self.with_consensus_store(|consensus_store| consensus_store.load_snapshot().unwrap().unwrap())
    }

    pub(crate) fn ledger_height(&self) -> BlockHeight {
        let ledger = BlockLedger::<FileDB>::open(self.data_dir(), LockPolicy::Exclusive).unwrap();
        ledger.height().unwrap()
    }

    /// Apply raw writes to one store, bypassing its accessor and its lock marker.
    pub(crate) fn raw_write(&self, kind: StoreKind, writes: impl FnOnce(&mut FileWriteBatch)) {
        let mut kv_store = FileDB::open(&self.store_dir(kind)).unwrap();
        let mut wb = FileWriteBatch::new();
        writes(&mut wb);
        kv_store.write(wb).unwrap();
    }

    /// Leave a lock marker in every store directory, as a crashed process would.
    pub(crate) fn leave_stale_locks(&self) {
        for kind in STORE_KINDS {
            fs::create_dir_all(self.store_dir(kind)).unwrap();
            fs::write(lock_path(&self.store_dir(kind)), STALE_PID.to_string()).unwrap();
        }
    }

    /// The lock markers currently present in the data directory.
    pub(crate) fn lock_markers(&self) -> Vec<PathBuf> {
        STORE_KINDS
            .iter()
            .map(|kind| lock_path(&self.store_dir(*kind)))
            .filter(|marker| marker.exists())
            .collect()
    }

    /// The raw contents of every store's database file.
    pub(crate) fn store_files(&self) -> Vec<Vec<u8>> {
        STORE_KINDS.iter().map(|kind| self.store_file(*kind)).collect()
    }

    /// The raw contents of one store's database file.
    pub(crate) fn store_file(&self, kind: StoreKind) -> Vec<u8> {
        fs::read(self.store_dir(kind).join(DB_FILE)).unwrap_or_default()
    }

    /// Overwrite one store's database file with `contents`, as if writes made after `contents` was
    /// read never reached the disk.
    pub(crate) fn restore_store_file(&self, kind: StoreKind, contents: &[u8]) {
        fs::write(self.store_dir(kind).join(DB_FILE), contents).unwrap();
    }

    fn store_dir(&self, kind: StoreKind) -> PathBuf {
        self.data_dir().join(kind.dir_name())
    }
}

/// `n` blocks, each holding a single [`Increment`](NumberAppTransaction::Increment).
pub(crate) fn increments(n: usize) -> Vec<Vec<NumberAppTransaction>> {
    (0..n).map(|_| vec![NumberAppTransaction::Increment]).collect()
}
