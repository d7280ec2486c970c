use log::LevelFilter;
use rand_core::OsRng;
use state_repair::{
    app::AppInstance,
    config::Configuration,
    consistency::ConsistencyChecks,
    executor::{BlockExecutor, ExecutionError},
    repair::RepairOutcome,
    stores::{
        app_store::{CommitMode, VersionedAppStore},
        consensus_store::ConsensusStore,
        lock::LockPolicy,
    },
    types::{
        block::{Block, BlockID},
        consensus_params::ConsensusParams,
        crypto_primitives::SigningKey,
        data_types::{
            AppVersion, BlockHeight, ChainID, CryptoHash, Data, Datum, Power, Timestamp,
        },
        snapshot::ConsensusSnapshot,
    },
};

mod common;

use crate::common::{
    chain::{increments, TestChain, CHAIN_ID},
    file_db::FileDB,
    logging::setup_logger,
    number_app::{NumberApp, NumberAppTransaction},
};

fn signing_keys() -> Vec<SigningKey> {
    let mut csprg = OsRng {};
    (0..2).map(|_| SigningKey::generate(&mut csprg)).collect()
}

fn open_stores(chain: &TestChain) -> (AppInstance<FileDB, NumberApp>, ConsensusStore<FileDB>) {
    let app_store =
        VersionedAppStore::<FileDB>::open(chain.data_dir(), LockPolicy::Exclusive).unwrap();
    let consensus_store =
        ConsensusStore::<FileDB>::open(chain.data_dir(), LockPolicy::Exclusive).unwrap();
    (AppInstance::new(NumberApp, app_store), consensus_store)
}

fn apply(
    chain: &TestChain,
    snapshot: &ConsensusSnapshot,
    block: &Block,
    checks: ConsistencyChecks,
) -> Result<ConsensusSnapshot, ExecutionError> {
    let (mut app, mut consensus_store) = open_stores(chain);
    let mut executor = BlockExecutor::new(
        &mut app,
        &mut consensus_store,
        checks,
        false,
        CommitMode::Flushed,
    );
    executor.apply_block(snapshot, &BlockID::of(block), block)
}

fn block_1(prev_hash: CryptoHash, transactions: &[NumberAppTransaction]) -> Block {
    Block::new(
        CHAIN_ID,
        BlockHeight::new(1),
        prev_hash,
        Timestamp::new(1000),
        NumberApp::data(transactions),
    )
}

#[test]
fn apply_block_validation_test() {
    setup_logger(LevelFilter::Debug);
    let chain = TestChain::new(signing_keys());
    let genesis_snapshot = chain.snapshot();

    // 1. A block of another chain.
    let block = Block::new(
        ChainID::new(8),
        BlockHeight::new(1),
        CryptoHash::zero(),
        Timestamp::new(1000),
        NumberApp::data(&[NumberAppTransaction::Increment]),
    );
    assert!(matches!(
        apply(&chain, &genesis_snapshot, &block, ConsistencyChecks::STRICT),
        Err(ExecutionError::WrongChain { .. })
    ));

    // 2. A block whose hash does not cover its contents.
    let mut block = block_1(CryptoHash::zero(), &[NumberAppTransaction::Increment]);
    block.timestamp = Timestamp::new(2000);
    assert!(matches!(
        apply(&chain, &genesis_snapshot, &block, ConsistencyChecks::STRICT),
        Err(ExecutionError::IncorrectBlock { .. })
    ));

    // 3. A block ID that belongs to a different block.
    let block = block_1(CryptoHash::zero(), &[NumberAppTransaction::Increment]);
    let other_block_id = BlockID::of(&block_1(CryptoHash::new([2; 32]), &[]));
    let (mut app, mut consensus_store) = open_stores(&chain);
    let mut executor = BlockExecutor::new(
        &mut app,
        &mut consensus_store,
        ConsistencyChecks::STRICT,
        false,
        CommitMode::Flushed,
    );
    assert!(matches!(
        executor.apply_block(&genesis_snapshot, &other_block_id, &block),
        Err(ExecutionError::BlockIDMismatch { .. })
    ));
    drop(executor);
    drop(app);
    drop(consensus_store);

    // 4. A block with more transactions than the consensus parameters allow.
    let mut limited_snapshot = genesis_snapshot.clone();
    limited_snapshot.consensus_params = ConsensusParams::new(1, 1024);
    let block = block_1(
        CryptoHash::zero(),
        &[NumberAppTransaction::Increment, NumberAppTransaction::Increment],
    );
    assert!(matches!(
        apply(&chain, &limited_snapshot, &block, ConsistencyChecks::STRICT),
        Err(ExecutionError::ConsensusParamsViolated { .. })
    ));

    // 5. Nothing was committed by the rejected blocks.
    chain.with_app_store(|app_store| {
        assert_eq!(app_store.latest_version().unwrap(), AppVersion::new(0));
    });
    assert_eq!(chain.snapshot(), genesis_snapshot);
}

#[test]
fn height_continuity_check_test() {
    setup_logger(LevelFilter::Debug);
    let chain = TestChain::new(signing_keys());
    let genesis_snapshot = chain.snapshot();

    // 1. A block that skips a height is refused under strict checks.
    let block_2 = Block::new(
        CHAIN_ID,
        BlockHeight::new(2),
        CryptoHash::zero(),
        Timestamp::new(2000),
        NumberApp::data(&[NumberAppTransaction::Increment]),
    );
    assert!(matches!(
        apply(&chain, &genesis_snapshot, &block_2, ConsistencyChecks::STRICT),
        Err(ExecutionError::HeightDiscontinuity { expected, got })
            if expected == BlockHeight::new(1) && got == BlockHeight::new(2)
    ));

    // 2. A block that does not extend the snapshot's last block is refused under strict checks, and
    //    accepted once the checks are relaxed.
    let block = block_1(CryptoHash::new([1; 32]), &[NumberAppTransaction::Increment]);
    assert!(matches!(
        apply(&chain, &genesis_snapshot, &block, ConsistencyChecks::STRICT),
        Err(ExecutionError::PrevHashMismatch { .. })
    ));
    let snapshot = apply(&chain, &genesis_snapshot, &block, ConsistencyChecks::RELAXED).unwrap();

    // 3. The accepted block advanced both the app store and the consensus store.
    assert_eq!(snapshot.last_block_height, BlockHeight::new(1));
    assert_eq!(snapshot.last_block_id, Some(BlockID::of(&block)));
    assert_eq!(snapshot.last_validators, genesis_snapshot.validators);
    assert_eq!(chain.snapshot(), snapshot);
    chain.with_app_store(|app_store| {
        assert_eq!(NumberApp::number(app_store), 1);
        assert_eq!(
            app_store.app_hash(AppVersion::new(1)).unwrap(),
            Some(snapshot.app_hash)
        );
    });
}

#[test]
fn invalid_block_is_not_committed_test() {
    setup_logger(LevelFilter::Debug);
    let chain = TestChain::new(signing_keys());
    let genesis_snapshot = chain.snapshot();

    // A datum that does not decode into a transaction makes the app reject the block.
    let block = Block::new(
        CHAIN_ID,
        BlockHeight::new(1),
        CryptoHash::zero(),
        Timestamp::new(1000),
        Data::new(vec![Datum::new(vec![0xff])]),
    );
    assert!(matches!(
        apply(&chain, &genesis_snapshot, &block, ConsistencyChecks::STRICT),
        Err(ExecutionError::InvalidBlock { height }) if height == BlockHeight::new(1)
    ));
    chain.with_app_store(|app_store| {
        assert_eq!(app_store.latest_version().unwrap(), AppVersion::new(0));
        assert_eq!(NumberApp::number(app_store), 0);
    });
    assert_eq!(chain.snapshot(), genesis_snapshot);
}

#[test]
fn validator_set_updates_take_effect_at_next_height_test() {
    setup_logger(LevelFilter::Debug);
    let chain = TestChain::new(signing_keys());

    // 1. Block 3 adds a validator, block 4 deletes it again.
    let mut blocks = increments(5);
    blocks[2].push(NumberAppTransaction::SetValidator(
        chain.verifying_key(1),
        Power::new(4),
    ));
    blocks[3].push(NumberAppTransaction::DeleteValidator(chain.verifying_key(1)));
    chain.append_blocks(&blocks);

    // 2. After block 3, the new validator is in `next_validators` only.
    chain.execute_up_to(3, CommitMode::Flushed, 0, false);
    let snapshot_3 = chain.snapshot();
    assert_eq!(snapshot_3.validators.len(), 1);
    assert_eq!(snapshot_3.next_validators.len(), 2);
    assert_eq!(snapshot_3.last_height_validators_changed, BlockHeight::new(4));

    // 3. After block 4, it is in `validators`, and leaves again at height 5.
    chain.execute_up_to(4, CommitMode::Flushed, 0, false);
    let snapshot_4 = chain.snapshot();
    assert_eq!(snapshot_4.validators.len(), 2);
    assert_eq!(snapshot_4.next_validators.len(), 1);
    assert_eq!(snapshot_4.last_height_validators_changed, BlockHeight::new(5));

    // 4. The per-height history agrees with the snapshots.
    chain.with_consensus_store(|consensus_store| {
        for (height, len) in [(3, 1), (4, 2), (5, 1)] {
            let record = consensus_store
                .load_validators(BlockHeight::new(height))
                .unwrap()
                .unwrap();
            assert_eq!(record.value.len(), len);
        }
    });
}

#[test]
fn info_reports_last_committed_block_test() {
    setup_logger(LevelFilter::Debug);
    let chain = TestChain::new(signing_keys());
    chain.append_blocks(&increments(3));
    chain.execute_up_to(3, CommitMode::Flushed, 0, false);
    let snapshot = chain.snapshot();

    let (mut app, mut consensus_store) = open_stores(&chain);
    let executor = BlockExecutor::new(
        &mut app,
        &mut consensus_store,
        ConsistencyChecks::STRICT,
        false,
        CommitMode::Flushed,
    );
    let info = executor.info().unwrap();
    assert_eq!(info.last_block_height, BlockHeight::new(3));
    assert_eq!(info.last_block_app_hash, snapshot.app_hash);
}

#[test]
fn parallel_execution_is_deterministic_test() {
    setup_logger(LevelFilter::Debug);

    // 1. Blocks of 10 transactions each, enough for every decoding thread to get a share.
    let blocks: Vec<Vec<NumberAppTransaction>> = (0..12u8)
        .map(|i| {
            let mut transactions = vec![NumberAppTransaction::Increment; 6];
            for j in 0..4u8 {
                transactions.push(NumberAppTransaction::Put(vec![b'k', j], vec![i, j]));
            }
            transactions
        })
        .collect();

    // 2. Execute the same ledger sequentially, in parallel, and in parallel after a crash and a repair.
    let keys = signing_keys();
    let sequential = TestChain::new(keys.clone());
    let parallel = TestChain::new(keys.clone());
    let repaired = TestChain::new(keys);
    for chain in [&sequential, &parallel, &repaired] {
        chain.append_blocks(&blocks);
    }
    sequential.execute_up_to(12, CommitMode::Flushed, 0, false);
    parallel.execute_up_to(12, CommitMode::Flushed, 0, true);
    repaired.execute_up_to(9, CommitMode::Pipelined { depth: 2 }, 1, true);
    let config = Configuration::builder()
        .data_dir(repaired.data_dir())
        .parallel_txs(true)
        .build();
    assert!(matches!(
        repaired.repair(config).unwrap(),
        RepairOutcome::Repaired { .. }
    ));

    // 3. All three end in the same state.
    let expected_app_hash = sequential.with_app_store(|app_store| {
        assert_eq!(NumberApp::number(app_store), 72);
        assert_eq!(app_store.app_state(&[b'k', 3]), Some(vec![11, 3]));
        app_store.app_hash(AppVersion::new(12)).unwrap()
    });
    for chain in [&parallel, &repaired] {
        assert_eq!(
            chain.with_app_store(|app_store| app_store.app_hash(AppVersion::new(12)).unwrap()),
            expected_app_hash
        );
        assert_eq!(chain.snapshot(), sequential.snapshot());
    }
}
