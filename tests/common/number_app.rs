//! [`NumberApp`], a simple implementation of [`App`] used in all of the integration tests.

use std::thread;

use borsh::{BorshDeserialize, BorshSerialize};
use state_repair::{
    app::{App, ExecuteBlockRequest, ExecuteBlockResponse},
    stores::app_store::VersionedAppStore,
    types::{
        consensus_params::ConsensusParams,
        crypto_primitives::VerifyingKey,
        data_types::{Data, Datum, Power},
        update_sets::{AppStateUpdates, ValidatorSetUpdates, VerifyingKeyBytes},
    },
};

use crate::common::file_db::FileDB;

/// A simple implementation of [`App`] for use in integration tests.
///
/// The number app maintains an app state consisting of a single number, which can be queried using
/// [`number`](NumberApp::number), plus arbitrary key-value pairs written by
/// [`Put`](NumberAppTransaction::Put) transactions. Every [`Datum`] of a block is one borsh-encoded
/// [`NumberAppTransaction`].
///
/// ## Parallel execution
///
/// If the request allows it, `NumberApp` decodes a block's transactions on several scoped threads.
/// The threads are joined, and their results concatenated in block order, before any transaction is
/// executed, so the response is the same either way.
pub(crate) struct NumberApp;

/// User-sent instructions that number app executes in [`execute_block`](App::execute_block).
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub(crate) enum NumberAppTransaction {
    /// Increase the number in the app state by 1.
    Increment,

    /// Set `key` to `value` in the app state.
    Put(Vec<u8>, Vec<u8>),

    /// Add a new validator with the specified verifying key and power or change the power of an existing
    /// validator.
    SetValidator(VerifyingKeyBytes, Power),

    /// Delete an existing validator. If the specified validator does not exist, this transaction is a no-
    /// op.
    DeleteValidator(VerifyingKeyBytes),

    /// Replace the consensus parameters.
    SetConsensusParams(u32, u64),
}

// The key in the app state where the "number" is stored.
pub(crate) const NUMBER_KEY: [u8; 1] = [0];

// How many threads decode transactions when parallel execution is allowed.
const DECODE_THREADS: usize = 4;

impl NumberApp {
    /// Return an `AppStateUpdates` that when applied on an empty app state will produce a good "initial"
    /// app state for a number app: one containing the number 0.
    pub(crate) fn initial_app_state() -> AppStateUpdates {
        let mut state = AppStateUpdates::new();
        state.insert(NUMBER_KEY.to_vec(), u32::to_le_bytes(0).to_vec());
        state
    }

    /// Get the number stored in a number app's app state.
    pub(crate) fn number(app_store: &VersionedAppStore<FileDB>) -> u32 {
        u32::from_le_bytes(
            app_store
                .app_state(&NUMBER_KEY)
                .unwrap()
                .try_into()
                .unwrap(),
        )
    }

    /// Encode `transactions` into block data, one transaction per datum.
    pub(crate) fn data(transactions: &[NumberAppTransaction]) -> Data {
        Data::new(
            transactions
                .iter()
                .map(|transaction| Datum::new(transaction.try_to_vec().unwrap()))
                .collect(),
        )
    }
}

impl App<FileDB> for NumberApp {
    fn execute_block(&mut self, request: ExecuteBlockRequest<FileDB>) -> ExecuteBlockResponse {
        let datums: Vec<&Datum> = request.block().data.iter().collect();
        let transactions = if request.parallel_txs() {
            decode_parallel(&datums)
        } else {
            decode(&datums)
        };
        let Some(transactions) = transactions else {
            return ExecuteBlockResponse::Invalid;
        };

        let initial_number = request
            .app_state()
            .get(&NUMBER_KEY)
            .map(|bytes| u32::from_le_bytes(bytes.try_into().unwrap()))
            .unwrap_or(0);

        execute(initial_number, &transactions)
    }
}

fn decode(datums: &[&Datum]) -> Option<Vec<NumberAppTransaction>> {
    datums
        .iter()
        .map(|datum| NumberAppTransaction::deserialize(&mut datum.bytes().as_slice()).ok())
        .collect()
}

fn decode_parallel(datums: &[&Datum]) -> Option<Vec<NumberAppTransaction>> {
    if datums.is_empty() {
        return Some(Vec::new());
    }

    let chunk_size = (datums.len() + DECODE_THREADS - 1) / DECODE_THREADS;
    let decoded_chunks: Vec<Option<Vec<NumberAppTransaction>>> = thread::scope(|scope| {
        let workers: Vec<_> = datums
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || decode(chunk)))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect()
    });

    let mut transactions = Vec::with_capacity(datums.len());
    for chunk in decoded_chunks {
        transactions.extend(chunk?);
    }
    Some(transactions)
}

/// Given the `current_number`, execute the given `transactions` and return the resulting updates.
fn execute(current_number: u32, transactions: &[NumberAppTransaction]) -> ExecuteBlockResponse {
    let mut number = current_number;
    let mut app_state_updates: Option<AppStateUpdates> = None;
    let mut validator_set_updates: Option<ValidatorSetUpdates> = None;
    let mut consensus_params_updates: Option<ConsensusParams> = None;

    for transaction in transactions {
        match transaction {
            NumberAppTransaction::Increment => {
                number += 1;
            }
            NumberAppTransaction::Put(key, value) => {
                app_state_updates
                    .get_or_insert(AppStateUpdates::new())
                    .insert(key.clone(), value.clone());
            }
            NumberAppTransaction::SetValidator(validator, power) => {
                validator_set_updates
                    .get_or_insert(ValidatorSetUpdates::new())
                    .insert(VerifyingKey::from_bytes(validator).unwrap(), *power);
            }
            NumberAppTransaction::DeleteValidator(validator) => {
                validator_set_updates
                    .get_or_insert(ValidatorSetUpdates::new())
                    .delete(VerifyingKey::from_bytes(validator).unwrap());
            }
            NumberAppTransaction::SetConsensusParams(max_block_txs, max_block_bytes) => {
                consensus_params_updates =
                    Some(ConsensusParams::new(*max_block_txs, *max_block_bytes));
            }
        }
    }

    if number != current_number {
        app_state_updates
            .get_or_insert(AppStateUpdates::new())
            .insert(NUMBER_KEY.to_vec(), number.to_le_bytes().to_vec());
    }

    ExecuteBlockResponse::Valid {
        app_state_updates,
        validator_set_updates,
        consensus_params_updates,
    }
}
