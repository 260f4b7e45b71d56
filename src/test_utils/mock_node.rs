use std::{
    collections::{HashMap, VecDeque},
    ops::RangeInclusive,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use alloy::{
    primitives::{Address, TxHash, U256, keccak256},
    rpc::types::Log,
    transports::{TransportErrorKind, TransportResult},
};

use crate::{
    NodeClient,
    types::{Block, Receipt, Transaction},
};

/// How a scripted call misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call fails with a transport error.
    Error,
    /// The call succeeds without a value (`null` block or receipt).
    Empty,
    /// The call never answers.
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CallKey {
    Head,
    Block(u64),
    Receipt(TxHash),
    Logs,
}

#[derive(Debug, Default)]
struct State {
    head: u64,
    blocks: HashMap<u64, Block>,
    receipts: HashMap<TxHash, Receipt>,
    logs: Vec<Log>,
    faults: HashMap<CallKey, VecDeque<(Fault, usize)>>,
    calls: HashMap<CallKey, usize>,
    log_requests: Vec<RangeInclusive<u64>>,
    latency: Duration,
}

impl State {
    /// Records the call and pops the next scripted fault for it, if any.
    fn begin(&mut self, key: CallKey) -> Option<Fault> {
        *self.calls.entry(key).or_default() += 1;
        let script = self.faults.get_mut(&key)?;
        let (fault, remaining) = script.front_mut()?;
        let fault = *fault;
        *remaining -= 1;
        if *remaining == 0 {
            script.pop_front();
        }
        Some(fault)
    }
}

/// An in-memory chain implementing [`NodeClient`].
///
/// Calls can be scripted to fail a number of times before answering normally. Clones share
/// the same chain, scripts and call counters.
#[derive(Debug, Clone, Default)]
pub struct MockNode {
    state: Arc<Mutex<State>>,
}

impl MockNode {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain holding blocks `from..=to`, each with `txs_per_block` transactions and a receipt
    /// for every transaction. Block `n` has timestamp `1_700_000_000 + 12 * n`.
    #[must_use]
    pub fn with_chain(from: u64, to: u64, txs_per_block: usize) -> Self {
        let node = Self::new();
        for number in from..=to {
            node.insert_block(Self::block(number, txs_per_block));
        }
        node
    }

    /// Builds block `number` with deterministic hashes and `txs` transactions.
    #[must_use]
    pub fn block(number: u64, txs: usize) -> Block {
        let transactions = (0..txs as u64)
            .map(|index| Transaction {
                hash: Self::tx_hash(number, index),
                block_number: Some(number),
                transaction_index: Some(index),
                from: Address::repeat_byte(0x11),
                to: Some(Address::repeat_byte(0x22)),
                value: U256::from(index),
                nonce: index,
                gas_limit: 21_000,
                ..Default::default()
            })
            .collect();

        Block {
            number,
            hash: keccak256(number.to_be_bytes()),
            parent_hash: keccak256(number.saturating_sub(1).to_be_bytes()),
            timestamp: 1_700_000_000 + 12 * number,
            gas_used: 21_000 * txs as u64,
            gas_limit: 30_000_000,
            transactions,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn tx_hash(block_number: u64, index: u64) -> TxHash {
        let mut preimage = [0u8; 16];
        preimage[..8].copy_from_slice(&block_number.to_be_bytes());
        preimage[8..].copy_from_slice(&index.to_be_bytes());
        keccak256(preimage)
    }

    /// Inserts `block` and a receipt for each of its transactions, raising the head if needed.
    pub fn insert_block(&self, block: Block) {
        let mut state = self.lock();
        for tx in &block.transactions {
            state.receipts.insert(
                tx.hash,
                Receipt {
                    transaction_hash: tx.hash,
                    block_number: Some(block.number),
                    status: true,
                    gas_used: 21_000,
                    cumulative_gas_used: 21_000 * (tx.transaction_index.unwrap_or_default() + 1),
                    ..Default::default()
                },
            );
        }
        state.head = state.head.max(block.number);
        state.blocks.insert(block.number, block);
    }

    pub fn set_timestamp(&self, number: u64, timestamp: u64) {
        if let Some(block) = self.lock().blocks.get_mut(&number) {
            block.timestamp = timestamp;
        }
    }

    pub fn set_head(&self, head: u64) {
        self.lock().head = head;
    }

    pub fn push_log(&self, log: Log) {
        self.lock().logs.push(log);
    }

    /// Delays every answer by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// The next `times` block-number calls misbehave with `fault`.
    pub fn fail_head(&self, fault: Fault, times: usize) {
        self.script(CallKey::Head, fault, times);
    }

    /// The next `times` calls for block `number` misbehave with `fault`.
    pub fn fail_block(&self, number: u64, fault: Fault, times: usize) {
        self.script(CallKey::Block(number), fault, times);
    }

    /// The next `times` receipt calls for `hash` misbehave with `fault`.
    pub fn fail_receipt(&self, hash: TxHash, fault: Fault, times: usize) {
        self.script(CallKey::Receipt(hash), fault, times);
    }

    /// The next `times` log queries misbehave with `fault`.
    pub fn fail_logs(&self, fault: Fault, times: usize) {
        self.script(CallKey::Logs, fault, times);
    }

    #[must_use]
    pub fn head_calls(&self) -> usize {
        self.calls(CallKey::Head)
    }

    #[must_use]
    pub fn block_calls(&self, number: u64) -> usize {
        self.calls(CallKey::Block(number))
    }

    #[must_use]
    pub fn receipt_calls(&self, hash: TxHash) -> usize {
        self.calls(CallKey::Receipt(hash))
    }

    /// Total number of block fetches across all numbers.
    #[must_use]
    pub fn total_block_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(key, _)| matches!(key, CallKey::Block(_)))
            .map(|(_, calls)| calls)
            .sum()
    }

    /// Ranges of every log query, in call order.
    #[must_use]
    pub fn log_requests(&self) -> Vec<RangeInclusive<u64>> {
        self.lock().log_requests.clone()
    }

    fn script(&self, key: CallKey, fault: Fault, times: usize) {
        if times > 0 {
            self.lock().faults.entry(key).or_default().push_back((fault, times));
        }
    }

    fn calls(&self, key: CallKey) -> usize {
        self.lock().calls.get(&key).copied().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies latency and the scripted fault for `key`, then answers with `answer`.
    async fn respond<T>(
        &self,
        key: CallKey,
        answer: impl FnOnce(&mut State) -> T,
    ) -> TransportResult<Option<T>> {
        let (fault, latency) = {
            let mut state = self.lock();
            (state.begin(key), state.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match fault {
            Some(Fault::Error) => return Err(TransportErrorKind::custom_str("mock node failure")),
            Some(Fault::Empty) => return Ok(None),
            Some(Fault::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        let mut state = self.lock();
        Ok(Some(answer(&mut state)))
    }
}

impl NodeClient for MockNode {
    async fn get_block_number(&self) -> TransportResult<u64> {
        // A node never returns an empty head, so `Empty` degrades to genesis.
        let head = self.respond(CallKey::Head, |state| state.head).await?;
        Ok(head.unwrap_or_default())
    }

    async fn get_block(&self, number: u64) -> TransportResult<Option<Block>> {
        let block =
            self.respond(CallKey::Block(number), |state| state.blocks.get(&number).cloned()).await?;
        Ok(block.flatten())
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> TransportResult<Option<Receipt>> {
        let receipt =
            self.respond(CallKey::Receipt(hash), |state| state.receipts.get(&hash).cloned()).await?;
        Ok(receipt.flatten())
    }

    async fn get_logs(
        &self,
        address: Address,
        range: RangeInclusive<u64>,
    ) -> TransportResult<Vec<Log>> {
        let logs = self
            .respond(CallKey::Logs, |state| {
                state.log_requests.push(range.clone());
                state
                    .logs
                    .iter()
                    .filter(|log| log.inner.address == address)
                    .filter(|log| log.block_number.is_some_and(|number| range.contains(&number)))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await?;
        Ok(logs.unwrap_or_default())
    }
}
