use alloy::{
    primitives::{Address, B256, Bytes, TxHash, U256},
    rpc::types::Log,
};
use tokio::sync::mpsc;

use crate::HistoryError;

/// Result delivered to a [`BlockConsumer`] for every recovered block or failed unit of work.
pub type BlockResult = Result<Block, HistoryError>;

/// A block as reported by the node, with full transaction objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub miner: Address,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: Option<u64>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Number of transactions that carry a receipt.
    #[must_use]
    pub fn receipt_count(&self) -> usize {
        self.transactions.iter().filter(|tx| tx.receipt.is_some()).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub hash: TxHash,
    pub block_number: Option<u64>,
    pub transaction_index: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub input: Bytes,
    /// Attached after the block is fetched, only when receipts were requested and the
    /// receipt could be retrieved.
    pub receipt: Option<Receipt>,
}

/// Outcome record of a mined transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub status: bool,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

/// Continuation signal returned by consumers after each delivery.
///
/// `()` and `true` convert to [`Flow::Continue`], `false` converts to [`Flow::Stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flow {
    #[default]
    Continue,
    Stop,
}

impl Flow {
    #[must_use]
    pub fn is_stop(self) -> bool {
        self == Flow::Stop
    }
}

impl From<()> for Flow {
    fn from((): ()) -> Self {
        Flow::Continue
    }
}

impl From<bool> for Flow {
    fn from(keep_going: bool) -> Self {
        if keep_going { Flow::Continue } else { Flow::Stop }
    }
}

/// How a recovery operation ended. Both variants are successful completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Completion {
    /// Delivery covered the full requested range.
    #[default]
    Done,
    /// The consumer returned [`Flow::Stop`].
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub completion: Completion,
    /// Blocks (block recovery) or event transactions (event recovery) handed to the consumer.
    pub delivered: u64,
    /// Failures reported to the consumer.
    pub failures: u64,
}

impl RecoveryOutcome {
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.completion == Completion::Stopped
    }

    pub(crate) fn stopped(mut self) -> Self {
        self.completion = Completion::Stopped;
        self
    }
}

/// Receives recovered blocks one at a time.
///
/// Each delivery is awaited before the pipeline proceeds, so a slow consumer throttles the
/// whole stream.
pub trait BlockConsumer {
    fn on_block(&mut self, block: BlockResult) -> impl Future<Output = Flow> + Send;
}

impl<F, Fut> BlockConsumer for F
where
    F: FnMut(BlockResult) -> Fut + Send,
    Fut: Future + Send,
    Fut::Output: Into<Flow>,
{
    fn on_block(&mut self, block: BlockResult) -> impl Future<Output = Flow> + Send {
        let delivery = self(block);
        async move { delivery.await.into() }
    }
}

impl BlockConsumer for mpsc::Sender<BlockResult> {
    async fn on_block(&mut self, block: BlockResult) -> Flow {
        if let Err(err) = self.send(block).await {
            warn!(error = %err, "Downstream channel closed, stopping stream");
            return Flow::Stop;
        }
        Flow::Continue
    }
}
