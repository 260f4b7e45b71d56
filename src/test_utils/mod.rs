//! In-memory collaborators for exercising the recovery pipelines without a node.

pub mod macros;
mod mock_events;
mod mock_node;

pub use mock_events::{MockEventSource, ScriptedCursor};
pub use mock_node::{Fault, MockNode};

use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    HistoryError,
    events::{EventBatchResult, EventConsumer, EventTransaction, MalformedTransaction},
    types::{BlockConsumer, BlockResult, Flow},
};

/// Records every block delivery and optionally stops after a number of successful ones.
#[derive(Debug, Clone, Default)]
pub struct BlockRecorder {
    deliveries: Arc<Mutex<Vec<BlockResult>>>,
    stop_after: Option<usize>,
}

impl BlockRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns [`Flow::Stop`] from the `blocks`-th successful delivery.
    #[must_use]
    pub fn stop_after(blocks: usize) -> Self {
        Self { stop_after: Some(blocks), ..Self::default() }
    }

    #[must_use]
    pub fn deliveries(&self) -> Vec<BlockResult> {
        self.deliveries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Numbers of the successfully delivered blocks, in delivery order.
    #[must_use]
    pub fn block_numbers(&self) -> Vec<u64> {
        self.deliveries().into_iter().filter_map(Result::ok).map(|block| block.number).collect()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<HistoryError> {
        self.deliveries().into_iter().filter_map(Result::err).collect()
    }
}

impl BlockConsumer for BlockRecorder {
    async fn on_block(&mut self, block: BlockResult) -> Flow {
        let mut deliveries = self.deliveries.lock().unwrap_or_else(PoisonError::into_inner);
        deliveries.push(block);
        let delivered = deliveries.iter().filter(|delivery| delivery.is_ok()).count();
        match self.stop_after {
            Some(limit) if delivered >= limit => Flow::Stop,
            _ => Flow::Continue,
        }
    }
}

/// Records every event page and every malformed-transaction report.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    batches: Arc<Mutex<Vec<EventBatchResult>>>,
    malformed: Arc<Mutex<Vec<MalformedTransaction>>>,
}

impl EventRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn batches(&self) -> Vec<EventBatchResult> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Every transaction of every successful page, in delivery order.
    #[must_use]
    pub fn transactions(&self) -> Vec<EventTransaction> {
        self.batches().into_iter().filter_map(Result::ok).flatten().collect()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<HistoryError> {
        self.batches().into_iter().filter_map(Result::err).collect()
    }

    #[must_use]
    pub fn malformed(&self) -> Vec<MalformedTransaction> {
        self.malformed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl EventConsumer for EventRecorder {
    async fn on_batch(&mut self, batch: EventBatchResult) {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).push(batch);
    }

    async fn on_malformed(&mut self, transactions: Vec<MalformedTransaction>) {
        self.malformed.lock().unwrap_or_else(PoisonError::into_inner).extend(transactions);
    }
}
