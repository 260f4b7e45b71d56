//! Event recovery: paging decoded contract events out of an event-sync collaborator.
//!
//! The collaborator is modelled by [`EventSource`], which hands out the first page of a range
//! together with a single-use [`EventCursor`] for the rest. [`LogEventSync`] is the default source,
//! backed by `eth_getLogs` on any [`NodeClient`](crate::NodeClient).

mod log_sync;
mod pager;

use std::ops::RangeInclusive;

use alloy::{dyn_abi::DynSolValue, primitives::TxHash, rpc::types::Log};
use tokio::sync::mpsc;

use crate::HistoryError;

pub use log_sync::{LogCursor, LogEventSync};
pub use pager::EventPager;

/// Default number of blocks covered by one `eth_getLogs` page.
pub const DEFAULT_EVENT_PAGE_SIZE: u64 = 1000;

/// Result delivered to an [`EventConsumer`] for every page.
pub type EventBatchResult = Result<Vec<EventTransaction>, HistoryError>;

/// A log decoded against the contract ABI.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLogEvent {
    pub name: String,
    /// Indexed parameters, in declaration order.
    pub indexed: Vec<DynSolValue>,
    /// Non-indexed parameters, in declaration order.
    pub body: Vec<DynSolValue>,
    pub log: Log,
}

/// A transaction with every contract event it emitted in the page's range.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTransaction {
    pub hash: TxHash,
    pub block_number: Option<u64>,
    pub transaction_index: Option<u64>,
    pub events: Vec<DecodedLogEvent>,
}

/// A transaction whose logs could not all be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedTransaction {
    pub hash: Option<TxHash>,
    pub block_number: Option<u64>,
    pub logs: Vec<Log>,
    pub reason: String,
}

/// One page produced by an [`EventSource`] or an [`EventCursor`].
#[derive(Debug)]
pub struct EventPage<C> {
    pub transactions: EventBatchResult,
    /// Side channel for transactions the source could not decode.
    pub malformed: Vec<MalformedTransaction>,
    /// Continuation for the rest of the range; `None` once the range is exhausted.
    pub next: Option<C>,
}

impl<C> EventPage<C> {
    #[must_use]
    pub fn new(transactions: EventBatchResult, next: Option<C>) -> Self {
        Self { transactions, malformed: Vec::new(), next }
    }

    #[must_use]
    pub fn with_malformed(mut self, malformed: Vec<MalformedTransaction>) -> Self {
        self.malformed = malformed;
        self
    }
}

/// An event-sync collaborator.
pub trait EventSource: Send + Sync {
    type Cursor: EventCursor;

    /// Produces the first page of `range` and the cursor for the remainder.
    fn start(
        &self,
        range: RangeInclusive<u64>,
    ) -> impl Future<Output = EventPage<Self::Cursor>> + Send;
}

/// A single-use continuation token. Consuming it is the only way to get the next page.
pub trait EventCursor: Sized + Send {
    fn next_batch(self) -> impl Future<Output = EventPage<Self>> + Send;
}

/// Receives event pages, and optionally the malformed transactions flagged within them.
pub trait EventConsumer {
    fn on_batch(&mut self, batch: EventBatchResult) -> impl Future<Output = ()> + Send;

    /// Called after [`on_batch`](Self::on_batch) whenever the page flagged malformed
    /// transactions. Ignores them by default.
    fn on_malformed(
        &mut self,
        transactions: Vec<MalformedTransaction>,
    ) -> impl Future<Output = ()> + Send {
        drop(transactions);
        std::future::ready(())
    }
}

impl<F, Fut> EventConsumer for F
where
    F: FnMut(EventBatchResult) -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    fn on_batch(&mut self, batch: EventBatchResult) -> impl Future<Output = ()> + Send {
        self(batch)
    }
}

impl EventConsumer for mpsc::Sender<EventBatchResult> {
    async fn on_batch(&mut self, batch: EventBatchResult) {
        if let Err(err) = self.send(batch).await {
            warn!(error = %err, "Downstream channel closed, dropping event batch");
        }
    }
}

/// Pairs a batch handler with a malformed-transaction handler.
#[derive(Debug, Clone)]
pub struct EventHandlers<B, M> {
    on_batch: B,
    on_malformed: M,
}

impl<B, M> EventHandlers<B, M> {
    #[must_use]
    pub fn new(on_batch: B, on_malformed: M) -> Self {
        Self { on_batch, on_malformed }
    }
}

impl<B, BFut, M, MFut> EventConsumer for EventHandlers<B, M>
where
    B: FnMut(EventBatchResult) -> BFut + Send,
    BFut: Future<Output = ()> + Send,
    M: FnMut(Vec<MalformedTransaction>) -> MFut + Send,
    MFut: Future<Output = ()> + Send,
{
    fn on_batch(&mut self, batch: EventBatchResult) -> impl Future<Output = ()> + Send {
        (self.on_batch)(batch)
    }

    fn on_malformed(
        &mut self,
        transactions: Vec<MalformedTransaction>,
    ) -> impl Future<Output = ()> + Send {
        (self.on_malformed)(transactions)
    }
}
