//! eth-history recovers historical chain data from an Ethereum JSON-RPC node.
//!
//! The entry point is [`EthHistory`], built via [`EthHistoryBuilder`] from any
//! [`NodeClient`] (every alloy `Provider<Ethereum>` is one), a contract address and the contract
//! ABI. It offers two operations:
//!
//! - [`EthHistory::recover_blocks`] streams raw blocks with full transactions, and optionally their
//!   receipts, to a [`BlockConsumer`].
//! - [`EthHistory::recover_events`] streams the contract's decoded events, grouped by transaction,
//!   to an [`EventConsumer`].
//!
//! # Delivery
//!
//! Blocks are fetched in windows of `concurrency` consecutive numbers. A window is delivered in
//! ascending timestamp order and the next window is only requested once the current one has been
//! fully delivered, so a slow consumer throttles the whole recovery. Every delivery is awaited.
//!
//! # Failures
//!
//! Every node call is retried with a fixed delay up to `max_retries` attempts. A block, receipt or
//! event page that still cannot be retrieved is delivered to the consumer as an `Err` and the
//! recovery carries on. A block whose receipts could only partially be retrieved is still
//! delivered. Only a malformed request, or a chain head that cannot be resolved, fails the
//! operation itself.
//!
//! # Stopping early
//!
//! A block consumer may return [`Flow::Stop`] from any delivery. Requests already in flight for
//! the current window are awaited but not delivered, and the operation resolves with
//! [`Completion::Stopped`]. Event recovery always runs to the end of its range.
//!
//! # Consumers
//!
//! Closures returning a future of `()`, `bool` or [`Flow`] are consumers, and so is a
//! `tokio::sync::mpsc::Sender` of the result type. A closed channel stops a block recovery.

#[macro_use]
mod logging;

pub mod blocks;
pub mod events;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod error;
mod history;
mod node;
mod request;
mod retry;
mod types;

pub use error::{HistoryError, ValidationError};
pub use history::{EthHistory, EthHistoryBuilder};
pub use node::NodeClient;
pub use request::{
    BlockRecoveryPlan, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, EventRecoveryRequest,
    RecoveryRequest,
};
pub use retry::{DEFAULT_CALL_TIMEOUT, DEFAULT_RETRY_DELAY, RetryExecutor};
pub use types::{
    Block, BlockConsumer, BlockResult, Completion, Flow, Receipt, RecoveryOutcome, Transaction,
};

pub use events::{
    DEFAULT_EVENT_PAGE_SIZE, DecodedLogEvent, EventBatchResult, EventConsumer, EventCursor,
    EventHandlers, EventPage, EventSource, EventTransaction, MalformedTransaction,
};
