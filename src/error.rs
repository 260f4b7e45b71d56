use std::{mem::discriminant, sync::Arc};

use alloy::{
    primitives::TxHash,
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;

/// A recovery request was rejected before any network activity took place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `fromBlock` is required for both block and event recovery.
    #[error("fromBlock is required")]
    MissingFromBlock,

    /// The requested range is inverted.
    #[error("Invalid block span: fromBlock {from_block} must not be after toBlock {to_block}")]
    InvalidRange { from_block: u64, to_block: u64 },

    #[error("Concurrency must be greater than 0")]
    InvalidConcurrency,

    #[error("Max retries must be greater than 0")]
    InvalidMaxRetries,

    #[error("Event page size must be greater than 0")]
    InvalidPageSize,

    /// The contract ABI has no items.
    #[error("Contract ABI must not be empty")]
    EmptyAbi,
}

/// Errors produced while recovering history.
///
/// Only [`HistoryError::Validation`] and a failure to resolve the chain head are returned from the
/// public operations. Everything else describes the failure of a single unit of work (one block,
/// one receipt or one event page) and is delivered to the consumer while the stream carries on.
#[derive(Error, Debug, Clone)]
pub enum HistoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The node returned an error on the final attempt.
    #[error("RPC error: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),

    /// The final attempt did not answer within the configured call timeout.
    #[error("Operation timed out")]
    Timeout,

    /// Block `number` could not be retrieved; `source` is the retry outcome.
    #[error("Failed to fetch block {number}: {source}")]
    BlockFetch { number: u64, source: Box<HistoryError> },

    /// The receipt of transaction `hash` could not be retrieved.
    #[error("Failed to fetch receipt for transaction {hash}: {source}")]
    ReceiptFetch { hash: TxHash, source: Box<HistoryError> },

    /// Every attempt came back empty, so no definitive outcome exists.
    #[error("Could not execute with retries after {attempts} attempts")]
    RetriesExhausted { attempts: usize },

    /// The event-sync collaborator failed to produce a page.
    #[error("Event sync failed: {0}")]
    EventSync(String),
}

impl From<RpcError<TransportErrorKind>> for HistoryError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        HistoryError::RpcError(Arc::new(error))
    }
}

impl<T> PartialEq<HistoryError> for Result<T, HistoryError> {
    fn eq(&self, other: &HistoryError) -> bool {
        match self {
            Ok(_) => false,
            Err(err) => discriminant(err) == discriminant(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_compares_by_error_variant() {
        let result: Result<(), HistoryError> = Err(HistoryError::BlockFetch {
            number: 7,
            source: Box::new(HistoryError::Timeout),
        });

        assert!(
            result
                == HistoryError::BlockFetch { number: 0, source: Box::new(HistoryError::Timeout) }
        );
        assert!(result != HistoryError::Timeout);
        assert!(Ok::<(), HistoryError>(()) != HistoryError::Timeout);
    }

    #[test]
    fn fetch_failures_name_the_unit_and_the_cause() {
        let err = HistoryError::BlockFetch {
            number: 12,
            source: Box::new(HistoryError::RetriesExhausted { attempts: 3 }),
        };

        assert_eq!(
            err.to_string(),
            "Failed to fetch block 12: Could not execute with retries after 3 attempts"
        );
    }

    #[test]
    fn validation_error_message_names_both_bounds() {
        let err: HistoryError =
            ValidationError::InvalidRange { from_block: 10, to_block: 5 }.into();

        assert_eq!(
            err.to_string(),
            "Invalid block span: fromBlock 10 must not be after toBlock 5"
        );
    }
}
