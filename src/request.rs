//! Typed recovery requests.
//!
//! Requests deserialize from camelCase JSON (`fromBlock`, `toBlock`, `includeReceipts`,
//! `maxRetries`, `concurrency`); unknown fields are ignored. They are validated at the public
//! boundary, before any network activity.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Default number of blocks fetched concurrently per window.
pub const DEFAULT_CONCURRENCY: usize = 5;
/// Default attempt budget for every node call.
pub const DEFAULT_MAX_RETRIES: usize = 50;

/// Parameters of a block recovery.
///
/// `to_block` defaults to the chain head, `concurrency` to [`DEFAULT_CONCURRENCY`] and
/// `max_retries` to [`DEFAULT_MAX_RETRIES`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryRequest {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub concurrency: Option<usize>,
    pub max_retries: Option<usize>,
    pub include_receipts: bool,
}

impl RecoveryRequest {
    #[must_use]
    pub fn new(from_block: u64) -> Self {
        Self { from_block: Some(from_block), ..Self::default() }
    }

    #[must_use]
    pub fn to_block(mut self, to_block: u64) -> Self {
        self.to_block = Some(to_block);
        self
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn include_receipts(mut self, include_receipts: bool) -> Self {
        self.include_receipts = include_receipts;
        self
    }

    /// Checks everything that can be checked without talking to the node.
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        let from_block = self.from_block.ok_or(ValidationError::MissingFromBlock)?;
        if self.concurrency == Some(0) {
            return Err(ValidationError::InvalidConcurrency);
        }
        if self.max_retries == Some(0) {
            return Err(ValidationError::InvalidMaxRetries);
        }
        if let Some(to_block) = self.to_block {
            check_range(from_block, to_block)?;
        }
        Ok(())
    }

    /// Resolves defaults against `to_block` (the explicit bound or the chain head).
    pub(crate) fn plan(&self, to_block: u64) -> Result<BlockRecoveryPlan, ValidationError> {
        self.validate()?;
        let from_block = self.from_block.ok_or(ValidationError::MissingFromBlock)?;
        check_range(from_block, to_block)?;

        let requested = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        let span = to_block - from_block;
        let concurrency = if span < requested as u64 { 1 } else { requested };

        Ok(BlockRecoveryPlan {
            from_block,
            to_block,
            concurrency,
            max_attempts: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            include_receipts: self.include_receipts,
        })
    }
}

/// A validated block recovery with every default resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecoveryPlan {
    pub from_block: u64,
    pub to_block: u64,
    /// Window width and receipt fan-out limit.
    pub concurrency: usize,
    pub max_attempts: usize,
    pub include_receipts: bool,
}

/// Parameters of an event recovery. `to_block` defaults to the chain head.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventRecoveryRequest {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl EventRecoveryRequest {
    #[must_use]
    pub fn new(from_block: u64) -> Self {
        Self { from_block: Some(from_block), to_block: None }
    }

    #[must_use]
    pub fn to_block(mut self, to_block: u64) -> Self {
        self.to_block = Some(to_block);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        let from_block = self.from_block.ok_or(ValidationError::MissingFromBlock)?;
        if let Some(to_block) = self.to_block {
            check_range(from_block, to_block)?;
        }
        Ok(())
    }

    pub(crate) fn range(&self, to_block: u64) -> Result<RangeInclusive<u64>, ValidationError> {
        let from_block = self.from_block.ok_or(ValidationError::MissingFromBlock)?;
        check_range(from_block, to_block)?;
        Ok(from_block..=to_block)
    }
}

fn check_range(from_block: u64, to_block: u64) -> Result<(), ValidationError> {
    if from_block > to_block {
        return Err(ValidationError::InvalidRange { from_block, to_block });
    }
    Ok(())
}
