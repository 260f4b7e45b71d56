use std::{sync::Arc, time::Duration};

use alloy::{json_abi::JsonAbi, primitives::Address};
use tracing::Span;

use crate::{
    HistoryError, NodeClient, RetryExecutor, ValidationError,
    blocks::BlockStreamer,
    events::{DEFAULT_EVENT_PAGE_SIZE, EventConsumer, EventPager, EventSource, LogEventSync},
    request::{DEFAULT_MAX_RETRIES, EventRecoveryRequest, RecoveryRequest},
    retry::{DEFAULT_CALL_TIMEOUT, DEFAULT_RETRY_DELAY},
    types::{BlockConsumer, RecoveryOutcome},
};

/// Builder for [`EthHistory`].
pub struct EthHistoryBuilder<C> {
    client: C,
    address: Address,
    abi: JsonAbi,
    retry_delay: Duration,
    call_timeout: Duration,
    event_page_size: u64,
    span: Span,
}

impl<C: NodeClient> EthHistoryBuilder<C> {
    /// `address` and `abi` describe the contract whose events [`EthHistory::recover_events`]
    /// recovers.
    #[must_use]
    pub fn new(client: C, address: Address, abi: JsonAbi) -> Self {
        Self {
            client,
            address,
            abi,
            retry_delay: DEFAULT_RETRY_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            event_page_size: DEFAULT_EVENT_PAGE_SIZE,
            span: tracing::info_span!(target: "eth_history", "eth_history"),
        }
    }

    /// Set the fixed delay between two attempts of the same node call.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the upper bound for a single attempt of a node call.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the number of blocks covered by one `eth_getLogs` page.
    #[must_use]
    pub fn event_page_size(mut self, blocks: u64) -> Self {
        self.event_page_size = blocks;
        self
    }

    /// Set the span every record emitted by this instance is attached to.
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// # Errors
    ///
    /// Fails when the ABI declares no decodable event or the event page size is 0.
    pub fn build(self) -> Result<EthHistory<C>, ValidationError> {
        debug!(
            address = %self.address,
            retry_delay_ms = self.retry_delay.as_millis(),
            call_timeout_ms = self.call_timeout.as_millis(),
            event_page_size = self.event_page_size,
            "Building EthHistory"
        );

        let client = Arc::new(self.client);
        let retry = RetryExecutor::new(DEFAULT_MAX_RETRIES, self.span.clone())
            .delay(self.retry_delay)
            .call_timeout(self.call_timeout);
        let events = LogEventSync::new(
            Arc::clone(&client),
            self.address,
            &self.abi,
            retry.clone(),
            self.event_page_size,
            tracing::info_span!(target: "eth_history", parent: &self.span, "log_sync"),
        )?;

        Ok(EthHistory { client, retry, events, span: self.span })
    }
}

/// Recovers historical blocks and contract events from a node.
///
/// Both operations validate their request before any network activity and otherwise always
/// complete: failures of individual blocks, receipts or event pages are delivered to the consumer,
/// never returned. The only other error is a chain head that cannot be resolved when `to_block` is
/// omitted.
#[derive(Debug)]
pub struct EthHistory<C> {
    client: Arc<C>,
    retry: RetryExecutor,
    events: LogEventSync<C>,
    span: Span,
}

impl<C: NodeClient> EthHistory<C> {
    #[must_use]
    pub fn builder(client: C, address: Address, abi: JsonAbi) -> EthHistoryBuilder<C> {
        EthHistoryBuilder::new(client, address, abi)
    }

    /// Streams every block of the requested range to `consumer`.
    ///
    /// Blocks are fetched in windows of `concurrency` consecutive numbers. Each window is
    /// delivered in ascending timestamp order, and windows follow each other in block order.
    /// Returning [`Flow::Stop`](crate::Flow::Stop) from a delivery ends the recovery with
    /// [`Completion::Stopped`](crate::Completion::Stopped).
    ///
    /// # Errors
    ///
    /// [`HistoryError::Validation`] for a malformed request, or the retry outcome of the
    /// chain-head lookup when `to_block` is omitted.
    pub async fn recover_blocks<K: BlockConsumer>(
        &self,
        request: RecoveryRequest,
        mut consumer: K,
    ) -> Result<RecoveryOutcome, HistoryError> {
        request.validate()?;

        let max_attempts = request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        let retry = self.retry.with_max_attempts(max_attempts);
        let to_block = match request.to_block {
            Some(to_block) => to_block,
            None => self.resolve_head(&retry).await?,
        };
        let plan = request.plan(to_block)?;

        let span = tracing::info_span!(target: "eth_history", parent: &self.span, "recover_blocks");
        let streamer = BlockStreamer::new(self.client.as_ref(), retry, span);
        Ok(streamer.stream(&plan, &mut consumer).await)
    }

    /// Streams every decoded event transaction of the contract in the requested range to
    /// `consumer`, one page at a time, until the range is exhausted.
    ///
    /// # Errors
    ///
    /// Same as [`EthHistory::recover_blocks`].
    pub async fn recover_events<K: EventConsumer>(
        &self,
        request: EventRecoveryRequest,
        consumer: K,
    ) -> Result<RecoveryOutcome, HistoryError> {
        self.recover_events_from(&self.events, request, consumer).await
    }

    /// Like [`EthHistory::recover_events`], paging a caller-supplied event source.
    ///
    /// # Errors
    ///
    /// Same as [`EthHistory::recover_blocks`].
    pub async fn recover_events_from<S: EventSource, K: EventConsumer>(
        &self,
        source: &S,
        request: EventRecoveryRequest,
        mut consumer: K,
    ) -> Result<RecoveryOutcome, HistoryError> {
        request.validate()?;

        let to_block = match request.to_block {
            Some(to_block) => to_block,
            None => self.resolve_head(&self.retry).await?,
        };
        let range = request.range(to_block)?;

        let span = tracing::info_span!(target: "eth_history", parent: &self.span, "recover_events");
        Ok(EventPager::new(source, span).run(range, &mut consumer).await)
    }

    async fn resolve_head(&self, retry: &RetryExecutor) -> Result<u64, HistoryError> {
        let client = self.client.as_ref();
        let head = retry
            .execute("eth_blockNumber", || {
                let pending = client.get_block_number();
                async move { pending.await.map(Some) }
            })
            .await;

        match head {
            Ok(head) => {
                debug!(head = head, "Resolved chain head");
                Ok(head)
            }
            Err(err) => {
                error!(error = %err, "Failed to resolve chain head");
                Err(err)
            }
        }
    }
}
