use std::ops::RangeInclusive;

use tracing::{Instrument, Span};

use crate::{
    events::{EventConsumer, EventCursor, EventPage, EventSource},
    types::RecoveryOutcome,
};

/// Pages an [`EventSource`] to exhaustion.
///
/// Every page is handed to the consumer, failed pages included, and paging carries on until the
/// source stops issuing cursors. There is no early stop.
#[derive(Debug)]
pub struct EventPager<'a, S> {
    source: &'a S,
    span: Span,
}

impl<'a, S: EventSource> EventPager<'a, S> {
    #[must_use]
    pub fn new(source: &'a S, span: Span) -> Self {
        Self { source, span }
    }

    /// Resolves after the final page has been delivered.
    pub async fn run<K: EventConsumer>(
        &self,
        range: RangeInclusive<u64>,
        consumer: &mut K,
    ) -> RecoveryOutcome {
        self.page(range, consumer).instrument(self.span.clone()).await
    }

    async fn page<K: EventConsumer>(
        &self,
        range: RangeInclusive<u64>,
        consumer: &mut K,
    ) -> RecoveryOutcome {
        info!(from_block = *range.start(), to_block = *range.end(), "Syncing log events in range");

        let mut outcome = RecoveryOutcome::default();
        let mut page = self.source.start(range).await;

        loop {
            let EventPage { transactions, malformed, next } = page;

            match &transactions {
                Ok(txs) => {
                    debug!(count = txs.len(), "Received event transactions");
                    outcome.delivered += txs.len() as u64;
                }
                Err(err) => {
                    error!(error = %err, "Problem in event retrieval");
                    outcome.failures += 1;
                }
            }
            consumer.on_batch(transactions).await;

            if !malformed.is_empty() {
                warn!(count = malformed.len(), "Event page flagged malformed transactions");
                consumer.on_malformed(malformed).await;
            }

            let Some(cursor) = next else { break };
            debug!("Going to next batch of events");
            page = cursor.next_batch().await;
        }

        info!(count = outcome.delivered, "Finished receiving event transactions");
        outcome
    }
}
