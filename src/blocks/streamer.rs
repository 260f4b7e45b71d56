use tracing::{Instrument, Span};

use crate::{
    NodeClient, RetryExecutor,
    blocks::{
        fetcher::{BlockBatchFetcher, FetchedWindow},
        receipts::ReceiptEnricher,
        window::WindowIterator,
    },
    request::BlockRecoveryPlan,
    types::{BlockConsumer, BlockResult, RecoveryOutcome},
};

/// Drives a block recovery window by window and hands every result to the consumer.
///
/// Windows are processed strictly in order: the next window is not requested until every block
/// of the current one has been enriched and delivered. Within a window, failed positions are
/// reported first, then the blocks follow in timestamp order. The stream ends early as soon as a
/// delivery returns [`Flow::Stop`](crate::Flow::Stop).
#[derive(Debug)]
pub struct BlockStreamer<'a, C> {
    client: &'a C,
    retry: RetryExecutor,
    span: Span,
}

impl<'a, C: NodeClient> BlockStreamer<'a, C> {
    #[must_use]
    pub fn new(client: &'a C, retry: RetryExecutor, span: Span) -> Self {
        Self { client, retry, span }
    }

    pub async fn stream<K: BlockConsumer>(
        &self,
        plan: &BlockRecoveryPlan,
        consumer: &mut K,
    ) -> RecoveryOutcome {
        self.run(plan, consumer).instrument(self.span.clone()).await
    }

    async fn run<K: BlockConsumer>(
        &self,
        plan: &BlockRecoveryPlan,
        consumer: &mut K,
    ) -> RecoveryOutcome {
        info!(
            from_block = plan.from_block,
            to_block = plan.to_block,
            max_attempts = plan.max_attempts,
            concurrency = plan.concurrency,
            "Recovering blocks"
        );

        let retry = self.retry.with_max_attempts(plan.max_attempts);
        let fetcher = BlockBatchFetcher::new(self.client, &retry);
        let enricher = plan
            .include_receipts
            .then(|| ReceiptEnricher::new(self.client, &retry, plan.concurrency));

        let mut outcome = RecoveryOutcome::default();

        for window in WindowIterator::new(plan.from_block, plan.to_block, plan.concurrency) {
            let FetchedWindow { blocks, failures } = fetcher.fetch_window(window).await;

            for err in failures {
                if deliver(consumer, &mut outcome, Err(err)).await {
                    return stop(outcome);
                }
            }

            for mut block in blocks {
                if let Some(enricher) = &enricher {
                    for err in enricher.enrich(&mut block).await {
                        if deliver(consumer, &mut outcome, Err(err)).await {
                            return stop(outcome);
                        }
                    }
                }

                if deliver(consumer, &mut outcome, Ok(block)).await {
                    return stop(outcome);
                }
            }
        }

        info!(
            delivered = outcome.delivered,
            failures = outcome.failures,
            "Finished recovering all blocks"
        );
        outcome
    }
}

fn stop(outcome: RecoveryOutcome) -> RecoveryOutcome {
    debug!(
        delivered = outcome.delivered,
        "Bailing out of block retrieval early since the consumer asked to stop"
    );
    outcome.stopped()
}

/// Hands one result to the consumer and reports whether it asked to stop.
async fn deliver<K: BlockConsumer>(
    consumer: &mut K,
    outcome: &mut RecoveryOutcome,
    result: BlockResult,
) -> bool {
    match &result {
        Ok(_) => outcome.delivered += 1,
        Err(_) => outcome.failures += 1,
    }
    consumer.on_block(result).await.is_stop()
}
