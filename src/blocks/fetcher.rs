use std::ops::RangeInclusive;

use futures::future::join_all;

use crate::{HistoryError, NodeClient, RetryExecutor, types::Block};

/// Blocks of one window, ordered by ascending timestamp, plus the positions that could not be
/// fetched.
#[derive(Debug, Default)]
pub struct FetchedWindow {
    pub blocks: Vec<Block>,
    pub failures: Vec<HistoryError>,
}

/// Fetches a window of consecutive blocks concurrently, one retried call per block.
///
/// Every call in the window runs to completion: a failure in one position never cancels its
/// siblings.
#[derive(Debug)]
pub struct BlockBatchFetcher<'a, C> {
    client: &'a C,
    retry: &'a RetryExecutor,
}

impl<'a, C: NodeClient> BlockBatchFetcher<'a, C> {
    #[must_use]
    pub fn new(client: &'a C, retry: &'a RetryExecutor) -> Self {
        Self { client, retry }
    }

    /// Fetches every block in `window` and sorts the result by `(timestamp, number)`.
    pub async fn fetch_window(&self, window: RangeInclusive<u64>) -> FetchedWindow {
        debug!(
            from_block = *window.start(),
            to_block = *window.end(),
            "Waiting on batch of block requests to complete"
        );

        let results = join_all(window.map(|number| self.fetch_block(number))).await;

        let mut fetched = FetchedWindow::default();
        for result in results {
            match result {
                Ok(block) => fetched.blocks.push(block),
                Err(err) => fetched.failures.push(err),
            }
        }
        fetched.blocks.sort_by_key(|block| (block.timestamp, block.number));

        fetched
    }

    async fn fetch_block(&self, number: u64) -> Result<Block, HistoryError> {
        match self.retry.execute("eth_getBlockByNumber", || self.client.get_block(number)).await {
            Ok(block) => {
                trace!(block_number = block.number, "Received block");
                Ok(block)
            }
            Err(err) => {
                error!(block_number = number, error = %err, "Problem in block retrieval");
                Err(HistoryError::BlockFetch { number, source: Box::new(err) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::Span;

    use super::*;
    use crate::test_utils::{Fault, MockNode};

    #[tokio::test]
    async fn window_is_sorted_by_timestamp_then_number() {
        let node = MockNode::with_chain(10, 13, 0);
        node.set_timestamp(10, 500);
        node.set_timestamp(11, 100);
        node.set_timestamp(12, 100);
        node.set_timestamp(13, 50);
        let retry = RetryExecutor::new(1, Span::none());

        let fetched = BlockBatchFetcher::new(&node, &retry).fetch_window(10..=13).await;

        let numbers: Vec<_> = fetched.blocks.iter().map(|block| block.number).collect();
        assert_eq!(numbers, vec![13, 11, 12, 10]);
        assert!(fetched.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_position_does_not_cancel_siblings() {
        let node = MockNode::with_chain(0, 2, 0);
        node.fail_block(1, Fault::Error, 3);
        let retry = RetryExecutor::new(3, Span::none());

        let fetched = BlockBatchFetcher::new(&node, &retry).fetch_window(0..=2).await;

        let numbers: Vec<_> = fetched.blocks.iter().map(|block| block.number).collect();
        assert_eq!(numbers, vec![0, 2]);
        assert_eq!(fetched.failures.len(), 1);
        assert!(matches!(
            &fetched.failures[0],
            HistoryError::BlockFetch { number: 1, source }
                if matches!(**source, HistoryError::RpcError(_))
        ));
        assert_eq!(node.block_calls(1), 3);
        assert_eq!(node.block_calls(0), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_block_exhausts_retries() {
        let node = MockNode::with_chain(0, 0, 0);
        let retry = RetryExecutor::new(4, Span::none());

        let fetched = BlockBatchFetcher::new(&node, &retry).fetch_window(0..=1).await;

        assert_eq!(fetched.blocks.len(), 1);
        assert!(matches!(
            &fetched.failures[0],
            HistoryError::BlockFetch { number: 1, source }
                if matches!(**source, HistoryError::RetriesExhausted { attempts: 4 })
        ));
    }
}
