use futures::future::join_all;

use crate::{
    HistoryError, NodeClient, RetryExecutor,
    types::{Block, Transaction},
};

/// Attaches receipts to the transactions of a block, at most `concurrency` fetches at a time.
///
/// A receipt whose fetch exhausts its retries is left unset; the failure is returned to the caller
/// and the remaining transactions are still processed.
#[derive(Debug)]
pub struct ReceiptEnricher<'a, C> {
    client: &'a C,
    retry: &'a RetryExecutor,
    concurrency: usize,
}

impl<'a, C: NodeClient> ReceiptEnricher<'a, C> {
    /// A `concurrency` of 0 is treated as 1.
    #[must_use]
    pub fn new(client: &'a C, retry: &'a RetryExecutor, concurrency: usize) -> Self {
        Self { client, retry, concurrency: concurrency.max(1) }
    }

    /// Enriches `block` in place and returns the failures in transaction order.
    pub async fn enrich(&self, block: &mut Block) -> Vec<HistoryError> {
        debug!(
            block_number = block.number,
            transactions = block.transactions.len(),
            "Retrieving receipts for block"
        );

        let mut failures = Vec::new();
        for chunk in block.transactions.chunks_mut(self.concurrency) {
            let results = join_all(chunk.iter_mut().map(|tx| self.attach_receipt(tx))).await;
            failures.extend(results.into_iter().filter_map(Result::err));
        }

        debug!(
            block_number = block.number,
            receipts = block.receipt_count(),
            failures = failures.len(),
            "Retrieved receipts for block"
        );
        failures
    }

    async fn attach_receipt(&self, tx: &mut Transaction) -> Result<(), HistoryError> {
        let hash = tx.hash;
        match self
            .retry
            .execute("eth_getTransactionReceipt", || self.client.get_transaction_receipt(hash))
            .await
        {
            Ok(receipt) => {
                tx.receipt = Some(receipt);
                Ok(())
            }
            Err(err) => {
                error!(tx_hash = %hash, error = %err, "Problem retrieving receipt");
                Err(HistoryError::ReceiptFetch { hash, source: Box::new(err) })
            }
        }
    }
}
