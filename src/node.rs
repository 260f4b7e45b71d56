//! The node capability consumed by the recovery pipelines.
//!
//! [`NodeClient`] is implemented for every alloy [`Provider`] on the Ethereum network, so a
//! `RootProvider` (or anything built by `ProviderBuilder`) can be handed to
//! [`EthHistoryBuilder`](crate::EthHistoryBuilder) directly.

use std::ops::RangeInclusive;

use alloy::{
    consensus::Transaction as _,
    eips::BlockNumberOrTag,
    network::{Ethereum, TransactionResponse},
    primitives::{Address, TxHash},
    providers::Provider,
    rpc::types::{self as rpc, Filter, Log},
    transports::TransportResult,
};

use crate::types::{Block, Receipt, Transaction};

/// Read-only access to a JSON-RPC node.
///
/// `Ok(None)` means "not available yet" and is retried exactly like a transport error.
pub trait NodeClient: Send + Sync {
    fn get_block_number(&self) -> impl Future<Output = TransportResult<u64>> + Send;

    /// Fetches a block with full transaction objects.
    fn get_block(&self, number: u64) -> impl Future<Output = TransportResult<Option<Block>>> + Send;

    fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = TransportResult<Option<Receipt>>> + Send;

    /// Fetches every log emitted by `address` within `range` (inclusive).
    fn get_logs(
        &self,
        address: Address,
        range: RangeInclusive<u64>,
    ) -> impl Future<Output = TransportResult<Vec<Log>>> + Send;
}

impl<P: Provider<Ethereum>> NodeClient for P {
    async fn get_block_number(&self) -> TransportResult<u64> {
        Provider::get_block_number(self).await
    }

    async fn get_block(&self, number: u64) -> TransportResult<Option<Block>> {
        let block =
            Provider::get_block_by_number(self, BlockNumberOrTag::Number(number)).full().await?;
        Ok(block.map(Block::from))
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> TransportResult<Option<Receipt>> {
        let receipt = Provider::get_transaction_receipt(self, hash).await?;
        Ok(receipt.map(Receipt::from))
    }

    async fn get_logs(
        &self,
        address: Address,
        range: RangeInclusive<u64>,
    ) -> TransportResult<Vec<Log>> {
        let filter =
            Filter::new().address(address).from_block(*range.start()).to_block(*range.end());
        Provider::get_logs(self, &filter).await
    }
}

impl From<rpc::Block> for Block {
    fn from(block: rpc::Block) -> Self {
        let header = &block.header.inner;
        Self {
            number: header.number,
            hash: block.header.hash,
            parent_hash: header.parent_hash,
            timestamp: header.timestamp,
            miner: header.beneficiary,
            gas_used: header.gas_used,
            gas_limit: header.gas_limit,
            base_fee_per_gas: header.base_fee_per_gas,
            transactions: block.transactions.into_transactions().map(Transaction::from).collect(),
        }
    }
}

impl From<rpc::Transaction> for Transaction {
    fn from(tx: rpc::Transaction) -> Self {
        Self {
            hash: tx.tx_hash(),
            block_number: tx.block_number,
            transaction_index: tx.transaction_index,
            from: TransactionResponse::from(&tx),
            to: tx.to(),
            value: tx.value(),
            nonce: tx.nonce(),
            gas_limit: tx.gas_limit(),
            input: tx.input().clone(),
            receipt: None,
        }
    }
}

impl From<rpc::TransactionReceipt> for Receipt {
    fn from(receipt: rpc::TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            status: receipt.inner.status(),
            gas_used: receipt.gas_used,
            cumulative_gas_used: receipt.inner.cumulative_gas_used(),
            contract_address: receipt.contract_address,
            logs: receipt.inner.logs().to_vec(),
        }
    }
}
