use std::time::Duration;

use eth_history::{
    BlockResult, Completion, EthHistory, Flow, HistoryError, RecoveryRequest, ValidationError,
    assert_block_sequence, assert_closed, assert_next,
    test_utils::{BlockRecorder, Fault, MockNode},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

mod common;
use common::{BALANCE_OF_ABI, CONTRACT, history, init_tracing};

#[tokio::test]
async fn every_block_in_range_is_delivered_once_in_order() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 40, 2);
    let recorder = BlockRecorder::new();

    let outcome = history(node.clone())?
        .recover_blocks(RecoveryRequest::new(3).to_block(37).concurrency(4), recorder.clone())
        .await?;

    assert_eq!(recorder.block_numbers(), (3..=37).collect::<Vec<_>>());
    assert!(recorder.errors().is_empty());
    assert_eq!(outcome.completion, Completion::Done);
    assert_eq!(outcome.delivered, 35);
    assert_eq!(node.total_block_calls(), 35);

    Ok(())
}

#[tokio::test]
async fn pairs_of_blocks_cover_the_range_through_a_channel() -> anyhow::Result<()> {
    let node = MockNode::with_chain(100, 105, 0);
    let (sender, receiver) = mpsc::channel(16);

    let outcome = history(node)?
        .recover_blocks(RecoveryRequest::new(100).to_block(105).concurrency(2), sender)
        .await?;

    let mut stream = ReceiverStream::new(receiver);
    assert_block_sequence!(stream, [100, 101, 102, 103, 104, 105]);
    assert_eq!(outcome.delivered, 6);

    Ok(())
}

#[tokio::test]
async fn window_is_delivered_in_timestamp_order() -> anyhow::Result<()> {
    let node = MockNode::with_chain(10, 13, 0);
    node.set_timestamp(10, 2_000_000_000);
    node.set_timestamp(12, 1);
    let recorder = BlockRecorder::new();

    history(node)?
        .recover_blocks(RecoveryRequest::new(10).to_block(13).concurrency(2), recorder.clone())
        .await?;

    // Windows are 10..=11 and 12..=13; ordering only applies within a window.
    assert_eq!(recorder.block_numbers(), vec![11, 10, 12, 13]);

    Ok(())
}

#[tokio::test]
async fn consumer_returning_false_stops_after_third_block() -> anyhow::Result<()> {
    let node = MockNode::with_chain(1, 20, 0);
    let (sender, receiver) = mpsc::channel(32);
    let mut delivered = 0;
    let consumer = move |result: BlockResult| {
        delivered += 1;
        let sender = sender.clone();
        let keep_going = delivered < 3;
        async move {
            let _ = sender.send(result).await;
            keep_going
        }
    };

    let outcome = history(node.clone())?
        .recover_blocks(RecoveryRequest::new(1).to_block(20).concurrency(2), consumer)
        .await?;

    assert_eq!(outcome.completion, Completion::Stopped);
    assert_eq!(outcome.delivered, 3);
    let mut stream = ReceiverStream::new(receiver);
    assert_block_sequence!(stream, [1, 2, 3]);
    assert_eq!(node.block_calls(4), 1);
    assert_eq!(node.block_calls(5), 0);

    Ok(())
}

#[tokio::test]
async fn dropping_the_receiver_stops_the_recovery() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 9, 0);
    let (sender, receiver) = mpsc::channel(1);
    drop(receiver);

    let outcome =
        history(node.clone())?.recover_blocks(RecoveryRequest::new(0).to_block(9), sender).await?;

    assert!(outcome.is_stopped());
    assert_eq!(node.block_calls(9), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_transparently() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 5, 1);
    node.fail_block(2, Fault::Error, 2);
    node.fail_block(4, Fault::Empty, 2);
    node.fail_receipt(MockNode::tx_hash(3, 0), Fault::Error, 1);
    let recorder = BlockRecorder::new();

    let outcome = history(node.clone())?
        .recover_blocks(
            RecoveryRequest::new(0).to_block(5).max_retries(3).include_receipts(true),
            recorder.clone(),
        )
        .await?;

    assert_eq!(recorder.block_numbers(), vec![0, 1, 2, 3, 4, 5]);
    assert!(recorder.errors().is_empty());
    assert!(recorder.deliveries().iter().flatten().all(|block| block.receipt_count() == 1));
    assert_eq!(node.block_calls(2), 3);
    assert_eq!(outcome.failures, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_receipt_is_reported_once_and_block_still_delivered() -> anyhow::Result<()> {
    let node = MockNode::with_chain(50, 51, 3);
    let broken = MockNode::tx_hash(51, 2);
    node.fail_receipt(broken, Fault::Error, 10);
    let (sender, receiver) = mpsc::channel(16);

    let outcome = history(node.clone())?
        .recover_blocks(
            RecoveryRequest::new(50).to_block(51).max_retries(4).include_receipts(true),
            sender,
        )
        .await?;

    let mut stream = ReceiverStream::new(receiver);
    assert_next!(stream, 50);
    assert_next!(
        stream,
        Err(HistoryError::ReceiptFetch { hash: broken, source: Box::new(HistoryError::Timeout) })
    );
    let block = stream_block(&mut stream).await;
    assert_eq!(block.number, 51);
    assert_eq!(block.receipt_count(), 2);
    assert!(block.transactions[2].receipt.is_none());
    assert_closed!(stream);

    assert_eq!(node.receipt_calls(broken), 4);
    assert_eq!((outcome.delivered, outcome.failures), (2, 1));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_block_is_reported_and_siblings_still_delivered() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 3, 0);
    node.fail_block(1, Fault::Error, 2);
    let recorder = BlockRecorder::new();

    let outcome = history(node.clone())?
        .recover_blocks(
            RecoveryRequest::new(0).to_block(3).concurrency(2).max_retries(2),
            recorder.clone(),
        )
        .await?;

    assert_eq!(recorder.block_numbers(), vec![0, 2, 3]);
    let errors = recorder.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], HistoryError::BlockFetch { number: 1, source }
        if matches!(**source, HistoryError::RpcError(_))));
    assert_eq!(node.block_calls(1), 2);
    assert_eq!(outcome.completion, Completion::Done);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hanging_node_call_times_out_per_attempt() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 1, 0);
    node.fail_block(0, Fault::Hang, 2);
    let recorder = BlockRecorder::new();
    let history = eth_history::EthHistory::builder(
        node.clone(),
        common::CONTRACT,
        common::transfer_abi()?,
    )
    .call_timeout(Duration::from_secs(5))
    .build()?;

    let start = tokio::time::Instant::now();
    history
        .recover_blocks(RecoveryRequest::new(0).to_block(1).max_retries(2), recorder.clone())
        .await?;

    assert_eq!(recorder.block_numbers(), vec![1]);
    assert!(matches!(recorder.errors()[0], HistoryError::BlockFetch { number: 0, .. }));
    assert!(start.elapsed() >= Duration::from_secs(10));

    Ok(())
}

#[tokio::test]
async fn missing_to_block_resolves_chain_head() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 8, 0);
    node.set_head(6);
    let recorder = BlockRecorder::new();

    history(node.clone())?.recover_blocks(RecoveryRequest::new(4), recorder.clone()).await?;

    assert_eq!(recorder.block_numbers(), vec![4, 5, 6]);
    assert_eq!(node.head_calls(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unresolvable_head_fails_the_operation() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 2, 0);
    node.fail_head(Fault::Error, 3);

    let result = history(node.clone())?
        .recover_blocks(RecoveryRequest::new(0).max_retries(3), |_: BlockResult| async {})
        .await;

    assert!(matches!(result, Err(HistoryError::RpcError(_))));
    assert_eq!(node.head_calls(), 3);
    assert_eq!(node.total_block_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_call() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 20, 0);
    let history = history(node.clone())?;

    let inverted = history
        .recover_blocks(RecoveryRequest::new(10).to_block(5), |_: BlockResult| async {})
        .await;
    assert!(matches!(
        inverted,
        Err(HistoryError::Validation(ValidationError::InvalidRange { from_block: 10, to_block: 5 }))
    ));

    let missing = history
        .recover_blocks(RecoveryRequest::default().to_block(5), |_: BlockResult| async {})
        .await;
    assert!(matches!(
        missing,
        Err(HistoryError::Validation(ValidationError::MissingFromBlock))
    ));

    assert_eq!(node.head_calls(), 0);
    assert_eq!(node.total_block_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn head_below_from_block_is_rejected() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 3, 0);

    let result = history(node.clone())?
        .recover_blocks(RecoveryRequest::new(10), |_: BlockResult| async { Flow::Continue })
        .await;

    assert!(matches!(
        result,
        Err(HistoryError::Validation(ValidationError::InvalidRange { from_block: 10, to_block: 3 }))
    ));
    assert_eq!(node.total_block_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn repeated_requests_yield_identical_sequences() -> anyhow::Result<()> {
    let node = MockNode::with_chain(0, 30, 1);
    node.set_timestamp(7, 0);
    let history = history(node)?;
    let request = RecoveryRequest::new(2).to_block(29).concurrency(3).include_receipts(true);

    let first = BlockRecorder::new();
    history.recover_blocks(request.clone(), first.clone()).await?;
    let second = BlockRecorder::new();
    history.recover_blocks(request, second.clone()).await?;

    assert_eq!(first.deliveries().len(), 28);
    assert_eq!(
        first.deliveries().into_iter().flatten().collect::<Vec<_>>(),
        second.deliveries().into_iter().flatten().collect::<Vec<_>>()
    );

    Ok(())
}

async fn stream_block(stream: &mut ReceiverStream<BlockResult>) -> eth_history::Block {
    match eth_history::test_utils::macros::next_within(stream, 5).await {
        Some(Ok(block)) => block,
        other => panic!("Expected a block, got {other:?}"),
    }
}

#[tokio::test]
async fn abi_without_events_still_recovers_blocks() -> anyhow::Result<()> {
    init_tracing();
    let node = MockNode::with_chain(0, 4, 1);
    let abi = serde_json::from_str(BALANCE_OF_ABI)?;
    let history = EthHistory::builder(node, CONTRACT, abi).build()?;
    let recorder = BlockRecorder::new();
    let request = RecoveryRequest::new(0).to_block(4).include_receipts(true);

    let outcome = history.recover_blocks(request, recorder.clone()).await?;

    assert_eq!(recorder.block_numbers(), vec![0, 1, 2, 3, 4]);
    assert_eq!(outcome.completion, Completion::Done);

    Ok(())
}
