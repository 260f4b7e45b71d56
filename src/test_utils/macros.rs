use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::types::BlockResult;

/// Waits at most `timeout_secs` for the next item of `stream`.
///
/// # Panics
///
/// Panics when the timeout elapses first.
pub async fn next_within<S: Stream + Unpin>(stream: &mut S, timeout_secs: u64) -> Option<S::Item> {
    tokio::time::timeout(Duration::from_secs(timeout_secs), stream.next())
        .await
        .unwrap_or_else(|_| panic!("timed out after {timeout_secs}s waiting for the next item"))
}

/// Asserts the next item of a block stream.
///
/// `Err(expected)` matches any error of the same [`HistoryError`](crate::HistoryError) variant;
/// any other expectation is compared against the delivered block's number.
#[macro_export]
macro_rules! assert_next {
    ($stream: expr, Err($expected_err:expr)) => {
        $crate::assert_next!($stream, Err($expected_err), timeout = 5)
    };
    ($stream: expr, Err($expected_err:expr), timeout = $secs: expr) => {
        let message = $crate::test_utils::macros::next_within(&mut $stream, $secs).await;
        if let Some(msg) = message {
            let expected = &$expected_err;
            assert!(&msg == expected, "Expected error {:?}, got {:?}", expected, msg);
        } else {
            panic!("Expected error {:?}, but channel was closed", $expected_err);
        }
    };

    ($stream: expr, $expected: expr) => {
        $crate::assert_next!($stream, $expected, timeout = 5)
    };
    ($stream: expr, $expected: expr, timeout = $secs: expr) => {
        let message = $crate::test_utils::macros::next_within(&mut $stream, $secs).await;
        let expected: u64 = $expected;
        match message {
            std::option::Option::Some(std::result::Result::Ok(block)) => {
                assert_eq!(block.number, expected, "Expected block {expected}, got {}", block.number);
            }
            std::option::Option::Some(std::result::Result::Err(e)) => {
                panic!("Expected block {:?}, got Err({:?})", expected, e);
            }
            std::option::Option::None => {
                panic!("Expected block {:?}, but channel was closed", expected);
            }
        }
    };
}

#[macro_export]
macro_rules! assert_closed {
    ($stream: expr) => {
        $crate::assert_closed!($stream, timeout = 5)
    };
    ($stream: expr, timeout = $secs: expr) => {
        let message = $crate::test_utils::macros::next_within(&mut $stream, $secs).await;
        assert!(message.is_none(), "Expected closed stream, got {:?}", message)
    };
}

/// Asserts that a block stream delivers exactly the given block numbers, in order, before it
/// closes. Errors in between fail the assertion.
///
/// # Examples
///
/// ```ignore
/// let (sender, receiver) = tokio::sync::mpsc::channel(16);
/// history.recover_blocks(RecoveryRequest::new(100).to_block(102), sender).await?;
/// let mut stream = tokio_stream::wrappers::ReceiverStream::new(receiver);
///
/// assert_block_sequence!(stream, [100, 101, 102]);
/// ```
#[macro_export]
macro_rules! assert_block_sequence {
    ($stream: expr, [$($number:expr),+ $(,)?]) => {
        $crate::assert_block_sequence!($stream, [$($number),+], timeout = 5)
    };
    ($stream: expr, [$($number:expr),+ $(,)?], timeout = $secs: expr) => {
        $crate::test_utils::macros::assert_block_sequence(&mut $stream, &[$($number),+], $secs)
            .await
    };
    ($stream: expr, $numbers: expr) => {
        $crate::assert_block_sequence!($stream, $numbers, timeout = 5)
    };
    ($stream: expr, $numbers: expr, timeout = $secs: expr) => {
        $crate::test_utils::macros::assert_block_sequence(&mut $stream, &$numbers, $secs).await
    };
}

/// # Panics
///
/// Panics on a timeout, an error item, a block out of sequence, a premature close, or an extra
/// item after the sequence.
pub async fn assert_block_sequence<S: Stream<Item = BlockResult> + Unpin>(
    stream: &mut S,
    expected: &[u64],
    timeout_secs: u64,
) {
    let mut remaining = expected.iter();

    while let Some(&number) = remaining.next() {
        match next_within(stream, timeout_secs).await {
            Some(Ok(block)) => assert_eq!(
                block.number,
                number,
                "\nRemaining: {:?}\n",
                remaining.clone().collect::<Vec<_>>()
            ),
            Some(Err(e)) => panic!("Expected block {number}, got Err: {e:#?}"),
            None => panic!(
                "Stream closed while still expecting: {:?}",
                std::iter::once(&number).chain(remaining).collect::<Vec<_>>()
            ),
        }
    }

    if let Some(extra) = next_within(stream, timeout_secs).await {
        panic!("Received more items than expected: {extra:#?}");
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    use crate::{Block, BlockResult, HistoryError};

    fn block(number: u64) -> BlockResult {
        Ok(Block { number, ..Default::default() })
    }

    #[tokio::test]
    async fn sequence_accepts_exact_delivery() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = ReceiverStream::new(rx);
        for number in [7, 8, 9] {
            tx.send(block(number)).await.unwrap();
        }
        drop(tx);

        assert_block_sequence!(stream, [7, 8, 9]);
    }

    #[tokio::test]
    async fn next_matches_errors_by_variant() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = ReceiverStream::new(rx);
        tx.send(Err(HistoryError::Timeout)).await.unwrap();
        tx.send(block(1)).await.unwrap();
        drop(tx);

        assert_next!(stream, Err(HistoryError::Timeout));
        assert_next!(stream, 1);
        assert_closed!(stream);
    }

    #[tokio::test]
    #[should_panic = "Stream closed while still expecting: [2]"]
    async fn sequence_panics_on_early_close() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = ReceiverStream::new(rx);
        tx.send(block(1)).await.unwrap();
        drop(tx);

        assert_block_sequence!(stream, [1, 2]);
    }
}
