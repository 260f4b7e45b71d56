use std::{collections::HashMap, ops::RangeInclusive, sync::Arc};

use alloy::{
    dyn_abi::{DynSolEvent, Specifier},
    json_abi::JsonAbi,
    primitives::{Address, B256, TxHash},
    rpc::types::Log,
};
use tracing::{Instrument, Span};

use crate::{
    NodeClient, RetryExecutor, ValidationError,
    events::{
        DEFAULT_EVENT_PAGE_SIZE, DecodedLogEvent, EventCursor, EventPage, EventSource,
        EventTransaction, MalformedTransaction,
    },
};

/// The default event-sync collaborator: pages `eth_getLogs` for one contract and decodes every
/// log against the contract ABI.
///
/// Each page covers at most `page_size` blocks. Logs are grouped by transaction in the order the
/// node returned them; a transaction with any log that cannot be decoded is reported as
/// malformed instead.
#[derive(Debug)]
pub struct LogEventSync<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for LogEventSync<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

#[derive(Debug)]
struct Inner<C> {
    client: Arc<C>,
    address: Address,
    decoder: EventDecoder,
    retry: RetryExecutor,
    page_size: u64,
    span: Span,
}

impl<C: NodeClient> LogEventSync<C> {
    /// Fails with [`ValidationError::EmptyAbi`] when the ABI has no items at all and with
    /// [`ValidationError::InvalidPageSize`] when `page_size` is 0. An ABI without events is
    /// accepted; every log it sees is then reported as malformed.
    pub fn new(
        client: Arc<C>,
        address: Address,
        abi: &JsonAbi,
        retry: RetryExecutor,
        page_size: u64,
        span: Span,
    ) -> Result<Self, ValidationError> {
        if page_size == 0 {
            return Err(ValidationError::InvalidPageSize);
        }
        let decoder = EventDecoder::new(abi)?;
        Ok(Self { inner: Arc::new(Inner { client, address, decoder, retry, page_size, span }) })
    }

    /// Same as [`LogEventSync::new`] with [`DEFAULT_EVENT_PAGE_SIZE`].
    pub fn with_default_page_size(
        client: Arc<C>,
        address: Address,
        abi: &JsonAbi,
        retry: RetryExecutor,
        span: Span,
    ) -> Result<Self, ValidationError> {
        Self::new(client, address, abi, retry, DEFAULT_EVENT_PAGE_SIZE, span)
    }
}

impl<C: NodeClient> EventSource for LogEventSync<C> {
    type Cursor = LogCursor<C>;

    async fn start(&self, range: RangeInclusive<u64>) -> EventPage<LogCursor<C>> {
        LogCursor { inner: Arc::clone(&self.inner), next_from: *range.start(), to: *range.end() }
            .next_batch()
            .await
    }
}

/// Position of a [`LogEventSync`] within its range.
#[derive(Debug)]
pub struct LogCursor<C> {
    inner: Arc<Inner<C>>,
    next_from: u64,
    to: u64,
}

impl<C: NodeClient> EventCursor for LogCursor<C> {
    async fn next_batch(self) -> EventPage<Self> {
        let span = self.inner.span.clone();
        self.fetch().instrument(span).await
    }
}

impl<C: NodeClient> LogCursor<C> {
    async fn fetch(self) -> EventPage<Self> {
        let Self { inner, next_from: from, to } = self;
        if from > to {
            return EventPage::new(Ok(Vec::new()), None);
        }

        let page_end = from.saturating_add(inner.page_size - 1).min(to);
        debug!(from_block = from, to_block = page_end, "Fetching event logs");

        let client: &C = &inner.client;
        let address = inner.address;
        let logs = inner
            .retry
            .execute("eth_getLogs", || {
                let pending = client.get_logs(address, from..=page_end);
                async move { pending.await.map(Some) }
            })
            .await;

        let (transactions, malformed) = match logs {
            Ok(logs) => {
                let (transactions, malformed) = inner.decoder.group(logs);
                (Ok(transactions), malformed)
            }
            Err(err) => {
                error!(
                    from_block = from,
                    to_block = page_end,
                    error = %err,
                    "Problem fetching event logs"
                );
                (Err(err), Vec::new())
            }
        };

        let next = (page_end < to).then(|| LogCursor {
            inner: Arc::clone(&inner),
            next_from: page_end + 1,
            to,
        });

        EventPage::new(transactions, next).with_malformed(malformed)
    }
}

/// Decoders keyed by `(topic0, number of topics)`, so overloaded events resolve correctly.
#[derive(Debug)]
struct EventDecoder {
    events: HashMap<(B256, usize), (String, DynSolEvent)>,
}

impl EventDecoder {
    fn new(abi: &JsonAbi) -> Result<Self, ValidationError> {
        let mut events = HashMap::new();
        for event in abi.events().filter(|event| !event.anonymous) {
            match event.resolve() {
                Ok(resolved) => {
                    events.insert(
                        (event.selector(), event.num_topics()),
                        (event.name.clone(), resolved),
                    );
                }
                Err(err) => {
                    warn!(event = %event.name, error = %err, "Skipping unresolvable ABI event");
                }
            }
        }
        if abi.is_empty() {
            return Err(ValidationError::EmptyAbi);
        }
        if events.is_empty() {
            warn!("Contract ABI declares no decodable events");
        }
        Ok(Self { events })
    }

    fn decode(&self, log: &Log) -> Result<DecodedLogEvent, String> {
        let topics = log.topics();
        let selector = topics.first().ok_or_else(|| "log has no topics".to_owned())?;
        let (name, event) = self
            .events
            .get(&(*selector, topics.len()))
            .ok_or_else(|| format!("no ABI event matches topic {selector}"))?;
        let decoded = event
            .decode_log_parts(topics.iter().copied(), &log.data().data)
            .map_err(|err| format!("failed to decode {name}: {err}"))?;

        Ok(DecodedLogEvent {
            name: name.clone(),
            indexed: decoded.indexed,
            body: decoded.body,
            log: log.clone(),
        })
    }

    /// Groups `logs` by transaction, keeping the node's ordering.
    fn group(&self, logs: Vec<Log>) -> (Vec<EventTransaction>, Vec<MalformedTransaction>) {
        let mut groups: Vec<(Option<TxHash>, Vec<Log>)> = Vec::new();
        let mut positions: HashMap<TxHash, usize> = HashMap::new();
        for log in logs {
            match log.transaction_hash {
                Some(hash) => match positions.get(&hash) {
                    Some(&position) => groups[position].1.push(log),
                    None => {
                        positions.insert(hash, groups.len());
                        groups.push((Some(hash), vec![log]));
                    }
                },
                None => groups.push((None, vec![log])),
            }
        }

        let mut transactions = Vec::new();
        let mut malformed = Vec::new();
        for (hash, logs) in groups {
            let block_number = logs.first().and_then(|log| log.block_number);
            let Some(hash) = hash else {
                malformed.push(MalformedTransaction {
                    hash: None,
                    block_number,
                    logs,
                    reason: "log has no transaction hash".to_owned(),
                });
                continue;
            };

            match logs.iter().map(|log| self.decode(log)).collect::<Result<Vec<_>, _>>() {
                Ok(events) => transactions.push(EventTransaction {
                    hash,
                    block_number,
                    transaction_index: logs.first().and_then(|log| log.transaction_index),
                    events,
                }),
                Err(reason) => {
                    debug!(tx_hash = %hash, reason = %reason, "Undecodable event transaction");
                    malformed.push(MalformedTransaction {
                        hash: Some(hash),
                        block_number,
                        logs,
                        reason,
                    });
                }
            }
        }
        (transactions, malformed)
    }
}
