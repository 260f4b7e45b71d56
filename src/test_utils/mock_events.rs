use std::{
    ops::RangeInclusive,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    HistoryError,
    events::{
        EventBatchResult, EventCursor, EventPage, EventSource, EventTransaction,
        MalformedTransaction,
    },
    test_utils::MockNode,
};

#[derive(Debug, Clone)]
struct ScriptedPage {
    transactions: EventBatchResult,
    malformed: Vec<MalformedTransaction>,
}

/// An [`EventSource`] replaying a fixed list of pages, whatever the requested range.
#[derive(Debug, Clone, Default)]
pub struct MockEventSource {
    pages: Vec<ScriptedPage>,
    starts: Arc<Mutex<Vec<RangeInclusive<u64>>>>,
    next_calls: Arc<AtomicUsize>,
}

impl MockEventSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page carrying `transactions`.
    #[must_use]
    pub fn page(mut self, transactions: Vec<EventTransaction>) -> Self {
        self.pages.push(ScriptedPage { transactions: Ok(transactions), malformed: Vec::new() });
        self
    }

    /// Appends a page that failed with `error`.
    #[must_use]
    pub fn failed_page(mut self, error: HistoryError) -> Self {
        self.pages.push(ScriptedPage { transactions: Err(error), malformed: Vec::new() });
        self
    }

    /// Flags `malformed` on the last scripted page.
    #[must_use]
    pub fn malformed(mut self, malformed: Vec<MalformedTransaction>) -> Self {
        if let Some(page) = self.pages.last_mut() {
            page.malformed.extend(malformed);
        }
        self
    }

    /// An event transaction without decoded events, positioned like a [`MockNode`] transaction.
    #[must_use]
    pub fn transaction(block_number: u64, index: u64) -> EventTransaction {
        EventTransaction {
            hash: MockNode::tx_hash(block_number, index),
            block_number: Some(block_number),
            transaction_index: Some(index),
            events: Vec::new(),
        }
    }

    /// Ranges passed to [`EventSource::start`], in call order.
    #[must_use]
    pub fn starts(&self) -> Vec<RangeInclusive<u64>> {
        self.starts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn next_batch_calls(&self) -> usize {
        self.next_calls.load(Ordering::SeqCst)
    }
}

impl EventSource for MockEventSource {
    type Cursor = ScriptedCursor;

    async fn start(&self, range: RangeInclusive<u64>) -> EventPage<ScriptedCursor> {
        self.starts.lock().unwrap_or_else(PoisonError::into_inner).push(range);
        ScriptedCursor {
            pages: Arc::new(self.pages.clone()),
            index: 0,
            next_calls: Arc::clone(&self.next_calls),
        }
        .page()
    }
}

/// Cursor over the pages of a [`MockEventSource`].
#[derive(Debug)]
pub struct ScriptedCursor {
    pages: Arc<Vec<ScriptedPage>>,
    index: usize,
    next_calls: Arc<AtomicUsize>,
}

impl ScriptedCursor {
    fn page(self) -> EventPage<Self> {
        let Some(page) = self.pages.get(self.index).cloned() else {
            return EventPage::new(Ok(Vec::new()), None);
        };
        let next = (self.index + 1 < self.pages.len())
            .then(|| ScriptedCursor { index: self.index + 1, ..self });
        EventPage::new(page.transactions, next).with_malformed(page.malformed)
    }
}

impl EventCursor for ScriptedCursor {
    async fn next_batch(self) -> EventPage<Self> {
        self.next_calls.fetch_add(1, Ordering::SeqCst);
        self.page()
    }
}
