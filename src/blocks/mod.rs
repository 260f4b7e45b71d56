//! Block recovery: windowed concurrent fetches, receipt enrichment and ordered delivery.

mod fetcher;
mod receipts;
mod streamer;
mod window;

pub use fetcher::{BlockBatchFetcher, FetchedWindow};
pub use receipts::ReceiptEnricher;
pub use streamer::BlockStreamer;
