//! Tile retrieval pipeline.
//!
//! Turns "this tile is needed" into "this tile is in the local cache, or is
//! known to be unavailable".
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        RetrievalService                          │
//! │                                                                  │
//! │  submit ──► ┌──────────────┐                                     │
//! │             │ RequestQueue │  priority order, dedup by tile,     │
//! │             └──────┬───────┘  bounded                            │
//! │                    ▼                                             │
//! │             ┌──────────────┐                                     │
//! │             │ worker pool  │  fixed size, idle when empty        │
//! │             └──────┬───────┘                                     │
//! │                    ▼                                             │
//! │             ┌──────────────┐  cache check, absent gate, fetch,   │
//! │             │ TileFetcher  │  classify, transcode, write         │
//! │             └──────┬───────┘                                     │
//! │                    ▼                                             │
//! │             RetrievalEvent ──► subscribers                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`BulkRetriever`] reuses [`TileFetcher`] to make whole regions local.
//!
//! # Failure handling
//!
//! | Failure                          | Tile marked absent | Logged at |
//! |----------------------------------|--------------------|-----------|
//! | 204 / non-2xx / error payload    | yes                | warn      |
//! | timeout, connection error        | yes                | warn      |
//! | unsupported protocol             | yes                | error     |
//! | transcoding or cache write error | no                 | error     |
//! | cancellation                     | no                 | debug     |

mod bulk;
mod classify;
mod events;
mod fetcher;
mod queue;
mod service;

pub use bulk::{
    BulkEstimate, BulkProgress, BulkRetriever, BulkSummary, DEFAULT_BULK_CONCURRENCY,
};
pub use classify::{classify, AbsentReason, Classification, MAX_PAYLOAD_EXCERPT};
pub use events::{RetrievalEvent, DEFAULT_EVENT_CAPACITY};
pub use fetcher::{RetrievalError, RetrievalOutcome, SkipReason, TileFetcher};
pub use queue::{RequestKey, RequestQueue, SubmitResult, DEFAULT_QUEUE_CAPACITY};
pub use service::{RetrievalConfig, RetrievalService, TileRequest, DEFAULT_POOL_SIZE};
