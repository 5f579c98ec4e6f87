pub mod client;
pub mod decoder;
pub mod dedup;
pub mod error;
pub mod metrics;

pub use client::IngestClient;
pub use decoder::{decode_frame, Discard, EventDecoder, P2pQuakeDecoder};
pub use dedup::{Deduplicator, DEFAULT_MAX_SEEN_IDS};
pub use error::IngestError;
