//! Embedded SQLite storage for the session archive: schema management,
//! connection handling, transcript search, interaction logging, and
//! expired-session summarization.

pub mod connection;
pub mod interaction_logger;
pub mod schema;
pub mod sessions;
pub mod summarizer;
pub mod transcript_index;

pub use connection::ConnectionManager;
pub use interaction_logger::InteractionLogger;
pub use schema::{SchemaManager, SchemaStatus};
pub use sessions::{SessionDetail, SessionRepository};
pub use summarizer::{SummarizeReport, Summarizer};
pub use transcript_index::{SearchHit, TranscriptIndex};
