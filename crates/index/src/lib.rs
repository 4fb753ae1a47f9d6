pub mod chunker;
pub mod filter;
pub mod indexer;
pub mod search;
pub mod task;

pub use chunker::Chunker;
pub use filter::{QueryPredicate, compile, haversine_km};
pub use indexer::{CancellationSource, CancellationToken, CollectionLocks, IndexJob};
pub use search::{Conversation, ScoredResult, SearchEngine, SearchRequest};
pub use task::{ProgressSink, RegistryProgressSink, TaskEvent, TaskRegistry};
