pub mod connection;
pub mod error;
pub mod row;
pub mod rows;
pub mod schema;

pub use connection::Store;
pub use error::{Result, StoreError};
pub use row::{QueryMode, Row, ScoredRow};
pub use rows::cosine_distance;
pub use schema::{chunks_schema, collections_registry_schema, images_schema, messages_schema, schema_for_kind};
