/// Database model definitions.
pub mod models;
/// Client boundary to the external rating service.
pub mod rating_api;
/// Document store abstraction and its backends.
pub mod score_store;
/// Storage abstraction layer for database operations.
pub mod storage;
