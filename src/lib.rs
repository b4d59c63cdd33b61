//! photoroll: Ingest camera photos and videos into a date-organized
//! archive, idempotently and without ever overwriting on filename
//! collisions.

pub mod cache;
pub mod compare;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod pattern;
pub mod placement;
pub mod report;
pub mod scanner;
pub mod types;
