//! Database access.
//!
//! - [`pool`]: the diesel/r2d2 PostgreSQL pool behind the live repositories

pub mod pool;

pub use pool::{PgExecutor, PoolSettings};
