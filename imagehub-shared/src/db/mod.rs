/// Database layer for ImageHub
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: embedded migration runner
///
/// Models are in the `models` module at crate root level.

pub mod migrations;
pub mod pool;
