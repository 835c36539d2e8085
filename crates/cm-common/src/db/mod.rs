pub mod migrations;
pub mod pool;
pub mod store;
pub mod util;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool_from_url, DbPoolError, PgPool};
pub use store::PgStore;
