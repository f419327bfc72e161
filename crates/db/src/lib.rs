pub mod models;
pub mod queries;
pub mod store;

pub use store::PgStore;

use sqlx::PgPool;

/// Applies the embedded schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
