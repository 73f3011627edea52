pub mod entities;
pub mod enums;
pub mod schema;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support {
    use sea_orm::{ConnectOptions, Database, DatabaseConnection};

    use super::schema::ensure_schema;

    /// Fresh in-memory SQLite database with every table created.
    ///
    /// A single pooled connection keeps the in-memory database alive for the
    /// lifetime of the handle.
    pub async fn memory_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }
}
