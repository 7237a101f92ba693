use rocket_db_pools::{sqlx, Database};

/// Postgres pool backing [`PgRecordStore`](crate::store::PgRecordStore).
#[derive(Database)]
#[database("archive_db")]
pub struct ArchiveDb(sqlx::PgPool);
