//! Table and index definitions. Idempotent: safe to run on every startup.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;

use huddle_chat::RepositoryError;

/// Declare the three tables and their indexes.
///
/// Notable absence: there is no unique index on `direct_key`. Direct rooms
/// use the canonical pair key as their record key, so the second insert for
/// a pair fails on the record itself; a unique index over an optional field
/// would also collide on the rooms that legitimately have none.
pub async fn define(db: &Surreal<Any>) -> Result<(), RepositoryError> {
    const STATEMENTS: &str = "
        DEFINE TABLE IF NOT EXISTS room SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS room_room_id ON TABLE room COLUMNS room_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS participant SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS participant_room ON TABLE participant COLUMNS room_id;
        DEFINE INDEX IF NOT EXISTS participant_user ON TABLE participant COLUMNS user_id;

        DEFINE TABLE IF NOT EXISTS message SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS message_room_created ON TABLE message COLUMNS room_id, created_at;
    ";

    db.query(STATEMENTS)
        .await
        .map_err(|e| RepositoryError::backend(e.to_string(), "schema.define"))?;
    Ok(())
}
