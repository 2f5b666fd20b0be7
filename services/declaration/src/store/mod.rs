//! Persistence modules: free async functions over a pool or transaction
//! with `FromRow` row structs mapped into the domain models. All queries
//! are runtime-checked; uniqueness constraints surface as conflicts.

pub mod catalog;
pub mod declarations;
pub mod events;
pub mod exports;
pub mod mappings;
pub mod source_records;
pub mod taxpayers;

/// Postgres unique-constraint violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
