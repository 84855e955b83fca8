//! Row structs.
//!
//! Each submodule contains a `FromRow` struct matching the database row and
//! its conversion into the `atelier-core` domain type. Domain types live in
//! core so both storage backends share them.

pub mod audit;
pub mod history;
pub mod project;
pub mod score;
pub mod tenant;

/// Map a stored enum string that fails to parse into a decode error.
pub(crate) fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}
