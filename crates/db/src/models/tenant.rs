//! Tenant and user rows. Owned by the (external) identity layer; the engine
//! only reads them for existence and membership checks.

use atelier_core::types::{DbId, Timestamp};
use serde::Deserialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Tenant {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    pub tenant_id: DbId,
    pub email: String,
    pub role: String,
    pub created_at: Timestamp,
}

/// DTO for seeding a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub tenant_id: DbId,
    pub email: String,
    pub role: String,
}
