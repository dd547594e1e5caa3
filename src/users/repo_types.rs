use serde::Deserialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string
    pub name: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub secondary_email: Option<String>,
    pub phone: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Optional profile columns, shared by create and update payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub secondary_email: Option<String>,
    pub phone: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub profile: Profile,
    pub role: Option<String>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub profile: Profile,
    pub role: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub role: Option<String>,
    pub permissions: Vec<String>,
}
