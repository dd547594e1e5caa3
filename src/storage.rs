use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, RoleAssignment, User, UserPatch};

#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint (email) rejected the write.
    #[error("duplicate key")]
    UniqueViolation,

    /// Any other constraint or value the database refused.
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum Integrity {
    Unique,
    Constraint,
}

/// SQLSTATE class 23 is "integrity constraint violation"; 23505 is unique.
fn integrity_violation(code: Option<&str>) -> Option<Integrity> {
    match code {
        Some("23505") => Some(Integrity::Unique),
        Some(c) if c.starts_with("23") => Some(Integrity::Constraint),
        _ => None,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            match integrity_violation(db.code().as_deref()) {
                Some(Integrity::Unique) => return StoreError::UniqueViolation,
                Some(Integrity::Constraint) => {
                    return StoreError::Rejected(db.message().to_string())
                }
                None => {}
            }
        }
        StoreError::Other(e.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Credential store used by the handlers.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn insert(&self, new_user: NewUser) -> StoreResult<User>;
    async fn list(&self) -> StoreResult<Vec<User>>;
    /// Returns `None` when no user has this id.
    async fn update(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>>;
    /// Returns `false` when no user has this id.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
    /// Role and permissions of a user, `None` when the user does not exist.
    async fn role_of(&self, id: Uuid) -> StoreResult<Option<RoleAssignment>>;
}
