use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Profile, RoleAssignment, User};

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub secondary_email: Option<String>,
    pub phone: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            firstname: u.firstname,
            lastname: u.lastname,
            secondary_email: u.secondary_email,
            phone: u.phone,
            locale: u.locale,
            timezone: u.timezone,
            status: u.status,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

/// Administrative create; unlike registration it may assign a role.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub user_id: Uuid,
    pub role: String,
    pub permissions: Vec<String>,
}

impl RoleResponse {
    /// `None` when the user has no role assigned.
    pub fn from_assignment(a: RoleAssignment) -> Option<Self> {
        Some(Self {
            user_id: a.user_id,
            role: a.role?,
            permissions: a.permissions,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: Uuid,
}
