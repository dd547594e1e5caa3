use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::storage::{StoreResult, UserStore};
use crate::users::repo_types::{NewUser, RoleAssignment, User, UserPatch};

const USER_COLUMNS: &str = "id, email, password_hash, name, firstname, lastname, \
     secondary_email, phone, locale, timezone, status, role, created_at";

/// `UserStore` backed by the `users`, `roles` and `role_permissions` tables.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, new_user: NewUser) -> StoreResult<User> {
        let p = new_user.profile;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, name, firstname, lastname,
                               secondary_email, phone, locale, timezone, status, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(p.name)
        .bind(p.firstname)
        .bind(p.lastname)
        .bind(p.secondary_email)
        .bind(p.phone)
        .bind(p.locale)
        .bind(p.timezone)
        .bind(p.status)
        .bind(new_user.role)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let p = patch.profile;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                email           = COALESCE($2, email),
                password_hash   = COALESCE($3, password_hash),
                name            = COALESCE($4, name),
                firstname       = COALESCE($5, firstname),
                lastname        = COALESCE($6, lastname),
                secondary_email = COALESCE($7, secondary_email),
                phone           = COALESCE($8, phone),
                locale          = COALESCE($9, locale),
                timezone        = COALESCE($10, timezone),
                status          = COALESCE($11, status),
                role            = COALESCE($12, role)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.email)
        .bind(patch.password_hash)
        .bind(p.name)
        .bind(p.firstname)
        .bind(p.lastname)
        .bind(p.secondary_email)
        .bind(p.phone)
        .bind(p.locale)
        .bind(p.timezone)
        .bind(p.status)
        .bind(patch.role)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn role_of(&self, id: Uuid) -> StoreResult<Option<RoleAssignment>> {
        let row = sqlx::query_as::<_, RoleAssignment>(
            r#"
            SELECT u.id AS user_id,
                   u.role,
                   COALESCE(
                       array_agg(rp.permission ORDER BY rp.permission)
                           FILTER (WHERE rp.permission IS NOT NULL),
                       '{}'
                   ) AS permissions
            FROM users u
            LEFT JOIN role_permissions rp ON rp.role = u.role
            WHERE u.id = $1
            GROUP BY u.id, u.role
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }
}
