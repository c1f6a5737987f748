//! User repository for database operations.
//!
//! Queries are built at runtime with `sqlx::query` and bound parameters.
//! Every write is a single-row `UPDATE`, so each call is atomic.

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

use plantwatch_core::{
    ChatId, ConfigUpdate, Email, Plan, PlanExtension, StoreError, User, UserConfig, UserId,
    UserStore,
};

use super::RepositoryError;

const USER_COLUMNS: &str = "id, email, password, real_name, expiry_date, linked_chat_id, \
                            plan, wishlist, auto_checkout";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    password: String,
    real_name: String,
    expiry_date: Option<NaiveDate>,
    linked_chat_id: Option<i64>,
    plan: String,
    wishlist: String,
    auto_checkout: bool,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let plan = row.plan.parse::<Plan>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid plan for {email}: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            password: SecretString::from(row.password),
            real_name: row.real_name,
            expiry_date: row.expiry_date,
            linked_chat_id: row.linked_chat_id.map(ChatId::new),
            config: UserConfig {
                plan,
                wishlist: row.wishlist,
                auto_checkout: row.auto_checkout,
            },
        })
    }
}

fn decode_rows(rows: Vec<UserRow>) -> Vec<User> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            User::try_from(row)
                .inspect_err(|e| tracing::warn!(user_id = id, error = %e, "Skipping undecodable user row"))
                .ok()
        })
        .collect()
}

/// Fields for a new user record.
pub struct NewUser {
    pub email: Email,
    pub real_name: String,
    pub password: SecretString,
    pub expiry_date: Option<NaiveDate>,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all users in storage order (by id).
    ///
    /// Rows that cannot be decoded are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
                .fetch_all(self.pool)
                .await?;

        Ok(decode_rows(rows))
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the row cannot be decoded.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email.as_str())
                .fetch_optional(self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let result: Result<UserRow, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO users (email, password, real_name, expiry_date) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(user.email.as_str())
        .bind(user.password.expose_secret())
        .bind(&user.real_name)
        .bind(user.expiry_date)
        .fetch_one(self.pool)
        .await;

        match result {
            Ok(row) => User::try_from(row),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                RepositoryError::Conflict(format!("user already exists: {}", user.email)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Update one user-editable field.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn update_config(
        &self,
        id: UserId,
        update: &ConfigUpdate,
    ) -> Result<bool, RepositoryError> {
        let query = match update {
            ConfigUpdate::Plan(plan) => {
                sqlx::query("UPDATE users SET plan = $2, updated_at = NOW() WHERE id = $1")
                    .bind(id)
                    .bind(plan.as_str())
            }
            ConfigUpdate::Wishlist(wishlist) => {
                sqlx::query("UPDATE users SET wishlist = $2, updated_at = NOW() WHERE id = $1")
                    .bind(id)
                    .bind(wishlist.as_str())
            }
            ConfigUpdate::AutoCheckout(enabled) => {
                sqlx::query("UPDATE users SET auto_checkout = $2, updated_at = NOW() WHERE id = $1")
                    .bind(id)
                    .bind(*enabled)
            }
        };

        let result = query.execute(self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    /// Set the service expiry date.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn update_expiry_date(
        &self,
        id: UserId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE users SET expiry_date = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(date)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Link or unlink a chat.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn update_linked_chat(
        &self,
        id: UserId,
        chat_id: Option<ChatId>,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE users SET linked_chat_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(chat_id.map(|c| c.get()))
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Apply a paid plan extension in one statement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn apply_plan_extension(
        &self,
        id: UserId,
        extension: &PlanExtension,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users \
             SET plan = $2, expiry_date = $3, \
                 auto_checkout = COALESCE($4, auto_checkout), \
                 wishlist = COALESCE($5, wishlist), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(extension.plan.as_str())
        .bind(extension.expiry_date)
        .bind(extension.auto_checkout)
        .bind(extension.wishlist.as_deref())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// [`UserStore`] backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn repo(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.repo().list().await?)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        Ok(self.repo().get_by_email(email).await?)
    }

    async fn set_config_field(&self, id: UserId, update: ConfigUpdate) -> Result<bool, StoreError> {
        Ok(self.repo().update_config(id, &update).await?)
    }

    async fn set_expiry_date(&self, id: UserId, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(self.repo().update_expiry_date(id, date).await?)
    }

    async fn set_linked_chat(&self, id: UserId, chat_id: Option<ChatId>) -> Result<bool, StoreError> {
        Ok(self.repo().update_linked_chat(id, chat_id).await?)
    }

    async fn apply_plan_extension(
        &self,
        id: UserId,
        extension: &PlanExtension,
    ) -> Result<bool, StoreError> {
        Ok(self.repo().apply_plan_extension(id, extension).await?)
    }
}
