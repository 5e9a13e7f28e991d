//! Users
//!
//! ```rust
//! use docrepo::domain::{NewUser, UserRepository, UserStatus};
//! use docrepo::repository::SessionOptions;
//! use docrepo::repository::WriteRepository;
//! use docrepo::store::MemoryStore;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let users = UserRepository::new(&UserRepository::model(MemoryStore::new("accounts")));
//! let ada = users
//!     .create(NewUser::new("Ada@Example.com", "Ada"), SessionOptions::new())
//!     .await
//!     .unwrap();
//! assert_eq!(ada.email, "ada@example.com");
//! assert_eq!(ada.status, UserStatus::Active);
//! # });
//! ```

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::doc;
use crate::model::Model;
use crate::repository::{
    Hooks, QueryOptions, ReadRepository, Repository, RepositoryFactory, RepositoryResult,
    SessionOptions, WriteRepository,
};
use crate::schema::{FieldRule, Schema};
use crate::store::DocumentStore;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// A stored user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Input for creating a user
///
/// A missing status becomes [`UserStatus::Active`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub role: UserRole,
}

impl NewUser {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            status: None,
            role: UserRole::User,
        }
    }

    #[must_use]
    pub fn role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }
}

fn user_schema() -> Schema {
    Schema::new()
        .field("email", FieldRule::string().required().max_length(255))
        .field("name", FieldRule::string().required().max_length(100))
        .field(
            "status",
            FieldRule::string().one_of(["active", "inactive", "suspended"]),
        )
        .field(
            "role",
            FieldRule::string()
                .one_of(["user", "admin"])
                .default_value("user"),
        )
}

fn user_hooks() -> Hooks<User> {
    Hooks::new()
        .before_create(|mut document| async move {
            if let Some(Value::String(email)) = document.get_mut("email") {
                *email = email.trim().to_lowercase();
            }
            let status = document
                .entry("status".to_string())
                .or_insert(Value::Null);
            if status.is_null() {
                *status = Value::from(UserStatus::Active.to_string());
            }
            Ok(document)
        })
        .after_create(|user: User| async move {
            info!(
                id = user.id.as_deref().unwrap_or_default(),
                email = %user.email,
                "User created"
            );
            Ok(user)
        })
}

/// Full repository of [`User`] with e-mail normalisation and named queries
///
/// Derefs to [`Repository<User, S>`], so every generic operation is available.
pub struct UserRepository<S> {
    inner: Repository<User, S>,
}

impl<S> Clone for UserRepository<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> fmt::Debug for UserRepository<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRepository")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<S: DocumentStore> UserRepository<S> {
    /// Model for the `users` collection with timestamps and validation
    pub fn model(store: S) -> Model<S> {
        Model::builder("User", store)
            .schema(user_schema())
            .timestamps(true)
            .build()
    }

    pub fn new(model: &Model<S>) -> Self {
        Self {
            inner: RepositoryFactory::create_full_with_hooks(model, user_hooks()),
        }
    }

    pub async fn find_active_users(&self) -> RepositoryResult<Vec<User>> {
        self.inner
            .find_many(doc! { "status": UserStatus::Active }, QueryOptions::new())
            .await
    }

    /// Look up by e-mail, case-insensitively
    pub async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.inner
            .find_one(
                doc! { "email": email.trim().to_lowercase() },
                QueryOptions::new(),
            )
            .await
    }

    /// Active administrators
    pub async fn find_admins(&self) -> RepositoryResult<Vec<User>> {
        self.inner
            .find_many(
                doc! { "role": UserRole::Admin, "status": UserStatus::Active },
                QueryOptions::new(),
            )
            .await
    }

    pub async fn suspend_user(&self, id: &str) -> RepositoryResult<Option<User>> {
        self.inner
            .update_by_id(
                id,
                doc! { "status": UserStatus::Suspended },
                SessionOptions::new(),
            )
            .await
    }
}

impl<S> Deref for UserRepository<S> {
    type Target = Repository<User, S>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{DeleteRepository, RepositoryErrorKind};
    use crate::store::MemoryStore;

    fn users() -> UserRepository<MemoryStore> {
        UserRepository::new(&UserRepository::model(MemoryStore::new("accounts")))
    }

    #[tokio::test]
    async fn test_create_normalises_email_and_status() {
        let repo = users();
        let user = repo
            .create(
                doc! { "email": "  Grace@Navy.MIL ", "name": "Grace" },
                SessionOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(user.email, "grace@navy.mil");
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.role, UserRole::User);
        assert!(user.created_at.is_some());
    }

    #[tokio::test]
    async fn test_explicit_status_is_kept() {
        let repo = users();
        let user = repo
            .create(
                NewUser::new("a@b.c", "A").status(UserStatus::Inactive),
                SessionOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Inactive);
    }

    #[tokio::test]
    async fn test_named_queries() {
        let repo = users();
        repo.create_many(
            vec![
                NewUser::new("ada@x.io", "Ada").role(UserRole::Admin).status(UserStatus::Active),
                NewUser::new("bob@x.io", "Bob").status(UserStatus::Active),
                NewUser::new("eve@x.io", "Eve")
                    .role(UserRole::Admin)
                    .status(UserStatus::Inactive),
            ],
            SessionOptions::new(),
        )
        .await
        .unwrap();

        let active: Vec<_> = repo
            .find_active_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(active, ["Ada", "Bob"]);

        let admins = repo.find_admins().await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].name, "Ada");

        let bob = repo.find_by_email("BOB@x.io").await.unwrap().unwrap();
        assert_eq!(bob.name, "Bob");
        assert!(repo.find_by_email("nobody@x.io").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_suspend_user() {
        let repo = users();
        let user = repo
            .create(NewUser::new("c@d.e", "C"), SessionOptions::new())
            .await
            .unwrap();
        let id = user.id.clone().unwrap_or_default();

        let suspended = repo.suspend_user(&id).await.unwrap().unwrap();
        assert_eq!(suspended.status, UserStatus::Suspended);
        assert!(repo.find_active_users().await.unwrap().is_empty());
        assert!(repo.suspend_user("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_debug_and_clone_over_memory_store() {
        let repo = users();
        let copy = repo.clone();
        let rendered = format!("{copy:?}");
        assert!(rendered.starts_with("UserRepository"));
        assert!(rendered.contains("User"));
    }

    #[tokio::test]
    async fn test_generic_operations_through_deref() {
        let repo = users();
        let err = repo
            .create(doc! { "email": "x@y.z" }, SessionOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.field_errors[0].field, "name");

        let user = repo
            .create(NewUser::new("x@y.z", "X"), SessionOptions::new())
            .await
            .unwrap();
        let removed = repo
            .delete_by_id(user.id.as_deref().unwrap_or_default(), SessionOptions::new())
            .await
            .unwrap();
        assert_eq!(removed.map(|u| u.email), Some("x@y.z".to_string()));
    }
}
