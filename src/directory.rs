//! `UserDirectory`: the narrow seam onto account/subscription state.
//!
//! Per the data model, ownership of user identity and plan lives with an
//! external billing/account collaborator. This module ships the one local
//! SQLite-backed implementation the standalone binary runs against; a
//! networked implementation would satisfy the same trait without touching
//! any caller.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::db::open_conn;
use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Blocked,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Blocked => "blocked",
        }
    }

    fn from_str(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            "blocked" => Role::Blocked,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Unknown plan strings coerce to `free` per the PolicyEngine's first rule.
    pub fn from_str(s: &str) -> Plan {
        match s {
            "pro" => Plan::Pro,
            "enterprise" => Plan::Enterprise,
            _ => Plan::Free,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub plan: Plan,
    #[serde(skip)]
    pub password_hash: Option<String>,
}

/// Account identity and subscription lookups. The core only ever calls
/// through this trait; it never touches the `users` table directly.
pub trait UserDirectory: Send + Sync {
    fn find_by_id(&self, user_id: &str) -> GatewayResult<Option<User>>;
    fn find_by_email(&self, email: &str) -> GatewayResult<Option<User>>;
    fn create(&self, name: &str, email: &str, password_hash: Option<&str>) -> GatewayResult<User>;
}

pub struct SqliteUserDirectory;

impl SqliteUserDirectory {
    pub fn new() -> Self {
        SqliteUserDirectory
    }
}

impl Default for SqliteUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    let plan: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: Role::from_str(&role),
        plan: Plan::from_str(&plan),
        password_hash: row.get(5)?,
    })
}

impl UserDirectory for SqliteUserDirectory {
    fn find_by_id(&self, user_id: &str) -> GatewayResult<Option<User>> {
        let conn = open_conn();
        conn.query_row(
            "select id, name, email, role, plan, password_hash from users where id = ?1",
            params![user_id],
            row_to_user,
        )
        .optional()
        .map_err(GatewayError::from)
    }

    fn find_by_email(&self, email: &str) -> GatewayResult<Option<User>> {
        let conn = open_conn();
        conn.query_row(
            "select id, name, email, role, plan, password_hash from users where email = ?1",
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(GatewayError::from)
    }

    fn create(&self, name: &str, email: &str, password_hash: Option<&str>) -> GatewayResult<User> {
        let conn = open_conn();
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "insert into users (id, name, email, password_hash, role, plan, created_at) values (?1, ?2, ?3, ?4, 'user', 'free', ?5)",
            params![id, name, email, password_hash, now],
        )?;
        Ok(User {
            id,
            name: name.to_string(),
            email: Some(email.to_string()),
            role: Role::User,
            plan: Plan::Free,
            password_hash: password_hash.map(|s| s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_unknown_coerces_to_free() {
        assert_eq!(Plan::from_str("bogus").as_str(), "free");
    }

    #[test]
    fn role_round_trips() {
        for role in [Role::User, Role::Admin, Role::Blocked] {
            assert_eq!(Role::from_str(role.as_str()), role);
        }
    }
}
