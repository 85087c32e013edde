//! Acting users and what they may do.
//!
//! Authentication happens outside this crate. By the time an [`Actor`]
//! reaches the registry its `user_id` and `role` are already trusted.

use serde::{Deserialize, Serialize};

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Registers and manages their own children.
    Parent,
    /// Daycare staff; takes attendance.
    Staff,
    /// Full access.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Staff => write!(f, "staff"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// An authenticated user acting on records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// External user id.
    pub user_id: String,
    /// Role granted by the auth service.
    pub role: Role,
}

impl Actor {
    /// Create an actor.
    #[must_use]
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Whether this actor may edit a child owned by `parent_id`.
    #[must_use]
    pub fn can_edit_child(&self, parent_id: &str) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Parent => self.user_id == parent_id,
            Role::Staff => false,
        }
    }

    /// Whether this actor may mark attendance.
    #[must_use]
    pub fn can_mark_attendance(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }
}
