use thiserror::Error;

use crate::records::BindingKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("role {name} does not exist")]
    UnknownRole { name: String },

    #[error("role {role} references unknown parent {parent}")]
    UnknownParent { role: String, parent: String },

    #[error("permission {name} does not exist")]
    UnknownPermission { name: String },

    #[error("no {kind} binding for {identifier}")]
    UnknownBinding {
        kind: BindingKind,
        identifier: String,
    },

    #[error("role {role} is not bound to {kind} {identifier}")]
    RoleNotBound {
        role: String,
        kind: BindingKind,
        identifier: String,
    },

    #[error("role inheritance cycle: {}", path.join(" -> "))]
    RoleCycle { path: Vec<String> },

    #[error("unknown binding kind: {kind:?}")]
    InvalidBindingKind { kind: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unknown_role(name: impl Into<String>) -> Self {
        Self::UnknownRole { name: name.into() }
    }

    #[must_use]
    pub fn unknown_parent(role: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::UnknownParent {
            role: role.into(),
            parent: parent.into(),
        }
    }

    #[must_use]
    pub fn unknown_permission(name: impl Into<String>) -> Self {
        Self::UnknownPermission { name: name.into() }
    }

    #[must_use]
    pub fn unknown_binding(kind: BindingKind, identifier: impl Into<String>) -> Self {
        Self::UnknownBinding {
            kind,
            identifier: identifier.into(),
        }
    }
}

impl hal_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

hal_common::impl_context!();
