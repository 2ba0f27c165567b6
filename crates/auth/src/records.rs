//! Persisted RBAC records and the JSON snapshot used by dump/load.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Permission name that grants everything.
pub const WILDCARD_PERMISSION: &str = "*";

/// Binding identifier matching every user.
pub const ALL_USERS: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Permission {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A named set of permissions, inheriting everything its parents grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl Role {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            permissions: Vec::new(),
            parents: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// What a binding's identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "channel")]
    Channel,
    /// Applies to anyone who belongs to the channel named by the identifier.
    #[serde(rename = "memberOf")]
    MemberOf,
}

impl BindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Channel => "channel",
            Self::MemberOf => "memberOf",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "channel" => Ok(Self::Channel),
            "memberOf" | "memberof" => Ok(Self::MemberOf),
            other => Err(Error::InvalidBindingKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Grants `roles` to whatever `kind`/`identifier` designates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub kind: BindingKind,
    pub identifier: String,
    pub roles: Vec<String>,
}

impl RoleBinding {
    pub fn new<I, S>(kind: BindingKind, identifier: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            identifier: identifier.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this binding applies to the given actor.
    pub fn applies_to(&self, user: &str, channel: &str, member_of: &[String]) -> bool {
        match self.kind {
            BindingKind::User => self.identifier == user || self.identifier == ALL_USERS,
            BindingKind::Channel => self.identifier == channel,
            BindingKind::MemberOf => member_of.iter().any(|c| *c == self.identifier),
        }
    }
}

/// Full RBAC state as exchanged by dump and load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub bindings: Vec<RoleBinding>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.bindings.is_empty() && self.permissions.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(BindingKind::User, "U1", true)]
    #[case(BindingKind::User, "all", true)]
    #[case(BindingKind::User, "U2", false)]
    #[case(BindingKind::Channel, "C1", true)]
    #[case(BindingKind::Channel, "C2", false)]
    #[case(BindingKind::MemberOf, "G7", true)]
    #[case(BindingKind::MemberOf, "C1", false)]
    fn binding_applicability(
        #[case] kind: BindingKind,
        #[case] identifier: &str,
        #[case] expected: bool,
    ) {
        let binding = RoleBinding::new(kind, identifier, ["r"]);
        assert_eq!(
            binding.applies_to("U1", "C1", &["G7".to_string()]),
            expected
        );
    }

    #[test]
    fn binding_kind_serializes_like_the_chat_commands() {
        let json = serde_json::to_string(&BindingKind::MemberOf).unwrap();
        assert_eq!(json, "\"memberOf\"");
        assert_eq!("memberOf".parse::<BindingKind>().unwrap(), BindingKind::MemberOf);
        assert!("group".parse::<BindingKind>().is_err());
    }

    #[test]
    fn snapshot_tolerates_missing_sections() {
        let snap: Snapshot =
            serde_json::from_str(r#"{"permissions":[{"name":"deploy"}]}"#).unwrap();
        assert!(snap.roles.is_empty());
        assert_eq!(snap.permissions[0].name, "deploy");
        assert!(!snap.is_empty());
        assert!(Snapshot::default().is_empty());
    }
}
