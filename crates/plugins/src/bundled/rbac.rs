//! `rbac`: chat surface for managing roles, permissions and bindings.
//!
//! The dispatcher already checks the `rbac` permission before invoking this
//! plugin, so subcommands only validate their own syntax. The authorizer is
//! looked up in the service registry under [`RBAC_SERVICE`].

use std::{fmt::Write as _, sync::Arc};

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD},
    hal_auth::{ALL_USERS, Authorizer, BindingKind, Error, Snapshot, WILDCARD_PERMISSION},
    hal_common::types::InboundMessage,
    tracing::warn,
};

use crate::{
    plugin::{Plugin, PluginContext, PluginDescriptor, Trigger, command_args},
    services::RBAC_SERVICE,
};

const USAGE: &str = "\
*RBAC management*

RBAC is open until the first binding exists. Start with *rbac behave*: it gives you \
the rbac role, which carries the rbac permission.

- *rbac list*: show roles, permissions and bindings
- *rbac add-role <name> <description> withParent:<parent1>,<parent2>*: add a role, parents optional
- *rbac del-role <name>*: delete a role
- *rbac add-permission <name> <description>*: add a permission
- *rbac del-permission <name>*: delete a permission
- *rbac attach-permission <p1,p2> to <role1,role2>*: grant permissions to roles
- *rbac detach-permission <p1,p2> from <role1,role2>*: revoke permissions from roles
- *rbac bind <kind> <value> to <role1,role2>*: bind an identity to roles
- *rbac unbind <kind> <value> from <role1,role2>*: unbind an identity from roles
- *rbac dump*: export everything as a base64 blob
- *rbac load <blob>*: merge a blob produced by dump

<kind> is one of user, channel or memberOf. <value> is a mention, a channel \
reference, a raw id, or `all` (user kind only).

A permission is a command trigger name, for instance *echo*. The permission *\\** \
grants everything.";

const RBAC_PERMISSION: &str = "rbac";

pub struct RbacPlugin;

#[async_trait]
impl Plugin for RbacPlugin {
    fn metadata(&self) -> PluginDescriptor {
        PluginDescriptor::new("rbac", "Role-based access control management").with_active(
            Trigger::new("rbac", "Manage roles, permissions and bindings")
                .with_long_description(USAGE),
        )
    }

    async fn process_message(
        &self,
        trigger: &str,
        message: &InboundMessage,
        ctx: &PluginContext,
    ) -> anyhow::Result<bool> {
        let args = command_args(&message.text, trigger);
        let reply = match ctx.services.get::<Authorizer>(RBAC_SERVICE) {
            Some(authz) => run(&authz, args, &message.user_id).await,
            None => "RBAC is not available.".to_string(),
        };
        ctx.outbound.reply(&message.channel_id, reply).await?;
        Ok(true)
    }
}

/// Execute one subcommand line and return the reply text.
pub async fn run(authz: &Arc<Authorizer>, line: &str, caller: &str) -> String {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command.to_ascii_lowercase().as_str() {
        "" | "help" => USAGE.to_string(),
        "list" => list(authz).await,
        "add-role" => add_role(authz, rest).await,
        "del-role" => {
            if rest.is_empty() {
                return "Please provide a role name.".into();
            }
            match authz.remove_role(rest).await {
                Ok(()) => format!("Role {rest} has been removed."),
                Err(e) => e.to_string(),
            }
        },
        "add-permission" => {
            let Some((name, description)) = rest.split_once(char::is_whitespace) else {
                return invalid_syntax();
            };
            match authz.add_permission(name, description.trim()).await {
                Ok(()) => format!("Permission {name} created."),
                Err(e) => e.to_string(),
            }
        },
        "del-permission" => {
            if rest.is_empty() {
                return "Please provide a permission name.".into();
            }
            match authz.remove_permission(rest).await {
                Ok(()) => format!("Permission {rest} has been removed."),
                Err(e) => e.to_string(),
            }
        },
        "attach-permission" => attach(authz, rest, true).await,
        "detach-permission" | "dettach-permission" => attach(authz, rest, false).await,
        "bind" => bind(authz, rest, true).await,
        "unbind" => bind(authz, rest, false).await,
        "dump" => match authz.dump().await {
            Ok(Some(raw)) => STANDARD.encode(raw),
            Ok(None) => "Nothing to dump yet.".into(),
            Err(e) => format!("Failed to dump current data: {e}"),
        },
        "load" => load(authz, rest).await,
        "behave" => behave(authz, caller).await,
        other => format!("Unknown rbac command `{other}`. Try `rbac help`."),
    }
}

fn invalid_syntax() -> String {
    "Invalid syntax. Try `rbac help`.".into()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Reduce a chat reference to its id: `<@U123|bob>` gives `U123`,
/// `<#C123|general>` gives `C123`. Anything else is returned trimmed.
pub fn reference_id(raw: &str) -> &str {
    let raw = raw.trim();
    let Some(inner) = raw.strip_prefix('<').and_then(|r| r.strip_suffix('>')) else {
        return raw;
    };
    let inner = inner
        .strip_prefix('@')
        .or_else(|| inner.strip_prefix('#'))
        .unwrap_or(inner);
    inner.split('|').next().unwrap_or(inner)
}

async fn add_role(authz: &Authorizer, rest: &str) -> String {
    let (head, parents) = match rest.split_once("withParent:") {
        Some((head, parents)) => (head.trim(), split_list(parents)),
        None => (rest, Vec::new()),
    };
    let Some((name, description)) = head.split_once(char::is_whitespace) else {
        return invalid_syntax();
    };
    match authz.add_role(name, description.trim(), &parents).await {
        Ok(()) => format!("Role {name} created."),
        Err(e) => e.to_string(),
    }
}

async fn attach(authz: &Authorizer, rest: &str, grant: bool) -> String {
    let separator = if grant { " to " } else { " from " };
    let Some((perms, roles)) = rest.split_once(separator) else {
        return invalid_syntax();
    };
    let (perms, roles) = (split_list(perms), split_list(roles));
    if perms.is_empty() || roles.is_empty() {
        return invalid_syntax();
    }
    let verb = if grant { "attach" } else { "detach" };
    if let Err(e) = check_attach(authz, &perms, &roles).await {
        let (perms, roles) = (perms.join(","), roles.join(","));
        return format!("Failed to {verb} {perms}{separator}{roles}: {e}");
    }

    for role in &roles {
        for perm in &perms {
            let result = if grant {
                authz.attach_permission(perm, role).await
            } else {
                authz.detach_permission(perm, role).await
            };
            if let Err(e) = result {
                return format!("Failed to {verb} {perm}{separator}role {role}: {e}");
            }
        }
    }
    let verb = if grant { "attached to" } else { "detached from" };
    format!("Permissions {} {verb} {}.", perms.join(","), roles.join(","))
}

async fn bind(authz: &Authorizer, rest: &str, grant: bool) -> String {
    let separator = if grant { " to " } else { " from " };
    let Some((identity, roles)) = rest.split_once(separator) else {
        return invalid_syntax();
    };
    let roles = split_list(roles);
    let Some((kind, value)) = identity.trim().split_once(char::is_whitespace) else {
        return invalid_syntax();
    };
    if roles.is_empty() {
        return invalid_syntax();
    }
    let kind: BindingKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return e.to_string(),
    };
    let value = value.trim();
    let id = if value == ALL_USERS {
        value
    } else {
        reference_id(value)
    };

    if grant {
        return match authz.bind_to_role(kind, id, &roles).await {
            Ok(()) => format!("Bound {kind} {value} to {}.", roles.join(",")),
            Err(e) => format!("Failed to bind {kind} {value}: {e}"),
        };
    }
    if let Err(e) = check_unbind(authz, kind, id, &roles).await {
        return format!("Failed to unbind {kind} {value}: {e}");
    }
    for role in &roles {
        if let Err(e) = authz.unbind_from_role(kind, id, role).await {
            return format!("Failed to unbind {kind} {value} from {role}: {e}");
        }
    }
    format!("Unbound {kind} {value} from {}.", roles.join(","))
}

/// Every permission and role named must exist, so a typo rejects the whole
/// command before any pair is applied.
async fn check_attach(
    authz: &Authorizer,
    perms: &[String],
    roles: &[String],
) -> hal_auth::Result<()> {
    let snapshot = authz.list().await?;
    if let Some(missing) = perms
        .iter()
        .find(|p| !snapshot.permissions.iter().any(|known| &known.name == *p))
    {
        return Err(Error::unknown_permission(missing.as_str()));
    }
    if let Some(missing) = roles
        .iter()
        .find(|r| !snapshot.roles.iter().any(|known| &known.name == *r))
    {
        return Err(Error::unknown_role(missing.as_str()));
    }
    Ok(())
}

/// The binding must exist and hold every role being removed.
async fn check_unbind(
    authz: &Authorizer,
    kind: BindingKind,
    id: &str,
    roles: &[String],
) -> hal_auth::Result<()> {
    let snapshot = authz.list().await?;
    let binding = snapshot
        .bindings
        .iter()
        .find(|b| b.kind == kind && b.identifier == id)
        .ok_or_else(|| Error::unknown_binding(kind, id))?;
    if let Some(missing) = roles.iter().find(|r| !binding.roles.contains(*r)) {
        return Err(Error::RoleNotBound {
            role: missing.clone(),
            kind,
            identifier: id.to_string(),
        });
    }
    Ok(())
}

async fn load(authz: &Authorizer, rest: &str) -> String {
    let blob: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
    if blob.is_empty() {
        return "Please provide the blob produced by `rbac dump`.".into();
    }
    let raw = match STANDARD.decode(blob.as_bytes()) {
        Ok(raw) => raw,
        Err(e) => return format!("Invalid blob: {e}"),
    };
    match authz.load(&raw).await {
        Ok(()) => "Data successfully loaded.".into(),
        Err(e) => format!("Failed to load data: {e}"),
    }
}

async fn behave(authz: &Authorizer, caller: &str) -> String {
    let steps = async {
        authz
            .add_permission(WILDCARD_PERMISSION, "Can do everything")
            .await?;
        authz
            .add_permission(RBAC_PERMISSION, "Can manage rbac")
            .await?;
        authz
            .add_role(RBAC_PERMISSION, "RBAC management role", &[])
            .await?;
        authz
            .attach_permission(RBAC_PERMISSION, RBAC_PERMISSION)
            .await?;
        authz
            .bind_to_role(BindingKind::User, caller, &[RBAC_PERMISSION.to_string()])
            .await
    };
    match steps.await {
        Ok(()) => "You are the boss now.".into(),
        Err(e) => {
            warn!(user = caller, error = %e, "rbac bootstrap failed");
            format!("Error while bootstrapping rbac: {e}")
        },
    }
}

async fn list(authz: &Authorizer) -> String {
    match authz.list().await {
        Ok(snapshot) if snapshot.is_empty() => {
            "No RBAC set yet, start with `rbac behave`.".into()
        },
        Ok(snapshot) => render(&snapshot),
        Err(e) => format!("Failed to read rbac state: {e}"),
    }
}

fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    if !snapshot.bindings.is_empty() {
        out.push_str("*Role bindings*:\n");
        for b in &snapshot.bindings {
            let who = match b.kind {
                BindingKind::User if b.identifier == ALL_USERS => ALL_USERS.to_string(),
                BindingKind::User => format!("<@{}>", b.identifier),
                BindingKind::Channel | BindingKind::MemberOf => format!("<#{}>", b.identifier),
            };
            let _ = writeln!(out, "- _{}={who}_: {}", b.kind, b.roles.join(", "));
        }
    }
    if !snapshot.roles.is_empty() {
        out.push_str("*Roles*:\n");
        for r in &snapshot.roles {
            let _ = write!(out, "- _{}_: {}", r.name, r.description);
            if !r.parents.is_empty() {
                let _ = write!(out, ", Parents: {}", r.parents.join(", "));
            }
            if !r.permissions.is_empty() {
                let _ = write!(out, ", Permissions: {}", r.permissions.join(", "));
            }
            out.push('\n');
        }
    }
    if !snapshot.permissions.is_empty() {
        out.push_str("*Permissions*:\n");
        for p in &snapshot.permissions {
            let _ = writeln!(out, "- {}: {}", p.name, p.description);
        }
    }
    out
}
