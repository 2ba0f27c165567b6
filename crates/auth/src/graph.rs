//! In-memory role hierarchy.
//!
//! A [`RoleGraph`] is only ever built from a complete role set and is
//! rejected if any parent is missing or the inheritance relation has a cycle,
//! so walks over it always terminate.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{Error, Result, records::Role, records::WILDCARD_PERMISSION};

#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    roles: HashMap<String, Role>,
}

impl RoleGraph {
    /// Validate `roles` and index them by name.
    pub fn build(roles: impl IntoIterator<Item = Role>) -> Result<Self> {
        let roles: HashMap<String, Role> = roles
            .into_iter()
            .map(|mut role| {
                role.parents.retain(|p| !p.is_empty());
                (role.name.clone(), role)
            })
            .collect();

        let mut names: Vec<&String> = roles.keys().collect();
        names.sort_unstable();
        for name in names {
            if let Some(role) = roles.get(name) {
                for parent in &role.parents {
                    if !roles.contains_key(parent) {
                        return Err(Error::unknown_parent(name.as_str(), parent.as_str()));
                    }
                }
            }
        }

        if let Some(path) = find_cycle(&roles) {
            return Err(Error::RoleCycle { path });
        }

        Ok(Self { roles })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// `name` followed by every role it inherits from, breadth first.
    pub fn lineage(&self, name: &str) -> Vec<&Role> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            let Some(role) = self.roles.get(current) else {
                continue;
            };
            out.push(role);
            queue.extend(role.parents.iter().map(String::as_str));
        }
        out
    }

    /// Name of the role in `name`'s lineage that grants `permission`, if any.
    ///
    /// A wildcard anywhere in the lineage wins over an exact grant.
    pub fn granting_role(&self, name: &str, permission: &str) -> Option<&str> {
        let lineage = self.lineage(name);
        lineage
            .iter()
            .find(|r| r.has_permission(WILDCARD_PERMISSION))
            .or_else(|| lineage.iter().find(|r| r.has_permission(permission)))
            .map(|r| r.name.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn find_cycle(roles: &HashMap<String, Role>) -> Option<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut names: Vec<&str> = roles.keys().map(String::as_str).collect();
    names.sort_unstable();
    for name in names {
        let mut stack = Vec::new();
        if let Some(cycle) = visit(name, roles, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    name: &'a str,
    roles: &'a HashMap<String, Role>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    match marks.get(name) {
        Some(Mark::Done) => return None,
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Some(cycle);
        },
        None => {},
    }

    marks.insert(name, Mark::Visiting);
    stack.push(name);
    if let Some(role) = roles.get(name) {
        for parent in &role.parents {
            if let Some(cycle) = visit(parent, roles, marks, stack) {
                return Some(cycle);
            }
        }
    }
    stack.pop();
    marks.insert(name, Mark::Done);
    None
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, parents: &[&str], permissions: &[&str]) -> Role {
        Role::new(name, "")
            .with_parents(parents.iter().copied())
            .with_permissions(permissions.iter().copied())
    }

    #[test]
    fn inherited_permission_reports_granting_ancestor() {
        let graph = RoleGraph::build([
            role("admin", &[], &["deploy"]),
            role("ops", &["admin"], &[]),
            role("oncall", &["ops"], &["page"]),
        ])
        .unwrap();
        assert_eq!(graph.granting_role("oncall", "deploy"), Some("admin"));
        assert_eq!(graph.granting_role("oncall", "page"), Some("oncall"));
        assert_eq!(graph.granting_role("ops", "page"), None);
    }

    #[test]
    fn wildcard_beats_exact_grant() {
        let graph = RoleGraph::build([
            role("root", &[], &["*"]),
            role("dev", &["root"], &["deploy"]),
        ])
        .unwrap();
        assert_eq!(graph.granting_role("dev", "deploy"), Some("root"));
        assert_eq!(graph.granting_role("dev", "anything"), Some("root"));
    }

    #[test]
    fn diamond_inheritance_visits_each_role_once() {
        let graph = RoleGraph::build([
            role("base", &[], &["read"]),
            role("left", &["base"], &[]),
            role("right", &["base"], &[]),
            role("top", &["left", "right"], &[]),
        ])
        .unwrap();
        let names: Vec<&str> = graph.lineage("top").iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["top", "left", "right", "base"]);
    }

    #[test]
    fn rejects_missing_parent() {
        let err = RoleGraph::build([role("ops", &["ghost"], &[])]).unwrap_err();
        assert!(matches!(err, Error::UnknownParent { ref parent, .. } if parent == "ghost"));
    }

    #[test]
    fn rejects_cycle() {
        let err = RoleGraph::build([
            role("a", &["b"], &[]),
            role("b", &["c"], &[]),
            role("c", &["a"], &[]),
        ])
        .unwrap_err();
        match err {
            Error::RoleCycle { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_self_parent() {
        assert!(matches!(
            RoleGraph::build([role("a", &["a"], &[])]),
            Err(Error::RoleCycle { .. })
        ));
    }

    #[test]
    fn empty_parent_names_are_ignored() {
        let graph = RoleGraph::build([role("a", &[""], &["x"])]).unwrap();
        assert!(graph.get("a").unwrap().parents.is_empty());
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let graph = RoleGraph::build([role("a", &[], &["*"])]).unwrap();
        assert_eq!(graph.granting_role("ghost", "x"), None);
    }
}
