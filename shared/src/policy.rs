//! Who may see, toggle and edit map resources.
//!
//! Role is the only gate for editing. For Ordner, assignment is the only gate
//! for seeing and toggling. Points and areas go through the same functions.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::{Area, Point, Role};

/// The user performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

/// A resource that carries a set of assigned usernames.
pub trait Assignable {
    fn assigned_users(&self) -> &BTreeSet<String>;
}

impl Assignable for Point {
    fn assigned_users(&self) -> &BTreeSet<String> {
        &self.assigned_users
    }
}

impl Assignable for Area {
    fn assigned_users(&self) -> &BTreeSet<String> {
        &self.assigned_users
    }
}

fn is_assigned(actor: &Actor, resource: &impl Assignable) -> bool {
    resource.assigned_users().contains(&actor.username)
}

pub fn can_see(actor: &Actor, resource: &impl Assignable) -> bool {
    match actor.role {
        Role::Admin | Role::Einsatzleiter | Role::Bereichsleiter => true,
        Role::Ordner => is_assigned(actor, resource),
    }
}

pub fn can_toggle(actor: &Actor, resource: &impl Assignable) -> bool {
    match actor.role {
        Role::Admin | Role::Einsatzleiter => true,
        Role::Bereichsleiter => false,
        Role::Ordner => is_assigned(actor, resource),
    }
}

/// Create, update and delete of points and areas.
pub fn can_edit(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Einsatzleiter)
}

/// Create and delete users, change roles.
pub fn can_manage_users(role: Role) -> bool {
    role == Role::Admin
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    pub visible: bool,
    pub can_toggle: bool,
    pub can_edit: bool,
}

pub fn access(actor: &Actor, resource: &impl Assignable) -> Access {
    Access {
        visible: can_see(actor, resource),
        can_toggle: can_toggle(actor, resource),
        can_edit: can_edit(actor.role),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Offset;
    use crate::types::PointType;

    fn point(assigned: &[&str]) -> Point {
        Point {
            id: "p1".to_string(),
            name: "Tor".to_string(),
            point_type: PointType::Gate,
            positions: vec![Offset::new(0.5, 0.5)],
            is_ready: false,
            assigned_users: assigned.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn area(assigned: &[&str]) -> Area {
        Area {
            id: "a1".to_string(),
            name: "Block".to_string(),
            positions: vec![],
            color_value: 0,
            assigned_users: assigned.iter().map(|s| s.to_string()).collect(),
            is_ready: false,
        }
    }

    fn expected(role: Role, assigned: bool) -> Access {
        match role {
            Role::Admin | Role::Einsatzleiter => Access {
                visible: true,
                can_toggle: true,
                can_edit: true,
            },
            Role::Bereichsleiter => Access {
                visible: true,
                can_toggle: false,
                can_edit: false,
            },
            Role::Ordner => Access {
                visible: assigned,
                can_toggle: assigned,
                can_edit: false,
            },
        }
    }

    #[test]
    fn test_authorization_table() {
        let roles = [
            Role::Admin,
            Role::Einsatzleiter,
            Role::Bereichsleiter,
            Role::Ordner,
        ];
        let mut cases = 0;
        for role in roles {
            let actor = Actor::new("dana", role);
            for assigned in [true, false] {
                let users: &[&str] = if assigned { &["dana", "eric"] } else { &["eric"] };
                assert_eq!(access(&actor, &point(users)), expected(role, assigned), "{role:?} point");
                assert_eq!(access(&actor, &area(users)), expected(role, assigned), "{role:?} area");
                cases += 2;
            }
        }
        assert_eq!(cases, 16);
    }

    #[test]
    fn test_assignment_is_by_exact_username() {
        let actor = Actor::new("Dana", Role::Ordner);
        assert!(!can_see(&actor, &point(&["dana"])));
        assert!(!can_toggle(&actor, &area(&[])));
    }

    #[test]
    fn test_only_admin_manages_users() {
        assert!(can_manage_users(Role::Admin));
        assert!(!can_manage_users(Role::Einsatzleiter));
        assert!(!can_manage_users(Role::Bereichsleiter));
        assert!(!can_manage_users(Role::Ordner));
    }
}
