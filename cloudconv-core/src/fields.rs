//! Mapping of free-form attribute names onto canonical roles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical semantic attribute of a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    X,
    Y,
    Z,
    R,
    G,
    B,
    Intensity,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::X,
        Role::Y,
        Role::Z,
        Role::R,
        Role::G,
        Role::B,
        Role::Intensity,
    ];

    /// Order in which roles are tried against one raw name
    pub const PRIORITY: [Role; 7] = [
        Role::Intensity,
        Role::X,
        Role::Y,
        Role::Z,
        Role::R,
        Role::G,
        Role::B,
    ];

    pub const COORDINATES: [Role; 3] = [Role::X, Role::Y, Role::Z];
    pub const COLORS: [Role; 3] = [Role::R, Role::G, Role::B];

    fn index(self) -> usize {
        match self {
            Role::X => 0,
            Role::Y => 1,
            Role::Z => 2,
            Role::R => 3,
            Role::G => 4,
            Role::B => 5,
            Role::Intensity => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::X => "x",
            Role::Y => "y",
            Role::Z => "z",
            Role::R => "r",
            Role::G => "g",
            Role::B => "b",
            Role::Intensity => "intensity",
        }
    }

    /// Whether an already lowercased raw name can fill this role.
    ///
    /// Coordinate matching is a plain substring test, so `boxid` matches `x`.
    pub fn matches(self, lowered: &str) -> bool {
        match self {
            Role::Intensity => lowered.contains("intensit"),
            Role::X => lowered.contains('x'),
            Role::Y => lowered.contains('y'),
            Role::Z => lowered.contains('z'),
            Role::R => lowered == "r" || lowered.contains("red"),
            Role::G => lowered == "g" || lowered.contains("green"),
            Role::B => lowered == "b" || lowered.contains("blue"),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved raw field name per canonical role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    fields: [Option<String>; 7],
}

impl FieldMapping {
    /// Raw name assigned to `role`, if any
    pub fn get(&self, role: Role) -> Option<&str> {
        self.fields[role.index()].as_deref()
    }

    pub fn is_resolved(&self, role: Role) -> bool {
        self.fields[role.index()].is_some()
    }

    /// Whether every role in `roles` has a raw name
    pub fn has_all(&self, roles: &[Role]) -> bool {
        roles.iter().all(|&role| self.is_resolved(role))
    }

    /// Roles left without a raw name
    pub fn missing(&self) -> Vec<Role> {
        Role::ALL
            .iter()
            .copied()
            .filter(|&role| !self.is_resolved(role))
            .collect()
    }

    /// Role a raw name was assigned to, if any
    pub fn role_of(&self, raw: &str) -> Option<Role> {
        Role::ALL
            .iter()
            .copied()
            .find(|&role| self.get(role) == Some(raw))
    }

    fn assign(&mut self, role: Role, raw: &str) {
        self.fields[role.index()] = Some(raw.to_string());
    }
}

/// Assign each canonical role to at most one raw name.
///
/// Names are scanned in order and compared case-insensitively. Each name
/// fills the first role of [`Role::PRIORITY`] that it matches and that is
/// still unassigned, so earlier names win ties. Unmatched roles stay empty.
pub fn resolve_fields<S: AsRef<str>>(names: &[S]) -> FieldMapping {
    let mut mapping = FieldMapping::default();

    for name in names {
        let raw = name.as_ref();
        let lowered = raw.to_lowercase();
        let role = Role::PRIORITY
            .iter()
            .copied()
            .find(|&role| !mapping.is_resolved(role) && role.matches(&lowered));

        if let Some(role) = role {
            mapping.assign(role, raw);
        }
    }

    let missing = mapping.missing();
    if !missing.is_empty() {
        log::debug!(
            "unresolved fields: {}",
            missing.iter().map(|r| r.name()).collect::<Vec<_>>().join(", ")
        );
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_canonical_names() {
        let mapping = resolve_fields(&["X", "Y", "Z", "Red", "Green", "Blue", "Intensity"]);
        assert_eq!(mapping.get(Role::X), Some("X"));
        assert_eq!(mapping.get(Role::Y), Some("Y"));
        assert_eq!(mapping.get(Role::Z), Some("Z"));
        assert_eq!(mapping.get(Role::R), Some("Red"));
        assert_eq!(mapping.get(Role::G), Some("Green"));
        assert_eq!(mapping.get(Role::B), Some("Blue"));
        assert_eq!(mapping.get(Role::Intensity), Some("Intensity"));
        assert!(mapping.missing().is_empty());
    }

    #[test]
    fn test_resolve_short_and_plural_names() {
        let mapping = resolve_fields(&["x", "y", "z", "r", "g", "b", "intensities"]);
        assert!(mapping.has_all(&Role::ALL));
        assert_eq!(mapping.get(Role::Intensity), Some("intensities"));
        assert_eq!(mapping.get(Role::R), Some("r"));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let mapping = resolve_fields(&["x", "x_original", "y", "z"]);
        assert_eq!(mapping.get(Role::X), Some("x"));
        assert_eq!(mapping.role_of("x_original"), None);
    }

    #[test]
    fn test_intensity_takes_priority_over_y() {
        // "intensity" contains a 'y' but is claimed by the intensity role
        let mapping = resolve_fields(&["intensity", "y"]);
        assert_eq!(mapping.get(Role::Intensity), Some("intensity"));
        assert_eq!(mapping.get(Role::Y), Some("y"));
    }

    #[test]
    fn test_name_falls_through_to_next_free_role() {
        // Second "xy" name finds x taken and lands on y
        let mapping = resolve_fields(&["x", "xy"]);
        assert_eq!(mapping.get(Role::Y), Some("xy"));
    }

    #[test]
    fn test_lenient_substring_match() {
        let mapping = resolve_fields(&["boxid"]);
        assert_eq!(mapping.get(Role::X), Some("boxid"));
    }

    #[test]
    fn test_missing_roles() {
        let mapping = resolve_fields(&["X", "Y", "Z", "classification"]);
        assert!(mapping.has_all(&Role::COORDINATES));
        assert!(!mapping.has_all(&Role::COLORS));
        assert_eq!(
            mapping.missing(),
            vec![Role::R, Role::G, Role::B, Role::Intensity]
        );
    }
}
