//! Permission resolution.
//!
//! Everything here is a pure function of its inputs: the policy is passed in
//! on every call, never read from global state. Grants are exact,
//! case-sensitive strings naming either a unit or a section label.
//!
//! Evaluation order for [`authorize`], first match wins:
//! 1. actor is an admin → granted
//! 2. pick the per-action maps (`start` → start maps; `stop` and `restart` → stop maps)
//! 3. the actor's user grants cover the target → granted
//! 4. any of the actor's roles has grants covering the target → granted
//! 5. denied

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::types::{Action, ActorId, RoleId, Unit, UnitTarget};

/// A set of unit names and/or section labels.
pub type Grants = BTreeSet<String>;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub admins: BTreeSet<ActorId>,
    #[serde(default)]
    pub role_start_permissions: BTreeMap<RoleId, Grants>,
    #[serde(default)]
    pub role_stop_permissions: BTreeMap<RoleId, Grants>,
    #[serde(default)]
    pub user_start_permissions: BTreeMap<ActorId, Grants>,
    #[serde(default)]
    pub user_stop_permissions: BTreeMap<ActorId, Grants>,
    /// Display order of sections. Not an authorization input.
    #[serde(default)]
    pub section_order: Vec<String>,
}

impl Policy {
    pub fn is_admin(&self, actor: ActorId) -> bool {
        self.admins.contains(&actor)
    }

    /// The (user, role) maps consulted for `action`.
    fn maps_for(
        &self,
        action: Action,
    ) -> (&BTreeMap<ActorId, Grants>, &BTreeMap<RoleId, Grants>) {
        match action {
            Action::Start => (&self.user_start_permissions, &self.role_start_permissions),
            Action::Stop | Action::Restart => {
                (&self.user_stop_permissions, &self.role_stop_permissions)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

/// An immutable, versioned view of the policy.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub version: u64,
    pub policy: Arc<Policy>,
}

/// Holds the current policy snapshot. Reloads publish a new version; flows
/// that already cloned a snapshot keep evaluating against it.
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<PolicySnapshot>,
}

impl PolicyStore {
    pub fn new(policy: Policy) -> Self {
        Self {
            current: RwLock::new(PolicySnapshot {
                version: 1,
                policy: Arc::new(policy),
            }),
        }
    }

    pub fn current(&self) -> PolicySnapshot {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publish `policy` as the new current snapshot and return its version.
    pub fn replace(&self, policy: Policy) -> u64 {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = guard.version + 1;
        *guard = PolicySnapshot {
            version,
            policy: Arc::new(policy),
        };
        version
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// The grant keys that cover `target`: its own name and, when known, its
/// current section label.
pub fn section_membership<'a>(target: &UnitTarget<'a>) -> impl Iterator<Item = &'a str> {
    std::iter::once(target.name).chain(target.section)
}

fn covers(grants: Option<&Grants>, target: &UnitTarget<'_>) -> bool {
    let Some(grants) = grants else {
        return false;
    };
    section_membership(target).any(|key| grants.contains(key))
}

/// Decide whether `actor` (member of `groups`) may perform `action` on `target`.
pub fn authorize(
    actor: ActorId,
    action: Action,
    target: &UnitTarget<'_>,
    groups: &[RoleId],
    policy: &Policy,
) -> bool {
    if policy.is_admin(actor) {
        return true;
    }

    let (user_maps, role_maps) = policy.maps_for(action);

    if covers(user_maps.get(&actor), target) {
        return true;
    }

    groups
        .iter()
        .any(|group| covers(role_maps.get(group), target))
}

/// Whether any grant could authorize `action` for the actor, whatever the
/// target. `false` means every such request is denied without looking at a
/// unit.
pub fn holds_any_grant(actor: ActorId, action: Action, groups: &[RoleId], policy: &Policy) -> bool {
    if policy.is_admin(actor) {
        return true;
    }
    let (user_maps, role_maps) = policy.maps_for(action);
    let non_empty = |grants: Option<&Grants>| grants.is_some_and(|g| !g.is_empty());
    non_empty(user_maps.get(&actor)) || groups.iter().any(|g| non_empty(role_maps.get(g)))
}

/// Whether the actor may see `unit` at all: authorized for start or stop.
fn is_visible(actor: ActorId, groups: &[RoleId], policy: &Policy, unit: &Unit) -> bool {
    let target = UnitTarget::from(unit);
    authorize(actor, Action::Start, &target, groups, policy)
        || authorize(actor, Action::Stop, &target, groups, policy)
}

/// Names of the units the actor may see. Visibility only: every mutating
/// request must call [`authorize`] again.
pub fn list_authorized_units(
    actor: ActorId,
    groups: &[RoleId],
    policy: &Policy,
    units: &[Unit],
) -> BTreeSet<String> {
    units
        .iter()
        .filter(|unit| is_visible(actor, groups, policy, unit))
        .map(|unit| unit.name.clone())
        .collect()
}

/// Order `sections` by `section_order`; sections not listed there follow
/// alphabetically.
pub fn order_sections(mut sections: Vec<String>, section_order: &[String]) -> Vec<String> {
    sections.sort_by(|a, b| {
        let rank = |s: &String| section_order.iter().position(|o| o == s);
        match (rank(a), rank(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    });
    sections.dedup();
    sections
}

/// Sections containing at least one unit the actor may see, in display order.
pub fn authorized_sections(
    actor: ActorId,
    groups: &[RoleId],
    policy: &Policy,
    units: &[Unit],
) -> Vec<String> {
    let sections: BTreeSet<String> = units
        .iter()
        .filter(|unit| is_visible(actor, groups, policy, unit))
        .map(|unit| unit.section.clone())
        .collect();
    order_sections(sections.into_iter().collect(), &policy.section_order)
}

/// Units in `section` the actor may see.
pub fn units_in_section(
    actor: ActorId,
    groups: &[RoleId],
    policy: &Policy,
    units: &[Unit],
    section: &str,
) -> Vec<Unit> {
    units
        .iter()
        .filter(|unit| unit.section == section)
        .filter(|unit| is_visible(actor, groups, policy, unit))
        .cloned()
        .collect()
}

/// Group `units` by section, sections in display order.
pub fn group_by_section(units: &[Unit], section_order: &[String]) -> Vec<(String, Vec<Unit>)> {
    let mut groups: BTreeMap<String, Vec<Unit>> = BTreeMap::new();
    for unit in units {
        groups
            .entry(unit.section.clone())
            .or_default()
            .push(unit.clone());
    }
    order_sections(groups.keys().cloned().collect(), section_order)
        .into_iter()
        .filter_map(|section| groups.remove(&section).map(|units| (section, units)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: ActorId = 1;
    const ALICE: ActorId = 10;
    const BOB: ActorId = 20;
    const STRANGER: ActorId = 99;
    const GAMERS: RoleId = 500;
    const OPS: RoleId = 600;

    fn grants(items: &[&str]) -> Grants {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn unit(name: &str, section: &str, running: bool) -> Unit {
        Unit {
            id: format!("id-{name}"),
            name: name.to_string(),
            running,
            section: section.to_string(),
            status: if running { "Up 1 hour" } else { "Exited (0)" }.to_string(),
        }
    }

    fn policy() -> Policy {
        let mut p = Policy::default();
        p.admins.insert(ADMIN);
        p.user_start_permissions.insert(ALICE, grants(&["plex"]));
        p.user_stop_permissions.insert(BOB, grants(&["sonarr"]));
        p.role_start_permissions.insert(GAMERS, grants(&["games"]));
        p.role_stop_permissions.insert(OPS, grants(&["media"]));
        p.section_order = vec!["media".into(), "games".into()];
        p
    }

    #[test]
    fn holds_any_grant_is_per_action() {
        let p = policy();
        assert!(holds_any_grant(ADMIN, Action::Stop, &[], &p));
        assert!(holds_any_grant(ALICE, Action::Start, &[], &p));
        assert!(!holds_any_grant(ALICE, Action::Stop, &[], &p));
        assert!(holds_any_grant(STRANGER, Action::Restart, &[OPS], &p));
        assert!(!holds_any_grant(STRANGER, Action::Start, &[OPS], &p));
    }

    #[test]
    fn empty_grant_set_counts_as_none() {
        let mut p = policy();
        p.user_stop_permissions.insert(STRANGER, Grants::new());
        assert!(!holds_any_grant(STRANGER, Action::Stop, &[], &p));
    }

    fn units() -> Vec<Unit> {
        vec![
            unit("minecraft", "games", false),
            unit("plex", "media", true),
            unit("sonarr", "media", true),
            unit("valheim", "games", false),
            unit("watchtower", "Uncategorized", true),
        ]
    }

    #[test]
    fn admin_granted_for_every_action_and_unit() {
        let p = policy();
        for action in Action::all() {
            for name in ["plex", "does-not-exist", ""] {
                assert!(authorize(ADMIN, *action, &UnitTarget::named(name), &[], &p));
            }
        }
    }

    #[test]
    fn admin_granted_even_with_empty_maps() {
        let mut p = Policy::default();
        p.admins.insert(ADMIN);
        assert!(authorize(ADMIN, Action::Restart, &UnitTarget::named("x"), &[], &p));
    }

    #[test]
    fn user_start_grant_does_not_imply_stop() {
        let p = policy();
        let target = UnitTarget::named("plex");
        assert!(authorize(ALICE, Action::Start, &target, &[], &p));
        assert!(!authorize(ALICE, Action::Stop, &target, &[], &p));
        assert!(!authorize(ALICE, Action::Restart, &target, &[], &p));
    }

    #[test]
    fn restart_is_authorized_as_stop() {
        let p = policy();
        let target = UnitTarget::named("sonarr");
        assert!(authorize(BOB, Action::Restart, &target, &[], &p));
        assert!(authorize(BOB, Action::Stop, &target, &[], &p));
        assert!(!authorize(BOB, Action::Start, &target, &[], &p));
    }

    #[test]
    fn group_section_grant_authorizes_stop() {
        let p = policy();
        let plex = unit("plex", "media", true);
        assert!(authorize(
            STRANGER,
            Action::Stop,
            &UnitTarget::from(&plex),
            &[OPS],
            &p
        ));
    }

    #[test]
    fn section_grant_needs_known_section() {
        let p = policy();
        assert!(!authorize(
            STRANGER,
            Action::Stop,
            &UnitTarget::named("plex"),
            &[OPS],
            &p
        ));
    }

    #[test]
    fn user_section_grant_is_honoured() {
        let mut p = policy();
        p.user_start_permissions.insert(STRANGER, grants(&["games"]));
        let valheim = unit("valheim", "games", false);
        assert!(authorize(
            STRANGER,
            Action::Start,
            &UnitTarget::from(&valheim),
            &[],
            &p
        ));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let p = policy();
        assert!(!authorize(ALICE, Action::Start, &UnitTarget::named("Plex"), &[], &p));
    }

    #[test]
    fn stranger_is_denied() {
        let p = policy();
        for action in Action::all() {
            assert!(!authorize(
                STRANGER,
                *action,
                &UnitTarget::named("plex"),
                &[12345],
                &p
            ));
        }
    }

    #[test]
    fn section_membership_yields_name_then_section() {
        let plex = unit("plex", "media", true);
        let keys: Vec<_> = section_membership(&UnitTarget::from(&plex)).collect();
        assert_eq!(keys, vec!["plex", "media"]);
        let keys: Vec<_> = section_membership(&UnitTarget::named("plex")).collect();
        assert_eq!(keys, vec!["plex"]);
    }

    #[test]
    fn list_authorized_units_unions_start_and_stop() {
        let p = policy();
        let all = units();
        let visible = list_authorized_units(BOB, &[GAMERS], &p, &all);
        assert_eq!(
            visible.into_iter().collect::<Vec<_>>(),
            vec!["minecraft", "sonarr", "valheim"]
        );
    }

    #[test]
    fn list_authorized_units_admin_sees_everything() {
        let p = policy();
        let all = units();
        assert_eq!(list_authorized_units(ADMIN, &[], &p, &all).len(), all.len());
    }

    #[test]
    fn authorized_sections_follow_section_order() {
        let p = policy();
        let all = units();
        assert_eq!(
            authorized_sections(ADMIN, &[], &p, &all),
            vec!["media", "games", "Uncategorized"]
        );
        assert_eq!(authorized_sections(ALICE, &[], &p, &all), vec!["media"]);
        assert!(authorized_sections(STRANGER, &[], &p, &all).is_empty());
    }

    #[test]
    fn units_in_section_filters_by_visibility() {
        let p = policy();
        let all = units();
        let names: Vec<_> = units_in_section(ALICE, &[], &p, &all, "media")
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["plex"]);

        let names: Vec<_> = units_in_section(STRANGER, &[GAMERS], &p, &all, "games")
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["minecraft", "valheim"]);
    }

    #[test]
    fn order_sections_puts_unlisted_last_alphabetically() {
        let ordered = order_sections(
            vec!["zeta".into(), "games".into(), "alpha".into(), "media".into()],
            &["media".to_string(), "games".to_string()],
        );
        assert_eq!(ordered, vec!["media", "games", "alpha", "zeta"]);
    }

    #[test]
    fn group_by_section_keeps_unit_order() {
        let grouped = group_by_section(&units(), &["games".to_string()]);
        let sections: Vec<_> = grouped.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(sections, vec!["games", "Uncategorized", "media"]);
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[0].1[0].name, "minecraft");
    }

    #[test]
    fn policy_store_versions_increase() {
        let store = PolicyStore::new(Policy::default());
        let before = store.current();
        assert_eq!(before.version, 1);
        assert!(!before.policy.is_admin(ADMIN));

        let version = store.replace(policy());
        assert_eq!(version, 2);
        assert!(store.current().policy.is_admin(ADMIN));
        // The old snapshot is untouched.
        assert!(!before.policy.is_admin(ADMIN));
    }
}
