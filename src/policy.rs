//! Room safety policies.
//!
//! `PolicyStore` is built once from configuration and is read-only afterwards.
//! Floor rules may name whole object categories; those references are
//! resolved here, at load time, so rule evaluation only does set lookups.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::camera::UNKNOWN_ROOM_TYPE;

/// Prefix for an explicit category reference inside a rule list.
pub const CATEGORY_PREFIX: &str = "category:";

/// One entry of a floor rule list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleToken {
    /// A single detector class name, e.g. `knife`.
    Literal(String),
    /// Every member of a named object category, e.g. `DANGEROUS`.
    CategoryRef(String),
}

/// Named groups of object classes.
#[derive(Clone, Debug, Default)]
pub struct ObjectCategories {
    categories: BTreeMap<String, BTreeSet<String>>,
}

impl ObjectCategories {
    pub fn new(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            categories: categories
                .into_iter()
                .map(|(name, members)| (name, members.into_iter().collect()))
                .collect(),
        }
    }

    pub fn members(&self, category: &str) -> Option<&BTreeSet<String>> {
        self.categories.get(category)
    }

    /// Categories a class belongs to.
    pub fn categories_of<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a str> {
        self.categories
            .iter()
            .filter(move |(_, members)| members.contains(class_name))
            .map(|(name, _)| name.as_str())
    }
}

/// Raw, unresolved rules for one room type as they appear in configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomRules {
    #[serde(default)]
    pub forbidden_objects: Vec<String>,
    #[serde(default)]
    pub forbidden_on_floor: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Resolved safety policy for one room type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoomPolicy {
    pub room_type: String,
    pub forbidden_objects: BTreeSet<String>,
    pub forbidden_on_floor: Vec<RuleToken>,
    pub description: String,
    floor_classes: BTreeSet<String>,
}

impl RoomPolicy {
    /// Policy that forbids nothing. Unknown room types resolve to this.
    pub fn permissive(room_type: &str) -> Self {
        Self {
            room_type: room_type.to_string(),
            ..Self::default()
        }
    }

    pub fn forbids_object(&self, class_name: &str) -> bool {
        self.forbidden_objects.contains(class_name)
    }

    /// Membership in the union of every expanded floor token.
    pub fn forbids_on_floor(&self, class_name: &str) -> bool {
        self.floor_classes.contains(class_name)
    }

    pub fn is_permissive(&self) -> bool {
        self.forbidden_objects.is_empty() && self.floor_classes.is_empty()
    }
}

/// Immutable room-type -> policy table.
pub struct PolicyStore {
    categories: ObjectCategories,
    sentinels: BTreeMap<String, Vec<String>>,
    policies: HashMap<String, RoomPolicy>,
    fallback: RoomPolicy,
    unresolved_refs: u64,
    misses: AtomicU64,
    warned_room_types: Mutex<BTreeSet<String>>,
}

impl PolicyStore {
    /// Build the store. `sentinels` maps legacy tokens such as
    /// `any_sharp_object` to the categories they stand for.
    pub fn new(
        categories: ObjectCategories,
        sentinels: BTreeMap<String, Vec<String>>,
        rules: BTreeMap<String, RoomRules>,
    ) -> Self {
        let mut store = Self {
            categories,
            sentinels,
            policies: HashMap::new(),
            fallback: RoomPolicy::permissive(UNKNOWN_ROOM_TYPE),
            unresolved_refs: 0,
            misses: AtomicU64::new(0),
            warned_room_types: Mutex::new(BTreeSet::new()),
        };

        for (room_type, raw) in rules {
            let forbidden_on_floor: Vec<RuleToken> = raw
                .forbidden_on_floor
                .iter()
                .flat_map(|entry| store.parse_token(entry))
                .collect();
            let mut floor_classes = BTreeSet::new();
            for token in &forbidden_on_floor {
                if let RuleToken::CategoryRef(category) = token {
                    if store.categories.members(category).is_none() {
                        store.unresolved_refs += 1;
                        log::warn!(
                            "policy for {}: category {} is not defined; it matches nothing",
                            room_type,
                            category
                        );
                    }
                }
                floor_classes.extend(store.expand_token(token));
            }
            log::debug!(
                "policy for {}: {} forbidden objects, {} forbidden on floor",
                room_type,
                raw.forbidden_objects.len(),
                floor_classes.len()
            );
            let policy = RoomPolicy {
                room_type: room_type.clone(),
                forbidden_objects: raw.forbidden_objects.into_iter().collect(),
                forbidden_on_floor,
                description: raw.description,
                floor_classes,
            };
            store.policies.insert(room_type, policy);
        }
        store
    }

    /// Policy for `room_type`. Unknown room types get a permissive policy.
    pub fn lookup(&self, room_type: &str) -> &RoomPolicy {
        match self.policies.get(room_type) {
            Some(policy) => policy,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let first = self
                    .warned_room_types
                    .lock()
                    .map(|mut warned| warned.insert(room_type.to_string()))
                    .unwrap_or(false);
                if first {
                    log::warn!(
                        "no safety policy for room type {:?}; nothing is forbidden there",
                        room_type
                    );
                } else {
                    log::debug!("no safety policy for room type {:?}", room_type);
                }
                &self.fallback
            }
        }
    }

    /// Split a configured rule entry into tokens.
    ///
    /// `category:NAME` is an explicit category reference, a configured
    /// sentinel expands to each category it names, anything else is literal.
    pub fn parse_token(&self, raw: &str) -> Vec<RuleToken> {
        if let Some(category) = raw.strip_prefix(CATEGORY_PREFIX) {
            return vec![RuleToken::CategoryRef(category.to_string())];
        }
        match self.sentinels.get(raw) {
            Some(categories) => categories
                .iter()
                .map(|c| RuleToken::CategoryRef(c.clone()))
                .collect(),
            None => vec![RuleToken::Literal(raw.to_string())],
        }
    }

    pub fn expand_token(&self, token: &RuleToken) -> BTreeSet<String> {
        match token {
            RuleToken::Literal(class_name) => BTreeSet::from([class_name.clone()]),
            RuleToken::CategoryRef(category) => self
                .categories
                .members(category)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Class names a configured rule entry stands for: the category members
    /// for a sentinel or category reference, the singleton for a literal.
    pub fn expand_category_sentinel(&self, raw: &str) -> BTreeSet<String> {
        self.parse_token(raw)
            .iter()
            .flat_map(|token| self.expand_token(token))
            .collect()
    }

    pub fn categories(&self) -> &ObjectCategories {
        &self.categories
    }

    pub fn room_types(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Lookups that fell back to the permissive policy.
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Category references in floor rules with no matching category.
    pub fn unresolved_category_refs(&self) -> u64 {
        self.unresolved_refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PolicyStore {
        let categories = ObjectCategories::new(BTreeMap::from([
            (
                "DANGEROUS".to_string(),
                vec!["knife".to_string(), "scissors".to_string()],
            ),
            ("FRAGILE".to_string(), vec!["glass".to_string()]),
        ]));
        let sentinels = BTreeMap::from([(
            "any_sharp_object".to_string(),
            vec!["DANGEROUS".to_string()],
        )]);
        let rules = BTreeMap::from([
            (
                "child_room".to_string(),
                RoomRules {
                    forbidden_objects: vec!["lighter".to_string()],
                    forbidden_on_floor: vec!["any_sharp_object".to_string()],
                    description: "no hazards".to_string(),
                },
            ),
            (
                "hallway".to_string(),
                RoomRules {
                    forbidden_objects: vec![],
                    forbidden_on_floor: vec![
                        "category:FRAGILE".to_string(),
                        "category:MISSING".to_string(),
                        "toy".to_string(),
                    ],
                    description: String::new(),
                },
            ),
        ]);
        PolicyStore::new(categories, sentinels, rules)
    }

    #[test]
    fn sentinel_expands_to_category_members() {
        let store = store();
        assert_eq!(
            store.expand_category_sentinel("any_sharp_object"),
            BTreeSet::from(["knife".to_string(), "scissors".to_string()])
        );
        assert_eq!(
            store.expand_category_sentinel("cup"),
            BTreeSet::from(["cup".to_string()])
        );
    }

    #[test]
    fn tokens_parse_into_tagged_variants() {
        let store = store();
        assert_eq!(
            store.parse_token("any_sharp_object"),
            vec![RuleToken::CategoryRef("DANGEROUS".to_string())]
        );
        assert_eq!(
            store.parse_token("category:FRAGILE"),
            vec![RuleToken::CategoryRef("FRAGILE".to_string())]
        );
        assert_eq!(
            store.parse_token("knife"),
            vec![RuleToken::Literal("knife".to_string())]
        );
    }

    #[test]
    fn floor_rules_are_resolved_at_load() {
        let store = store();
        let child = store.lookup("child_room");
        assert!(child.forbids_on_floor("knife"));
        assert!(child.forbids_on_floor("scissors"));
        assert!(!child.forbids_on_floor("cup"));
        assert!(child.forbids_object("lighter"));

        let hallway = store.lookup("hallway");
        assert!(hallway.forbids_on_floor("glass"));
        assert!(hallway.forbids_on_floor("toy"));
        assert_eq!(store.unresolved_category_refs(), 1);
    }

    #[test]
    fn unknown_room_type_is_permissive_and_counted() {
        let store = store();
        let garage = store.lookup("garage");
        assert!(garage.is_permissive());
        assert_eq!(garage.room_type, UNKNOWN_ROOM_TYPE);
        store.lookup("garage");
        assert_eq!(store.miss_count(), 2);
        store.lookup("child_room");
        assert_eq!(store.miss_count(), 2);
    }

    #[test]
    fn categories_of_lists_memberships() {
        let store = store();
        let cats: Vec<&str> = store.categories().categories_of("knife").collect();
        assert_eq!(cats, vec!["DANGEROUS"]);
    }
}
