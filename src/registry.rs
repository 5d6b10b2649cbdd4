//! Name registry for one build.
//!
//! Two independent tables: every registered object by name, and the subset
//! that are selectable scenes (containers that are not groups). The registry
//! is owned by the graph it indexes; there is no process-wide instance.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strum::{Display, EnumString};

use crate::graph::{ObjectId, ObjectKind};

/// What happens when a name is registered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The later registration replaces the earlier one
    #[default]
    LastWins,
    /// The earlier registration is kept, the later one is ignored
    FirstWins,
}

/// Outcome of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The name was free
    Inserted,
    /// The name was taken; `previous` is no longer reachable by name
    Replaced { previous: ObjectId },
    /// The name was taken and kept; the new object is not reachable by name
    Kept { existing: ObjectId },
}

impl Registration {
    pub fn is_duplicate(self) -> bool {
        !matches!(self, Self::Inserted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    objects: HashMap<String, ObjectId>,
    scenes: BTreeMap<String, ObjectId>,
    policy: DuplicatePolicy,
}

impl NameRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            objects: HashMap::new(),
            scenes: BTreeMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Register `id` under `name`. Non-group scenes also enter the scene table.
    ///
    /// Empty names are never registered; callers skip unnamed entries before
    /// they get here, this only guards the invariant.
    pub fn register(&mut self, name: &str, id: ObjectId, kind: ObjectKind) -> Registration {
        if name.is_empty() {
            return Registration::Kept { existing: id };
        }

        let outcome = match (self.objects.get(name).copied(), self.policy) {
            (None, _) => {
                self.objects.insert(name.to_string(), id);
                Registration::Inserted
            }
            (Some(previous), DuplicatePolicy::LastWins) => {
                self.objects.insert(name.to_string(), id);
                Registration::Replaced { previous }
            }
            (Some(existing), DuplicatePolicy::FirstWins) => Registration::Kept { existing },
        };

        // The scene table always mirrors the object table for this name
        if !matches!(outcome, Registration::Kept { .. }) {
            if kind == ObjectKind::Scene {
                self.scenes.insert(name.to_string(), id);
            } else {
                self.scenes.remove(name);
            }
        }

        outcome
    }

    /// O(1) lookup; `None` is a skip for callers, never an error
    pub fn resolve(&self, name: &str) -> Option<ObjectId> {
        self.objects.get(name).copied()
    }

    pub fn resolve_scene(&self, name: &str) -> Option<ObjectId> {
        self.scenes.get(name).copied()
    }

    /// Selectable scene names, sorted
    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Number of registered object names
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }
}
