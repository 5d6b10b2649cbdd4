//! Two-phase graph builder.
//!
//! Serialized descriptions are not topologically sorted: a scene may list a
//! member that is declared further down, or in another list. The builder
//! therefore works in two strictly ordered phases.
//!
//! # Phases
//! 1. **Flat creation** - every entry of every list, in order, is created
//!    through the [`ObjectFactory`] and registered under its declared name.
//!    Container members are not touched.
//! 2. **Linking** - every container, in creation order, gets its finalize
//!    hook, then each of its `items` is resolved by name and attached with
//!    its placement.
//!
//! Afterwards every non-container object receives `notify_loaded` exactly
//! once.
//!
//! # Failures
//! Entry-level defects become [`Diagnostic`]s and the build continues. A
//! [`HostError`] aborts the build: the partial graph is dropped, which tears
//! down everything it created, and the caller's previous graph is untouched.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::document::{ContainerSettings, Placement, SceneItemRef, SerializedObject};
use crate::error::Result;
use crate::factory::ObjectFactory;
use crate::graph::{BuiltGraph, Member, ObjectId};
use crate::host::{HostHandle, ItemHandle, ObjectHost, Scope};
use crate::registry::{DuplicatePolicy, Registration};
use crate::tokens::TokenSet;

// ============================================================================
// Policy
// ============================================================================

/// How a list's entries are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRole {
    /// Sources, scenes and groups
    Objects,
    /// Transitions; containers are not allowed here
    Transitions,
}

/// Differences between the two call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPolicy {
    pub scope: Scope,
    /// Restore the `locked` flag of container members
    pub restore_lock_state: bool,
    pub duplicate_policy: DuplicatePolicy,
}

impl BuildPolicy {
    /// Isolated namespace, lock state left alone
    pub fn private_preview() -> Self {
        Self {
            scope: Scope::Private,
            restore_lock_state: false,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }

    /// Shared namespace, lock state restored
    pub fn public_install() -> Self {
        Self {
            scope: Scope::Global,
            restore_lock_state: true,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Entry-level defect, recovered locally
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("<{index}> entry of {list} is malformed: {reason}")]
    MalformedEntry {
        list: String,
        index: usize,
        reason: String,
    },

    #[error("<{index}> entry of {list} has no name")]
    UnnamedEntry { list: String, index: usize },

    #[error("failed to create '{type_id}' with name '{name}'")]
    CreationFailed { name: String, type_id: String },

    #[error("container '{name}' is not allowed in the transitions list")]
    MisplacedContainer { name: String },

    #[error("filter '{name}' of '{parent}' has container type '{type_id}'")]
    FilterRejected {
        parent: String,
        name: String,
        type_id: String,
    },

    #[error("failed to create filter '{type_id}' with name '{name}' for '{parent}'")]
    FilterCreationFailed {
        parent: String,
        name: String,
        type_id: String,
    },

    #[error("name '{name}' declared more than once (kept first: {kept_first})")]
    DuplicateName { name: String, kept_first: bool },

    #[error("building scene '{container}' failed due to missing items array")]
    MissingItems { container: String },

    #[error("<{index}> item of '{container}' is malformed: {reason}")]
    MalformedItem {
        container: String,
        index: usize,
        reason: String,
    },

    #[error("<{index}> failed to find source '{name}' for '{container}'")]
    UnresolvedMember {
        container: String,
        index: usize,
        name: String,
    },

    #[error("failed to add source '{name}' to '{container}'")]
    AttachRejected { container: String, name: String },
}

/// Outcome of one build besides the graph itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Objects created from list entries (filters excluded)
    pub created: usize,
    pub filters: usize,
    pub containers: usize,
    pub linked_members: usize,
}

impl BuildReport {
    /// Log and keep a diagnostic
    pub fn record(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    /// True when nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// A successfully built graph
#[derive(Debug)]
pub struct Built {
    pub graph: BuiltGraph,
    pub report: BuildReport,
}

// ============================================================================
// Builder
// ============================================================================

struct EntryList<'a> {
    name: &'a str,
    role: ListRole,
    entries: &'a [Value],
}

/// A container created in phase 1, waiting for phase 2
struct PendingContainer {
    id: ObjectId,
    handle: HostHandle,
    name: String,
    settings: ContainerSettings,
}

pub struct GraphBuilder<'a> {
    host: Arc<dyn ObjectHost>,
    tokens: &'a TokenSet,
    policy: BuildPolicy,
    lists: Vec<EntryList<'a>>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(host: Arc<dyn ObjectHost>, tokens: &'a TokenSet, policy: BuildPolicy) -> Self {
        Self {
            host,
            tokens,
            policy,
            lists: Vec::new(),
        }
    }

    /// Queue a list; lists are processed in the order they were added
    pub fn with_list(mut self, name: &'a str, role: ListRole, entries: &'a [Value]) -> Self {
        self.lists.push(EntryList {
            name,
            role,
            entries,
        });
        self
    }

    /// Run both phases and the finalize pass
    pub fn build(self) -> Result<Built> {
        let mut graph = BuiltGraph::new(
            self.host.clone(),
            self.policy.scope,
            self.policy.duplicate_policy,
        );
        let mut report = BuildReport::default();

        let pending = self.create_all(&mut graph, &mut report)?;
        for container in &pending {
            self.link_container(&mut graph, container, &mut report);
        }

        for (_, object) in graph.objects() {
            if !object.kind.is_container() {
                self.host.notify_loaded(object.handle);
            }
        }

        tracing::info!(
            "Built {} object(s), {} filter(s), {} container(s), {} member(s); {} diagnostic(s)",
            report.created,
            report.filters,
            report.containers,
            report.linked_members,
            report.diagnostics.len()
        );
        Ok(Built { graph, report })
    }

    // Phase 1
    fn create_all(
        &self,
        graph: &mut BuiltGraph,
        report: &mut BuildReport,
    ) -> Result<Vec<PendingContainer>> {
        let factory = ObjectFactory::new(self.host.as_ref(), self.tokens, self.policy.scope);
        let mut pending = Vec::new();

        for list in &self.lists {
            for (index, raw) in list.entries.iter().enumerate() {
                let entry = match SerializedObject::from_value(raw) {
                    Ok(entry) => entry,
                    Err(e) => {
                        report.record(Diagnostic::MalformedEntry {
                            list: list.name.to_string(),
                            index,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };
                if !entry.is_named() {
                    report.record(Diagnostic::UnnamedEntry {
                        list: list.name.to_string(),
                        index,
                    });
                    continue;
                }

                let Some(created) = factory.create(graph, &entry, list.role, report)? else {
                    continue;
                };

                match graph
                    .registry_mut()
                    .register(&entry.name, created.id, created.kind)
                {
                    Registration::Inserted => {}
                    Registration::Replaced { .. } => report.record(Diagnostic::DuplicateName {
                        name: entry.name.clone(),
                        kept_first: false,
                    }),
                    Registration::Kept { .. } => report.record(Diagnostic::DuplicateName {
                        name: entry.name.clone(),
                        kept_first: true,
                    }),
                }

                if let (Some(settings), Some(object)) = (created.container, graph.get(created.id)) {
                    report.containers += 1;
                    pending.push(PendingContainer {
                        id: created.id,
                        handle: object.handle,
                        name: entry.name.clone(),
                        settings,
                    });
                }
            }
        }

        Ok(pending)
    }

    // Phase 2
    fn link_container(
        &self,
        graph: &mut BuiltGraph,
        container: &PendingContainer,
        report: &mut BuildReport,
    ) {
        self.host.finalize_container(container.handle);

        let Some(items) = &container.settings.items else {
            report.record(Diagnostic::MissingItems {
                container: container.name.clone(),
            });
            return;
        };

        tracing::info!(
            "Building scene '{}' with {} items ...",
            container.name,
            items.len()
        );
        for (index, raw) in items.iter().enumerate() {
            let item_ref = match SceneItemRef::from_value(raw) {
                Ok(item_ref) if !item_ref.name.is_empty() => item_ref,
                Ok(_) => {
                    report.record(Diagnostic::MalformedItem {
                        container: container.name.clone(),
                        index,
                        reason: "entry missing name".to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    report.record(Diagnostic::MalformedItem {
                        container: container.name.clone(),
                        index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let Some((member, member_handle)) = graph
                .resolve(&item_ref.name)
                .and_then(|id| graph.get(id).map(|o| (id, o.handle)))
            else {
                report.record(Diagnostic::UnresolvedMember {
                    container: container.name.clone(),
                    index,
                    name: item_ref.name,
                });
                continue;
            };

            let Some(item) = self.host.attach_member(container.handle, member_handle) else {
                report.record(Diagnostic::AttachRejected {
                    container: container.name.clone(),
                    name: item_ref.name,
                });
                continue;
            };

            self.apply_placement(item, &item_ref.placement);
            if let Some(owner) = graph.get_mut(container.id) {
                owner.members.push(Member {
                    object: member,
                    item,
                    placement: item_ref.placement,
                });
            }
            report.linked_members += 1;
            tracing::debug!("    <{}> Added source '{}'", index, item_ref.name);
        }
    }

    /// Item setters, always in this order, followed by a transform update
    fn apply_placement(&self, item: ItemHandle, placement: &Placement) {
        let host = self.host.as_ref();
        host.set_item_alignment(item, placement.alignment);
        host.set_item_bounds(item, placement.bounds);
        host.set_item_bounds_alignment(item, placement.bounds_alignment);
        host.set_item_bounds_type(item, placement.bounds_type);
        host.set_item_crop(item, placement.crop);
        host.set_item_position(item, placement.position);
        host.set_item_rotation(item, placement.rotation);
        host.set_item_scale(item, placement.scale);
        host.set_item_scale_filter(item, placement.scale_filter);
        host.set_item_visible(item, placement.visible);
        if self.policy.restore_lock_state {
            host.set_item_locked(item, placement.locked);
        }
        host.update_transform(item);
    }
}
