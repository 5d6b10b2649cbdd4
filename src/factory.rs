//! Object factory: one serialized entry becomes one host object plus its
//! decorators.
//!
//! # Design
//! - Containers are constructed from a synthetic parameter tree without
//!   members; their `items` come back to the builder for linking
//! - Everything else gets its token-substituted `settings` verbatim
//! - The new object enters the graph arena immediately after construction,
//!   so a host failure later in the same entry still tears it down
//! - Rejections (`Ok(None)` from the host) are diagnostics, host failures
//!   (`Err`) propagate

use serde_json::Value;

use crate::builder::{BuildReport, Diagnostic, ListRole};
use crate::document::{ContainerSettings, GROUP_TYPE, GenericAttributes, SCENE_TYPE, SerializedObject};
use crate::graph::{BuiltGraph, GraphObject, ObjectId, ObjectKind};
use crate::host::{HostError, HostHandle, ObjectHost, Scope};
use crate::tokens::TokenSet;

/// Result of a successful `create`
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    /// Retained container fields (only for scenes and groups)
    pub container: Option<ContainerSettings>,
}

pub struct ObjectFactory<'a> {
    host: &'a dyn ObjectHost,
    tokens: &'a TokenSet,
    scope: Scope,
}

impl<'a> ObjectFactory<'a> {
    pub fn new(host: &'a dyn ObjectHost, tokens: &'a TokenSet, scope: Scope) -> Self {
        Self {
            host,
            tokens,
            scope,
        }
    }

    /// Create `entry` and its filters inside `graph`.
    ///
    /// Returns `Ok(None)` when the entry was skipped; the reason is recorded
    /// in `report`.
    pub fn create(
        &self,
        graph: &mut BuiltGraph,
        entry: &SerializedObject,
        role: ListRole,
        report: &mut BuildReport,
    ) -> Result<Option<CreatedObject>, HostError> {
        let kind = match (role, entry.kind.as_str()) {
            (ListRole::Transitions, SCENE_TYPE | GROUP_TYPE) => {
                report.record(Diagnostic::MisplacedContainer {
                    name: entry.name.clone(),
                });
                return Ok(None);
            }
            (ListRole::Transitions, _) => ObjectKind::Transition,
            (ListRole::Objects, SCENE_TYPE) => ObjectKind::Scene,
            (ListRole::Objects, GROUP_TYPE) => ObjectKind::Group,
            (ListRole::Objects, _) => ObjectKind::Source,
        };

        // Groups are scenes with a tag; the host only knows one container type
        let (type_id, parameters, container) = if kind.is_container() {
            let settings = ContainerSettings::from_parameters(&entry.settings);
            (SCENE_TYPE, settings.construction_parameters(), Some(settings))
        } else {
            let mut parameters = entry.settings.clone();
            self.tokens.substitute(&mut parameters);
            (entry.kind.as_str(), parameters, None)
        };

        let Some(handle) = self.host.create(type_id, &entry.name, &parameters, self.scope)? else {
            report.record(Diagnostic::CreationFailed {
                name: entry.name.clone(),
                type_id: entry.kind.clone(),
            });
            return Ok(None);
        };
        tracing::info!("Created {} '{}' with name '{}'", kind, type_id, entry.name);

        self.apply_attributes(handle, &entry.attributes);

        let id = graph.insert(GraphObject {
            name: entry.name.clone(),
            type_id: type_id.to_string(),
            kind,
            handle,
            parent: None,
            filters: Vec::new(),
            members: Vec::new(),
        });
        report.created += 1;

        self.create_filters(graph, id, handle, entry, report)?;

        Ok(Some(CreatedObject {
            id,
            kind,
            container,
        }))
    }

    /// Generic attribute setters, always in this order
    fn apply_attributes(&self, handle: HostHandle, attributes: &GenericAttributes) {
        self.host.set_interlacing(handle, &attributes.interlacing);
        self.host.set_audio(handle, &attributes.audio);
        self.host.set_hotkeys(handle, &attributes.hotkeys);
        self.host.set_enabled(handle, attributes.enabled);
        self.host.set_flags(handle, attributes.flags);
    }

    fn create_filters(
        &self,
        graph: &mut BuiltGraph,
        parent: ObjectId,
        parent_handle: HostHandle,
        entry: &SerializedObject,
        report: &mut BuildReport,
    ) -> Result<(), HostError> {
        for (index, raw) in entry.filters.iter().enumerate() {
            let Some(filter) = self.parse_filter(&entry.name, index, raw, report) else {
                continue;
            };

            let mut parameters = filter.settings.clone();
            self.tokens.substitute(&mut parameters);

            let Some(handle) =
                self.host
                    .create(&filter.kind, &filter.name, &parameters, self.scope)?
            else {
                report.record(Diagnostic::FilterCreationFailed {
                    parent: entry.name.clone(),
                    name: filter.name.clone(),
                    type_id: filter.kind.clone(),
                });
                continue;
            };

            self.apply_attributes(handle, &filter.attributes);
            self.host.add_filter(parent_handle, handle);
            tracing::info!("    Added filter '{}' with name '{}'", filter.kind, filter.name);

            let id = graph.insert(GraphObject {
                name: filter.name.clone(),
                type_id: filter.kind.clone(),
                kind: ObjectKind::Filter,
                handle,
                parent: Some(parent),
                filters: Vec::new(),
                members: Vec::new(),
            });
            if let Some(owner) = graph.get_mut(parent) {
                owner.filters.push(id);
            }
            report.filters += 1;
        }
        Ok(())
    }

    /// Filters are plain named leaves; anything else is skipped
    fn parse_filter(
        &self,
        parent: &str,
        index: usize,
        raw: &Value,
        report: &mut BuildReport,
    ) -> Option<SerializedObject> {
        let filter = match SerializedObject::from_value(raw) {
            Ok(filter) => filter,
            Err(e) => {
                report.record(Diagnostic::MalformedEntry {
                    list: format!("filters of '{}'", parent),
                    index,
                    reason: e.to_string(),
                });
                return None;
            }
        };

        if !filter.is_named() {
            report.record(Diagnostic::UnnamedEntry {
                list: format!("filters of '{}'", parent),
                index,
            });
            return None;
        }

        if filter.is_container() {
            report.record(Diagnostic::FilterRejected {
                parent: parent.to_string(),
                name: filter.name,
                type_id: filter.kind,
            });
            return None;
        }

        Some(filter)
    }
}
