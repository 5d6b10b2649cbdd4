//! The built object graph.
//!
//! All constructed objects live in one arena indexed by [`ObjectId`]. The name
//! registry and container member lists hold indices, never ownership, so the
//! graph is the single party responsible for destruction.
//!
//! # Teardown
//!
//! Dropping an armed graph first detaches every container member, then
//! destroys each object exactly once through the host. [`BuiltGraph::commit`]
//! disarms the teardown and leaves the objects to the host (installation).

use std::fmt;
use std::sync::Arc;

use strum::Display;

use crate::document::Placement;
use crate::host::{HostHandle, ItemHandle, ObjectHost, Scope};
use crate::registry::{DuplicatePolicy, NameRegistry};

/// Index of an object inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Role of a constructed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ObjectKind {
    Source,
    Scene,
    Group,
    Filter,
    Transition,
}

impl ObjectKind {
    /// Scenes and groups hold members
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Scene | Self::Group)
    }
}

/// One attached member of a container
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub object: ObjectId,
    pub item: ItemHandle,
    pub placement: Placement,
}

#[derive(Debug, Clone)]
pub struct GraphObject {
    /// Declared name (the registry key)
    pub name: String,
    /// Host type identifier the object was created with
    pub type_id: String,
    pub kind: ObjectKind,
    pub handle: HostHandle,
    /// Owning object, for filters
    pub parent: Option<ObjectId>,
    /// Decorators in attach order
    pub filters: Vec<ObjectId>,
    /// Members in attach order (containers only)
    pub members: Vec<Member>,
}

/// Summary of a graph whose objects now belong to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedGraph {
    pub objects: Vec<(String, ObjectKind, HostHandle)>,
    pub scene_names: Vec<String>,
}

pub struct BuiltGraph {
    host: Arc<dyn ObjectHost>,
    scope: Scope,
    objects: Vec<GraphObject>,
    containers: Vec<ObjectId>,
    registry: NameRegistry,
    armed: bool,
}

impl BuiltGraph {
    pub(crate) fn new(host: Arc<dyn ObjectHost>, scope: Scope, policy: DuplicatePolicy) -> Self {
        Self {
            host,
            scope,
            objects: Vec::new(),
            containers: Vec::new(),
            registry: NameRegistry::new(policy),
            armed: true,
        }
    }

    pub(crate) fn insert(&mut self, object: GraphObject) -> ObjectId {
        let id = ObjectId(self.objects.len());
        if object.kind.is_container() {
            self.containers.push(id);
        }
        self.objects.push(object);
        id
    }

    pub(crate) fn get_mut(&mut self, id: ObjectId) -> Option<&mut GraphObject> {
        self.objects.get_mut(id.0)
    }

    pub(crate) fn registry_mut(&mut self) -> &mut NameRegistry {
        &mut self.registry
    }

    pub fn get(&self, id: ObjectId) -> Option<&GraphObject> {
        self.objects.get(id.0)
    }

    /// Look up an object by its registered name
    pub fn resolve(&self, name: &str) -> Option<ObjectId> {
        self.registry.resolve(name)
    }

    /// Convenience: the object registered under `name`
    pub fn object_named(&self, name: &str) -> Option<&GraphObject> {
        self.resolve(name).and_then(|id| self.get(id))
    }

    /// Look up a selectable scene (non-group container) by name
    pub fn scene(&self, name: &str) -> Option<ObjectId> {
        self.registry.resolve_scene(name)
    }

    /// Snapshot of the scene-name table, sorted
    pub fn scene_names(&self) -> Vec<String> {
        self.registry.scene_names().map(str::to_string).collect()
    }

    /// Members of a container in attach order; empty for leaves
    pub fn members(&self, id: ObjectId) -> &[Member] {
        self.get(id).map(|o| o.members.as_slice()).unwrap_or(&[])
    }

    /// Names of the members of the container registered under `name`
    pub fn member_names(&self, name: &str) -> Vec<&str> {
        self.resolve(name)
            .map(|id| {
                self.members(id)
                    .iter()
                    .filter_map(|m| self.get(m.object))
                    .map(|o| o.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Containers in creation order
    pub fn containers(&self) -> &[ObjectId] {
        &self.containers
    }

    /// Every object in creation order
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &GraphObject)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId(i), o))
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    pub fn host(&self) -> &Arc<dyn ObjectHost> {
        &self.host
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Number of constructed objects, filters included
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Hand every object over to the host; nothing is destroyed on drop.
    pub fn commit(mut self) -> CommittedGraph {
        self.armed = false;
        CommittedGraph {
            objects: self
                .objects
                .iter()
                .map(|o| (o.name.clone(), o.kind, o.handle))
                .collect(),
            scene_names: self.scene_names(),
        }
    }

    fn teardown(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        for &container in self.containers.iter().rev() {
            for member in self.objects[container.0].members.iter().rev() {
                self.host.detach_member(member.item);
            }
        }

        tracing::debug!(
            "Destroying {} {} object(s)",
            self.objects.len(),
            self.scope
        );
        for object in self.objects.iter().rev() {
            self.host.destroy(object.handle);
        }
    }
}

impl fmt::Debug for BuiltGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltGraph")
            .field("scope", &self.scope)
            .field("objects", &self.objects)
            .field("containers", &self.containers)
            .field("armed", &self.armed)
            .finish()
    }
}

impl Drop for BuiltGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}
