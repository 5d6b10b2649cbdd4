//! In-memory host.
//!
//! A complete, inspectable implementation of both host traits. The CLI uses
//! it to dry-run descriptions and packages; tests use it to observe exactly
//! which host calls a build made and in which order.
//!
//! Besides bookkeeping it enforces the rules a real compositor would:
//! unique names in the global scope, no container inside itself (directly
//! or transitively), members only on scene-typed objects.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Mutex, MutexGuard};

use glam::Affine2;
use serde_json::Value;

use super::{CollectionEvent, CollectionHost, HostError, HostHandle, ItemHandle, ObjectHost, Scope};
use crate::document::{AudioSettings, HotkeySettings, Interlacing, ParameterTree, SCENE_TYPE};
use crate::types::{Alignment, BoundsType, Crop, ScaleFilter, Vec2};

/// Canvas size reported for objects without an explicit size
pub const DEFAULT_CANVAS: (u32, u32) = (1920, 1080);

/// One recorded host call
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Created { object: HostHandle, name: String },
    Attribute { object: HostHandle, attribute: &'static str },
    FilterAdded { parent: HostHandle, filter: HostHandle },
    Finalized { container: HostHandle },
    Attached { container: HostHandle, member: HostHandle, item: ItemHandle },
    Detached { item: ItemHandle },
    ItemSetter { item: ItemHandle, setter: &'static str },
    Loaded { object: HostHandle },
    Destroyed { object: HostHandle },
    ActiveAdded { parent: HostHandle, child: HostHandle },
    ActiveRemoved { parent: HostHandle, child: HostHandle },
    CollectionAdded { name: String },
    Renamed { object: HostHandle, name: String },
    CurrentScene { scene: HostHandle },
    Saved,
}

/// Snapshot of a live object
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    pub type_id: String,
    pub name: String,
    pub scope: Scope,
    /// Collection that was active when the object was created
    pub collection: u64,
    pub parameters: ParameterTree,
    pub interlacing: Interlacing,
    pub audio: AudioSettings,
    pub hotkeys: HotkeySettings,
    pub enabled: bool,
    pub flags: u32,
    pub filters: Vec<HostHandle>,
    pub items: Vec<ItemHandle>,
    pub active_children: Vec<HostHandle>,
    pub loaded: usize,
    pub finalized: usize,
}

/// Snapshot of a container member slot
#[derive(Debug, Clone, PartialEq)]
pub struct HostItem {
    pub container: HostHandle,
    pub member: HostHandle,
    pub alignment: Alignment,
    pub bounds: Vec2,
    pub bounds_alignment: Alignment,
    pub bounds_type: BoundsType,
    pub crop: Crop,
    pub position: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
    pub scale_filter: ScaleFilter,
    pub visible: bool,
    pub locked: bool,
    /// Recomputed by `update_transform`
    pub transform: Affine2,
}

impl HostItem {
    fn new(container: HostHandle, member: HostHandle) -> Self {
        Self {
            container,
            member,
            alignment: Alignment::default(),
            bounds: Vec2::default(),
            bounds_alignment: Alignment::default(),
            bounds_type: BoundsType::default(),
            crop: Crop::default(),
            position: Vec2::default(),
            rotation: 0.0,
            scale: Vec2::splat(1.0),
            scale_filter: ScaleFilter::default(),
            visible: true,
            locked: false,
            transform: Affine2::IDENTITY,
        }
    }
}

/// How `add_collection` answers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SwitchBehavior {
    /// Confirm the switch to the requested collection
    #[default]
    Confirm,
    /// Refuse with a reason
    Refuse(String),
    /// Never answer; the sender is kept alive
    Silent,
    /// Drop the sender without answering
    Hangup,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    next_item: u64,
    objects: BTreeMap<HostHandle, HostObject>,
    items: BTreeMap<ItemHandle, HostItem>,
    events: Vec<HostEvent>,
    created: usize,
    active_removals: usize,

    rejected_kinds: HashSet<String>,
    /// Successful creates left before every create fails
    fail_after: Option<usize>,

    /// Bumped on every confirmed collection switch
    collection_epoch: u64,
    collections: Vec<String>,
    collection_files: Vec<String>,
    switch_behavior: SwitchBehavior,
    pending_switches: Vec<mpsc::Sender<CollectionEvent>>,
    default_scene: Option<HostHandle>,
    current_scene: Option<HostHandle>,
    fail_save: bool,
    saves: usize,
}

impl State {
    fn object_mut(&mut self, handle: HostHandle) -> Option<&mut HostObject> {
        self.objects.get_mut(&handle)
    }

    /// Global names are unique within the active collection
    fn global_name_taken(&self, name: &str) -> bool {
        self.objects.values().any(|o| {
            o.scope == Scope::Global && o.collection == self.collection_epoch && o.name == name
        })
    }

    /// True if `target` is `from` or reachable through members of `from`
    fn reaches(&self, from: HostHandle, target: HostHandle) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(handle) = stack.pop() {
            if handle == target {
                return true;
            }
            if !seen.insert(handle) {
                continue;
            }
            if let Some(object) = self.objects.get(&handle) {
                stack.extend(
                    object
                        .items
                        .iter()
                        .filter_map(|item| self.items.get(item))
                        .map(|item| item.member),
                );
            }
        }
        false
    }

    fn with_item(&mut self, item: ItemHandle, setter: &'static str, apply: impl FnOnce(&mut HostItem)) {
        if let Some(slot) = self.items.get_mut(&item) {
            apply(slot);
            self.events.push(HostEvent::ItemSetter { item, setter });
        }
    }

    fn with_object(
        &mut self,
        object: HostHandle,
        attribute: &'static str,
        apply: impl FnOnce(&mut HostObject),
    ) {
        if let Some(target) = self.object_mut(object) {
            apply(target);
            self.events.push(HostEvent::Attribute { object, attribute });
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // Behavior knobs
    // ========================================================================

    /// Make `create` return `Ok(None)` for this type
    pub fn reject_kind(&self, kind: &str) {
        self.state().rejected_kinds.insert(kind.to_string());
    }

    /// Let `successes` more creates succeed, then fail every create with a
    /// host error
    pub fn fail_after(&self, successes: usize) {
        self.state().fail_after = Some(successes);
    }

    /// Known collections and backing files
    pub fn with_collections(
        self,
        names: impl IntoIterator<Item = impl Into<String>>,
        files: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        {
            let mut state = self.state();
            state.collections = names.into_iter().map(Into::into).collect();
            state.collection_files = files.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn set_switch_behavior(&self, behavior: SwitchBehavior) {
        self.state().switch_behavior = behavior;
    }

    pub fn fail_saves(&self) {
        self.state().fail_save = true;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// `create` that folds both failure kinds into `None`
    pub fn create_object(
        &self,
        kind: &str,
        name: &str,
        parameters: &ParameterTree,
        scope: Scope,
    ) -> Option<HostHandle> {
        self.create(kind, name, parameters, scope).ok().flatten()
    }

    pub fn object(&self, handle: HostHandle) -> Option<HostObject> {
        self.state().objects.get(&handle).cloned()
    }

    pub fn item(&self, item: ItemHandle) -> Option<HostItem> {
        self.state().items.get(&item).cloned()
    }

    /// Live global object called `name` in the active collection
    pub fn find_global(&self, name: &str) -> Option<HostHandle> {
        let state = self.state();
        state
            .objects
            .iter()
            .find(|(_, o)| {
                o.scope == Scope::Global && o.collection == state.collection_epoch && o.name == name
            })
            .map(|(handle, _)| *handle)
    }

    /// Members of a container, in attach order
    pub fn members(&self, container: HostHandle) -> Vec<HostHandle> {
        let state = self.state();
        state
            .objects
            .get(&container)
            .map(|o| {
                o.items
                    .iter()
                    .filter_map(|item| state.items.get(item))
                    .map(|item| item.member)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn filters(&self, parent: HostHandle) -> Vec<HostHandle> {
        self.state()
            .objects
            .get(&parent)
            .map(|o| o.filters.clone())
            .unwrap_or_default()
    }

    pub fn active_children(&self, parent: HostHandle) -> Vec<HostHandle> {
        self.state()
            .objects
            .get(&parent)
            .map(|o| o.active_children.clone())
            .unwrap_or_default()
    }

    /// Number of `remove_active_child` calls
    pub fn active_removals(&self) -> usize {
        self.state().active_removals
    }

    pub fn loaded_count(&self, object: HostHandle) -> usize {
        self.state().objects.get(&object).map_or(0, |o| o.loaded)
    }

    pub fn live_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Total successful creates since construction
    pub fn created_count(&self) -> usize {
        self.state().created
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.state().events.clone()
    }

    pub fn collections(&self) -> Vec<String> {
        self.state().collections.clone()
    }

    pub fn current_scene(&self) -> Option<HostHandle> {
        self.state().current_scene
    }

    pub fn save_count(&self) -> usize {
        self.state().saves
    }
}

impl ObjectHost for MemoryHost {
    fn create(
        &self,
        kind: &str,
        name: &str,
        parameters: &ParameterTree,
        scope: Scope,
    ) -> Result<Option<HostHandle>, HostError> {
        let mut state = self.state();

        match state.fail_after {
            Some(0) => return Err(HostError::failed(format!("cannot allocate '{}'", name))),
            Some(ref mut left) => *left -= 1,
            None => {}
        }

        if kind.is_empty() || state.rejected_kinds.contains(kind) {
            return Ok(None);
        }
        if scope == Scope::Global && state.global_name_taken(name) {
            return Ok(None);
        }

        state.next_handle += 1;
        let handle = HostHandle(state.next_handle);
        let collection = state.collection_epoch;
        state.objects.insert(
            handle,
            HostObject {
                type_id: kind.to_string(),
                name: name.to_string(),
                scope,
                collection,
                parameters: parameters.clone(),
                interlacing: Interlacing::default(),
                audio: AudioSettings::default(),
                hotkeys: HotkeySettings::default(),
                enabled: true,
                flags: 0,
                filters: Vec::new(),
                items: Vec::new(),
                active_children: Vec::new(),
                loaded: 0,
                finalized: 0,
            },
        );
        state.created += 1;
        state.events.push(HostEvent::Created {
            object: handle,
            name: name.to_string(),
        });
        Ok(Some(handle))
    }

    fn set_interlacing(&self, object: HostHandle, interlacing: &Interlacing) {
        self.state()
            .with_object(object, "interlacing", |o| o.interlacing = *interlacing);
    }

    fn set_audio(&self, object: HostHandle, audio: &AudioSettings) {
        self.state().with_object(object, "audio", |o| o.audio = *audio);
    }

    fn set_hotkeys(&self, object: HostHandle, hotkeys: &HotkeySettings) {
        self.state().with_object(object, "hotkeys", |o| o.hotkeys = *hotkeys);
    }

    fn set_enabled(&self, object: HostHandle, enabled: bool) {
        self.state().with_object(object, "enabled", |o| o.enabled = enabled);
    }

    fn set_flags(&self, object: HostHandle, flags: u32) {
        self.state().with_object(object, "flags", |o| o.flags = flags);
    }

    fn add_filter(&self, parent: HostHandle, filter: HostHandle) {
        let mut state = self.state();
        if !state.objects.contains_key(&filter) {
            return;
        }
        if let Some(object) = state.object_mut(parent) {
            object.filters.push(filter);
            state.events.push(HostEvent::FilterAdded { parent, filter });
        }
    }

    fn finalize_container(&self, container: HostHandle) {
        let mut state = self.state();
        if let Some(object) = state.object_mut(container) {
            object.finalized += 1;
            state.events.push(HostEvent::Finalized { container });
        }
    }

    fn attach_member(&self, container: HostHandle, member: HostHandle) -> Option<ItemHandle> {
        let mut state = self.state();
        let is_scene = state
            .objects
            .get(&container)
            .is_some_and(|o| o.type_id == SCENE_TYPE);
        if !is_scene || !state.objects.contains_key(&member) || state.reaches(member, container) {
            return None;
        }

        state.next_item += 1;
        let item = ItemHandle(state.next_item);
        state.items.insert(item, HostItem::new(container, member));
        if let Some(object) = state.object_mut(container) {
            object.items.push(item);
        }
        state.events.push(HostEvent::Attached {
            container,
            member,
            item,
        });
        Some(item)
    }

    fn detach_member(&self, item: ItemHandle) {
        let mut state = self.state();
        let Some(slot) = state.items.remove(&item) else {
            return;
        };
        if let Some(container) = state.object_mut(slot.container) {
            container.items.retain(|i| *i != item);
        }
        state.events.push(HostEvent::Detached { item });
    }

    fn set_item_alignment(&self, item: ItemHandle, alignment: Alignment) {
        self.state()
            .with_item(item, "alignment", |i| i.alignment = alignment);
    }

    fn set_item_bounds(&self, item: ItemHandle, bounds: Vec2) {
        self.state().with_item(item, "bounds", |i| i.bounds = bounds);
    }

    fn set_item_bounds_alignment(&self, item: ItemHandle, alignment: Alignment) {
        self.state()
            .with_item(item, "bounds_alignment", |i| i.bounds_alignment = alignment);
    }

    fn set_item_bounds_type(&self, item: ItemHandle, bounds_type: BoundsType) {
        self.state()
            .with_item(item, "bounds_type", |i| i.bounds_type = bounds_type);
    }

    fn set_item_crop(&self, item: ItemHandle, crop: Crop) {
        self.state().with_item(item, "crop", |i| i.crop = crop);
    }

    fn set_item_position(&self, item: ItemHandle, position: Vec2) {
        self.state().with_item(item, "position", |i| i.position = position);
    }

    fn set_item_rotation(&self, item: ItemHandle, degrees: f32) {
        self.state().with_item(item, "rotation", |i| i.rotation = degrees);
    }

    fn set_item_scale(&self, item: ItemHandle, scale: Vec2) {
        self.state().with_item(item, "scale", |i| i.scale = scale);
    }

    fn set_item_scale_filter(&self, item: ItemHandle, filter: ScaleFilter) {
        self.state()
            .with_item(item, "scale_filter", |i| i.scale_filter = filter);
    }

    fn set_item_visible(&self, item: ItemHandle, visible: bool) {
        self.state().with_item(item, "visible", |i| i.visible = visible);
    }

    fn set_item_locked(&self, item: ItemHandle, locked: bool) {
        self.state().with_item(item, "locked", |i| i.locked = locked);
    }

    fn update_transform(&self, item: ItemHandle) {
        self.state().with_item(item, "update_transform", |i| {
            i.transform = Affine2::from_scale_angle_translation(
                i.scale.into(),
                i.rotation.to_radians(),
                i.position.into(),
            );
        });
    }

    fn notify_loaded(&self, object: HostHandle) {
        let mut state = self.state();
        if let Some(target) = state.object_mut(object) {
            target.loaded += 1;
            state.events.push(HostEvent::Loaded { object });
        }
    }

    fn destroy(&self, object: HostHandle) {
        let mut state = self.state();
        let Some(removed) = state.objects.remove(&object) else {
            return;
        };
        for item in &removed.items {
            state.items.remove(item);
        }
        if state.default_scene == Some(object) {
            state.default_scene = None;
        }
        if state.current_scene == Some(object) {
            state.current_scene = None;
        }
        state.events.push(HostEvent::Destroyed { object });
    }

    fn add_active_child(&self, parent: HostHandle, child: HostHandle) {
        let mut state = self.state();
        if let Some(target) = state.object_mut(parent) {
            target.active_children.push(child);
            state.events.push(HostEvent::ActiveAdded { parent, child });
        }
    }

    fn remove_active_child(&self, parent: HostHandle, child: HostHandle) {
        let mut state = self.state();
        state.active_removals += 1;
        if let Some(target) = state.object_mut(parent) {
            if let Some(pos) = target.active_children.iter().position(|c| *c == child) {
                target.active_children.remove(pos);
            }
        }
        state.events.push(HostEvent::ActiveRemoved { parent, child });
    }

    fn dimensions(&self, object: HostHandle) -> Option<(u32, u32)> {
        let state = self.state();
        let target = state.objects.get(&object)?;
        let custom = target
            .parameters
            .get("custom_size")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let size = |key: &str| {
            target
                .parameters
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };
        match (custom, size("cx"), size("cy")) {
            (true, Some(width), Some(height)) if width > 0 && height > 0 => Some((width, height)),
            _ => Some(DEFAULT_CANVAS),
        }
    }
}

impl CollectionHost for MemoryHost {
    fn collection_names(&self) -> Vec<String> {
        self.state().collections.clone()
    }

    fn collection_files(&self) -> Vec<String> {
        self.state().collection_files.clone()
    }

    fn add_collection(&self, name: &str, file: &Path) -> Result<Receiver<CollectionEvent>, HostError> {
        let (tx, rx) = mpsc::channel();
        let behavior = self.state().switch_behavior.clone();

        match behavior {
            SwitchBehavior::Confirm => {
                {
                    let mut state = self.state();
                    state.collection_epoch += 1;
                    state.collections.push(name.to_string());
                    state
                        .collection_files
                        .push(file.to_string_lossy().into_owned());
                    state.events.push(HostEvent::CollectionAdded {
                        name: name.to_string(),
                    });
                }
                // Every fresh collection starts with one scene
                let scene = self.create(SCENE_TYPE, "Scene", &ParameterTree::new(), Scope::Global)?;
                self.state().default_scene = scene;
                let _ = tx.send(CollectionEvent::Switched {
                    name: name.to_string(),
                });
            }
            SwitchBehavior::Refuse(reason) => {
                let _ = tx.send(CollectionEvent::Refused { reason });
            }
            SwitchBehavior::Silent => self.state().pending_switches.push(tx),
            SwitchBehavior::Hangup => drop(tx),
        }
        Ok(rx)
    }

    fn default_scene(&self) -> Option<HostHandle> {
        self.state().default_scene
    }

    fn rename(&self, object: HostHandle, name: &str) {
        let mut state = self.state();
        if let Some(target) = state.object_mut(object) {
            target.name = name.to_string();
            state.events.push(HostEvent::Renamed {
                object,
                name: name.to_string(),
            });
        }
    }

    fn set_current_scene(&self, scene: HostHandle) {
        let mut state = self.state();
        if state.objects.contains_key(&scene) {
            state.current_scene = Some(scene);
            state.events.push(HostEvent::CurrentScene { scene });
        }
    }

    fn save(&self) -> Result<(), HostError> {
        let mut state = self.state();
        if state.fail_save {
            return Err(HostError::failed("cannot write collection"));
        }
        state.saves += 1;
        state.events.push(HostEvent::Saved);
        Ok(())
    }
}
