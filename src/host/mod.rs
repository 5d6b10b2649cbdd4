//! Host collaborator contracts.
//!
//! The engine never constructs or renders anything itself. Every object lives
//! inside a host (a compositor, a broadcast application, or the in-memory
//! [`MemoryHost`](memory::MemoryHost) used by the CLI and tests) and is
//! addressed through opaque handles.
//!
//! # Contract
//!
//! - Methods take `&self`; hosts use interior mutability and must be
//!   `Send + Sync` so a graph can hold them behind an `Arc`.
//! - `create` distinguishes a rejected entry (`Ok(None)`, recovered locally)
//!   from a host failure (`Err`, aborts the build).
//! - Setters on handles the host no longer knows are silently ignored.

pub mod memory;

use std::path::Path;
use std::sync::mpsc::Receiver;

use strum::Display;
use thiserror::Error;

use crate::document::{AudioSettings, HotkeySettings, Interlacing, ParameterTree};
use crate::types::{Alignment, BoundsType, Crop, ScaleFilter, Vec2};

/// Opaque handle to a host object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub u64);

/// Opaque handle to one member slot inside a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemHandle(pub u64);

/// Namespace an object is created in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Scope {
    /// Invisible to the rest of the host application
    Private,
    /// Shared namespace, names must be unique there
    Global,
}

/// Failures the host cannot recover from
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host unavailable: {0}")]
    Unavailable(String),

    #[error("host operation failed: {0}")]
    Failed(String),
}

impl HostError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Object construction collaborator
pub trait ObjectHost: Send + Sync {
    /// Construct an object. `Ok(None)` means the type is unknown or rejected
    /// the parameters.
    fn create(
        &self,
        kind: &str,
        name: &str,
        parameters: &ParameterTree,
        scope: Scope,
    ) -> Result<Option<HostHandle>, HostError>;

    // Generic attributes
    fn set_interlacing(&self, object: HostHandle, interlacing: &Interlacing);
    fn set_audio(&self, object: HostHandle, audio: &AudioSettings);
    fn set_hotkeys(&self, object: HostHandle, hotkeys: &HotkeySettings);
    fn set_enabled(&self, object: HostHandle, enabled: bool);
    fn set_flags(&self, object: HostHandle, flags: u32);

    /// Append `filter` to the ordered decorator chain of `parent`
    fn add_filter(&self, parent: HostHandle, filter: HostHandle);

    /// Deferred initialization some containers need before accepting members
    fn finalize_container(&self, _container: HostHandle) {}

    /// Append `member` to `container`. `None` if the host refuses (for
    /// example a container inserted into itself).
    fn attach_member(&self, container: HostHandle, member: HostHandle) -> Option<ItemHandle>;
    fn detach_member(&self, item: ItemHandle);

    // Member placement
    fn set_item_alignment(&self, item: ItemHandle, alignment: Alignment);
    fn set_item_bounds(&self, item: ItemHandle, bounds: Vec2);
    fn set_item_bounds_alignment(&self, item: ItemHandle, alignment: Alignment);
    fn set_item_bounds_type(&self, item: ItemHandle, bounds_type: BoundsType);
    fn set_item_crop(&self, item: ItemHandle, crop: Crop);
    fn set_item_position(&self, item: ItemHandle, position: Vec2);
    fn set_item_rotation(&self, item: ItemHandle, degrees: f32);
    fn set_item_scale(&self, item: ItemHandle, scale: Vec2);
    fn set_item_scale_filter(&self, item: ItemHandle, filter: ScaleFilter);
    fn set_item_visible(&self, item: ItemHandle, visible: bool);
    fn set_item_locked(&self, item: ItemHandle, locked: bool);
    fn update_transform(&self, item: ItemHandle);

    /// One-time "restored from a persisted description" signal
    fn notify_loaded(&self, object: HostHandle);

    fn destroy(&self, object: HostHandle);

    fn add_active_child(&self, parent: HostHandle, child: HostHandle);
    fn remove_active_child(&self, parent: HostHandle, child: HostHandle);

    /// Output size of an object, if the host knows it
    fn dimensions(&self, object: HostHandle) -> Option<(u32, u32)>;
}

/// Asynchronous outcome of a collection switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    /// The host finished switching to the named collection
    Switched { name: String },
    /// The host refused or aborted the switch
    Refused { reason: String },
}

/// Name enumeration and collection management collaborator (installation only)
pub trait CollectionHost: Send + Sync {
    /// Every currently known collection name
    fn collection_names(&self) -> Vec<String>;

    /// Current contents of the backing-file directory (file names)
    fn collection_files(&self) -> Vec<String>;

    /// Create a collection backed by `file` and make it active. The switch is
    /// confirmed later through the returned channel.
    fn add_collection(&self, name: &str, file: &Path)
    -> Result<Receiver<CollectionEvent>, HostError>;

    /// The scene the host put into a freshly created collection
    fn default_scene(&self) -> Option<HostHandle>;

    fn rename(&self, object: HostHandle, name: &str);

    /// Make `scene` the program and preview scene
    fn set_current_scene(&self, scene: HostHandle);

    /// Persist the active collection
    fn save(&self) -> Result<(), HostError>;
}
