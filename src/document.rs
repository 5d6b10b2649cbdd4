//! Typed view of an exported scene collection.
//!
//! The outer document is parsed strictly: if it is not an object with list
//! fields, nothing can be rebuilt and the caller gets an error. Individual
//! entries are kept as raw JSON and parsed one at a time by the builder, so a
//! single malformed entry only costs that entry.
//!
//! # Format
//!
//! ```json
//! {
//!   "name": "Theme",
//!   "current_scene": "Scene A",
//!   "sources": [
//!     { "id": "scene", "name": "Scene A", "settings": { "items": [ { "name": "Cam" } ] } },
//!     { "id": "image_source", "name": "Cam", "settings": { "file": "<REPLACE|ME>/data/cam.png" } }
//!   ],
//!   "groups": [],
//!   "transitions": []
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{Result, SceneGraftError};
use crate::types::{
    Alignment, BoundsType, Crop, DeinterlaceFieldOrder, DeinterlaceMode, MonitoringType,
    ScaleFilter, Vec2,
};

/// Arbitrary nested key/value parameters, passed to the host untouched.
pub type ParameterTree = Map<String, Value>;

/// Reserved type identifier of containers
pub const SCENE_TYPE: &str = "scene";

/// Alias of [`SCENE_TYPE`] that marks the container as a group
pub const GROUP_TYPE: &str = "group";

fn default_true() -> bool {
    true
}

fn default_balance() -> f64 {
    0.5
}

fn default_volume() -> f64 {
    1.0
}

fn default_mixers() -> u32 {
    0x3F
}

fn default_scale() -> Vec2 {
    Vec2::splat(1.0)
}

// ============================================================================
// Generic attributes
// ============================================================================

/// Deinterlacing attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Interlacing {
    #[serde(default, rename = "deinterlace_mode")]
    pub mode: DeinterlaceMode,
    #[serde(default, rename = "deinterlace_field_order")]
    pub field_order: DeinterlaceFieldOrder,
}

/// Audio routing attributes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_balance")]
    pub balance: f64,
    #[serde(default = "default_mixers")]
    pub mixers: u32,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
    /// Sync offset in nanoseconds
    #[serde(default, rename = "sync")]
    pub sync_offset: i64,
    #[serde(default, rename = "monitoring-type")]
    pub monitoring: MonitoringType,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            balance: default_balance(),
            mixers: default_mixers(),
            volume: default_volume(),
            muted: false,
            sync_offset: 0,
            monitoring: MonitoringType::None,
        }
    }
}

/// Push-to-mute / push-to-talk hotkey behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HotkeySettings {
    #[serde(default, rename = "push-to-mute")]
    pub push_to_mute: bool,
    #[serde(default, rename = "push-to-mute-delay")]
    pub push_to_mute_delay: i64,
    #[serde(default, rename = "push-to-talk")]
    pub push_to_talk: bool,
    #[serde(default, rename = "push-to-talk-delay")]
    pub push_to_talk_delay: i64,
}

/// The fixed set of attributes every serialized object carries next to its
/// type-specific parameters.
///
/// Parsed leniently: a value of the wrong shape falls back to that field's
/// default instead of failing the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenericAttributes {
    #[serde(flatten)]
    pub interlacing: Interlacing,
    #[serde(flatten)]
    pub audio: AudioSettings,
    #[serde(flatten)]
    pub hotkeys: HotkeySettings,
    pub enabled: bool,
    pub flags: u32,
}

impl Default for GenericAttributes {
    fn default() -> Self {
        Self {
            interlacing: Interlacing::default(),
            audio: AudioSettings::default(),
            hotkeys: HotkeySettings::default(),
            enabled: true,
            flags: 0,
        }
    }
}

impl GenericAttributes {
    /// Pick the known attribute keys out of an entry's fields
    pub fn from_fields(fields: &ParameterTree) -> Self {
        Self {
            interlacing: lenient_group(fields),
            audio: lenient_group(fields),
            hotkeys: lenient_group(fields),
            enabled: lenient_field(fields, "enabled").unwrap_or(true),
            flags: lenient_field(fields, "flags").unwrap_or(0),
        }
    }
}

impl<'de> Deserialize<'de> for GenericAttributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let fields = ParameterTree::deserialize(deserializer)?;
        Ok(Self::from_fields(&fields))
    }
}

fn lenient_field<T: DeserializeOwned>(fields: &ParameterTree, key: &str) -> Option<T> {
    let value = fields.get(key)?;
    match T::deserialize(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Ignoring attribute '{}' = {}: {}", key, value, e);
            None
        }
    }
}

/// Overlay the keys of `T` present in `fields` onto its defaults, one at a
/// time, keeping only the values that still parse.
fn lenient_group<T>(fields: &ParameterTree) -> T
where
    T: Serialize + DeserializeOwned + Default,
{
    let Ok(Value::Object(mut accepted)) = serde_json::to_value(T::default()) else {
        return T::default();
    };
    let keys: Vec<String> = accepted.keys().cloned().collect();
    for key in keys {
        let Some(value) = fields.get(&key) else {
            continue;
        };
        let previous = accepted.insert(key.clone(), value.clone());
        if let Err(e) = T::deserialize(&Value::Object(accepted.clone())) {
            tracing::warn!("Ignoring attribute '{}' = {}: {}", key, value, e);
            if let Some(previous) = previous {
                accepted.insert(key, previous);
            }
        }
    }
    T::deserialize(Value::Object(accepted)).unwrap_or_default()
}

// ============================================================================
// Serialized entries
// ============================================================================

/// One entry of a source, group, transition or filter list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerializedObject {
    #[serde(default)]
    pub name: String,

    /// Host type identifier (`"scene"`, `"group"`, `"image_source"`, ...)
    #[serde(default, rename = "id")]
    pub kind: String,

    #[serde(default)]
    pub settings: ParameterTree,

    /// Decorators, kept raw and parsed one by one so a bad filter only skips itself
    #[serde(default)]
    pub filters: Vec<Value>,

    #[serde(flatten)]
    pub attributes: GenericAttributes,
}

impl SerializedObject {
    /// Parse one raw list entry
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(SceneGraftError::document("entry is not an object"));
        }
        Ok(Self::deserialize(value)?)
    }

    /// Entries without a name never take part in a build
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    /// True for `scene` and `group` entries
    pub fn is_container(&self) -> bool {
        self.kind == SCENE_TYPE || self.kind == GROUP_TYPE
    }
}

/// Container-specific parameters (scene or group `settings`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerSettings {
    #[serde(default)]
    pub custom_size: bool,
    #[serde(default, rename = "cx")]
    pub width: u32,
    #[serde(default, rename = "cy")]
    pub height: u32,
    /// Opaque container-internal counter, preserved verbatim
    #[serde(default)]
    pub id_counter: u64,
    /// `None` when the description has no `items` array at all
    #[serde(default)]
    pub items: Option<Vec<Value>>,
}

impl ContainerSettings {
    /// Read container fields out of a parameter tree; fields of the wrong
    /// shape are treated as absent.
    pub fn from_parameters(parameters: &ParameterTree) -> Self {
        let get_u64 = |key: &str| parameters.get(key).and_then(Value::as_u64).unwrap_or(0);
        Self {
            custom_size: parameters
                .get("custom_size")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            width: u32::try_from(get_u64("cx")).unwrap_or(u32::MAX),
            height: u32::try_from(get_u64("cy")).unwrap_or(u32::MAX),
            id_counter: get_u64("id_counter"),
            items: parameters
                .get("items")
                .and_then(Value::as_array)
                .cloned(),
        }
    }

    /// The synthetic tree handed to the host at construction time. Members are
    /// deliberately left out; they are attached during linking.
    pub fn construction_parameters(&self) -> ParameterTree {
        let mut tree = ParameterTree::new();
        tree.insert("custom_size".into(), Value::Bool(self.custom_size));
        tree.insert("cx".into(), Value::from(self.width));
        tree.insert("cy".into(), Value::from(self.height));
        tree.insert("id_counter".into(), Value::from(self.id_counter));
        tree.insert("items".into(), Value::Array(Vec::new()));
        tree
    }
}

/// Placement metadata of one container member
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(default, rename = "align")]
    pub alignment: Alignment,
    #[serde(default)]
    pub bounds: Vec2,
    #[serde(default, rename = "bounds_align")]
    pub bounds_alignment: Alignment,
    #[serde(default)]
    pub bounds_type: BoundsType,
    #[serde(flatten)]
    pub crop: Crop,
    #[serde(default, rename = "pos")]
    pub position: Vec2,
    /// Degrees
    #[serde(default, rename = "rot")]
    pub rotation: f32,
    #[serde(default = "default_scale")]
    pub scale: Vec2,
    #[serde(default)]
    pub scale_filter: ScaleFilter,
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Only restored by the installation variant
    #[serde(default)]
    pub locked: bool,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            alignment: Alignment::default(),
            bounds: Vec2::default(),
            bounds_alignment: Alignment::default(),
            bounds_type: BoundsType::default(),
            crop: Crop::default(),
            position: Vec2::default(),
            rotation: 0.0,
            scale: default_scale(),
            scale_filter: ScaleFilter::default(),
            visible: true,
            locked: false,
        }
    }
}

/// A container member reference, resolved by name during linking
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneItemRef {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub placement: Placement,
}

impl SceneItemRef {
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(SceneGraftError::document("scene item is not an object"));
        }
        Ok(Self::deserialize(value)?)
    }
}

// ============================================================================
// Document
// ============================================================================

/// The whole serialized description, keyed by top-level list names
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub current_scene: Option<String>,

    #[serde(default)]
    pub sources: Vec<Value>,

    #[serde(default)]
    pub groups: Vec<Value>,

    #[serde(default)]
    pub transitions: Vec<Value>,
}

impl SceneDocument {
    /// Parse a description from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a description from an in-memory JSON tree
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(SceneGraftError::document(
                "top level of a scene description must be an object",
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| SceneGraftError::document(format!("malformed scene description: {}", e)))
    }

    /// Read and parse a description file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Total number of raw entries across every list
    pub fn entry_count(&self) -> usize {
        self.sources.len() + self.groups.len() + self.transitions.len()
    }
}
