//! Type-safe attribute types for serialized scene objects
//!
//! The export format stores these values as raw integers. They are mapped onto
//! proper Rust enums here so the rest of the crate gets exhaustive matching.
//! Unknown raw values fall back to the enum default instead of failing the
//! whole entry.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Implements the raw integer conversions used by serde for each coded enum.
macro_rules! raw_conversions {
    ($($ty:ty),+ $(,)?) => {$(
        impl From<i64> for $ty {
            fn from(raw: i64) -> Self {
                <$ty>::iter().find(|v| *v as i64 == raw).unwrap_or_default()
            }
        }

        impl From<$ty> for i64 {
            fn from(value: $ty) -> Self {
                value as i64
            }
        }
    )+};
}

/// Deinterlacing algorithm applied to a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(from = "i64", into = "i64")]
#[strum(serialize_all = "snake_case")]
pub enum DeinterlaceMode {
    #[default]
    Disable = 0,
    Discard = 1,
    Retro = 2,
    Blend = 3,
    #[strum(serialize = "blend_2x")]
    Blend2x = 4,
    Linear = 5,
    #[strum(serialize = "linear_2x")]
    Linear2x = 6,
    Yadif = 7,
    #[strum(serialize = "yadif_2x")]
    Yadif2x = 8,
}

/// Field order used by the deinterlacer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(from = "i64", into = "i64")]
#[strum(serialize_all = "snake_case")]
pub enum DeinterlaceFieldOrder {
    #[default]
    Top = 0,
    Bottom = 1,
}

/// Audio monitoring routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(from = "i64", into = "i64")]
#[strum(serialize_all = "snake_case")]
pub enum MonitoringType {
    #[default]
    None = 0,
    MonitorOnly = 1,
    MonitorAndOutput = 2,
}

/// How a scene item is fitted into its bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(from = "i64", into = "i64")]
#[strum(serialize_all = "snake_case")]
pub enum BoundsType {
    #[default]
    None = 0,
    Stretch = 1,
    ScaleInner = 2,
    ScaleOuter = 3,
    ScaleToWidth = 4,
    ScaleToHeight = 5,
    MaxOnly = 6,
}

/// Sampling filter used when a scene item is scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(from = "i64", into = "i64")]
#[strum(serialize_all = "snake_case")]
pub enum ScaleFilter {
    #[default]
    Disable = 0,
    Point = 1,
    Bicubic = 2,
    Bilinear = 3,
    Lanczos = 4,
    Area = 5,
}

raw_conversions!(
    DeinterlaceMode,
    DeinterlaceFieldOrder,
    MonitoringType,
    BoundsType,
    ScaleFilter,
);

/// Alignment bitmask (center is the absence of every edge bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alignment(pub u32);

impl Alignment {
    pub const CENTER: Self = Self(0);
    pub const LEFT: Self = Self(1 << 0);
    pub const RIGHT: Self = Self(1 << 1);
    pub const TOP: Self = Self(1 << 2);
    pub const BOTTOM: Self = Self(1 << 3);

    /// Returns true if every bit of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Alignment {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Two-component vector as written by the export format (`{"x": .., "y": ..}`)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v }
    }
}

impl From<Vec2> for glam::Vec2 {
    fn from(v: Vec2) -> Self {
        glam::Vec2::new(v.x, v.y)
    }
}

/// Per-edge crop in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Crop {
    #[serde(default, rename = "crop_left")]
    pub left: i32,
    #[serde(default, rename = "crop_right")]
    pub right: i32,
    #[serde(default, rename = "crop_top")]
    pub top: i32,
    #[serde(default, rename = "crop_bottom")]
    pub bottom: i32,
}
