//! Hitbox definitions.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Geometry of a hit volume, relative to its owner and aim angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HitboxShape {
    /// Oriented rectangle in front of the owner.
    ///
    /// `width` runs across the facing, `height` along it. The centre sits at
    /// `owner + forward * (offset + height / 2)`.
    #[serde(rename_all = "camelCase")]
    Rect {
        /// Extent across the facing direction.
        width: f32,
        /// Extent along the facing direction.
        height: f32,
        /// Gap between the owner and the near edge.
        offset: f32,
    },
    /// Angular wedge centred on the owner.
    #[serde(rename_all = "camelCase")]
    Sector {
        /// Reach in pixels.
        radius: f32,
        /// Full opening angle in degrees.
        arc_degrees: f32,
        /// Total angle the wedge rotates through over its lifetime.
        #[serde(default)]
        sweep_degrees: f32,
    },
}

impl HitboxShape {
    /// Wire name of the shape kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rect { .. } => "rect",
            Self::Sector { .. } => "sector",
        }
    }

    /// Describe the first invalid dimension, if any.
    #[must_use]
    pub fn validation_error(&self) -> Option<String> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        match *self {
            Self::Rect {
                width,
                height,
                offset,
            } => {
                if !positive(width) || !positive(height) {
                    return Some(format!("rect size must be positive, got {width}x{height}"));
                }
                if !offset.is_finite() {
                    return Some("rect offset must be finite".to_string());
                }
            }
            Self::Sector {
                radius,
                arc_degrees,
                sweep_degrees,
            } => {
                if !positive(radius) {
                    return Some(format!("sector radius must be positive, got {radius}"));
                }
                if !positive(arc_degrees) || arc_degrees > 360.0 {
                    return Some(format!("sector arc must be in (0, 360], got {arc_degrees}"));
                }
                if !sweep_degrees.is_finite() || sweep_degrees < 0.0 {
                    return Some(format!("sector sweep must be >= 0, got {sweep_degrees}"));
                }
            }
        }
        None
    }
}

/// A named hitbox definition.
///
/// # Example RON
///
/// ```ron
/// HitboxDef(
///     shape: sector(radius: 128.0, arcDegrees: 100.0, sweepDegrees: 140.0),
///     duration_ms: 400,
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitboxDef {
    /// Geometry.
    pub shape: HitboxShape,
    /// Lifetime in milliseconds.
    pub duration_ms: u64,
}

impl HitboxDef {
    /// The player's default sweeping swing.
    #[must_use]
    pub const fn player_basic_swing() -> Self {
        Self {
            shape: HitboxShape::Sector {
                radius: 128.0,
                arc_degrees: 100.0,
                sweep_degrees: 140.0,
            },
            duration_ms: 400,
        }
    }

    /// A small box directly in front of a mob.
    #[must_use]
    pub const fn enemy_front_box_basic() -> Self {
        Self {
            shape: HitboxShape::Rect {
                width: 48.0,
                height: 32.0,
                offset: 16.0,
            },
            duration_ms: 240,
        }
    }
}

/// Convert degrees to radians.
#[must_use]
pub fn deg_to_rad(degrees: f32) -> f32 {
    degrees * PI / 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defs_are_valid() {
        assert!(HitboxDef::player_basic_swing().shape.validation_error().is_none());
        assert!(HitboxDef::enemy_front_box_basic().shape.validation_error().is_none());
    }

    #[test]
    fn test_rejects_degenerate_shapes() {
        let flat = HitboxShape::Rect {
            width: 0.0,
            height: 10.0,
            offset: 0.0,
        };
        assert!(flat.validation_error().is_some());

        let wide = HitboxShape::Sector {
            radius: 10.0,
            arc_degrees: 400.0,
            sweep_degrees: 0.0,
        };
        assert!(wide.validation_error().is_some());
    }

    #[test]
    fn test_parse_from_ron() {
        let def: HitboxDef = ron::from_str(
            "(shape: rect(width: 48.0, height: 32.0, offset: 16.0), duration_ms: 240)",
        )
        .unwrap();
        assert_eq!(def, HitboxDef::enemy_front_box_basic());
    }
}
