//! Static map geometry.
//!
//! Each map has a bounding box and a set of solids. Geometry is validated
//! once on registration and then shared read-only between instances through
//! [`MapRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::math::{closest_point_on_segment, Aabb, Vec2, LENGTH_EPSILON};

/// Overlap between a circle and a solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Unit direction that moves the circle out of the solid.
    pub normal: Vec2,
    /// Distance to move along `normal`.
    pub depth: f32,
}

/// A simple polygon given by its vertices in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Vertices, either winding.
    pub points: Vec<Vec2>,
}

impl Polygon {
    /// Create a polygon from vertices.
    #[must_use]
    pub fn new(points: Vec<Vec2>) -> Self {
        Self { points }
    }

    /// Signed area (positive for counter-clockwise winding in a y-up frame).
    #[must_use]
    pub fn signed_area(&self) -> f32 {
        let n = self.points.len();
        let mut sum = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            sum += a.perp_dot(b);
        }
        sum * 0.5
    }

    /// Even-odd point containment.
    #[must_use]
    pub fn contains(&self, p: Vec2) -> bool {
        let n = self.points.len();
        let mut inside = false;
        let mut j = n.wrapping_sub(1);
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[j];
            if (a.y > p.y) != (b.y > p.y) {
                let x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Closest point on the polygon's boundary.
    #[must_use]
    pub fn closest_boundary_point(&self, p: Vec2) -> Option<Vec2> {
        let n = self.points.len();
        (0..n)
            .map(|i| closest_point_on_segment(p, self.points[i], self.points[(i + 1) % n]))
            .min_by(|a, b| a.distance_squared(p).total_cmp(&b.distance_squared(p)))
    }

    fn centroid(&self) -> Vec2 {
        let n = self.points.len().max(1) as f32;
        let sum = self.points.iter().fold(Vec2::ZERO, |acc, &p| acc + p);
        sum * (1.0 / n)
    }
}

/// An immovable obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Solid {
    /// Axis-aligned rectangle.
    Rect(Aabb),
    /// Circle.
    Circle {
        /// Centre.
        center: Vec2,
        /// Radius.
        radius: f32,
    },
    /// Polygon outline.
    Polygon(Polygon),
}

impl Solid {
    /// Rectangle from top-left corner and size, as map files describe them.
    #[must_use]
    pub fn rect(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::Rect(Aabb::from_origin_size(x, y, w, h))
    }

    /// Describe why this solid is degenerate, if it is.
    #[must_use]
    pub fn validation_error(&self) -> Option<String> {
        match self {
            Self::Rect(aabb) => {
                let size = aabb.size();
                if !aabb.is_valid() || size.x <= 0.0 || size.y <= 0.0 {
                    return Some(format!("rect has non-positive size {}x{}", size.x, size.y));
                }
            }
            Self::Circle { center, radius } => {
                if !center.is_finite() || !radius.is_finite() || *radius <= 0.0 {
                    return Some(format!("circle has invalid radius {radius}"));
                }
            }
            Self::Polygon(poly) => {
                if poly.points.len() < 3 {
                    return Some(format!(
                        "polygon needs at least 3 vertices, got {}",
                        poly.points.len()
                    ));
                }
                if poly.points.iter().any(|p| !p.is_finite()) {
                    return Some("polygon has non-finite vertex".to_string());
                }
                if poly.signed_area().abs() <= LENGTH_EPSILON {
                    return Some("polygon has zero area".to_string());
                }
            }
        }
        None
    }

    /// How far a circle at `center` with `radius` overlaps this solid.
    #[must_use]
    pub fn penetration(&self, center: Vec2, radius: f32) -> Option<Penetration> {
        match self {
            Self::Circle {
                center: c,
                radius: r,
            } => {
                let delta = center - *c;
                let reach = radius + r;
                let dist_sq = delta.length_squared();
                if dist_sq >= reach * reach {
                    return None;
                }
                let dist = dist_sq.sqrt();
                let normal = delta.try_normalize().unwrap_or(Vec2::X);
                Some(Penetration {
                    normal,
                    depth: reach - dist,
                })
            }
            Self::Rect(aabb) => {
                let closest = aabb.clamp(center);
                let delta = center - closest;
                if delta.is_near_zero() {
                    // Centre inside: leave through the nearest face.
                    let faces = [
                        (center.x - aabb.min.x, Vec2::new(-1.0, 0.0)),
                        (aabb.max.x - center.x, Vec2::new(1.0, 0.0)),
                        (center.y - aabb.min.y, Vec2::new(0.0, -1.0)),
                        (aabb.max.y - center.y, Vec2::new(0.0, 1.0)),
                    ];
                    let (dist, normal) = faces
                        .into_iter()
                        .min_by(|a, b| a.0.total_cmp(&b.0))
                        .unwrap_or((0.0, Vec2::X));
                    return Some(Penetration {
                        normal,
                        depth: dist + radius,
                    });
                }
                let dist_sq = delta.length_squared();
                if dist_sq >= radius * radius {
                    return None;
                }
                let dist = dist_sq.sqrt();
                Some(Penetration {
                    normal: delta * (1.0 / dist),
                    depth: radius - dist,
                })
            }
            Self::Polygon(poly) => {
                let closest = poly.closest_boundary_point(center)?;
                let delta = center - closest;
                let dist = delta.length();
                if poly.contains(center) {
                    let normal = (closest - center)
                        .try_normalize()
                        .or_else(|| (center - poly.centroid()).try_normalize())
                        .unwrap_or(Vec2::X);
                    return Some(Penetration {
                        normal,
                        depth: dist + radius,
                    });
                }
                if dist >= radius {
                    return None;
                }
                let normal = delta
                    .try_normalize()
                    .or_else(|| (center - poly.centroid()).try_normalize())
                    .unwrap_or(Vec2::X);
                Some(Penetration {
                    normal,
                    depth: radius - dist,
                })
            }
        }
    }
}

/// Bounds and solids of one map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapGeometry {
    /// Walkable area.
    pub bounds: Aabb,
    /// Static obstacles.
    #[serde(default)]
    pub solids: Vec<Solid>,
}

impl MapGeometry {
    /// Geometry with bounds and no solids.
    #[must_use]
    pub fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            solids: Vec::new(),
        }
    }

    /// Add a solid.
    #[must_use]
    pub fn with_solid(mut self, solid: Solid) -> Self {
        self.solids.push(solid);
        self
    }

    /// Area a collider centre may occupy: the bounds deflated by its
    /// half extents.
    #[must_use]
    pub fn walkable(&self, hx: f32, hy: f32) -> Aabb {
        self.bounds.deflate(hx, hy)
    }

    /// True when a circle overlaps any solid.
    #[must_use]
    pub fn overlaps(&self, center: Vec2, radius: f32) -> bool {
        self.solids
            .iter()
            .any(|s| s.penetration(center, radius).is_some())
    }

    /// Deepest overlap of a circle against all solids.
    #[must_use]
    pub fn deepest_penetration(&self, center: Vec2, radius: f32) -> Option<Penetration> {
        self.solids
            .iter()
            .filter_map(|s| s.penetration(center, radius))
            .max_by(|a, b| a.depth.total_cmp(&b.depth))
    }

    /// Validate bounds and drop degenerate solids. Returns how many solids
    /// were dropped.
    fn sanitize(&mut self, map_id: &str) -> Result<usize> {
        let size = self.bounds.size();
        if !self.bounds.is_valid() || size.x <= 0.0 || size.y <= 0.0 {
            return Err(CoreError::InvalidGeometry {
                map_id: map_id.to_string(),
                message: format!("bounds must have positive size, got {}x{}", size.x, size.y),
            });
        }
        let before = self.solids.len();
        self.solids.retain(|solid| match solid.validation_error() {
            Some(reason) => {
                tracing::warn!(map = map_id, %reason, "rejected degenerate solid");
                false
            }
            None => true,
        });
        Ok(before - self.solids.len())
    }
}

/// Geometry of every known map, keyed by map id.
#[derive(Debug, Clone, Default)]
pub struct MapRegistry {
    maps: HashMap<String, Arc<MapGeometry>>,
}

impl MapRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store geometry for a map, replacing any previous entry.
    ///
    /// Degenerate solids are dropped with a warning; invalid bounds are an
    /// error. Returns the number of dropped solids.
    pub fn register(&mut self, map_id: impl Into<String>, mut geometry: MapGeometry) -> Result<usize> {
        let map_id = map_id.into();
        let dropped = geometry.sanitize(&map_id)?;
        tracing::info!(
            map = %map_id,
            solids = geometry.solids.len(),
            dropped,
            "registered map geometry"
        );
        self.maps.insert(map_id, Arc::new(geometry));
        Ok(dropped)
    }

    /// Geometry for a map.
    #[must_use]
    pub fn get(&self, map_id: &str) -> Option<&Arc<MapGeometry>> {
        self.maps.get(map_id)
    }

    /// Check whether a map is registered.
    #[must_use]
    pub fn contains(&self, map_id: &str) -> bool {
        self.maps.contains_key(map_id)
    }

    /// Number of registered maps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// True when no map is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
        ])
    }

    #[test]
    fn test_polygon_contains() {
        let poly = square();
        assert!(poly.contains(Vec2::new(5.0, 5.0)));
        assert!(!poly.contains(Vec2::new(15.0, 5.0)));
        assert!((poly.signed_area().abs() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_rect_penetration_outside() {
        let wall = Solid::rect(100.0, 0.0, 10.0, 100.0);
        let pen = wall.penetration(Vec2::new(95.0, 50.0), 10.0).unwrap();
        assert_eq!(pen.normal, Vec2::new(-1.0, 0.0));
        assert!((pen.depth - 5.0).abs() < 1e-4);
        assert!(wall.penetration(Vec2::new(80.0, 50.0), 10.0).is_none());
    }

    #[test]
    fn test_rect_penetration_centre_inside() {
        let wall = Solid::rect(100.0, 0.0, 10.0, 100.0);
        let pen = wall.penetration(Vec2::new(102.0, 50.0), 5.0).unwrap();
        assert_eq!(pen.normal, Vec2::new(-1.0, 0.0));
        assert!((pen.depth - 7.0).abs() < 1e-4);
    }

    #[test]
    fn test_circle_penetration() {
        let pillar = Solid::Circle {
            center: Vec2::new(0.0, 0.0),
            radius: 10.0,
        };
        let pen = pillar.penetration(Vec2::new(15.0, 0.0), 10.0).unwrap();
        assert_eq!(pen.normal, Vec2::X);
        assert!((pen.depth - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_polygon_penetration_inside_and_outside() {
        let solid = Solid::Polygon(square());
        let inside = solid.penetration(Vec2::new(9.0, 5.0), 2.0).unwrap();
        assert!((inside.normal.x - 1.0).abs() < 1e-4);
        assert!((inside.depth - 3.0).abs() < 1e-4);

        let outside = solid.penetration(Vec2::new(11.0, 5.0), 2.0).unwrap();
        assert!((outside.normal.x - 1.0).abs() < 1e-4);
        assert!((outside.depth - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_register_drops_degenerate_solids() {
        let geometry = MapGeometry::new(Aabb::from_origin_size(0.0, 0.0, 640.0, 640.0))
            .with_solid(Solid::rect(10.0, 10.0, 0.0, 5.0))
            .with_solid(Solid::Polygon(Polygon::new(vec![Vec2::ZERO, Vec2::X])))
            .with_solid(Solid::Polygon(Polygon::new(vec![
                Vec2::ZERO,
                Vec2::X,
                Vec2::new(2.0, 0.0),
            ])))
            .with_solid(Solid::rect(10.0, 10.0, 5.0, 5.0));

        let mut registry = MapRegistry::new();
        assert_eq!(registry.register("m", geometry).unwrap(), 3);
        assert_eq!(registry.get("m").unwrap().solids.len(), 1);
    }

    #[test]
    fn test_register_rejects_bad_bounds() {
        let mut registry = MapRegistry::new();
        let result = registry.register("m", MapGeometry::new(Aabb::from_origin_size(0.0, 0.0, 0.0, 10.0)));
        assert!(matches!(result, Err(CoreError::InvalidGeometry { .. })));
        assert!(registry.is_empty());
    }
}
