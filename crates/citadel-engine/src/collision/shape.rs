//! Collision shapes and the separating-axis overlap test.
//!
//! Shapes are described in the instance's local frame on the X/Z plane and
//! placed in the world through the owning [`Transform`] each test. All
//! vectors here are ground-plane vectors: `Vec2::x` is world X and `Vec2::y`
//! is world Z.

use citadel_ecs::glam::{Vec2, Vec3};
use citadel_ecs::transform::{Aabb, Transform};
use serde::{Deserialize, Serialize};

/// Local-space collision shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Oriented box given by its centre and half extents along local X and Z.
    Box { center: Vec2, half_extents: Vec2 },
    Circle { center: Vec2, radius: f32 },
}

impl Shape {
    /// Box centred on the instance origin.
    pub fn rect(half_extents: Vec2) -> Self {
        Shape::Box {
            center: Vec2::ZERO,
            half_extents,
        }
    }

    /// Circle centred on the instance origin.
    pub fn circle(radius: f32) -> Self {
        Shape::Circle {
            center: Vec2::ZERO,
            radius,
        }
    }

    /// Place the shape in the world with `transform`.
    ///
    /// Box axes are rotated and scaled from the local half extents. A circle's
    /// radius is scaled by the larger of the X and Z scale factors.
    pub fn to_world(&self, transform: &Transform) -> WorldShape {
        let affine = transform.to_affine();
        let ground = |v: Vec3| Vec2::new(v.x, v.z);
        match *self {
            Shape::Box {
                center,
                half_extents,
            } => WorldShape::Box {
                center: ground(affine.transform_point3(Vec3::new(center.x, 0.0, center.y))),
                axes: [
                    ground(affine.transform_vector3(Vec3::new(half_extents.x, 0.0, 0.0))),
                    ground(affine.transform_vector3(Vec3::new(0.0, 0.0, half_extents.y))),
                ],
            },
            Shape::Circle { center, radius } => WorldShape::Circle {
                center: ground(affine.transform_point3(Vec3::new(center.x, 0.0, center.y))),
                radius: radius * transform.scale.x.abs().max(transform.scale.z.abs()),
            },
        }
    }
}

/// A shape placed in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldShape {
    /// `axes` are the half-extent vectors: the centre plus or minus each axis
    /// reaches the middle of an edge.
    Box { center: Vec2, axes: [Vec2; 2] },
    Circle { center: Vec2, radius: f32 },
}

impl WorldShape {
    pub fn center(&self) -> Vec2 {
        match *self {
            WorldShape::Box { center, .. } | WorldShape::Circle { center, .. } => center,
        }
    }

    /// Radius of a circle enclosing the shape.
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            WorldShape::Box { axes, .. } => axes[0].length() + axes[1].length(),
            WorldShape::Circle { radius, .. } => radius,
        }
    }

    /// The four corners of a box. Circles have none.
    pub fn corners(&self) -> Option<[Vec2; 4]> {
        match *self {
            WorldShape::Box { center, axes: [u, v] } => {
                Some([center + u + v, center - u + v, center - u - v, center + u - v])
            }
            WorldShape::Circle { .. } => None,
        }
    }

    /// Ground-plane extent as an AABB relative to `origin`, flat on Y.
    pub fn bound_relative_to(&self, origin: Vec3) -> Aabb {
        let (min, max) = match *self {
            WorldShape::Box { center, axes: [u, v] } => {
                let reach = u.abs() + v.abs();
                (center - reach, center + reach)
            }
            WorldShape::Circle { center, radius } => (center - Vec2::splat(radius), center + Vec2::splat(radius)),
        };
        Aabb::new(
            Vec3::new(min.x - origin.x, 0.0, min.y - origin.z),
            Vec3::new(max.x - origin.x, 0.0, max.y - origin.z),
        )
    }

    /// Project onto the unit `axis`.
    ///
    /// Boxes project their corners. Circles paired with a box project the
    /// diamond spanned by `diamond` (the box's unit axes); with no diamond
    /// given the projection is the exact circle extent.
    fn project(&self, axis: Vec2, diamond: Option<[Vec2; 2]>) -> (f32, f32) {
        match *self {
            WorldShape::Box { center, axes: [u, v] } => {
                let mid = center.dot(axis);
                let reach = u.dot(axis).abs() + v.dot(axis).abs();
                (mid - reach, mid + reach)
            }
            WorldShape::Circle { center, radius } => {
                let mid = center.dot(axis);
                let reach = match diamond {
                    Some([p, q]) => radius * p.dot(axis).abs().max(q.dot(axis).abs()),
                    None => radius,
                };
                (mid - reach, mid + reach)
            }
        }
    }

    /// Unit edge normals. Degenerate axes are left out.
    fn unit_axes(&self) -> Vec<Vec2> {
        match *self {
            WorldShape::Box { axes, .. } => axes.iter().filter_map(|a| a.try_normalize()).collect(),
            WorldShape::Circle { .. } => Vec::new(),
        }
    }
}

/// Displacement that moves `a` out of `b`, or zero when they do not overlap.
///
/// Runs the separating-axis test over the candidate axes of the pair and
/// returns the smallest per-axis push, signed so that applying it to `a`
/// separates the shapes. Touching shapes count as separated.
pub fn minimal_push(a: &WorldShape, b: &WorldShape) -> Vec2 {
    let reach = a.bounding_radius() + b.bounding_radius();
    if a.center().distance_squared(b.center()) > reach * reach {
        return Vec2::ZERO;
    }

    let (axes, diamond) = match (a, b) {
        (WorldShape::Box { .. }, WorldShape::Box { .. }) => {
            let mut axes = a.unit_axes();
            axes.extend(b.unit_axes());
            (axes, None)
        }
        (WorldShape::Box { .. }, WorldShape::Circle { .. }) => (a.unit_axes(), diamond_of(a)),
        (WorldShape::Circle { .. }, WorldShape::Box { .. }) => (b.unit_axes(), diamond_of(b)),
        (WorldShape::Circle { .. }, WorldShape::Circle { .. }) => {
            let axes = (b.center() - a.center()).try_normalize().into_iter().collect();
            (axes, None)
        }
    };

    let mut best: Option<Vec2> = None;
    for axis in axes {
        let (min_a, max_a) = a.project(axis, diamond);
        let (min_b, max_b) = b.project(axis, diamond);
        let push_pos = max_b - min_a;
        let push_neg = max_a - min_b;
        if push_pos <= 0.0 || push_neg <= 0.0 {
            return Vec2::ZERO;
        }
        let candidate = if push_pos < push_neg {
            axis * push_pos
        } else {
            -axis * push_neg
        };
        if best.map_or(true, |current| candidate.length_squared() < current.length_squared()) {
            best = Some(candidate);
        }
    }
    best.unwrap_or(Vec2::ZERO)
}

fn diamond_of(shape: &WorldShape) -> Option<[Vec2; 2]> {
    match *shape {
        WorldShape::Box { axes: [u, v], .. } => Some([u.normalize_or_zero(), v.normalize_or_zero()]),
        WorldShape::Circle { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_4;

    use citadel_ecs::glam::Quat;

    use super::*;

    const EPS: f32 = 1e-5;

    fn at(x: f32, z: f32) -> Transform {
        Transform::on_ground(x, z)
    }

    fn unit_box(x: f32, z: f32) -> WorldShape {
        Shape::rect(Vec2::ONE).to_world(&at(x, z))
    }

    fn circle(r: f32, x: f32, z: f32) -> WorldShape {
        Shape::circle(r).to_world(&at(x, z))
    }

    #[test]
    fn overlapping_boxes_push_along_shallow_axis() {
        let fixed = unit_box(0.0, 0.0);
        let moving = unit_box(1.5, 0.0);
        let push = minimal_push(&moving, &fixed);
        assert!((push - Vec2::new(0.5, 0.0)).length() < EPS, "push = {push:?}");
    }

    #[test]
    fn separated_circles_give_zero() {
        assert_eq!(minimal_push(&circle(1.0, 0.0, 0.0), &circle(1.0, 3.0, 0.0)), Vec2::ZERO);
    }

    #[test]
    fn touching_shapes_are_separated() {
        assert_eq!(minimal_push(&unit_box(0.0, 0.0), &unit_box(2.0, 0.0)), Vec2::ZERO);
        assert_eq!(minimal_push(&circle(1.0, 0.0, 0.0), &circle(1.0, 0.0, 2.0)), Vec2::ZERO);
    }

    #[test]
    fn circle_pair_pushes_along_centres() {
        let push = minimal_push(&circle(1.0, 0.0, 0.0), &circle(1.0, 1.5, 2.0));
        assert_eq!(push, Vec2::ZERO);

        let push = minimal_push(&circle(1.0, 0.0, 0.0), &circle(1.0, 0.6, 0.8));
        assert!((push - Vec2::new(-0.6, -0.8)).length() < EPS, "push = {push:?}");
    }

    #[test]
    fn coincident_circles_have_no_axis() {
        assert_eq!(minimal_push(&circle(1.0, 2.0, 2.0), &circle(1.0, 2.0, 2.0)), Vec2::ZERO);
    }

    #[test]
    fn box_circle_pushes_circle_out_of_face() {
        let push = minimal_push(&circle(0.5, 1.2, 0.0), &unit_box(0.0, 0.0));
        assert!((push - Vec2::new(0.3, 0.0)).length() < EPS, "push = {push:?}");

        let back = minimal_push(&unit_box(0.0, 0.0), &circle(0.5, 1.2, 0.0));
        assert!((back + push).length() < EPS);
    }

    #[test]
    fn rotated_box_uses_its_own_axes() {
        let rotated = Shape::rect(Vec2::ONE).to_world(&at(0.0, 0.0).with_rotation(Quat::from_rotation_y(FRAC_PI_4)));
        // A corner of the diamond-shaped box reaches sqrt(2) along X.
        let probe = circle(0.5, 1.8, 0.0);
        let push = minimal_push(&probe, &rotated);
        assert!(push.x > 0.0);
        // Outside the rotated box's reach entirely.
        assert_eq!(minimal_push(&circle(0.1, 1.6, 0.0), &rotated), Vec2::ZERO);
    }

    #[test]
    fn scale_grows_shapes() {
        let t = at(0.0, 0.0).with_scale(Vec3::new(2.0, 1.0, 3.0));
        match Shape::circle(1.0).to_world(&t) {
            WorldShape::Circle { radius, .. } => assert_eq!(radius, 3.0),
            other => panic!("unexpected {other:?}"),
        }
        match Shape::rect(Vec2::ONE).to_world(&t) {
            WorldShape::Box { axes, .. } => {
                assert_eq!(axes[0], Vec2::new(2.0, 0.0));
                assert_eq!(axes[1], Vec2::new(0.0, 3.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn degenerate_box_axis_is_skipped() {
        let flat = Shape::rect(Vec2::new(1.0, 0.0)).to_world(&at(0.0, 0.0));
        assert_eq!(flat.bounding_radius(), 1.0);
        // Only the X axes of the second box remain usable; still a valid push.
        let push = minimal_push(&unit_box(0.5, 0.0), &flat);
        assert!(push.is_finite());
    }

    #[test]
    fn bound_relative_to_origin() {
        let shape = circle(2.0, 10.0, 5.0);
        let bound = shape.bound_relative_to(Vec3::new(10.0, 0.0, 5.0));
        assert_eq!(bound.min, Vec3::new(-2.0, 0.0, -2.0));
        assert_eq!(bound.max, Vec3::new(2.0, 0.0, 2.0));
        assert_eq!(unit_box(0.0, 0.0).corners().map(|c| c.len()), Some(4));
    }
}
