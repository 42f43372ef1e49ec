//! Feasibility regions: where the ZMP may go and where the next foot may land.
//!
//! Both regions are fixed templates expressed in the support-foot frame,
//! rotated by the support yaw and translated to the support position. A
//! polygon is turned into half-planes `D_x x + D_y y <= dc`, one per edge,
//! which requires counter-clockwise winding.

use nalgebra::{DVector, Rotation2, Vector2};

use walkgen_core::config::{FeasibilityConfig, FootGeometry, MIN_POLYGON_AREA, StanceConfig};
use walkgen_core::error::GenerationError;
use walkgen_core::types::{Foot, SupportState};

// ---------------------------------------------------------------------------
// ConvexHull
// ---------------------------------------------------------------------------

/// Convex polygon, vertices in counter-clockwise order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHull {
    vertices: Vec<Vector2<f64>>,
}

impl ConvexHull {
    pub const fn new(vertices: Vec<Vector2<f64>>) -> Self {
        Self { vertices }
    }

    pub fn from_points(points: &[[f64; 2]]) -> Self {
        Self::new(points.iter().map(|[x, y]| Vector2::new(*x, *y)).collect())
    }

    /// Axis-aligned rectangle, counter-clockwise from the lower-left corner.
    pub fn rectangle(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self::new(vec![
            Vector2::new(x_min, y_min),
            Vector2::new(x_max, y_min),
            Vector2::new(x_max, y_max),
            Vector2::new(x_min, y_max),
        ])
    }

    /// Convex hull of a point cloud (monotone chain). Collinear and repeated
    /// points are dropped.
    pub fn hull_of(mut points: Vec<Vector2<f64>>) -> Self {
        points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        points.dedup();
        if points.len() < 3 {
            return Self::new(points);
        }
        let mut hull = half_hull(points.iter());
        hull.extend(half_hull(points.iter().rev()));
        Self::new(hull)
    }

    /// Minkowski combination `(1 - s)·self ⊕ s·other`: the set swept when
    /// every point of `self` moves linearly onto a point of `other`.
    #[must_use]
    pub fn blend(&self, other: &Self, s: f64) -> Self {
        if s <= 0.0 {
            return self.clone();
        }
        if s >= 1.0 {
            return other.clone();
        }
        let sums = self
            .vertices
            .iter()
            .flat_map(|a| other.vertices.iter().map(move |b| a * (1.0 - s) + b * s))
            .collect();
        Self::hull_of(sums)
    }

    pub fn vertices(&self) -> &[Vector2<f64>] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Shoelace area, positive for counter-clockwise order.
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum::<f64>()
            / 2.0
    }

    #[must_use]
    pub fn rotated(&self, angle: f64) -> Self {
        let r = Rotation2::new(angle);
        Self::new(self.vertices.iter().map(|v| r * v).collect())
    }

    #[must_use]
    pub fn translated(&self, x: f64, y: f64) -> Self {
        let offset = Vector2::new(x, y);
        Self::new(self.vertices.iter().map(|v| v + offset).collect())
    }

    /// Reflection across the x axis. The vertex order is reversed so the
    /// polygon stays counter-clockwise.
    #[must_use]
    pub fn mirrored_y(&self) -> Self {
        Self::new(
            self.vertices
                .iter()
                .rev()
                .map(|v| Vector2::new(v.x, -v.y))
                .collect(),
        )
    }

    /// True if `p` is inside or within `tolerance` of every edge.
    pub fn contains(&self, p: &Vector2<f64>, tolerance: f64) -> bool {
        match linearize(self) {
            Ok(c) => (0..c.len()).all(|e| c.dx[e] * p.x + c.dy[e] * p.y <= c.dc[e] + tolerance),
            Err(_) => false,
        }
    }

    /// Signed distance of `p` to the nearest edge line (negative inside).
    pub fn edge_distance(&self, p: &Vector2<f64>) -> f64 {
        let n = self.vertices.len();
        (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                let edge = b - a;
                let normal = Vector2::new(edge.y, -edge.x) / edge.norm();
                normal.dot(&(p - a))
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// One monotone chain of the hull; the last point is left to the other chain.
fn half_hull<'a>(points: impl Iterator<Item = &'a Vector2<f64>>) -> Vec<Vector2<f64>> {
    let mut half: Vec<Vector2<f64>> = Vec::new();
    for p in points {
        while let [.., o, a] = half.as_slice() {
            if (a.x - o.x) * (p.y - o.y) - (a.y - o.y) * (p.x - o.x) > 0.0 {
                break;
            }
            half.pop();
        }
        half.push(*p);
    }
    half.pop();
    half
}

// ---------------------------------------------------------------------------
// Linearization
// ---------------------------------------------------------------------------

/// Half-plane form of a polygon: row `e` reads `dx[e] x + dy[e] y <= dc[e]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraints {
    pub dx: DVector<f64>,
    pub dy: DVector<f64>,
    pub dc: DVector<f64>,
}

impl LinearConstraints {
    pub fn len(&self) -> usize {
        self.dc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dc.is_empty()
    }
}

/// One inequality per edge `v_i -> v_{i+1}`:
/// `D_x = y_{i+1} - y_i`, `D_y = -(x_{i+1} - x_i)`, `dc = D_x x_i + D_y y_i`.
///
/// Fails on a collapsed polygon rather than returning meaningless rows.
pub fn linearize(hull: &ConvexHull) -> Result<LinearConstraints, GenerationError> {
    let area = hull.signed_area();
    if hull.len() < 3 || area < MIN_POLYGON_AREA {
        return Err(GenerationError::DegeneratePolygon { area });
    }
    let n = hull.len();
    let mut dx = DVector::zeros(n);
    let mut dy = DVector::zeros(n);
    let mut dc = DVector::zeros(n);
    for i in 0..n {
        let a = hull.vertices[i];
        let b = hull.vertices[(i + 1) % n];
        dx[i] = b.y - a.y;
        dy[i] = -(b.x - a.x);
        dc[i] = dx[i] * a.x + dy[i] * a.y;
    }
    Ok(LinearConstraints { dx, dy, dc })
}

// ---------------------------------------------------------------------------
// FeasibilityRegions
// ---------------------------------------------------------------------------

/// Templates of the ZMP and foot-placement regions.
#[derive(Debug, Clone)]
pub struct FeasibilityRegions {
    single_support: ConvexHull,
    double_support: ConvexHull,
    /// Landing region of a right foot seen from a left support.
    reach_right: ConvexHull,
    /// Landing region of a left foot seen from a right support.
    reach_left: ConvexHull,
}

impl FeasibilityRegions {
    pub fn new(foot: &FootGeometry, feasibility: &FeasibilityConfig, stance: &StanceConfig) -> Self {
        let margin = feasibility.security_margin;
        let back = foot.heel_to_ankle - margin;
        let front = foot.ankle_to_toe() - margin;
        let half_width = foot.sole_width / 2.0 - margin;
        let ds_half_width = stance.half_stance_width + half_width;
        let reach_right = ConvexHull::from_points(&feasibility.foot_reach);
        Self {
            single_support: ConvexHull::rectangle(-back, front, -half_width, half_width),
            double_support: ConvexHull::rectangle(-back, front, -ds_half_width, ds_half_width),
            reach_left: reach_right.mirrored_y(),
            reach_right,
        }
    }

    /// ZMP region of a support phase, rotated by `yaw` and centred on the
    /// support anchor.
    pub fn zmp_polygon(&self, yaw: f64, support: &SupportState) -> ConvexHull {
        self.zmp_local(yaw, support).translated(support.x, support.y)
    }

    /// Same as [`Self::zmp_polygon`] but centred on the origin.
    pub fn zmp_local(&self, yaw: f64, support: &SupportState) -> ConvexHull {
        let template = if support.is_double_support() {
            &self.double_support
        } else {
            &self.single_support
        };
        template.rotated(yaw)
    }

    /// Region where the next foot may land, relative to the support foot of
    /// `support`.
    pub fn foot_reachability_polygon(&self, yaw: f64, support: &SupportState) -> ConvexHull {
        self.reach_local(yaw, support.foot)
            .translated(support.x, support.y)
    }

    /// Landing region for the foot opposite to `support_foot`, centred on the
    /// origin.
    pub fn reach_local(&self, yaw: f64, support_foot: Foot) -> ConvexHull {
        match support_foot {
            Foot::Left => self.reach_right.rotated(yaw),
            Foot::Right => self.reach_left.rotated(yaw),
        }
    }
}
