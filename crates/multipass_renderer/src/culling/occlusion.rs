//! Software occlusion rasterizer
//!
//! A small CPU depth buffer filled with occluder boxes before a visibility walk. Tree nodes
//! whose bounds are entirely behind the stored occluder depth are skipped together with
//! their subtrees.
//!
//! Depth is NDC `z` (`[-1, 1]`, larger is further). Occluders only write pixels they cover
//! completely, and they write the furthest depth their surface reaches inside that pixel,
//! so the buffer never claims more occlusion than there is.

use std::cmp::Ordering;

use crate::foundation::math::{Mat4, Point3, Vec2, Vec3, Vec4};
use crate::geometry::AABB;

/// Polygons with a smaller projected area (in pixels²) are ignored
pub const MIN_PROJECTED_AREA: f32 = 1.0;

/// Clip-space `w` below which a point counts as behind the viewer
const MIN_CLIP_W: f32 = 1.0e-6;

/// Outward box faces, counter-clockwise seen from outside, indexing [`AABB::corners`]
const BOX_FACES: [[usize; 4]; 6] = [
    [0, 4, 6, 2], // -X
    [1, 3, 7, 5], // +X
    [0, 1, 5, 4], // -Y
    [2, 6, 7, 3], // +Y
    [0, 2, 3, 1], // -Z
    [4, 5, 7, 6], // +Z
];

/// Counters for the last culling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OcclusionStats {
    /// Occluder boxes appended
    pub occluders: u32,
    /// Polygons that reached the rasterizer
    pub polygons_rasterized: u32,
    /// Polygons dropped as degenerate, back-facing or behind the near plane
    pub polygons_skipped: u32,
    /// Queries answered
    pub queries: u32,
    /// Queries that reported "occluded"
    pub occluded: u32,
}

/// Linear depth over the screen: `z(x, y) = origin + dzdx * x + dzdy * y`
#[derive(Debug, Clone, Copy)]
struct DepthPlane {
    origin: f32,
    dzdx: f32,
    dzdy: f32,
}

impl DepthPlane {
    fn flat(depth: f32) -> Self {
        Self { origin: depth, dzdx: 0.0, dzdy: 0.0 }
    }

    /// Plane through the largest triangle of a fan over `points`
    fn from_polygon(points: &[Vec2], depths: &[f32]) -> Option<Self> {
        let mut best: Option<(f32, usize)> = None;
        for k in 1..points.len().saturating_sub(1) {
            let area = cross(points[k] - points[0], points[k + 1] - points[0]).abs();
            if best.map_or(true, |(best_area, _)| area > best_area) {
                best = Some((area, k));
            }
        }
        let (_, k) = best?;

        let (p0, p1, p2) = (points[0], points[k], points[k + 1]);
        let (z0, z1, z2) = (depths[0], depths[k], depths[k + 1]);
        let det = cross(p1 - p0, p2 - p0);
        if det.abs() <= f32::EPSILON {
            return None;
        }
        let dzdx = ((z1 - z0) * (p2.y - p0.y) - (z2 - z0) * (p1.y - p0.y)) / det;
        let dzdy = ((p1.x - p0.x) * (z2 - z0) - (p2.x - p0.x) * (z1 - z0)) / det;
        Some(Self {
            origin: z0 - dzdx * p0.x - dzdy * p0.y,
            dzdx,
            dzdy,
        })
    }

    /// Furthest depth the plane reaches inside the pixel centred at `(x, y)`
    fn max_in_pixel(&self, x: f32, y: f32) -> f32 {
        self.origin + self.dzdx * x + self.dzdy * y + 0.5 * (self.dzdx.abs() + self.dzdy.abs())
    }
}

fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

fn signed_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    (0..n).map(|i| cross(points[i], points[(i + 1) % n])).sum::<f32>() * 0.5
}

/// Clip a convex polygon of homogeneous points against the near plane (`w + z >= 0`)
///
/// Works for any vertex count; an empty result means the polygon is entirely behind.
pub fn clip_polygon_near(polygon: &[Vec4], out: &mut Vec<Vec4>) {
    out.clear();
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let da = a.w + a.z;
        let db = b.w + b.z;

        if da >= 0.0 {
            out.push(a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out.push(a + (b - a) * t);
        }
    }
}

/// Convex hull of screen points, counter-clockwise (monotone chain)
fn convex_hull(points: &mut Vec<Vec2>) -> Vec<Vec2> {
    points.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
    });
    points.dedup();
    if points.len() < 3 {
        return points.clone();
    }

    let mut hull: Vec<Vec2> = Vec::with_capacity(points.len() * 2);
    for pass in 0..2 {
        let start = hull.len();
        let iter: Box<dyn Iterator<Item = &Vec2>> = if pass == 0 {
            Box::new(points.iter())
        } else {
            Box::new(points.iter().rev())
        };
        for p in iter {
            while hull.len() >= start + 2
                && cross(hull[hull.len() - 1] - hull[hull.len() - 2], *p - hull[hull.len() - 2]) <= 0.0
            {
                hull.pop();
            }
            hull.push(*p);
        }
        hull.pop();
    }
    hull
}

/// CPU depth buffer of occluder footprints
#[derive(Debug, Clone)]
pub struct OcclusionRasterizer {
    view_projection: Mat4,
    width: u32,
    height: u32,
    depth: Vec<f32>,
    stats: OcclusionStats,
    clip_scratch: Vec<Vec4>,
}

impl Default for OcclusionRasterizer {
    fn default() -> Self {
        Self::new(128, 128)
    }
}

impl OcclusionRasterizer {
    /// Create a rasterizer with an empty buffer
    pub fn new(width: u32, height: u32) -> Self {
        let mut rasterizer = Self {
            view_projection: Mat4::identity(),
            width: 0,
            height: 0,
            depth: Vec::new(),
            stats: OcclusionStats::default(),
            clip_scratch: Vec::with_capacity(8),
        };
        rasterizer.reset(&Mat4::identity(), width, height);
        rasterizer
    }

    /// Reinitialize for a new view-projection matrix; every pixel becomes unoccluded
    pub fn reset(&mut self, view_projection: &Mat4, width: u32, height: u32) {
        self.view_projection = *view_projection;
        self.width = width.max(1);
        self.height = height.max(1);
        self.depth.clear();
        self.depth.resize((self.width * self.height) as usize, f32::INFINITY);
        self.stats = OcclusionStats::default();
    }

    /// Buffer width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Counters since the last reset
    pub fn stats(&self) -> OcclusionStats {
        self.stats
    }

    /// Stored occluder depth of a pixel (`INFINITY` when uncovered)
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.depth[(y * self.width + x) as usize])
    }

    /// Rasterize an oriented box occluder
    pub fn append_occluder(&mut self, half_extents: Vec3, world_transform: &Mat4) {
        self.stats.occluders += 1;
        let mvp = self.view_projection * world_transform;
        let mirrored = world_transform.fixed_view::<3, 3>(0, 0).determinant() < 0.0;

        let clip: Vec<Vec4> = AABB::from_center_extents(Vec3::zeros(), half_extents)
            .corners()
            .iter()
            .map(|c| mvp * Vec4::new(c.x, c.y, c.z, 1.0))
            .collect();

        // Silhouette of a box fully in front of the near plane, at its furthest depth
        if clip.iter().all(|c| c.w > MIN_CLIP_W && c.w + c.z >= 0.0) {
            let mut screen: Vec<Vec2> = clip.iter().map(|c| self.to_screen(c)).collect();
            let far = clip.iter().map(|c| c.z / c.w).fold(f32::MIN, f32::max);
            let hull = convex_hull(&mut screen);
            self.rasterize_convex(&hull, DepthPlane::flat(far));
        }

        let mut clipped = std::mem::take(&mut self.clip_scratch);
        for face in &BOX_FACES {
            let mut quad = [Vec4::zeros(); 4];
            for (slot, corner) in quad.iter_mut().zip(face) {
                *slot = clip[*corner];
            }
            if mirrored {
                quad.reverse();
            }

            clip_polygon_near(&quad, &mut clipped);
            if clipped.len() < 3 || clipped.iter().any(|c| c.w <= MIN_CLIP_W) {
                self.stats.polygons_skipped += 1;
                continue;
            }

            let screen: Vec<Vec2> = clipped.iter().map(|c| self.to_screen(c)).collect();
            let depths: Vec<f32> = clipped.iter().map(|c| c.z / c.w).collect();
            if signed_area(&screen) < MIN_PROJECTED_AREA {
                self.stats.polygons_skipped += 1;
                continue;
            }
            match DepthPlane::from_polygon(&screen, &depths) {
                Some(plane) => self.rasterize_convex(&screen, plane),
                None => self.stats.polygons_skipped += 1,
            }
        }
        self.clip_scratch = clipped;
    }

    /// Check whether a world-space box is hidden behind already appended occluders
    ///
    /// Returns `true` only if the box lies in front of the near plane, its footprint is on
    /// screen, and every footprint pixel holds an occluder strictly nearer than the box.
    pub fn query_occluder(&mut self, center: Vec3, extents: Vec3) -> bool {
        self.stats.queries += 1;
        let aabb = AABB::from_center_extents(center, extents);

        let mut min = Vec2::repeat(f32::MAX);
        let mut max = Vec2::repeat(f32::MIN);
        let mut nearest = f32::MAX;
        for corner in aabb.corners() {
            let c = self.view_projection * Vec4::new(corner.x, corner.y, corner.z, 1.0);
            if c.w <= MIN_CLIP_W || c.w + c.z < 0.0 {
                return false;
            }
            let p = self.to_screen(&c);
            min = min.inf(&p);
            max = max.sup(&p);
            nearest = nearest.min(c.z / c.w);
        }

        if min.x < 0.0 || min.y < 0.0 || max.x > self.width as f32 || max.y > self.height as f32 {
            return false;
        }

        let x0 = min.x.floor() as u32;
        let y0 = min.y.floor() as u32;
        if x0 >= self.width || y0 >= self.height {
            return false;
        }
        let x1 = (max.x.ceil() as u32).clamp(x0 + 1, self.width);
        let y1 = (max.y.ceil() as u32).clamp(y0 + 1, self.height);

        for y in y0..y1 {
            let row = (y * self.width) as usize;
            if self.depth[row + x0 as usize..row + x1 as usize].iter().any(|d| *d >= nearest) {
                return false;
            }
        }
        self.stats.occluded += 1;
        true
    }

    /// Check whether a world-space point is hidden behind appended occluders
    pub fn is_point_occluded(&self, point: Vec3) -> bool {
        let c = self.view_projection * Point3::from(point).to_homogeneous();
        if c.w <= MIN_CLIP_W || c.w + c.z < 0.0 {
            return false;
        }
        let p = self.to_screen(&c);
        if p.x < 0.0 || p.y < 0.0 {
            return false;
        }
        self.depth_at(p.x as u32, p.y as u32)
            .is_some_and(|d| d < c.z / c.w)
    }

    fn to_screen(&self, clip: &Vec4) -> Vec2 {
        Vec2::new(
            (clip.x / clip.w * 0.5 + 0.5) * self.width as f32,
            (clip.y / clip.w * 0.5 + 0.5) * self.height as f32,
        )
    }

    /// Edge-function scan of a counter-clockwise convex polygon; only pixels the polygon
    /// covers completely are written
    fn rasterize_convex(&mut self, points: &[Vec2], plane: DepthPlane) {
        if points.len() < 3 || signed_area(points) < MIN_PROJECTED_AREA {
            self.stats.polygons_skipped += 1;
            return;
        }
        self.stats.polygons_rasterized += 1;

        let mut min = Vec2::repeat(f32::MAX);
        let mut max = Vec2::repeat(f32::MIN);
        for p in points {
            min = min.inf(p);
            max = max.sup(p);
        }
        let x0 = min.x.floor().max(0.0) as u32;
        let y0 = min.y.floor().max(0.0) as u32;
        let x1 = (max.x.ceil().max(0.0) as u32).min(self.width);
        let y1 = (max.y.ceil().max(0.0) as u32).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        // E(p) = a * p.x + b * p.y + c, positive inside; shrunk so that E >= 0 at a pixel
        // centre means the whole pixel square is inside the edge
        let n = points.len();
        let mut a = Vec::with_capacity(n);
        let mut b = Vec::with_capacity(n);
        let mut row_start = Vec::with_capacity(n);
        let start = Vec2::new(x0 as f32 + 0.5, y0 as f32 + 0.5);
        for i in 0..n {
            let p = points[i];
            let q = points[(i + 1) % n];
            let ea = -(q.y - p.y);
            let eb = q.x - p.x;
            let ec = -(ea * p.x + eb * p.y) - 0.5 * (ea.abs() + eb.abs());
            a.push(ea);
            b.push(eb);
            row_start.push(ea * start.x + eb * start.y + ec);
        }

        let mut edges = vec![0.0_f32; n];
        for y in y0..y1 {
            edges.copy_from_slice(&row_start);
            let row = (y * self.width) as usize;
            let cy = y as f32 + 0.5;
            for x in x0..x1 {
                if edges.iter().all(|e| *e >= 0.0) {
                    let depth = plane.max_in_pixel(x as f32 + 0.5, cy);
                    let slot = &mut self.depth[row + x as usize];
                    *slot = slot.min(depth);
                }
                for (e, step) in edges.iter_mut().zip(&a) {
                    *e += step;
                }
            }
            for (e, step) in row_start.iter_mut().zip(&b) {
                *e += step;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;

    fn view_projection() -> Mat4 {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y());
        projection * view
    }

    fn rasterizer_with_wall() -> OcclusionRasterizer {
        let mut rasterizer = OcclusionRasterizer::new(64, 64);
        rasterizer.reset(&view_projection(), 64, 64);
        // 8x8 wall, 0.2 thick, 5 units in front of the camera
        rasterizer.append_occluder(
            Vec3::new(4.0, 4.0, 0.1),
            &Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0)),
        );
        rasterizer
    }

    #[test]
    fn test_reset_clears_buffer() {
        let mut rasterizer = rasterizer_with_wall();
        assert!(rasterizer.depth_at(32, 32).is_some_and(f32::is_finite));

        rasterizer.reset(&view_projection(), 16, 8);
        assert_eq!(rasterizer.width(), 16);
        assert_eq!(rasterizer.depth_at(8, 4), Some(f32::INFINITY));
        assert_eq!(rasterizer.depth_at(16, 0), None);
    }

    #[test]
    fn test_box_behind_wall_is_occluded() {
        let mut rasterizer = rasterizer_with_wall();
        assert!(rasterizer.query_occluder(Vec3::new(0.0, 0.0, -10.0), Vec3::repeat(0.5)));
        assert!(rasterizer.is_point_occluded(Vec3::new(0.0, 0.0, -10.0)));
    }

    #[test]
    fn test_box_in_front_of_wall_is_visible() {
        let mut rasterizer = rasterizer_with_wall();
        assert!(!rasterizer.query_occluder(Vec3::new(0.0, 0.0, -3.0), Vec3::repeat(0.5)));
    }

    #[test]
    fn test_box_intersecting_wall_is_visible() {
        let mut rasterizer = rasterizer_with_wall();
        assert!(!rasterizer.query_occluder(Vec3::new(0.0, 0.0, -5.0), Vec3::repeat(0.5)));
    }

    #[test]
    fn test_box_peeking_past_wall_edge_is_visible() {
        let mut rasterizer = rasterizer_with_wall();
        // Behind the wall but sticking out past its right edge
        assert!(!rasterizer.query_occluder(Vec3::new(7.0, 0.0, -10.0), Vec3::repeat(1.0)));
    }

    #[test]
    fn test_box_crossing_near_plane_is_never_occluded() {
        let mut rasterizer = rasterizer_with_wall();
        assert!(!rasterizer.query_occluder(Vec3::zeros(), Vec3::repeat(1.0)));
    }

    #[test]
    fn test_empty_buffer_occludes_nothing() {
        let mut rasterizer = OcclusionRasterizer::new(32, 32);
        rasterizer.reset(&view_projection(), 32, 32);
        assert!(!rasterizer.query_occluder(Vec3::new(0.0, 0.0, -10.0), Vec3::repeat(0.5)));
    }

    #[test]
    fn test_edge_on_occluder_contributes_nothing() {
        let mut rasterizer = OcclusionRasterizer::new(32, 32);
        rasterizer.reset(&view_projection(), 32, 32);
        // Zero-thickness plate seen exactly edge-on
        rasterizer.append_occluder(
            Vec3::new(0.0, 4.0, 4.0),
            &Mat4::new_translation(&Vec3::new(0.0, 0.0, -10.0)),
        );
        assert!(rasterizer.depth.iter().all(|d| d.is_infinite()));
        assert!(!rasterizer.query_occluder(Vec3::new(0.0, 0.0, -20.0), Vec3::repeat(0.1)));
    }

    #[test]
    fn test_occluder_straddling_near_plane_is_clipped() {
        let mut rasterizer = OcclusionRasterizer::new(32, 32);
        rasterizer.reset(&view_projection(), 32, 32);
        // Floor slab under the camera reaching behind it
        rasterizer.append_occluder(
            Vec3::new(50.0, 1.0, 35.0),
            &Mat4::new_translation(&Vec3::new(0.0, -2.0, -25.0)),
        );
        assert!(rasterizer.stats().polygons_rasterized > 0);
        assert!(rasterizer.depth.iter().all(|d| !d.is_nan()));
        // Below the floor, seen through it
        assert!(rasterizer.query_occluder(Vec3::new(0.0, -5.0, -20.0), Vec3::repeat(0.5)));
        // Above the floor
        assert!(!rasterizer.query_occluder(Vec3::new(0.0, 1.0, -20.0), Vec3::repeat(0.5)));
    }

    #[test]
    fn test_clip_polygon_near_interpolates_crossing() {
        let mut out = Vec::new();
        // One vertex behind (w + z < 0), two in front
        let triangle = [
            Vec4::new(0.0, 0.0, -2.0, 1.0),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
            Vec4::new(0.0, 1.0, 0.0, 1.0),
        ];
        clip_polygon_near(&triangle, &mut out);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|v| v.w + v.z >= -1.0e-6));

        let behind = [Vec4::new(0.0, 0.0, -2.0, 1.0); 4];
        clip_polygon_near(&behind, &mut out);
        assert!(out.is_empty());
    }
}
