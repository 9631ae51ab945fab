//! Heightfield Mesh Generator
//!
//! Turns a band raster into a closed, printable solid:
//! - two vertices per pixel: bottom at z = 0, top at the band's height
//! - two triangles per 2x2 pixel quad on top (+z) and bottom (-z)
//! - vertical walls along the four perimeter edges
//!
//! Image rows are flipped so row 0 of the image lands at the far (+y) edge,
//! matching a right-handed print bed. Triangles wind counter-clockwise when
//! seen from outside.

use nalgebra::{Point3, Vector3};
use std::io::Write;
use tracing::info;
use crate::bands::BandRaster;
use crate::error::{Result, ColorStackError};

/// Bytes before the first triangle record of a binary STL
pub const STL_HEADER_LEN: usize = 84;
/// Bytes per binary STL triangle record
pub const STL_TRIANGLE_LEN: usize = 50;

/// Squared length under which a face normal is treated as degenerate
const NORMAL_EPSILON: f32 = 1e-12;

#[derive(Debug, Clone, Default)]
pub struct HeightfieldMesh {
    pub vertices: Vec<Point3<f32>>,
    pub triangles: Vec<[u32; 3]>,
}

impl HeightfieldMesh {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn corners(&self, tri: &[u32; 3]) -> [Point3<f32>; 3] {
        tri.map(|i| self.vertices[i as usize])
    }

    /// Unit normal of a triangle; zero vector for degenerate faces
    pub fn face_normal(&self, tri: &[u32; 3]) -> Vector3<f32> {
        let [v0, v1, v2] = self.corners(tri);
        face_normal(v0, v1, v2)
    }

    /// Signed volume by the divergence theorem.
    ///
    /// Positive when every face winds outward.
    pub fn signed_volume(&self) -> f64 {
        self.triangles
            .iter()
            .map(|tri| {
                let [v0, v1, v2] = self.corners(tri).map(|p| p.coords.cast::<f64>());
                v0.dot(&v1.cross(&v2))
            })
            .sum::<f64>()
            / 6.0
    }

    /// Serialize as binary STL
    pub fn write_stl<W: Write>(&self, writer: &mut W) -> Result<()> {
        let triangles: Vec<stl_io::Triangle> = self
            .triangles
            .iter()
            .map(|tri| {
                let [v0, v1, v2] = self.corners(tri);
                let n = face_normal(v0, v1, v2);
                stl_io::Triangle {
                    normal: stl_io::Normal::new([n.x, n.y, n.z]),
                    vertices: [
                        stl_io::Vertex::new([v0.x, v0.y, v0.z]),
                        stl_io::Vertex::new([v1.x, v1.y, v1.z]),
                        stl_io::Vertex::new([v2.x, v2.y, v2.z]),
                    ],
                }
            })
            .collect();

        stl_io::write_stl(writer, triangles.iter())?;
        Ok(())
    }

    pub fn to_stl_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(STL_HEADER_LEN + STL_TRIANGLE_LEN * self.triangle_count());
        self.write_stl(&mut buffer)?;
        Ok(buffer)
    }
}

/// Normalized cross product of two triangle edges.
///
/// A zero-length cross product is divided by 1 instead of its length, so
/// degenerate faces yield a zero normal rather than NaN.
pub fn face_normal(v0: Point3<f32>, v1: Point3<f32>, v2: Point3<f32>) -> Vector3<f32> {
    let n = (v1 - v0).cross(&(v2 - v0));
    let len_sq = n.norm_squared();
    let len = if len_sq > NORMAL_EPSILON { len_sq.sqrt() } else { 1.0 };
    n / len
}

/// Triangle count of a closed heightfield over `width` x `height` pixels
pub fn expected_triangle_count(width: u32, height: u32) -> usize {
    let w = width.saturating_sub(1) as usize;
    let h = height.saturating_sub(1) as usize;
    4 * w * h + 4 * w + 4 * h
}

/// Build the closed heightfield solid for a band raster.
///
/// `heights[band]` is the top z of each band; `width_mm` x `depth_mm` is the
/// physical footprint.
pub fn build_heightfield(
    raster: &BandRaster,
    heights: &[f32],
    width_mm: f32,
    depth_mm: f32,
) -> Result<HeightfieldMesh> {
    let (w, h) = (raster.width(), raster.height());
    if w < 2 || h < 2 {
        return Err(ColorStackError::MeshTooSmall { width: w, height: h });
    }
    for (name, value) in [("width_mm", width_mm), ("depth_mm", depth_mm)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(ColorStackError::InvalidParameter(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
    }
    if let Some(max) = raster.max_band() {
        if max as usize >= heights.len() {
            return Err(ColorStackError::HeightTable {
                band: max as usize,
                len: heights.len(),
            });
        }
    }
    if let Some(bad) = heights.iter().find(|z| !z.is_finite()) {
        return Err(ColorStackError::InvalidParameter(format!(
            "band heights must be finite, got {}",
            bad
        )));
    }

    let dx = width_mm / (w - 1) as f32;
    let dy = depth_mm / (h - 1) as f32;

    // Vertex (i, j) top = 2 * (j * w + i), bottom = top + 1
    let mut vertices = Vec::with_capacity(2 * (w as usize) * (h as usize));
    for j in 0..h {
        for i in 0..w {
            let band = raster.get(i, h - 1 - j) as usize;
            let (x, y) = (i as f32 * dx, j as f32 * dy);
            vertices.push(Point3::new(x, y, heights[band]));
            vertices.push(Point3::new(x, y, 0.0));
        }
    }

    let top = |i: u32, j: u32| 2 * (j * w + i);
    let bottom = |i: u32, j: u32| 2 * (j * w + i) + 1;

    let mut triangles = Vec::with_capacity(expected_triangle_count(w, h));

    // Top and bottom surfaces
    for j in 0..h - 1 {
        for i in 0..w - 1 {
            let (a, b, c, d) = (top(i, j), top(i + 1, j), top(i + 1, j + 1), top(i, j + 1));
            triangles.push([a, b, c]);
            triangles.push([a, c, d]);

            let (a, b, c, d) = (bottom(i, j), bottom(i + 1, j), bottom(i + 1, j + 1), bottom(i, j + 1));
            triangles.push([a, c, b]);
            triangles.push([a, d, c]);
        }
    }

    // Front (y = 0, -y) and back (y = max, +y) walls
    for i in 0..w - 1 {
        let j = 0;
        triangles.push([bottom(i, j), bottom(i + 1, j), top(i + 1, j)]);
        triangles.push([bottom(i, j), top(i + 1, j), top(i, j)]);

        let j = h - 1;
        triangles.push([bottom(i, j), top(i + 1, j), bottom(i + 1, j)]);
        triangles.push([bottom(i, j), top(i, j), top(i + 1, j)]);
    }

    // Left (x = 0, -x) and right (x = max, +x) walls
    for j in 0..h - 1 {
        let i = 0;
        triangles.push([bottom(i, j), top(i, j + 1), bottom(i, j + 1)]);
        triangles.push([bottom(i, j), top(i, j), top(i, j + 1)]);

        let i = w - 1;
        triangles.push([bottom(i, j), bottom(i, j + 1), top(i, j + 1)]);
        triangles.push([bottom(i, j), top(i, j + 1), top(i, j)]);
    }

    info!(
        vertices = vertices.len(),
        triangles = triangles.len(),
        "Built heightfield mesh"
    );

    Ok(HeightfieldMesh { vertices, triangles })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn flat(width: u32, height: u32, band: u8) -> BandRaster {
        BandRaster::new(width, height, vec![band; (width * height) as usize]).unwrap()
    }

    #[test]
    fn test_triangle_count_formula() {
        for (w, h) in [(2, 2), (3, 2), (4, 4), (7, 5)] {
            let mesh = build_heightfield(&flat(w, h, 0), &[1.0], 10.0, 10.0).unwrap();
            assert_eq!(mesh.triangle_count(), expected_triangle_count(w, h));
            assert_eq!(mesh.vertices.len(), (2 * w * h) as usize);
        }
        assert_eq!(expected_triangle_count(4, 4), 4 * 9 + 12 + 12);
    }

    #[test]
    fn test_rejects_degenerate_input() {
        assert!(matches!(
            build_heightfield(&flat(1, 5, 0), &[1.0], 10.0, 10.0),
            Err(ColorStackError::MeshTooSmall { width: 1, height: 5 })
        ));
        assert!(build_heightfield(&flat(5, 1, 0), &[1.0], 10.0, 10.0).is_err());
        assert!(build_heightfield(&flat(3, 3, 0), &[1.0], 0.0, 10.0).is_err());
        assert!(matches!(
            build_heightfield(&flat(3, 3, 2), &[1.0, 2.0], 10.0, 10.0),
            Err(ColorStackError::HeightTable { band: 2, len: 2 })
        ));
    }

    #[test]
    fn test_normals_are_unit_and_outward() {
        let raster = BandRaster::new(3, 3, vec![0, 1, 0, 1, 2, 1, 0, 1, 0]).unwrap();
        let mesh = build_heightfield(&raster, &[0.6, 1.0, 1.4], 20.0, 20.0).unwrap();

        for tri in &mesh.triangles {
            let n = mesh.face_normal(tri);
            assert!((n.norm() - 1.0).abs() < 1e-4, "normal {:?} is not unit length", n);
        }
        // Closed with outward winding
        assert!(mesh.signed_volume() > 0.0);

        // First quad: top faces up, bottom faces down
        assert!(mesh.face_normal(&mesh.triangles[0]).z > 0.0);
        assert!(mesh.face_normal(&mesh.triangles[2]).z < 0.0);
    }

    #[test]
    fn test_flat_slab_volume() {
        let mesh = build_heightfield(&flat(4, 3, 0), &[2.0], 30.0, 20.0).unwrap();
        assert!((mesh.signed_volume() - 30.0 * 20.0 * 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_rows_are_flipped() {
        // Image row 0 (top) is band 1, row 1 is band 0
        let raster = BandRaster::new(2, 2, vec![1, 1, 0, 0]).unwrap();
        let mesh = build_heightfield(&raster, &[1.0, 3.0], 10.0, 10.0).unwrap();
        // Vertex row j = 0 sits at y = 0 and takes the bottom image row
        assert_eq!(mesh.vertices[0], Point3::new(0.0, 0.0, 1.0));
        assert_eq!(mesh.vertices[4], Point3::new(0.0, 10.0, 3.0));
    }

    #[test]
    fn test_degenerate_normal_is_zero() {
        let p = Point3::new(1.0, 1.0, 1.0);
        let n = face_normal(p, p, Point3::new(2.0, 2.0, 2.0));
        assert_eq!(n, Vector3::zeros());
        assert!(n.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_binary_layout() {
        let mesh = build_heightfield(&flat(2, 2, 0), &[0.4], 10.0, 10.0).unwrap();
        let bytes = mesh.to_stl_bytes().unwrap();
        let count = mesh.triangle_count();
        assert_eq!(count, 12);
        assert_eq!(bytes.len(), STL_HEADER_LEN + STL_TRIANGLE_LEN * count);

        let stored = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]);
        assert_eq!(stored as usize, count);

        // First record: normal then first vertex, little-endian f32
        let read_f32 = |at: usize| f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let n = mesh.face_normal(&mesh.triangles[0]);
        assert_eq!(read_f32(84 + 8), n.z);
        assert_eq!(read_f32(84 + 12 + 8), mesh.vertices[mesh.triangles[0][0] as usize].z);
    }

    #[test]
    fn test_stl_reads_back() {
        let raster = BandRaster::new(3, 2, vec![0, 1, 0, 1, 0, 1]).unwrap();
        let mesh = build_heightfield(&raster, &[0.2, 0.6], 15.0, 5.0).unwrap();
        let bytes = mesh.to_stl_bytes().unwrap();

        let indexed = stl_io::read_stl(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(indexed.faces.len(), mesh.triangle_count());
        assert!(indexed.validate().is_ok());
    }
}
