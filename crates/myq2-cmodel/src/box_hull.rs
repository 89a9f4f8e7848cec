// box_hull.rs - synthetic six-plane BSP tree for an axis-aligned box
//
// Entities without a brush model (monsters, players, items) are clipped
// against by building a tiny tree around their bounding box, so the regular
// trace and point-contents code can run against them unchanged.

use crate::hull::Hull;
use crate::q_shared::{CPlane, Contents, Vec3, CONTENTS_MONSTER};
use crate::world::{CBrush, CBrushSide, CLeaf, CNode, Child};

const BOX_EMPTY_LEAF: usize = 0;
const BOX_SOLID_LEAF: usize = 1;

/// Leaf and brush contents of every box hull.
pub const BOX_CONTENTS: Contents = CONTENTS_MONSTER;

#[derive(Debug, Clone)]
pub struct BoxHull {
    planes: [CPlane; 12],
    nodes: [CNode; 6],
    leafs: [CLeaf; 2],
    leafbrushes: [u16; 1],
    brushes: [CBrush; 1],
    brushsides: [CBrushSide; 6],
}

impl BoxHull {
    /// Builds the hull for `mins..maxs`. Plane `2i` is the positive-normal
    /// plane tested by node `i`; plane `2i + 1` is its flipped twin, used
    /// by the outward-facing brush sides.
    pub fn new(mins: &Vec3, maxs: &Vec3) -> Self {
        let mut planes = [CPlane::default(); 12];
        let mut nodes = [CNode {
            plane_idx: 0,
            children: [Child::Leaf(BOX_EMPTY_LEAF); 2],
        }; 6];
        let mut brushsides = [CBrushSide::default(); 6];

        for i in 0..6 {
            let axis = i >> 1;
            let side = i & 1;
            let dist = if side == 0 { maxs[axis] } else { mins[axis] };

            let mut normal = [0.0f32; 3];
            normal[axis] = 1.0;
            planes[i * 2] = CPlane::new(normal, dist, axis as u8);
            normal[axis] = -1.0;
            planes[i * 2 + 1] = CPlane::new(normal, -dist, 3 + axis as u8);

            brushsides[i] = CBrushSide {
                plane_idx: i * 2 + side,
                surface_idx: None,
            };

            // outside of this face is empty, inside chains to the next face
            nodes[i].plane_idx = i * 2;
            nodes[i].children[side] = Child::Leaf(BOX_EMPTY_LEAF);
            nodes[i].children[side ^ 1] = if i != 5 {
                Child::Node(i + 1)
            } else {
                Child::Leaf(BOX_SOLID_LEAF)
            };
        }

        Self {
            planes,
            nodes,
            leafs: [
                CLeaf {
                    cluster: -1,
                    ..CLeaf::default()
                },
                CLeaf {
                    contents: BOX_CONTENTS,
                    cluster: -1,
                    area: 0,
                    firstleafbrush: 0,
                    numleafbrushes: 1,
                },
            ],
            leafbrushes: [0],
            brushes: [CBrush {
                contents: BOX_CONTENTS,
                firstbrushside: 0,
                numsides: 6,
            }],
            brushsides,
        }
    }

    pub fn planes(&self) -> &[CPlane; 12] {
        &self.planes
    }

    pub fn hull(&self) -> Hull<'_> {
        Hull {
            planes: &self.planes,
            nodes: &self.nodes,
            leafs: &self.leafs,
            leafbrushes: &self.leafbrushes,
            brushes: &self.brushes,
            brushsides: &self.brushsides,
            surfaces: &[],
            headnode: Child::Node(0),
            is_box: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceContext;
    use crate::q_shared::{Contents, CONTENTS_SOLID};

    #[test]
    fn test_plane_distances() {
        let bh = BoxHull::new(&[-32.0, -32.0, -24.0], &[32.0, 32.0, 40.0]);
        let dists: Vec<f32> = bh.planes().iter().map(|p| p.dist).collect();
        assert_eq!(
            dists,
            vec![32.0, -32.0, -32.0, 32.0, 32.0, -32.0, -32.0, 32.0, 40.0, -40.0, -24.0, 24.0]
        );
    }

    #[test]
    fn test_plane_types_and_normals() {
        let bh = BoxHull::new(&[-1.0; 3], &[1.0; 3]);
        for (i, plane) in bh.planes().iter().enumerate() {
            let axis = i / 4;
            if i % 2 == 0 {
                assert_eq!(plane.plane_type as usize, axis);
                assert_eq!(plane.normal[axis], 1.0);
            } else {
                assert_eq!(plane.plane_type as usize, 3 + axis);
                assert_eq!(plane.normal[axis], -1.0);
                assert_eq!(plane.signbits, 1 << axis);
            }
        }
    }

    #[test]
    fn test_brush_sides_face_outward() {
        let mins = [-10.0, -20.0, -30.0];
        let maxs = [10.0, 20.0, 30.0];
        let bh = BoxHull::new(&mins, &maxs);
        let hull = bh.hull();
        let center = [0.0; 3];
        for side in hull.brushsides {
            // center of the box is behind every side
            assert!(hull.planes[side.plane_idx].distance(&center) < 0.0);
        }
    }

    #[test]
    fn test_point_contents_inside_and_out() {
        let bh = BoxHull::new(&[-16.0; 3], &[16.0; 3]);
        let hull = bh.hull();
        assert_eq!(hull.point_contents(&[0.0, 0.0, 0.0]), BOX_CONTENTS);
        assert_eq!(hull.point_contents(&[15.0, -15.0, 15.0]), BOX_CONTENTS);
        assert_eq!(hull.point_contents(&[17.0, 0.0, 0.0]), Contents::empty());
        assert_eq!(hull.point_contents(&[0.0, 0.0, -17.0]), Contents::empty());
    }

    #[test]
    fn test_independent_hulls_coexist() {
        let near = BoxHull::new(&[-8.0; 3], &[8.0; 3]);
        let far = BoxHull::new(&[92.0, -8.0, -8.0], &[108.0, 8.0, 8.0]);
        let mut ctx = TraceContext::new();

        let start = [-50.0, 0.0, 0.0];
        let end = [150.0, 0.0, 0.0];
        let t_near = near
            .hull()
            .box_trace(&mut ctx, &start, &end, &[0.0; 3], &[0.0; 3], BOX_CONTENTS);
        let t_far = far
            .hull()
            .box_trace(&mut ctx, &start, &end, &[0.0; 3], &[0.0; 3], BOX_CONTENTS);

        assert!(t_near.fraction < t_far.fraction);
        assert!((t_near.endpos[0] - -8.0).abs() < 0.1);
        assert!((t_far.endpos[0] - 92.0).abs() < 0.1);
    }

    #[test]
    fn test_mask_without_monster_passes_through() {
        let bh = BoxHull::new(&[-1000.0; 3], &[1000.0; 3]);
        let mut ctx = TraceContext::new();
        let trace = bh
            .hull()
            .box_trace(&mut ctx, &[0.0; 3], &[100.0, 0.0, 0.0], &[0.0; 3], &[0.0; 3], CONTENTS_SOLID);
        assert_eq!(trace.fraction, 1.0);
        assert!(!trace.startsolid);
    }
}
