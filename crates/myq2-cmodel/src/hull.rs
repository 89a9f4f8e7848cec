// hull.rs - borrowed traversal view over the world or a synthetic box hull

use crate::q_shared::{
    angle_vectors, box_on_plane_side, rotate_into_frame, vector_is_zero, vector_subtract,
    CPlane, Contents, MapSurface, Vec3,
};
use crate::world::{CBrush, CBrushSide, CLeaf, CNode, Child};

/// The arrays a query walks plus the node it starts from. Both the world
/// ([`crate::world::World::hull`]) and [`crate::box_hull::BoxHull`] hand
/// these out, so box and point queries share one traversal.
#[derive(Debug, Clone, Copy)]
pub struct Hull<'a> {
    pub(crate) planes: &'a [CPlane],
    pub(crate) nodes: &'a [CNode],
    pub(crate) leafs: &'a [CLeaf],
    pub(crate) leafbrushes: &'a [u16],
    pub(crate) brushes: &'a [CBrush],
    pub(crate) brushsides: &'a [CBrushSide],
    pub(crate) surfaces: &'a [MapSurface],
    pub(crate) headnode: Child,
    pub(crate) is_box: bool,
}

impl<'a> Hull<'a> {
    pub fn headnode(&self) -> Child {
        self.headnode
    }

    /// True for box hulls, which are never rotated by the transformed
    /// queries.
    pub fn is_box(&self) -> bool {
        self.is_box
    }

    pub fn leaf(&self, leafnum: usize) -> Option<&'a CLeaf> {
        self.leafs.get(leafnum)
    }

    // ============================================================
    // Point queries
    // ============================================================

    pub fn point_leafnum(&self, p: &Vec3) -> usize {
        let mut num = self.headnode;
        loop {
            let nodenum = match num {
                Child::Leaf(leaf) => return leaf,
                Child::Node(n) => n,
            };
            let Some(node) = self.nodes.get(nodenum) else {
                log::warn!("point_leafnum: bad node {}", nodenum);
                return 0;
            };
            let Some(plane) = self.planes.get(node.plane_idx) else {
                log::warn!("point_leafnum: node {} has bad plane {}", nodenum, node.plane_idx);
                return 0;
            };

            num = if plane.distance(p) < 0.0 {
                node.children[1]
            } else {
                node.children[0]
            };
        }
    }

    pub fn point_contents(&self, p: &Vec3) -> Contents {
        let leafnum = self.point_leafnum(p);
        self.leafs
            .get(leafnum)
            .map_or(Contents::empty(), |leaf| leaf.contents)
    }

    /// Point contents for a brush model that may be translated and rotated.
    pub fn transformed_point_contents(&self, p: &Vec3, origin: &Vec3, angles: &Vec3) -> Contents {
        let mut p_l = vector_subtract(p, origin);

        if !self.is_box && !vector_is_zero(angles) {
            let (forward, right, up) = angle_vectors(angles);
            p_l = rotate_into_frame(&p_l, &forward, &right, &up);
        }

        self.point_contents(&p_l)
    }

    // ============================================================
    // Box leaf enumeration
    // ============================================================

    /// Appends up to `max_leafs` leaves touched by the box to `list` and
    /// returns the first node that split the box, if any.
    pub fn box_leafnums(
        &self,
        mins: &Vec3,
        maxs: &Vec3,
        list: &mut Vec<usize>,
        max_leafs: usize,
    ) -> Option<usize> {
        let mut topnode = None;
        self.box_leafnums_r(self.headnode, mins, maxs, list, max_leafs, &mut topnode);
        topnode
    }

    fn box_leafnums_r(
        &self,
        mut num: Child,
        mins: &Vec3,
        maxs: &Vec3,
        list: &mut Vec<usize>,
        max_leafs: usize,
        topnode: &mut Option<usize>,
    ) {
        loop {
            let nodenum = match num {
                Child::Leaf(leaf) => {
                    if list.len() < max_leafs {
                        list.push(leaf);
                    }
                    return;
                }
                Child::Node(n) => n,
            };

            let Some(node) = self.nodes.get(nodenum) else {
                log::warn!("box_leafnums: bad node {}", nodenum);
                return;
            };
            let Some(plane) = self.planes.get(node.plane_idx) else {
                log::warn!("box_leafnums: node {} has bad plane {}", nodenum, node.plane_idx);
                return;
            };

            match box_on_plane_side(mins, maxs, plane) {
                1 => num = node.children[0],
                2 => num = node.children[1],
                _ => {
                    // go down both
                    if topnode.is_none() {
                        *topnode = Some(nodenum);
                    }
                    self.box_leafnums_r(node.children[0], mins, maxs, list, max_leafs, topnode);
                    num = node.children[1];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::box_hull::BoxHull;
    use crate::q_shared::{CONTENTS_MONSTER, CONTENTS_WATER};
    use crate::testutil::{box_world, TestBrush};

    #[test]
    fn test_point_contents_water_and_above() {
        let world = box_world(&[TestBrush::new(
            [-64.0, -64.0, 0.0],
            [64.0, 64.0, 64.0],
            CONTENTS_WATER,
        )]);
        let hull = world.hull(0).unwrap();

        assert!(hull.point_contents(&[10.0, -20.0, 32.0]).contains(CONTENTS_WATER));
        assert_eq!(hull.point_contents(&[10.0, -20.0, 96.0]), Contents::empty());
    }

    #[test]
    fn test_transformed_point_contents_translates() {
        let world = box_world(&[TestBrush::solid([-8.0; 3], [8.0; 3])]);
        let hull = world.hull(0).unwrap();
        let origin = [100.0, 0.0, 0.0];

        assert_eq!(
            hull.transformed_point_contents(&[104.0, 0.0, 0.0], &origin, &[0.0; 3]),
            Contents::SOLID
        );
        assert_eq!(
            hull.transformed_point_contents(&[4.0, 0.0, 0.0], &origin, &[0.0; 3]),
            Contents::empty()
        );
    }

    #[test]
    fn test_transformed_point_contents_rotates() {
        // long thin brush along x; rotating the model 90 degrees of yaw
        // lays it along y in world space
        let world = box_world(&[TestBrush::solid([-32.0, -4.0, -4.0], [32.0, 4.0, 4.0])]);
        let hull = world.hull(0).unwrap();
        let angles = [0.0, 90.0, 0.0];

        assert_eq!(
            hull.transformed_point_contents(&[0.0, 24.0, 0.0], &[0.0; 3], &angles),
            Contents::SOLID
        );
        assert_eq!(
            hull.transformed_point_contents(&[24.0, 0.0, 0.0], &[0.0; 3], &angles),
            Contents::empty()
        );
    }

    #[test]
    fn test_box_hull_ignores_rotation() {
        let bh = BoxHull::new(&[-16.0; 3], &[16.0; 3]);
        let hull = bh.hull();
        assert!(hull.is_box());
        assert_eq!(
            hull.transformed_point_contents(&[12.0, 0.0, 0.0], &[0.0; 3], &[0.0, 45.0, 0.0]),
            CONTENTS_MONSTER
        );
    }
}
