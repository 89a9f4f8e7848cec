// trace.rs - swept box tracing against a hull
//
// A trace walks the BSP tree along the segment, splitting it at every node
// plane the (box-expanded) segment crosses, and clips the box against each
// brush of every leaf it reaches. Brushes are stamped with the trace epoch so
// a brush shared by several leaves is only clipped once.

use crate::hull::Hull;
use crate::q_shared::{
    angle_vectors, dot_product, rotate_into_frame, vector_is_zero, vector_lerp, vector_subtract,
    CPlane, CSurface, Contents, Trace, Vec3,
};
use crate::world::{CBrushSide, Child};

/// Distance kept between the box and a struck plane: 1/32 unit.
pub const DIST_EPSILON: f32 = 0.03125;

/// Leaf cap for the stationary position test.
pub const MAX_POSITION_LEAFS: usize = 1024;

// ============================================================
// Per-caller trace state
// ============================================================

/// Scratch state shared by consecutive traces: the brush epoch stamps, the
/// leaf list of the position test and a couple of counters.
#[derive(Debug, Default)]
pub struct TraceContext {
    checkcount: u32,
    brush_checkcounts: Vec<u32>,
    leaf_list: Vec<usize>,
    pub c_traces: u64,
    pub c_brush_traces: u64,
}

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkcount(&self) -> u32 {
        self.checkcount
    }

    /// Starts a new epoch sized for `numbrushes`.
    fn begin(&mut self, numbrushes: usize) {
        if self.brush_checkcounts.len() < numbrushes {
            self.brush_checkcounts.resize(numbrushes, 0);
        }
        if self.checkcount == u32::MAX {
            log::debug!("trace checkcount wrapped, clearing brush stamps");
            self.brush_checkcounts.fill(0);
            self.checkcount = 0;
        }
        self.checkcount += 1;
        self.c_traces += 1;
    }

    /// Stamps `brush` for this epoch. Returns false if it already was.
    fn stamp(&mut self, brush: usize) -> bool {
        match self.brush_checkcounts.get_mut(brush) {
            Some(stamp) if *stamp == self.checkcount => false,
            Some(stamp) => {
                *stamp = self.checkcount;
                true
            }
            None => false,
        }
    }
}

// ============================================================
// Trace work
// ============================================================

/// Nearest corner of the box along `plane`'s normal.
#[inline]
fn box_offset(plane: &CPlane, mins: &Vec3, maxs: &Vec3) -> f32 {
    let mut ofs = [0.0f32; 3];
    for j in 0..3 {
        ofs[j] = if plane.normal[j] < 0.0 { maxs[j] } else { mins[j] };
    }
    dot_product(&ofs, &plane.normal)
}

struct TraceWork<'h, 'c> {
    hull: Hull<'h>,
    ctx: &'c mut TraceContext,
    contents: Contents,
    start: Vec3,
    end: Vec3,
    mins: Vec3,
    maxs: Vec3,
    extents: Vec3,
    ispoint: bool,
    trace: Trace,
}

impl<'h> TraceWork<'h, '_> {
    fn clip_box_to_brush(&mut self, brushnum: usize) {
        let hull = self.hull;
        let Some(brush) = hull.brushes.get(brushnum) else {
            log::warn!("clip_box_to_brush: bad brush {}", brushnum);
            return;
        };
        if brush.numsides == 0 {
            return;
        }
        let first = brush.firstbrushside;
        let Some(sides) = hull.brushsides.get(first..first + brush.numsides) else {
            log::warn!("clip_box_to_brush: brush {} has bad sides", brushnum);
            return;
        };

        self.ctx.c_brush_traces += 1;

        // entering fraction with the plane and side that produced it
        let mut leading: Option<(f32, &CPlane, &CBrushSide)> = None;
        let mut leavefrac = 1.0f32;
        let mut getout = false;
        let mut startout = false;

        for side in sides {
            let Some(plane) = hull.planes.get(side.plane_idx) else {
                log::warn!("clip_box_to_brush: brush {} has bad plane {}", brushnum, side.plane_idx);
                return;
            };

            let dist = if self.ispoint {
                plane.dist
            } else {
                plane.dist - box_offset(plane, &self.mins, &self.maxs)
            };

            let d1 = dot_product(&self.start, &plane.normal) - dist;
            let d2 = dot_product(&self.end, &plane.normal) - dist;

            if d2 > 0.0 {
                getout = true; // endpoint is not in solid
            }
            if d1 > 0.0 {
                startout = true;
            }

            // completely in front of this face, no intersection
            if d1 > 0.0 && d2 >= d1 {
                return;
            }
            if d1 <= 0.0 && d2 <= 0.0 {
                continue;
            }

            if d1 > d2 {
                // entering
                let f = (d1 - DIST_EPSILON) / (d1 - d2);
                if f > leading.map_or(-1.0, |(enterfrac, _, _)| enterfrac) {
                    leading = Some((f, plane, side));
                }
            } else {
                // leaving
                let f = (d1 + DIST_EPSILON) / (d1 - d2);
                if f < leavefrac {
                    leavefrac = f;
                }
            }
        }

        if !startout {
            // original point was inside brush
            self.trace.startsolid = true;
            if !getout {
                self.trace.allsolid = true;
                self.trace.fraction = 0.0;
                self.trace.contents = brush.contents;
            }
            return;
        }

        let Some((enterfrac, plane, side)) = leading else {
            return;
        };
        if enterfrac < leavefrac && enterfrac < self.trace.fraction {
            self.trace.fraction = enterfrac.max(0.0);
            self.trace.plane = Some(*plane);
            self.trace.surface = Some(
                side.surface_idx
                    .and_then(|s| hull.surfaces.get(s))
                    .map_or_else(CSurface::default, |s| s.c.clone()),
            );
            self.trace.contents = brush.contents;
        }
    }

    fn test_box_in_brush(&mut self, brushnum: usize) {
        let hull = self.hull;
        let Some(brush) = hull.brushes.get(brushnum) else {
            return;
        };
        if brush.numsides == 0 {
            return;
        }
        let first = brush.firstbrushside;
        let Some(sides) = hull.brushsides.get(first..first + brush.numsides) else {
            return;
        };

        for side in sides {
            let Some(plane) = hull.planes.get(side.plane_idx) else {
                return;
            };
            let dist = plane.dist - box_offset(plane, &self.mins, &self.maxs);
            let d1 = dot_product(&self.start, &plane.normal) - dist;

            // if completely in front of face, no intersection
            if d1 > 0.0 {
                return;
            }
        }

        // inside this brush
        self.trace.startsolid = true;
        self.trace.allsolid = true;
        self.trace.fraction = 0.0;
        self.trace.contents = brush.contents;
    }

    /// Leaf brush indices of `leafnum`, or nothing when the leaf contents
    /// miss the trace mask.
    fn leaf_brush_list(&self, leafnum: usize) -> &'h [u16] {
        let hull = self.hull;
        let Some(leaf) = hull.leafs.get(leafnum) else {
            log::warn!("trace: bad leaf {}", leafnum);
            return &[];
        };
        if !leaf.contents.intersects(self.contents) {
            return &[];
        }
        let first = leaf.firstleafbrush;
        match hull.leafbrushes.get(first..first + leaf.numleafbrushes) {
            Some(list) => list,
            None => {
                log::warn!("trace: leaf {} has bad leafbrush range", leafnum);
                &[]
            }
        }
    }

    /// Stamps the brush and reports whether it still needs testing.
    fn wants_brush(&mut self, brushnum: usize) -> bool {
        if !self.ctx.stamp(brushnum) {
            return false; // already checked this brush in another leaf
        }
        self.hull
            .brushes
            .get(brushnum)
            .is_some_and(|b| b.contents.intersects(self.contents))
    }

    fn trace_to_leaf(&mut self, leafnum: usize) {
        for &brushnum in self.leaf_brush_list(leafnum) {
            let brushnum = brushnum as usize;
            if !self.wants_brush(brushnum) {
                continue;
            }
            self.clip_box_to_brush(brushnum);
            if self.trace.fraction == 0.0 {
                return;
            }
        }
    }

    fn test_in_leaf(&mut self, leafnum: usize) {
        for &brushnum in self.leaf_brush_list(leafnum) {
            let brushnum = brushnum as usize;
            if !self.wants_brush(brushnum) {
                continue;
            }
            self.test_box_in_brush(brushnum);
            if self.trace.fraction == 0.0 {
                return;
            }
        }
    }

    fn recursive_hull_check(&mut self, num: Child, p1f: f32, p2f: f32, p1: &Vec3, p2: &Vec3) {
        if self.trace.fraction <= p1f {
            return; // already hit something nearer
        }

        let nodenum = match num {
            Child::Leaf(leaf) => return self.trace_to_leaf(leaf),
            Child::Node(n) => n,
        };

        let hull = self.hull;
        let Some(node) = hull.nodes.get(nodenum) else {
            log::warn!("trace: bad node {}", nodenum);
            return;
        };
        let Some(plane) = hull.planes.get(node.plane_idx) else {
            log::warn!("trace: node {} has bad plane {}", nodenum, node.plane_idx);
            return;
        };

        // find the point distances to the separating plane and the offset
        // for the size of the box
        let (t1, t2, offset) = if plane.is_axial() {
            let t = plane.plane_type as usize;
            (p1[t] - plane.dist, p2[t] - plane.dist, self.extents[t])
        } else {
            let offset = if self.ispoint {
                0.0
            } else {
                (self.extents[0] * plane.normal[0]).abs()
                    + (self.extents[1] * plane.normal[1]).abs()
                    + (self.extents[2] * plane.normal[2]).abs()
            };
            (plane.distance(p1), plane.distance(p2), offset)
        };

        // see which sides we need to consider
        if t1 >= offset && t2 >= offset {
            return self.recursive_hull_check(node.children[0], p1f, p2f, p1, p2);
        }
        if t1 < -offset && t2 < -offset {
            return self.recursive_hull_check(node.children[1], p1f, p2f, p1, p2);
        }

        // put the crosspoint DIST_EPSILON pixels on the near side
        let (side, frac, frac2) = if t1 < t2 {
            let idist = 1.0 / (t1 - t2);
            (
                1,
                (t1 - offset + DIST_EPSILON) * idist,
                (t1 + offset + DIST_EPSILON) * idist,
            )
        } else if t1 > t2 {
            let idist = 1.0 / (t1 - t2);
            (
                0,
                (t1 + offset + DIST_EPSILON) * idist,
                (t1 - offset - DIST_EPSILON) * idist,
            )
        } else {
            (0, 1.0, 0.0)
        };
        let frac = frac.clamp(0.0, 1.0);
        let frac2 = frac2.clamp(0.0, 1.0);

        // move up to the node
        let midf = p1f + (p2f - p1f) * frac;
        let mid = vector_lerp(p1, p2, frac);
        self.recursive_hull_check(node.children[side], p1f, midf, p1, &mid);

        // go past the node
        let midf2 = p1f + (p2f - p1f) * frac2;
        let mid2 = vector_lerp(p1, p2, frac2);
        self.recursive_hull_check(node.children[side ^ 1], midf2, p2f, &mid2, p2);
    }
}

// ============================================================
// Public trace entry points
// ============================================================

impl Hull<'_> {
    /// Sweeps the box `mins..maxs` from `start` to `end` through this hull,
    /// stopping at the first brush whose contents intersect `brushmask`.
    pub fn box_trace(
        &self,
        ctx: &mut TraceContext,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        brushmask: Contents,
    ) -> Trace {
        ctx.begin(self.brushes.len());

        // fill in a default trace
        let mut trace = Trace {
            endpos: *end,
            ..Trace::default()
        };
        if self.nodes.is_empty() {
            return trace; // map not loaded
        }

        let ispoint = vector_is_zero(mins) && vector_is_zero(maxs);
        let extents = if ispoint {
            [0.0; 3]
        } else {
            [
                (-mins[0]).max(maxs[0]),
                (-mins[1]).max(maxs[1]),
                (-mins[2]).max(maxs[2]),
            ]
        };

        let mut work = TraceWork {
            hull: *self,
            ctx,
            contents: brushmask,
            start: *start,
            end: *end,
            mins: *mins,
            maxs: *maxs,
            extents,
            ispoint,
            trace: Trace::default(),
        };

        // position test special case
        if start == end {
            let c1 = [start[0] + mins[0] - 1.0, start[1] + mins[1] - 1.0, start[2] + mins[2] - 1.0];
            let c2 = [start[0] + maxs[0] + 1.0, start[1] + maxs[1] + 1.0, start[2] + maxs[2] + 1.0];

            let mut leafs = std::mem::take(&mut work.ctx.leaf_list);
            leafs.clear();
            self.box_leafnums(&c1, &c2, &mut leafs, MAX_POSITION_LEAFS);
            for &leafnum in &leafs {
                work.test_in_leaf(leafnum);
                if work.trace.allsolid {
                    break;
                }
            }
            work.ctx.leaf_list = leafs;

            trace = work.trace;
            trace.endpos = *start;
            return trace;
        }

        work.recursive_hull_check(self.headnode, 0.0, 1.0, start, end);

        trace = work.trace;
        trace.endpos = if trace.fraction == 1.0 {
            *end
        } else {
            vector_lerp(start, end, trace.fraction)
        };
        trace
    }

    /// [`Hull::box_trace`] against a brush model placed at `origin` and
    /// rotated by `angles`. The struck plane normal and the end position are
    /// returned in world space. Box hulls are never rotated.
    pub fn transformed_box_trace(
        &self,
        ctx: &mut TraceContext,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        brushmask: Contents,
        origin: &Vec3,
        angles: &Vec3,
    ) -> Trace {
        // subtract origin offset
        let mut start_l = vector_subtract(start, origin);
        let mut end_l = vector_subtract(end, origin);

        // rotate start and end into the model's frame of reference
        let rotated = !self.is_box && !vector_is_zero(angles);
        if rotated {
            let (forward, right, up) = angle_vectors(angles);
            start_l = rotate_into_frame(&start_l, &forward, &right, &up);
            end_l = rotate_into_frame(&end_l, &forward, &right, &up);
        }

        let mut trace = self.box_trace(ctx, &start_l, &end_l, mins, maxs, brushmask);

        if rotated && trace.fraction != 1.0 {
            let back = [-angles[0], -angles[1], -angles[2]];
            let (forward, right, up) = angle_vectors(&back);
            if let Some(plane) = trace.plane.as_mut() {
                plane.normal = rotate_into_frame(&plane.normal, &forward, &right, &up);
            }
        }

        trace.endpos = vector_lerp(start, end, trace.fraction);
        trace
    }
}
