// testutil.rs - synthetic worlds and IBSP images for the unit tests

use crate::areaportal::CArea;
use crate::q_shared::{CModel, CPlane, Contents, MapSurface, Vec3, CONTENTS_SOLID};
use crate::qfiles::*;
use crate::world::{CBrush, CBrushSide, CLeaf, CNode, Child, World, WorldData};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An axis-aligned brush for [`box_world_data`].
#[derive(Debug, Clone, Copy)]
pub struct TestBrush {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub contents: Contents,
}

impl TestBrush {
    pub fn new(mins: Vec3, maxs: Vec3, contents: Contents) -> Self {
        Self { mins, maxs, contents }
    }

    pub fn solid(mins: Vec3, maxs: Vec3) -> Self {
        Self::new(mins, maxs, CONTENTS_SOLID)
    }
}

const PLANES_PER_BRUSH: usize = 9;
const NODES_PER_BRUSH: usize = 6;

/// Builds a world of disjoint axis-aligned brushes.
///
/// - leaf 0 is solid (cluster -1, area 0), leaf 1 is the empty outside
///   (cluster 0, area 1), leaf `2 + i` is the inside of brush `i`
///   (cluster 0, area 1);
/// - brush `i` owns planes `9i..9i+9`: six outward sides ordered +x, -x,
///   +y, -y, +z, -z, then positive planes at its mins for the nodes;
/// - brush `i` owns nodes `6i..6i+6`, one per face. Leaving through a face
///   continues at the next brush's first node, or the empty leaf after the
///   last brush. Node 0 is the root.
pub fn box_world_data(brushes: &[TestBrush]) -> WorldData {
    let mut data = WorldData::default();
    let n = brushes.len();

    data.surfaces.push(surface("test/wall"));
    data.leafs.push(CLeaf {
        contents: CONTENTS_SOLID,
        cluster: -1,
        area: 0,
        firstleafbrush: 0,
        numleafbrushes: 0,
    });
    data.leafs.push(CLeaf {
        contents: Contents::empty(),
        cluster: 0,
        area: 1,
        firstleafbrush: 0,
        numleafbrushes: 0,
    });

    let mut world_mins = [0.0f32; 3];
    let mut world_maxs = [0.0f32; 3];

    for (i, brush) in brushes.iter().enumerate() {
        let pbase = i * PLANES_PER_BRUSH;
        for axis in 0..3 {
            let mut normal = [0.0f32; 3];
            normal[axis] = 1.0;
            data.planes.push(CPlane::new(normal, brush.maxs[axis], axis as u8));
            normal[axis] = -1.0;
            data.planes.push(CPlane::new(normal, -brush.mins[axis], 3 + axis as u8));
        }
        for axis in 0..3 {
            let mut normal = [0.0f32; 3];
            normal[axis] = 1.0;
            data.planes.push(CPlane::new(normal, brush.mins[axis], axis as u8));
        }

        let nbase = i * NODES_PER_BRUSH;
        let outside = if i + 1 < n {
            Child::Node((i + 1) * NODES_PER_BRUSH)
        } else {
            Child::Leaf(1)
        };
        for k in 0..NODES_PER_BRUSH {
            let axis = k / 2;
            let inside = if k < 5 {
                Child::Node(nbase + k + 1)
            } else {
                Child::Leaf(2 + i)
            };
            data.nodes.push(if k % 2 == 0 {
                // plane at maxs: in front is outside
                CNode {
                    plane_idx: pbase + axis * 2,
                    children: [outside, inside],
                }
            } else {
                // plane at mins: behind is outside
                CNode {
                    plane_idx: pbase + 6 + axis,
                    children: [inside, outside],
                }
            });
        }

        data.leafs.push(CLeaf {
            contents: brush.contents,
            cluster: 0,
            area: 1,
            firstleafbrush: i,
            numleafbrushes: 1,
        });
        data.leafbrushes.push(i as u16);
        data.brushes.push(CBrush {
            contents: brush.contents,
            firstbrushside: i * 6,
            numsides: 6,
        });
        for s in 0..6 {
            data.brushsides.push(CBrushSide {
                plane_idx: pbase + s,
                surface_idx: Some(0),
            });
        }

        for axis in 0..3 {
            world_mins[axis] = world_mins[axis].min(brush.mins[axis]);
            world_maxs[axis] = world_maxs[axis].max(brush.maxs[axis]);
        }
    }

    data.models.push(CModel {
        mins: world_mins,
        maxs: world_maxs,
        origin: [0.0; 3],
        headnode: 0,
    });
    data.areas = vec![CArea::default(); 2];
    data
}

pub fn box_world(brushes: &[TestBrush]) -> World {
    World::new("test", 0, box_world_data(brushes)).expect("test world")
}

pub fn surface(name: &str) -> MapSurface {
    let mut surf = MapSurface::default();
    let bytes = name.as_bytes();
    let short = bytes.len().min(15);
    surf.c.name[..short].copy_from_slice(&bytes[..short]);
    let long = bytes.len().min(31);
    surf.rname[..long].copy_from_slice(&bytes[..long]);
    surf
}

// ============================================================
// Visibility
// ============================================================

/// Run-length compresses a vis row: zero bytes become `0, count`.
pub fn compress_row(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < row.len() {
        if row[i] != 0 {
            out.push(row[i]);
            i += 1;
            continue;
        }
        let mut rep = 1;
        while i + rep < row.len() && row[i + rep] == 0 && rep < 255 {
            rep += 1;
        }
        out.push(0);
        out.push(rep as u8);
        i += rep;
    }
    out
}

/// A visibility lump with one (pvs, phs) pair of rows per cluster.
pub fn vis_lump(rows: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let header = 4 + rows.len() * 8;
    let mut blob = Vec::new();
    let mut offsets = Vec::new();
    for (pvs, phs) in rows {
        let pvs_ofs = header + blob.len();
        blob.extend(compress_row(pvs));
        let phs_ofs = header + blob.len();
        blob.extend(compress_row(phs));
        offsets.push((pvs_ofs as i32, phs_ofs as i32));
    }

    let mut lump = Vec::with_capacity(header + blob.len());
    lump.extend((rows.len() as i32).to_le_bytes());
    for (pvs, phs) in offsets {
        lump.extend(pvs.to_le_bytes());
        lump.extend(phs.to_le_bytes());
    }
    lump.extend(blob);
    lump
}

// ============================================================
// IBSP serialization
// ============================================================

fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend(v.to_le_bytes());
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend(v.to_le_bytes());
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend(v.to_le_bytes());
}

fn put_i16(out: &mut Vec<u8>, v: i16) {
    out.extend(v.to_le_bytes());
}

fn put_vec3(out: &mut Vec<u8>, v: &Vec3) {
    for c in v {
        put_f32(out, *c);
    }
}

/// Serializes `data` as an IBSP version 38 file. Lumps the collision model
/// does not read are left empty.
pub fn bsp_bytes(data: &WorldData) -> Vec<u8> {
    let mut lumps: Vec<Vec<u8>> = vec![Vec::new(); HEADER_LUMPS];

    let mut ents = data.entity_string.clone().into_bytes();
    ents.push(0);
    lumps[LUMP_ENTITIES] = ents;

    let out = &mut lumps[LUMP_PLANES];
    for p in &data.planes {
        put_vec3(out, &p.normal);
        put_f32(out, p.dist);
        put_i32(out, p.plane_type as i32);
    }

    lumps[LUMP_VISIBILITY] = data.visibility.clone();

    let out = &mut lumps[LUMP_NODES];
    for n in &data.nodes {
        put_i32(out, n.plane_idx as i32);
        put_i32(out, n.children[0].to_raw());
        put_i32(out, n.children[1].to_raw());
        out.extend([0u8; 16]); // mins, maxs, firstface, numfaces
    }

    let out = &mut lumps[LUMP_TEXINFO];
    for s in &data.surfaces {
        out.extend([0u8; 32]); // vecs
        put_i32(out, s.c.flags);
        put_i32(out, s.c.value);
        out.extend(s.rname);
        put_i32(out, -1); // nexttexinfo
    }

    let out = &mut lumps[LUMP_LEAFS];
    for l in &data.leafs {
        put_i32(out, l.contents.bits());
        put_i16(out, l.cluster as i16);
        put_i16(out, l.area as i16);
        out.extend([0u8; 16]); // mins, maxs, leaffaces
        put_u16(out, l.firstleafbrush as u16);
        put_u16(out, l.numleafbrushes as u16);
    }

    let out = &mut lumps[LUMP_LEAFBRUSHES];
    for &b in &data.leafbrushes {
        put_u16(out, b);
    }

    let out = &mut lumps[LUMP_MODELS];
    for m in &data.models {
        put_vec3(out, &m.mins);
        put_vec3(out, &m.maxs);
        put_vec3(out, &m.origin);
        put_i32(out, m.headnode as i32);
        put_i32(out, 0); // firstface
        put_i32(out, 0); // numfaces
    }

    let out = &mut lumps[LUMP_BRUSHES];
    for b in &data.brushes {
        put_i32(out, b.firstbrushside as i32);
        put_i32(out, b.numsides as i32);
        put_i32(out, b.contents.bits());
    }

    let out = &mut lumps[LUMP_BRUSHSIDES];
    for s in &data.brushsides {
        put_u16(out, s.plane_idx as u16);
        put_i16(out, s.surface_idx.map_or(-1, |t| t as i16));
    }

    let out = &mut lumps[LUMP_AREAS];
    for a in &data.areas {
        put_i32(out, a.numareaportals as i32);
        put_i32(out, a.firstareaportal as i32);
    }

    let out = &mut lumps[LUMP_AREAPORTALS];
    for p in &data.areaportals {
        put_i32(out, p.portalnum as i32);
        put_i32(out, p.otherarea as i32);
    }

    let mut file = Vec::new();
    put_i32(&mut file, IDBSPHEADER);
    put_i32(&mut file, BSPVERSION);
    let mut ofs = HEADER_SIZE;
    for lump in &lumps {
        put_i32(&mut file, ofs as i32);
        put_i32(&mut file, lump.len() as i32);
        ofs += lump.len();
    }
    for lump in &lumps {
        file.extend(lump);
    }
    file
}

#[test]
fn test_box_world_layout() {
    let data = box_world_data(&[
        TestBrush::solid([-8.0; 3], [8.0; 3]),
        TestBrush::solid([32.0, -8.0, -8.0], [48.0, 8.0, 8.0]),
    ]);
    assert_eq!(data.planes.len(), 18);
    assert_eq!(data.nodes.len(), 12);
    assert_eq!(data.leafs.len(), 4);
    assert_eq!(data.nodes[5].children, [Child::Leaf(2), Child::Node(6)]);
    assert_eq!(data.nodes[11].children, [Child::Leaf(3), Child::Leaf(1)]);
    assert_eq!(&bsp_bytes(&data)[..4], b"IBSP");
}
