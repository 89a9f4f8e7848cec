// loader.rs - IBSP version 38 lump parsing into a validated World

use md4::{Digest, Md4};
use rayon::prelude::*;

use crate::areaportal::{CArea, CAreaPortal};
use crate::config::CmodelConfig;
use crate::error::{CmError, Result};
use crate::q_shared::{CModel, CPlane, Contents, MapSurface, CONTENTS_SOLID, PLANE_ANYZ};
use crate::qfiles::*;
use crate::world::{CBrush, CBrushSide, CLeaf, CNode, Child, World, WorldData};

/// MD4 digest of `data` folded into 32 bits by XOR of its four words.
pub fn block_checksum(data: &[u8]) -> u32 {
    let digest = Md4::digest(data);
    digest
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0, |acc, w| acc ^ w)
}

// ============================================================
// Byte helpers
// ============================================================

#[inline]
fn read_i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

#[inline]
fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn read_i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn read_f32_le(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn read_vec3(data: &[u8], offset: usize) -> [f32; 3] {
    [
        read_f32_le(data, offset),
        read_f32_le(data, offset + 4),
        read_f32_le(data, offset + 8),
    ]
}

/// Converts an on-disk count or index, rejecting negatives.
fn index(owner: &'static str, owner_index: usize, what: &'static str, raw: i32) -> Result<usize> {
    usize::try_from(raw).map_err(|_| CmError::bad_index(owner, owner_index, what, raw as i64))
}

fn check_count(what: &'static str, count: usize, min: usize, max: usize) -> Result<()> {
    if count < min {
        return Err(CmError::Empty { what });
    }
    if count > max {
        return Err(CmError::TooMany { what, count, max });
    }
    Ok(())
}

// ============================================================
// Raw records
// ============================================================

// Fixed-size records are decoded into these first, in parallel for large
// lumps, then converted and checked sequentially.

#[derive(Clone, Copy)]
struct DPlane {
    normal: [f32; 3],
    dist: f32,
    plane_type: i32,
}

#[derive(Clone, Copy)]
struct DNode {
    planenum: i32,
    children: [i32; 2],
}

#[derive(Clone, Copy)]
struct DLeaf {
    contents: i32,
    cluster: i16,
    area: i16,
    firstleafbrush: u16,
    numleafbrushes: u16,
}

#[derive(Clone, Copy)]
struct DModel {
    mins: [f32; 3],
    maxs: [f32; 3],
    origin: [f32; 3],
    headnode: i32,
}

#[derive(Clone, Copy)]
struct DBrushSide {
    planenum: u16,
    texinfo: i16,
}

struct BspReader<'a> {
    data: &'a [u8],
    lumps: [Lump; HEADER_LUMPS],
    parallel_threshold: usize,
}

impl<'a> BspReader<'a> {
    fn new(name: &str, data: &'a [u8], parallel_threshold: usize) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CmError::Truncated {
                name: name.to_string(),
                len: data.len(),
            });
        }
        if read_i32_le(data, 0) != IDBSPHEADER {
            return Err(CmError::BadIdent {
                name: name.to_string(),
            });
        }
        let version = read_i32_le(data, 4);
        if version != BSPVERSION {
            return Err(CmError::BadVersion {
                name: name.to_string(),
                found: version,
                expected: BSPVERSION,
            });
        }

        let mut lumps = [Lump::default(); HEADER_LUMPS];
        for (i, lump) in lumps.iter_mut().enumerate() {
            let base = 8 + i * 8;
            lump.fileofs = read_i32_le(data, base);
            lump.filelen = read_i32_le(data, base + 4);
        }

        Ok(Self {
            data,
            lumps,
            parallel_threshold: parallel_threshold.max(1),
        })
    }

    fn lump_bytes(&self, idx: usize) -> Result<&'a [u8]> {
        let lump = self.lumps[idx];
        let out_of_range = || CmError::LumpOutOfRange { lump: lump_name(idx) };
        let ofs = usize::try_from(lump.fileofs).map_err(|_| out_of_range())?;
        let len = usize::try_from(lump.filelen).map_err(|_| out_of_range())?;
        self.data.get(ofs..ofs.saturating_add(len)).ok_or_else(out_of_range)
    }

    /// Splits a lump into `stride` byte records and decodes each with
    /// `parse`, going parallel once the record count reaches the threshold.
    fn records<T, F>(&self, idx: usize, stride: usize, parse: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&[u8]) -> T + Sync + Send,
    {
        let bytes = self.lump_bytes(idx)?;
        if bytes.len() % stride != 0 {
            return Err(CmError::FunnyLumpSize { lump: lump_name(idx) });
        }

        let count = bytes.len() / stride;
        if count >= self.parallel_threshold {
            log::debug!("parsing {} {} records in parallel", count, lump_name(idx));
            Ok(bytes.par_chunks_exact(stride).map(parse).collect())
        } else {
            Ok(bytes.chunks_exact(stride).map(parse).collect())
        }
    }

    // ============================================================
    // Lump loaders
    // ============================================================

    fn load_surfaces(&self) -> Result<Vec<MapSurface>> {
        let surfaces = self.records(LUMP_TEXINFO, TEXINFO_SIZE, |rec| {
            let tex = &rec[TEXINFO_TEXTURE_OFS..TEXINFO_TEXTURE_OFS + 32];
            let name_len = tex.iter().position(|&b| b == 0).unwrap_or(32);

            let mut surf = MapSurface::default();
            let short = name_len.min(15);
            surf.c.name[..short].copy_from_slice(&tex[..short]);
            let long = name_len.min(31);
            surf.rname[..long].copy_from_slice(&tex[..long]);
            surf.c.flags = read_i32_le(rec, TEXINFO_FLAGS_OFS);
            surf.c.value = read_i32_le(rec, TEXINFO_VALUE_OFS);
            surf
        })?;
        check_count("surfaces", surfaces.len(), 1, MAX_MAP_TEXINFO)?;
        Ok(surfaces)
    }

    fn load_leafs(&self) -> Result<Vec<CLeaf>> {
        let raw = self.records(LUMP_LEAFS, DLEAF_SIZE, |rec| DLeaf {
            contents: read_i32_le(rec, 0),
            cluster: read_i16_le(rec, 4),
            area: read_i16_le(rec, 6),
            firstleafbrush: read_u16_le(rec, DLEAF_FIRSTLEAFBRUSH_OFS),
            numleafbrushes: read_u16_le(rec, DLEAF_FIRSTLEAFBRUSH_OFS + 2),
        })?;
        check_count("leafs", raw.len(), 1, MAX_MAP_LEAFS)?;

        let leafs = raw
            .iter()
            .enumerate()
            .map(|(i, l)| {
                Ok(CLeaf {
                    contents: Contents::from_bits_retain(l.contents),
                    cluster: l.cluster as i32,
                    area: index("leaf", i, "area", l.area as i32)?,
                    firstleafbrush: l.firstleafbrush as usize,
                    numleafbrushes: l.numleafbrushes as usize,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if leafs[0].contents != CONTENTS_SOLID {
            return Err(CmError::LeafZeroNotSolid);
        }
        if !leafs[1..].iter().any(|l| l.contents.is_empty()) {
            return Err(CmError::NoEmptyLeaf);
        }
        Ok(leafs)
    }

    fn load_leaf_brushes(&self) -> Result<Vec<u16>> {
        let leafbrushes = self.records(LUMP_LEAFBRUSHES, DLEAFBRUSH_SIZE, |rec| read_u16_le(rec, 0))?;
        check_count("leafbrushes", leafbrushes.len(), 1, MAX_MAP_LEAFBRUSHES)?;
        Ok(leafbrushes)
    }

    fn load_planes(&self) -> Result<Vec<CPlane>> {
        let raw = self.records(LUMP_PLANES, DPLANE_SIZE, |rec| DPlane {
            normal: read_vec3(rec, 0),
            dist: read_f32_le(rec, 12),
            plane_type: read_i32_le(rec, 16),
        })?;
        check_count("planes", raw.len(), 1, MAX_MAP_PLANES)?;

        raw.iter()
            .enumerate()
            .map(|(i, p)| {
                let plane_type = u8::try_from(p.plane_type)
                    .ok()
                    .filter(|&t| t <= PLANE_ANYZ)
                    .ok_or_else(|| CmError::bad_index("plane", i, "type", p.plane_type as i64))?;
                Ok(CPlane::new(p.normal, p.dist, plane_type))
            })
            .collect()
    }

    fn load_brushes(&self) -> Result<Vec<CBrush>> {
        let raw = self.records(LUMP_BRUSHES, DBRUSH_SIZE, |rec| {
            [read_i32_le(rec, 0), read_i32_le(rec, 4), read_i32_le(rec, 8)]
        })?;
        check_count("brushes", raw.len(), 0, MAX_MAP_BRUSHES)?;

        raw.iter()
            .enumerate()
            .map(|(i, &[firstside, numsides, contents])| {
                Ok(CBrush {
                    contents: Contents::from_bits_retain(contents),
                    firstbrushside: index("brush", i, "first side", firstside)?,
                    numsides: index("brush", i, "side count", numsides)?,
                })
            })
            .collect()
    }

    fn load_brush_sides(&self, numtexinfo: usize) -> Result<Vec<CBrushSide>> {
        let raw = self.records(LUMP_BRUSHSIDES, DBRUSHSIDE_SIZE, |rec| DBrushSide {
            planenum: read_u16_le(rec, 0),
            texinfo: read_i16_le(rec, 2),
        })?;
        check_count("brushsides", raw.len(), 0, MAX_MAP_BRUSHSIDES)?;

        raw.iter()
            .enumerate()
            .map(|(i, side)| {
                // negative texinfo is the null surface
                let surface_idx = match usize::try_from(side.texinfo) {
                    Ok(t) if t >= numtexinfo => {
                        return Err(CmError::bad_index("brushside", i, "texinfo", t as i64));
                    }
                    Ok(t) => Some(t),
                    Err(_) => None,
                };
                Ok(CBrushSide {
                    plane_idx: side.planenum as usize,
                    surface_idx,
                })
            })
            .collect()
    }

    fn load_submodels(&self) -> Result<Vec<CModel>> {
        let raw = self.records(LUMP_MODELS, DMODEL_SIZE, |rec| DModel {
            mins: read_vec3(rec, 0),
            maxs: read_vec3(rec, 12),
            origin: read_vec3(rec, 24),
            headnode: read_i32_le(rec, 36),
        })?;
        check_count("models", raw.len(), 1, MAX_MAP_MODELS)?;

        raw.iter()
            .enumerate()
            .map(|(i, m)| {
                // spread the bounds for the sake of entity links
                Ok(CModel {
                    mins: m.mins.map(|v| v - 1.0),
                    maxs: m.maxs.map(|v| v + 1.0),
                    origin: m.origin,
                    headnode: index("model", i, "headnode", m.headnode)?,
                })
            })
            .collect()
    }

    fn load_nodes(&self) -> Result<Vec<CNode>> {
        let raw = self.records(LUMP_NODES, DNODE_SIZE, |rec| DNode {
            planenum: read_i32_le(rec, 0),
            children: [read_i32_le(rec, 4), read_i32_le(rec, 8)],
        })?;
        check_count("nodes", raw.len(), 1, MAX_MAP_NODES)?;

        raw.iter()
            .enumerate()
            .map(|(i, n)| {
                Ok(CNode {
                    plane_idx: index("node", i, "plane", n.planenum)?,
                    children: n.children.map(Child::from_raw),
                })
            })
            .collect()
    }

    fn load_areas(&self) -> Result<Vec<CArea>> {
        let raw = self.records(LUMP_AREAS, DAREA_SIZE, |rec| [read_i32_le(rec, 0), read_i32_le(rec, 4)])?;
        check_count("areas", raw.len(), 0, MAX_MAP_AREAS)?;

        raw.iter()
            .enumerate()
            .map(|(i, &[numareaportals, firstareaportal])| {
                Ok(CArea {
                    numareaportals: index("area", i, "portal count", numareaportals)?,
                    firstareaportal: index("area", i, "first portal", firstareaportal)?,
                    floodnum: 0,
                    floodvalid: 0,
                })
            })
            .collect()
    }

    fn load_area_portals(&self) -> Result<Vec<CAreaPortal>> {
        let raw = self.records(LUMP_AREAPORTALS, DAREAPORTAL_SIZE, |rec| {
            [read_i32_le(rec, 0), read_i32_le(rec, 4)]
        })?;
        check_count("areaportals", raw.len(), 0, MAX_MAP_AREAPORTALS)?;

        raw.iter()
            .enumerate()
            .map(|(i, &[portalnum, otherarea])| {
                Ok(CAreaPortal {
                    portalnum: index("areaportal", i, "portalnum", portalnum)?,
                    otherarea: index("areaportal", i, "area", otherarea)?,
                })
            })
            .collect()
    }

    fn load_visibility(&self) -> Result<Vec<u8>> {
        let bytes = self.lump_bytes(LUMP_VISIBILITY)?;
        if bytes.len() > MAX_MAP_VISIBILITY {
            return Err(CmError::TooMany {
                what: "visibility bytes",
                count: bytes.len(),
                max: MAX_MAP_VISIBILITY,
            });
        }
        Ok(bytes.to_vec())
    }

    fn load_entity_string(&self) -> Result<String> {
        let bytes = self.lump_bytes(LUMP_ENTITIES)?;
        if bytes.len() > MAX_MAP_ENTSTRING {
            return Err(CmError::TooMany {
                what: "entity characters",
                count: bytes.len(),
                max: MAX_MAP_ENTSTRING,
            });
        }
        let text = String::from_utf8_lossy(bytes);
        Ok(text.trim_end_matches('\0').to_string())
    }
}

/// Parses just the lumps the collision model needs.
pub fn parse_bsp(name: &str, data: &[u8], config: &CmodelConfig) -> Result<WorldData> {
    let reader = BspReader::new(name, data, config.parallel_lump_threshold)?;

    let surfaces = reader.load_surfaces()?;
    let numtexinfo = surfaces.len();
    Ok(WorldData {
        surfaces,
        leafs: reader.load_leafs()?,
        leafbrushes: reader.load_leaf_brushes()?,
        planes: reader.load_planes()?,
        brushes: reader.load_brushes()?,
        brushsides: reader.load_brush_sides(numtexinfo)?,
        models: reader.load_submodels()?,
        nodes: reader.load_nodes()?,
        areas: reader.load_areas()?,
        areaportals: reader.load_area_portals()?,
        visibility: reader.load_visibility()?,
        entity_string: reader.load_entity_string()?,
    })
}

/// Parses and validates a whole map. Connectivity is flooded with every
/// portal closed.
pub fn load_bsp(name: &str, data: &[u8], config: &CmodelConfig) -> Result<World> {
    let checksum = block_checksum(data);
    let world_data = parse_bsp(name, data, config)?;
    let world = World::new(name, checksum, world_data)?;

    log::info!(
        "loaded {}: {} leafs, {} clusters, {} areas, {} inline models",
        name,
        world.num_leafs(),
        world.num_clusters(),
        world.area_graph().num_areas(),
        world.num_inline_models()
    );
    Ok(world)
}
