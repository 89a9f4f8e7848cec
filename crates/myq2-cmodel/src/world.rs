// world.rs - the loaded BSP structures the collision queries run against

use crate::areaportal::{AreaGraph, CArea, CAreaPortal};
use crate::error::{CmError, Result};
use crate::hull::Hull;
use crate::q_shared::{CModel, CPlane, Contents, MapSurface, Vec3};
use crate::vis::VisData;

// ============================================================
// Runtime structures
// ============================================================

/// One child slot of a node. On disk a negative child `c` encodes leaf
/// `-(c + 1)`; the loader converts once so traversal never re-decodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Node(usize),
    Leaf(usize),
}

impl Child {
    pub fn from_raw(raw: i32) -> Self {
        if raw >= 0 {
            Child::Node(raw as usize)
        } else {
            Child::Leaf((-1 - raw) as usize)
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            Child::Node(n) => n as i32,
            Child::Leaf(l) => -1 - l as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CNode {
    pub plane_idx: usize,
    /// [front, back]
    pub children: [Child; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CLeaf {
    pub contents: Contents,
    /// -1 when the leaf belongs to no cluster
    pub cluster: i32,
    pub area: usize,
    pub firstleafbrush: usize,
    pub numleafbrushes: usize,
}

impl Default for CLeaf {
    fn default() -> Self {
        Self {
            contents: Contents::empty(),
            cluster: 0,
            area: 0,
            firstleafbrush: 0,
            numleafbrushes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CBrush {
    pub contents: Contents,
    pub firstbrushside: usize,
    pub numsides: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CBrushSide {
    pub plane_idx: usize,
    /// Index into the map surfaces; None for the null surface.
    pub surface_idx: Option<usize>,
}

/// Everything a loader hands over. [`World::new`] validates it.
#[derive(Debug, Clone, Default)]
pub struct WorldData {
    pub planes: Vec<CPlane>,
    pub nodes: Vec<CNode>,
    pub leafs: Vec<CLeaf>,
    pub leafbrushes: Vec<u16>,
    pub brushes: Vec<CBrush>,
    pub brushsides: Vec<CBrushSide>,
    pub surfaces: Vec<MapSurface>,
    pub models: Vec<CModel>,
    pub areas: Vec<CArea>,
    pub areaportals: Vec<CAreaPortal>,
    /// Raw visibility lump; empty when the map has no vis.
    pub visibility: Vec<u8>,
    pub entity_string: String,
}

// ============================================================
// World
// ============================================================

#[derive(Debug, Clone)]
pub struct World {
    name: String,
    checksum: u32,

    pub(crate) planes: Vec<CPlane>,
    pub(crate) nodes: Vec<CNode>,
    pub(crate) leafs: Vec<CLeaf>,
    pub(crate) leafbrushes: Vec<u16>,
    pub(crate) brushes: Vec<CBrush>,
    pub(crate) brushsides: Vec<CBrushSide>,
    pub(crate) surfaces: Vec<MapSurface>,
    models: Vec<CModel>,
    pub(crate) vis: VisData,
    entity_string: String,
    pub(crate) areas: AreaGraph,
    numclusters: usize,
}

impl World {
    /// Validates every cross reference once, then floods area connectivity
    /// with all portals closed.
    pub fn new(name: &str, checksum: u32, data: WorldData) -> Result<Self> {
        validate(&data)?;

        let vis = VisData::from_lump(&data.visibility)?;
        let numclusters = if vis.is_empty() {
            data.leafs
                .iter()
                .map(|l| if l.cluster >= 0 { (l.cluster + 1) as usize } else { 0 })
                .max()
                .unwrap_or(0)
        } else {
            vis.numclusters()
        };
        for (i, leaf) in data.leafs.iter().enumerate() {
            if leaf.cluster >= numclusters as i32 {
                return Err(CmError::bad_index("leaf", i, "cluster", leaf.cluster as i64));
            }
        }

        let mut areas = AreaGraph::new(data.areas, data.areaportals)?;
        areas.flood_area_connections()?;

        Ok(Self {
            name: name.to_string(),
            checksum,
            planes: data.planes,
            nodes: data.nodes,
            leafs: data.leafs,
            leafbrushes: data.leafbrushes,
            brushes: data.brushes,
            brushsides: data.brushsides,
            surfaces: data.surfaces,
            models: data.models,
            vis,
            entity_string: data.entity_string,
            areas,
            numclusters,
        })
    }

    /// The state with no map loaded: one empty leaf, one model, one area,
    /// so leaf functions can still be called.
    pub fn null() -> Self {
        Self {
            name: String::new(),
            checksum: 0,
            planes: Vec::new(),
            nodes: Vec::new(),
            leafs: vec![CLeaf::default()],
            leafbrushes: Vec::new(),
            brushes: Vec::new(),
            brushsides: Vec::new(),
            surfaces: Vec::new(),
            models: vec![CModel::default()],
            vis: VisData::default(),
            entity_string: String::new(),
            areas: AreaGraph::single_area(),
            numclusters: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn entity_string(&self) -> &str {
        &self.entity_string
    }

    pub fn num_clusters(&self) -> usize {
        self.numclusters
    }

    pub fn num_leafs(&self) -> usize {
        self.leafs.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_inline_models(&self) -> usize {
        self.models.len()
    }

    pub fn models(&self) -> &[CModel] {
        &self.models
    }

    /// Headnode of the world model.
    pub fn primary_headnode(&self) -> usize {
        self.models.first().map_or(0, |m| m.headnode)
    }

    /// Looks up an inline brush model by its `*N` name.
    pub fn inline_model(&self, name: &str) -> Result<&CModel> {
        let bad = || CmError::BadInlineModel {
            name: name.to_string(),
        };
        let num: usize = name
            .strip_prefix('*')
            .and_then(|n| n.parse().ok())
            .ok_or_else(bad)?;
        if num < 1 || num >= self.models.len() {
            return Err(bad());
        }
        Ok(&self.models[num])
    }

    fn leaf(&self, leafnum: usize) -> Result<&CLeaf> {
        self.leafs.get(leafnum).ok_or(CmError::BadLeaf {
            leaf: leafnum,
            count: self.leafs.len(),
        })
    }

    pub fn leaf_contents(&self, leafnum: usize) -> Result<Contents> {
        Ok(self.leaf(leafnum)?.contents)
    }

    pub fn leaf_cluster(&self, leafnum: usize) -> Result<i32> {
        Ok(self.leaf(leafnum)?.cluster)
    }

    pub fn leaf_area(&self, leafnum: usize) -> Result<usize> {
        Ok(self.leaf(leafnum)?.area)
    }

    pub fn area_graph(&self) -> &AreaGraph {
        &self.areas
    }

    pub fn area_graph_mut(&mut self) -> &mut AreaGraph {
        &mut self.areas
    }

    // ============================================================
    // Hull views
    // ============================================================

    /// A traversal view rooted at `headnode`. A map without nodes answers
    /// every query from its single leaf.
    pub fn hull(&self, headnode: usize) -> Result<Hull<'_>> {
        let head = if self.nodes.is_empty() && headnode == 0 {
            Child::Leaf(0)
        } else if headnode < self.nodes.len() {
            Child::Node(headnode)
        } else {
            return Err(CmError::BadHeadnode {
                headnode,
                count: self.nodes.len(),
            });
        };

        Ok(Hull {
            planes: &self.planes,
            nodes: &self.nodes,
            leafs: &self.leafs,
            leafbrushes: &self.leafbrushes,
            brushes: &self.brushes,
            brushsides: &self.brushsides,
            surfaces: &self.surfaces,
            headnode: head,
            is_box: false,
        })
    }

    fn world_hull(&self) -> Hull<'_> {
        match self.hull(self.primary_headnode()) {
            Ok(hull) => hull,
            Err(_) => Hull {
                planes: &self.planes,
                nodes: &self.nodes,
                leafs: &self.leafs,
                leafbrushes: &self.leafbrushes,
                brushes: &self.brushes,
                brushsides: &self.brushsides,
                surfaces: &self.surfaces,
                headnode: Child::Leaf(0),
                is_box: false,
            },
        }
    }

    // ============================================================
    // Point / leaf queries against the world model
    // ============================================================

    pub fn point_leafnum(&self, p: &Vec3) -> usize {
        if self.planes.is_empty() {
            return 0;
        }
        self.world_hull().point_leafnum(p)
    }

    /// Leaves touched by the box, capped at `max_leafs`, plus the first node
    /// that split the box (None if it never straddled a plane).
    pub fn box_leafnums(&self, mins: &Vec3, maxs: &Vec3, max_leafs: usize) -> (Vec<usize>, Option<usize>) {
        let mut leafs = Vec::with_capacity(max_leafs.min(64));
        let topnode = self.world_hull().box_leafnums(mins, maxs, &mut leafs, max_leafs);
        (leafs, topnode)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::null()
    }
}

// ============================================================
// Load-time validation
// ============================================================

fn check(ok: bool, owner: &'static str, owner_index: usize, what: &'static str, index: usize) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(CmError::bad_index(owner, owner_index, what, index as i64))
    }
}

fn validate(data: &WorldData) -> Result<()> {
    let numplanes = data.planes.len();

    // child nodes always follow their parent, so the tree has no cycles
    for (i, node) in data.nodes.iter().enumerate() {
        check(node.plane_idx < numplanes, "node", i, "plane", node.plane_idx)?;
        for child in node.children {
            match child {
                Child::Node(n) => check(n > i && n < data.nodes.len(), "node", i, "child node", n)?,
                Child::Leaf(l) => check(l < data.leafs.len(), "node", i, "child leaf", l)?,
            }
        }
    }

    for (i, leaf) in data.leafs.iter().enumerate() {
        let end = leaf.firstleafbrush.saturating_add(leaf.numleafbrushes);
        check(end <= data.leafbrushes.len(), "leaf", i, "leafbrush", end)?;
        if !data.areas.is_empty() {
            check(leaf.area < data.areas.len(), "leaf", i, "area", leaf.area)?;
        }
        if leaf.cluster < -1 {
            return Err(CmError::bad_index("leaf", i, "cluster", leaf.cluster as i64));
        }
    }

    for (i, &brush) in data.leafbrushes.iter().enumerate() {
        check((brush as usize) < data.brushes.len(), "leafbrush", i, "brush", brush as usize)?;
    }

    for (i, brush) in data.brushes.iter().enumerate() {
        let end = brush.firstbrushside.saturating_add(brush.numsides);
        check(end <= data.brushsides.len(), "brush", i, "brushside", end)?;
    }

    for (i, side) in data.brushsides.iter().enumerate() {
        check(side.plane_idx < numplanes, "brushside", i, "plane", side.plane_idx)?;
        if let Some(surf) = side.surface_idx {
            check(surf < data.surfaces.len(), "brushside", i, "texinfo", surf)?;
        }
    }

    for (i, model) in data.models.iter().enumerate() {
        let ok = model.headnode < data.nodes.len() || (data.nodes.is_empty() && model.headnode == 0);
        check(ok, "model", i, "headnode", model.headnode)?;
    }

    Ok(())
}
