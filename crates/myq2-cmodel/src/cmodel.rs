// cmodel.rs - the collision model of the currently loaded map
//
// Owns the current world, a few recently unloaded worlds for quick level
// restarts, and the per-caller scratch state (trace epoch stamps and the
// PVS/PHS rows).

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crate::box_hull::BoxHull;
use crate::config::CmodelConfig;
use crate::cvar::CvarContext;
use crate::error::Result;
use crate::loader::load_bsp;
use crate::q_shared::{CModel, Contents, Trace, Vec3};
use crate::trace::TraceContext;
use crate::vis::VisRows;
use crate::world::{Child, World};

#[derive(Debug, Default)]
pub struct CollisionModel {
    config: CmodelConfig,
    world: World,
    /// Most recently unloaded first.
    recent: VecDeque<World>,
    trace_ctx: TraceContext,
    vis_rows: VisRows,
}

impl CollisionModel {
    pub fn new(config: CmodelConfig) -> Self {
        let mut cm = Self {
            config,
            ..Self::default()
        };
        cm.world.area_graph_mut().set_no_areas(config.no_areas);
        cm.vis_rows.fit(&cm.world);
        cm
    }

    pub fn from_cvars(cvars: &mut CvarContext) -> Self {
        Self::new(CmodelConfig::from_cvars(cvars))
    }

    pub fn config(&self) -> &CmodelConfig {
        &self.config
    }

    /// Applies new settings, e.g. after a cvar change.
    pub fn set_config(&mut self, config: CmodelConfig) {
        self.config = config;
        self.world.area_graph_mut().set_no_areas(config.no_areas);
        self.recent.truncate(config.map_cache_size);
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.trace_ctx
    }

    /// Names of the cached worlds, most recent first.
    pub fn cached_maps(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(|w| w.name())
    }

    // ============================================================
    // Map loading
    // ============================================================

    /// Makes `name` the current map and returns its world model and
    /// checksum. `read` is only called when the map is neither current nor
    /// cached. Reloading the current map on the server (`client_load`
    /// false) closes every area portal. An empty name unloads to the null
    /// world. On error the previous map stays current.
    pub fn load_map<F>(&mut self, name: &str, client_load: bool, read: F) -> Result<(CModel, u32)>
    where
        F: FnOnce(&str) -> io::Result<Vec<u8>>,
    {
        if !name.is_empty() && self.world.name() == name {
            if !client_load {
                self.world.area_graph_mut().close_all_portals()?;
            }
            return Ok((self.world_model(), self.world.checksum()));
        }

        let next = if name.is_empty() {
            World::null()
        } else if let Some(mut cached) = self.take_cached(name) {
            log::debug!("{} reused from the map cache", name);
            cached.area_graph_mut().close_all_portals()?;
            cached
        } else {
            let data = read(name)?;
            load_bsp(name, &data, &self.config)?
        };

        let prev = std::mem::replace(&mut self.world, next);
        if !prev.name().is_empty() {
            self.recent.push_front(prev);
            self.recent.truncate(self.config.map_cache_size);
        }

        self.world.area_graph_mut().set_no_areas(self.config.no_areas);
        self.vis_rows.fit(&self.world);
        Ok((self.world_model(), self.world.checksum()))
    }

    fn take_cached(&mut self, name: &str) -> Option<World> {
        let pos = self.recent.iter().position(|w| w.name() == name)?;
        self.recent.remove(pos)
    }

    // ============================================================
    // Current map accessors
    // ============================================================

    pub fn world_model(&self) -> CModel {
        self.world.models().first().copied().unwrap_or_default()
    }

    pub fn inline_model(&self, name: &str) -> Result<CModel> {
        self.world.inline_model(name).copied()
    }

    pub fn num_inline_models(&self) -> usize {
        self.world.num_inline_models()
    }

    pub fn num_clusters(&self) -> usize {
        self.world.num_clusters()
    }

    pub fn entity_string(&self) -> &str {
        self.world.entity_string()
    }

    pub fn leaf_contents(&self, leafnum: usize) -> Result<Contents> {
        self.world.leaf_contents(leafnum)
    }

    pub fn leaf_cluster(&self, leafnum: usize) -> Result<i32> {
        self.world.leaf_cluster(leafnum)
    }

    pub fn leaf_area(&self, leafnum: usize) -> Result<usize> {
        self.world.leaf_area(leafnum)
    }

    pub fn point_leafnum(&self, p: &Vec3) -> usize {
        self.world.point_leafnum(p)
    }

    pub fn box_leafnums(&self, mins: &Vec3, maxs: &Vec3, max_leafs: usize) -> (Vec<usize>, Option<usize>) {
        self.world.box_leafnums(mins, maxs, max_leafs)
    }

    // ============================================================
    // Contents and traces
    // ============================================================

    pub fn point_contents(&self, p: &Vec3, headnode: usize) -> Result<Contents> {
        Ok(self.world.hull(headnode)?.point_contents(p))
    }

    pub fn transformed_point_contents(
        &self,
        p: &Vec3,
        headnode: usize,
        origin: &Vec3,
        angles: &Vec3,
    ) -> Result<Contents> {
        Ok(self.world.hull(headnode)?.transformed_point_contents(p, origin, angles))
    }

    pub fn box_trace(
        &mut self,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        headnode: usize,
        brushmask: Contents,
    ) -> Result<Trace> {
        let hull = self.world.hull(headnode)?;
        Ok(hull.box_trace(&mut self.trace_ctx, start, end, mins, maxs, brushmask))
    }

    pub fn transformed_box_trace(
        &mut self,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        headnode: usize,
        brushmask: Contents,
        origin: &Vec3,
        angles: &Vec3,
    ) -> Result<Trace> {
        let hull = self.world.hull(headnode)?;
        Ok(hull.transformed_box_trace(&mut self.trace_ctx, start, end, mins, maxs, brushmask, origin, angles))
    }

    /// Traces against an entity that has no brush model, represented by its
    /// bounding box `box_mins..box_maxs` in world space.
    pub fn box_trace_against_box(
        &mut self,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        box_mins: &Vec3,
        box_maxs: &Vec3,
        brushmask: Contents,
    ) -> Trace {
        let bh = BoxHull::new(box_mins, box_maxs);
        bh.hull().box_trace(&mut self.trace_ctx, start, end, mins, maxs, brushmask)
    }

    // ============================================================
    // PVS / PHS
    // ============================================================

    /// Decompressed PVS row of `cluster`, valid until the next call.
    pub fn cluster_pvs(&mut self, cluster: i32) -> Result<&[u8]> {
        self.vis_rows.cluster_pvs(&self.world, cluster)
    }

    /// Decompressed PHS row of `cluster`, valid until the next call.
    pub fn cluster_phs(&mut self, cluster: i32) -> Result<&[u8]> {
        self.vis_rows.cluster_phs(&self.world, cluster)
    }

    pub fn headnode_visible(&self, node: Child, visbits: &[u8]) -> bool {
        self.world.headnode_visible(node, visbits)
    }

    // ============================================================
    // Area portals
    // ============================================================

    pub fn set_area_portal_state(&mut self, portalnum: usize, open: bool) -> Result<()> {
        self.world.area_graph_mut().set_area_portal_state(portalnum, open)
    }

    pub fn areas_connected(&self, area1: usize, area2: usize) -> Result<bool> {
        self.world.area_graph().areas_connected(area1, area2)
    }

    pub fn write_area_bits(&self, buffer: &mut [u8], area: usize) -> Result<usize> {
        self.world.area_graph().write_area_bits(buffer, area)
    }

    pub fn write_portal_state<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.world.area_graph().write_portal_state(writer)
    }

    pub fn read_portal_state<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        self.world.area_graph_mut().read_portal_state(reader)
    }
}
