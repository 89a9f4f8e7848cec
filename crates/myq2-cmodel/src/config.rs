// config.rs - typed collision model settings read from cvars

use crate::cvar::{CvarContext, CVAR_ARCHIVE, CVAR_CHEAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmodelConfig {
    /// `map_noareas`: treat every area as connected.
    pub no_areas: bool,
    /// `cm_mapcache`: previously loaded worlds kept for quick reloads.
    pub map_cache_size: usize,
    /// `cm_parallel_lumps`: record count at which lump decoding goes parallel.
    pub parallel_lump_threshold: usize,
}

impl Default for CmodelConfig {
    fn default() -> Self {
        Self {
            no_areas: false,
            map_cache_size: 2,
            parallel_lump_threshold: 64,
        }
    }
}

impl CmodelConfig {
    /// Registers the collision model cvars (keeping any existing values) and
    /// reads them back.
    pub fn from_cvars(cvars: &mut CvarContext) -> Self {
        let defaults = Self::default();
        let no_areas = cvars.get("map_noareas", "0", CVAR_CHEAT).value != 0.0;
        let cache = cvars
            .get("cm_mapcache", &defaults.map_cache_size.to_string(), CVAR_ARCHIVE)
            .value;
        let threshold = cvars
            .get(
                "cm_parallel_lumps",
                &defaults.parallel_lump_threshold.to_string(),
                CVAR_ARCHIVE,
            )
            .value;

        Self {
            no_areas,
            map_cache_size: if cache > 0.0 { cache as usize } else { 0 },
            parallel_lump_threshold: if threshold >= 1.0 { threshold as usize } else { 1 },
        }
    }
}
