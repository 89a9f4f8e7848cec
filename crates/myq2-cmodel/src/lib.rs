#![allow(clippy::too_many_arguments, clippy::float_cmp, clippy::needless_range_loop,
         clippy::manual_range_contains)]

pub mod q_shared;
pub mod qfiles;
pub mod error;
pub mod cvar;
pub mod config;
pub mod areaportal;
pub mod vis;
pub mod world;
pub mod hull;
pub mod box_hull;
pub mod trace;
pub mod loader;
pub mod cmodel;

#[cfg(test)]
mod testutil;

pub use box_hull::{BoxHull, BOX_CONTENTS};
pub use cmodel::CollisionModel;
pub use config::CmodelConfig;
pub use error::{CmError, ErrorKind, Result};
pub use hull::Hull;
pub use loader::{block_checksum, load_bsp, parse_bsp};
pub use q_shared::{CModel, CPlane, CSurface, Contents, Trace, Vec3};
pub use trace::{TraceContext, DIST_EPSILON};
pub use vis::{decompress_vis, VisRows};
pub use world::{Child, World, WorldData};
