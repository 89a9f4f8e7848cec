// vis.rs - PVS / PHS decompression
//
// The visibility lump holds one run-length compressed bit row per cluster
// for the potentially visible set and one for the potentially hearable set.
// Zero bytes are followed by a repeat count; every other byte is literal.

use crate::error::{CmError, Result};
use crate::qfiles::{DVIS_PHS, DVIS_PVS};
use crate::world::{Child, World};

/// Parsed visibility lump.
#[derive(Debug, Clone, Default)]
pub struct VisData {
    numclusters: usize,
    /// bitofs[cluster][DVIS_PVS | DVIS_PHS], relative to the lump start
    bitofs: Vec<[usize; 2]>,
    data: Vec<u8>,
}

fn read_i32(data: &[u8], ofs: usize) -> Option<i32> {
    let bytes = data.get(ofs..ofs + 4)?;
    Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl VisData {
    /// Parses the raw lump. An empty lump means the map has no vis.
    pub fn from_lump(lump: &[u8]) -> Result<Self> {
        if lump.is_empty() {
            return Ok(Self::default());
        }
        let numclusters = read_i32(lump, 0).ok_or(CmError::FunnyLumpSize { lump: "visibility" })?;
        if numclusters < 0 {
            return Err(CmError::bad_index("visibility", 0, "cluster count", numclusters as i64));
        }
        let numclusters = numclusters as usize;
        if 4 + numclusters.saturating_mul(8) > lump.len() {
            return Err(CmError::FunnyLumpSize { lump: "visibility" });
        }

        let mut bitofs = Vec::with_capacity(numclusters);
        for i in 0..numclusters {
            let mut ofs = [0usize; 2];
            for (which, slot) in ofs.iter_mut().enumerate() {
                let raw = read_i32(lump, 4 + i * 8 + which * 4).unwrap_or(0);
                if raw < 0 || raw as usize > lump.len() {
                    return Err(CmError::bad_index("cluster", i, "visibility offset", raw as i64));
                }
                *slot = raw as usize;
            }
            bitofs.push(ofs);
        }

        Ok(Self {
            numclusters,
            bitofs,
            data: lump.to_vec(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn numclusters(&self) -> usize {
        self.numclusters
    }

    /// Compressed row for `cluster`, or None when it has no vis data.
    fn compressed_row(&self, cluster: usize, which: usize) -> Option<&[u8]> {
        let ofs = self.bitofs.get(cluster)?[which];
        if ofs == 0 {
            return None;
        }
        self.data.get(ofs..)
    }
}

/// Expands one compressed row into `out`. Input that ends early leaves the
/// rest of the row zero; a zero run longer than the row is cut short.
pub fn decompress_vis(input: &[u8], out: &mut [u8]) {
    out.fill(0);
    let row = out.len();
    let mut out_p = 0;
    let mut inp = 0;

    while out_p < row {
        let Some(&b) = input.get(inp) else {
            break;
        };
        if b != 0 {
            out[out_p] = b;
            out_p += 1;
            inp += 1;
            continue;
        }

        let Some(&count) = input.get(inp + 1) else {
            break;
        };
        inp += 2;
        let mut c = count as usize;
        if out_p + c > row {
            c = row - out_p;
            log::warn!("Vis decompression overrun");
        }
        // already zero
        out_p += c;
    }
}

impl World {
    /// Bytes in one decompressed vis row.
    pub fn vis_row_bytes(&self) -> usize {
        (self.num_clusters() + 7) >> 3
    }

    /// Decompresses the PVS (`DVIS_PVS`) or PHS (`DVIS_PHS`) row of
    /// `cluster` into `out` and returns the row length. Cluster -1 gives an
    /// empty row; a map without vis sees everything.
    pub fn cluster_vis(&self, cluster: i32, which: usize, out: &mut [u8]) -> Result<usize> {
        let row = self.vis_row_bytes();
        if cluster < -1 || cluster >= self.num_clusters() as i32 {
            return Err(CmError::BadCluster {
                cluster,
                count: self.num_clusters(),
            });
        }
        if out.len() < row {
            log::warn!("cluster_vis: row buffer of {} bytes, need {}", out.len(), row);
        }
        let n = row.min(out.len());
        let out = &mut out[..n];

        if cluster == -1 {
            out.fill(0);
            return Ok(row);
        }

        match self.vis.compressed_row(cluster as usize, which) {
            Some(input) => decompress_vis(input, out),
            // no vis info, so make all visible
            None => out.fill(0xff),
        }
        Ok(row)
    }

    /// True if any leaf under `node` is in a cluster set in `visbits`.
    pub fn headnode_visible(&self, node: Child, visbits: &[u8]) -> bool {
        let nodenum = match node {
            Child::Leaf(leafnum) => {
                let Some(leaf) = self.leafs.get(leafnum) else {
                    return false;
                };
                if leaf.cluster == -1 {
                    return false;
                }
                let cluster = leaf.cluster as usize;
                return visbits
                    .get(cluster >> 3)
                    .is_some_and(|b| b & (1 << (cluster & 7)) != 0);
            }
            Child::Node(n) => n,
        };

        let Some(node) = self.nodes.get(nodenum) else {
            log::warn!("headnode_visible: bad node {}", nodenum);
            return false;
        };
        self.headnode_visible(node.children[0], visbits)
            || self.headnode_visible(node.children[1], visbits)
    }
}

/// Scratch rows handed out by the PVS/PHS queries.
#[derive(Debug, Clone, Default)]
pub struct VisRows {
    pvsrow: Vec<u8>,
    phsrow: Vec<u8>,
}

impl VisRows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows both rows to hold a full row of `world`.
    pub fn fit(&mut self, world: &World) {
        let needed = (world.num_leafs().max(world.num_clusters()) + 7) >> 3;
        if self.pvsrow.len() < needed {
            self.pvsrow.resize(needed, 0);
            self.phsrow.resize(needed, 0);
        }
    }

    pub fn capacity(&self) -> usize {
        self.pvsrow.len()
    }

    pub fn cluster_pvs(&mut self, world: &World, cluster: i32) -> Result<&[u8]> {
        self.fit(world);
        let row = world.cluster_vis(cluster, DVIS_PVS, &mut self.pvsrow)?;
        Ok(&self.pvsrow[..row])
    }

    pub fn cluster_phs(&mut self, world: &World, cluster: i32) -> Result<&[u8]> {
        self.fit(world);
        let row = world.cluster_vis(cluster, DVIS_PHS, &mut self.phsrow)?;
        Ok(&self.phsrow[..row])
    }
}
