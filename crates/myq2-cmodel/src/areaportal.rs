// areaportal.rs - area connectivity through togglable portals
//
// Areas are flooded into connected components through open portals only.
// Each recompute bumps `floodvalid`, so an area's floodnum only counts when
// its own floodvalid matches the graph's.

use std::io::{Read, Write};

use crate::error::{CmError, Result};
use crate::qfiles::MAX_MAP_AREAPORTALS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CArea {
    pub numareaportals: usize,
    pub firstareaportal: usize,
    /// if two areas have equal floodnums, they are connected
    pub floodnum: i32,
    pub floodvalid: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CAreaPortal {
    /// Index into the open/closed array; both sides of a portal share it.
    pub portalnum: usize,
    pub otherarea: usize,
}

#[derive(Debug, Clone)]
pub struct AreaGraph {
    areas: Vec<CArea>,
    portals: Vec<CAreaPortal>,
    portal_open: Vec<bool>,
    floodvalid: u32,
    no_areas: bool,
}

impl AreaGraph {
    /// Builds the graph with every portal closed. Connectivity is not
    /// computed until [`AreaGraph::flood_area_connections`].
    pub fn new(areas: Vec<CArea>, portals: Vec<CAreaPortal>) -> Result<Self> {
        for (i, area) in areas.iter().enumerate() {
            let end = area.firstareaportal.saturating_add(area.numareaportals);
            if end > portals.len() {
                return Err(CmError::bad_index("area", i, "areaportal", end as i64));
            }
        }
        for (i, portal) in portals.iter().enumerate() {
            if portal.otherarea >= areas.len() {
                return Err(CmError::bad_index("areaportal", i, "area", portal.otherarea as i64));
            }
            if portal.portalnum >= MAX_MAP_AREAPORTALS {
                return Err(CmError::bad_index("areaportal", i, "portalnum", portal.portalnum as i64));
            }
        }

        Ok(Self {
            areas,
            portals,
            portal_open: vec![false; MAX_MAP_AREAPORTALS],
            floodvalid: 0,
            no_areas: false,
        })
    }

    /// The graph of an unloaded map: just area 0.
    pub fn single_area() -> Self {
        Self {
            areas: vec![CArea::default()],
            portals: Vec::new(),
            portal_open: vec![false; MAX_MAP_AREAPORTALS],
            floodvalid: 0,
            no_areas: false,
        }
    }

    pub fn num_areas(&self) -> usize {
        self.areas.len()
    }

    pub fn num_portals(&self) -> usize {
        self.portals.len()
    }

    pub fn floodnum(&self, area: usize) -> Option<i32> {
        self.areas.get(area).map(|a| a.floodnum)
    }

    pub fn is_portal_open(&self, portalnum: usize) -> bool {
        self.portal_open.get(portalnum).copied().unwrap_or(false)
    }

    /// Debug override: when set every area counts as connected.
    pub fn set_no_areas(&mut self, no_areas: bool) {
        self.no_areas = no_areas;
    }

    pub fn no_areas(&self) -> bool {
        self.no_areas
    }

    // ============================================================
    // Flooding
    // ============================================================

    fn flood_area_r(&mut self, areanum: usize, floodnum: i32) -> Result<()> {
        let area = &mut self.areas[areanum];
        if area.floodvalid == self.floodvalid {
            if area.floodnum == floodnum {
                return Ok(());
            }
            return Err(CmError::Reflooded { area: areanum });
        }

        area.floodnum = floodnum;
        area.floodvalid = self.floodvalid;

        let first = area.firstareaportal;
        let count = area.numareaportals;
        for i in first..first + count {
            let portal = self.portals[i];
            if self.portal_open[portal.portalnum] {
                self.flood_area_r(portal.otherarea, floodnum)?;
            }
        }
        Ok(())
    }

    /// Recomputes every area's component. Area 0 is the outside void and is
    /// never flooded.
    pub fn flood_area_connections(&mut self) -> Result<()> {
        // all current floods are now invalid
        self.floodvalid = self.floodvalid.wrapping_add(1);
        if self.floodvalid == 0 {
            for area in &mut self.areas {
                area.floodvalid = 0;
            }
            self.floodvalid = 1;
        }

        let mut floodnum = 0;
        for i in 1..self.areas.len() {
            if self.areas[i].floodvalid == self.floodvalid {
                continue; // already flooded into
            }
            floodnum += 1;
            self.flood_area_r(i, floodnum)?;
        }
        Ok(())
    }

    pub fn set_area_portal_state(&mut self, portalnum: usize, open: bool) -> Result<()> {
        if portalnum > self.portals.len() || portalnum >= self.portal_open.len() {
            return Err(CmError::BadPortal {
                portal: portalnum,
                count: self.portals.len(),
            });
        }

        self.portal_open[portalnum] = open;
        self.flood_area_connections()
    }

    /// Closes every portal and refloods, as when a map is restarted.
    pub fn close_all_portals(&mut self) -> Result<()> {
        self.portal_open.fill(false);
        self.flood_area_connections()
    }

    // ============================================================
    // Queries
    // ============================================================

    fn check_area(&self, area: usize) -> Result<()> {
        if area >= self.areas.len() {
            return Err(CmError::BadArea {
                area,
                count: self.areas.len(),
            });
        }
        Ok(())
    }

    pub fn areas_connected(&self, area1: usize, area2: usize) -> Result<bool> {
        if self.no_areas {
            return Ok(true);
        }
        self.check_area(area1)?;
        self.check_area(area2)?;

        Ok(self.areas[area1].floodnum == self.areas[area2].floodnum)
    }

    /// Writes a bit vector of all the areas that are in the same flood as
    /// `area`, or every area when `area` is 0. Returns the number of bytes
    /// the row takes.
    pub fn write_area_bits(&self, buffer: &mut [u8], area: usize) -> Result<usize> {
        let bytes = (self.areas.len() + 7) >> 3;
        if buffer.len() < bytes {
            log::warn!("write_area_bits: buffer of {} bytes, need {}", buffer.len(), bytes);
        }
        let n = bytes.min(buffer.len());
        let row = &mut buffer[..n];

        if self.no_areas {
            // for debugging, send everything
            row.fill(0xff);
            return Ok(bytes);
        }

        if area != 0 {
            self.check_area(area)?;
        }
        row.fill(0);
        let floodnum = self.areas.get(area).map_or(0, |a| a.floodnum);
        for (i, a) in self.areas.iter().enumerate() {
            if area == 0 || a.floodnum == floodnum {
                if let Some(byte) = row.get_mut(i >> 3) {
                    *byte |= 1 << (i & 7);
                }
            }
        }
        Ok(bytes)
    }

    // ============================================================
    // Save games
    // ============================================================

    /// Writes the open flag of every portal slot, one byte each.
    pub fn write_portal_state<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes: Vec<u8> = self.portal_open.iter().map(|&open| open as u8).collect();
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Reads what [`AreaGraph::write_portal_state`] wrote and refloods.
    pub fn read_portal_state<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let mut bytes = vec![0u8; self.portal_open.len()];
        reader.read_exact(&mut bytes)?;
        for (open, &b) in self.portal_open.iter_mut().zip(&bytes) {
            *open = b != 0;
        }
        self.flood_area_connections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Area 0 plus `n` areas in a row, portal `i` joining area `i + 1` and
    /// area `i + 2` in both directions.
    fn corridor(n: usize) -> AreaGraph {
        let mut areas = vec![CArea::default(); n + 1];
        let mut portals = Vec::new();
        for a in 1..=n {
            areas[a].firstareaportal = portals.len();
            if a > 1 {
                portals.push(CAreaPortal {
                    portalnum: a - 2,
                    otherarea: a - 1,
                });
            }
            if a < n {
                portals.push(CAreaPortal {
                    portalnum: a - 1,
                    otherarea: a + 1,
                });
            }
            areas[a].numareaportals = portals.len() - areas[a].firstareaportal;
        }
        let mut graph = AreaGraph::new(areas, portals).unwrap();
        graph.flood_area_connections().unwrap();
        graph
    }

    #[test]
    fn test_closed_open_closed() {
        let mut graph = corridor(2);
        assert!(!graph.areas_connected(1, 2).unwrap());

        graph.set_area_portal_state(0, true).unwrap();
        assert!(graph.is_portal_open(0));
        assert!(graph.areas_connected(1, 2).unwrap());

        graph.set_area_portal_state(0, false).unwrap();
        assert!(!graph.areas_connected(1, 2).unwrap());
    }

    #[test]
    fn test_set_state_is_idempotent() {
        let mut graph = corridor(4);
        graph.set_area_portal_state(1, true).unwrap();
        let before: Vec<_> = (0..5).map(|a| graph.floodnum(a)).collect();
        graph.set_area_portal_state(1, true).unwrap();
        let after: Vec<_> = (0..5).map(|a| graph.floodnum(a)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_connected_is_symmetric() {
        let mut graph = corridor(5);
        graph.set_area_portal_state(0, true).unwrap();
        graph.set_area_portal_state(2, true).unwrap();
        graph.set_area_portal_state(3, true).unwrap();
        for a in 1..=5 {
            for b in 1..=5 {
                assert_eq!(
                    graph.areas_connected(a, b).unwrap(),
                    graph.areas_connected(b, a).unwrap()
                );
            }
        }
        assert!(graph.areas_connected(1, 2).unwrap());
        assert!(!graph.areas_connected(2, 3).unwrap());
        assert!(graph.areas_connected(3, 5).unwrap());
    }

    #[test]
    fn test_bad_area_and_portal() {
        let mut graph = corridor(2);
        let err = graph.areas_connected(1, 9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadCall);
        assert!(matches!(err, CmError::BadArea { area: 9, count: 3 }));

        // one past the portal count is tolerated, two is not
        assert!(graph.set_area_portal_state(2, true).is_ok());
        assert!(matches!(
            graph.set_area_portal_state(3, true),
            Err(CmError::BadPortal { portal: 3, .. })
        ));
        assert!(graph.set_area_portal_state(MAX_MAP_AREAPORTALS, true).is_err());
    }

    #[test]
    fn test_no_areas_override() {
        let mut graph = corridor(3);
        graph.set_no_areas(true);
        assert!(graph.areas_connected(1, 3).unwrap());
        // the override skips range checks too
        assert!(graph.areas_connected(1, 300).unwrap());

        let mut bits = [0u8; 4];
        assert_eq!(graph.write_area_bits(&mut bits, 1).unwrap(), 1);
        assert_eq!(bits, [0xff, 0, 0, 0]);
    }

    #[test]
    fn test_write_area_bits() {
        let mut graph = corridor(9);
        graph.set_area_portal_state(0, true).unwrap();

        let mut bits = [0xaau8; 2];
        assert_eq!(graph.write_area_bits(&mut bits, 1).unwrap(), 2);
        // areas 1 and 2
        assert_eq!(bits, [0b0000_0110, 0]);

        assert_eq!(graph.write_area_bits(&mut bits, 9).unwrap(), 2);
        assert_eq!(bits, [0, 0b0000_0010]);

        // area 0 sees everything
        graph.write_area_bits(&mut bits, 0).unwrap();
        assert_eq!(bits, [0xff, 0b0000_0011]);

        assert!(graph.write_area_bits(&mut bits, 10).is_err());
    }

    #[test]
    fn test_rejected_area_leaves_buffer_alone() {
        let graph = corridor(9);
        let mut bits = [0xaau8; 2];
        let err = graph.write_area_bits(&mut bits, 10).unwrap_err();
        assert!(matches!(err, CmError::BadArea { area: 10, count: 10 }));
        assert_eq!(bits, [0xaa, 0xaa]);
    }

    #[test]
    fn test_short_area_bits_buffer() {
        let mut graph = corridor(9);
        graph.set_area_portal_state(0, true).unwrap();

        // ten areas need two bytes; only the first is written
        let mut bits = [0xaau8; 1];
        assert_eq!(graph.write_area_bits(&mut bits, 2).unwrap(), 2);
        assert_eq!(bits, [0b0000_0110]);

        let mut empty: [u8; 0] = [];
        assert_eq!(graph.write_area_bits(&mut empty, 0).unwrap(), 2);
    }

    #[test]
    fn test_portal_state_round_trip() {
        let mut graph = corridor(4);
        graph.set_area_portal_state(0, true).unwrap();
        graph.set_area_portal_state(2, true).unwrap();

        let mut saved = Vec::new();
        graph.write_portal_state(&mut saved).unwrap();
        assert_eq!(saved.len(), MAX_MAP_AREAPORTALS);

        let mut restored = corridor(4);
        restored.read_portal_state(&mut saved.as_slice()).unwrap();
        assert!(restored.is_portal_open(0));
        assert!(!restored.is_portal_open(1));
        assert!(restored.areas_connected(1, 2).unwrap());
        assert!(restored.areas_connected(3, 4).unwrap());
        assert!(!restored.areas_connected(2, 3).unwrap());
    }

    #[test]
    fn test_short_portal_state_is_io_error() {
        let mut graph = corridor(2);
        let err = graph.read_portal_state(&mut [1u8; 10].as_slice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_one_way_portal_refloods() {
        // area 2 leads into area 1, but area 1 does not lead back
        let mut areas = vec![CArea::default(); 3];
        areas[2].numareaportals = 1;
        let portals = vec![CAreaPortal {
            portalnum: 0,
            otherarea: 1,
        }];
        let mut graph = AreaGraph::new(areas, portals).unwrap();
        graph.flood_area_connections().unwrap();

        let err = graph.set_area_portal_state(0, true).unwrap_err();
        assert!(matches!(err, CmError::Reflooded { area: 1 }));
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_validation() {
        let areas = vec![CArea {
            numareaportals: 2,
            ..CArea::default()
        }];
        assert!(AreaGraph::new(areas, vec![CAreaPortal::default()]).is_err());

        let areas = vec![CArea::default(); 2];
        let portals = vec![CAreaPortal {
            portalnum: 0,
            otherarea: 5,
        }];
        assert!(AreaGraph::new(areas, portals).is_err());
    }
}
