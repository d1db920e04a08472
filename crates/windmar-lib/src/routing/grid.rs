//! Regular lat/lon search grids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo::{aligned_axis, BoundingBox, LatLon};

use super::mask::NavigabilityMask;

const FOUR: [(i32, i32); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];

const EIGHT: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

const SIXTEEN: [(i32, i32); 16] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
    (-2, -1),
    (-2, 1),
    (-1, -2),
    (-1, 2),
    (1, -2),
    (1, 2),
    (2, -1),
    (2, 1),
];

/// Neighbour set of each grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
    /// Eight neighbours plus the knight moves.
    Sixteen,
}

impl Connectivity {
    pub fn offsets(&self) -> &'static [(i32, i32)] {
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
            Connectivity::Sixteen => &SIXTEEN,
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.offsets().len())
    }
}

impl FromStr for Connectivity {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "4" | "four" => Ok(Connectivity::Four),
            "8" | "eight" => Ok(Connectivity::Eight),
            "16" | "sixteen" => Ok(Connectivity::Sixteen),
            other => Err(Error::InvalidConfig {
                key: "connectivity".to_string(),
                message: format!("expected 4, 8 or 16, got '{other}'"),
            }),
        }
    }
}

/// Nodes at resolution-aligned lat/lon points, row-major by latitude.
#[derive(Debug, Clone)]
pub struct SearchGrid {
    lats: Vec<f64>,
    lons: Vec<f64>,
    navigable: Vec<bool>,
}

impl SearchGrid {
    /// Lay out nodes over `bbox` and consult `mask` once per node.
    pub fn build(bbox: BoundingBox, resolution_deg: f64, mask: &dyn NavigabilityMask) -> Self {
        let lats = aligned_axis(bbox.lat_min, bbox.lat_max, resolution_deg)
            .into_iter()
            .filter(|lat| (-90.0..=90.0).contains(lat))
            .collect::<Vec<_>>();
        let lons = aligned_axis(bbox.lon_min, bbox.lon_max, resolution_deg);

        let mut navigable = Vec::with_capacity(lats.len() * lons.len());
        for &lat in &lats {
            for &lon in &lons {
                navigable.push(mask.is_navigable(LatLon::new(lat, lon)));
            }
        }

        let grid = Self {
            lats,
            lons,
            navigable,
        };
        debug!(
            rows = grid.rows(),
            cols = grid.cols(),
            navigable = grid.navigable_count(),
            resolution_deg,
            "built search grid"
        );
        grid
    }

    pub fn rows(&self) -> usize {
        self.lats.len()
    }

    pub fn cols(&self) -> usize {
        self.lons.len()
    }

    pub fn len(&self) -> usize {
        self.navigable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.navigable.is_empty()
    }

    pub fn navigable_count(&self) -> usize {
        self.navigable.iter().filter(|n| **n).count()
    }

    pub fn is_navigable(&self, node: usize) -> bool {
        self.navigable.get(node).copied().unwrap_or(false)
    }

    pub fn position(&self, node: usize) -> LatLon {
        let cols = self.cols();
        LatLon::new(self.lats[node / cols], self.lons[node % cols])
    }

    fn cell(&self, row: i64, col: i64) -> Option<usize> {
        if row < 0 || col < 0 || row >= self.rows() as i64 || col >= self.cols() as i64 {
            return None;
        }
        Some(row as usize * self.cols() + col as usize)
    }

    /// Navigable neighbours of `node`. Knight moves also need both cells
    /// they pass between to be navigable.
    pub fn neighbors(&self, node: usize, connectivity: Connectivity) -> impl Iterator<Item = usize> + '_ {
        let cols = self.cols() as i64;
        let row = node as i64 / cols;
        let col = node as i64 % cols;
        connectivity.offsets().iter().filter_map(move |&(dr, dc)| {
            let (dr, dc) = (dr as i64, dc as i64);
            let target = self.cell(row + dr, col + dc)?;
            if !self.navigable[target] {
                return None;
            }
            if dr.abs() == 2 || dc.abs() == 2 {
                let first = self.cell(row + dr / 2, col + dc / 2)?;
                let second = self.cell(row + dr - dr / 2, col + dc - dc / 2)?;
                if !self.navigable[first] || !self.navigable[second] {
                    return None;
                }
            }
            Some(target)
        })
    }

    /// Great-circle length of the longest edge `connectivity` can produce
    /// anywhere on the grid, ignoring navigability.
    pub fn longest_edge_nm(&self, connectivity: Connectivity) -> f64 {
        let lon_spacing = match self.lons.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        };
        let mut longest = 0.0_f64;
        for (row, &lat) in self.lats.iter().enumerate() {
            let from = LatLon::new(lat, 0.0);
            for &(dr, dc) in connectivity.offsets() {
                let target_row = row as i64 + dr as i64;
                let Some(&target_lat) = usize::try_from(target_row).ok().and_then(|r| self.lats.get(r)) else {
                    continue;
                };
                let to = LatLon::new(target_lat, dc as f64 * lon_spacing);
                longest = longest.max(from.distance_nm(&to));
            }
        }
        longest
    }

    /// Navigable node closest to `position` by great-circle distance.
    pub fn nearest_navigable(&self, position: LatLon) -> Option<usize> {
        (0..self.len())
            .filter(|node| self.navigable[*node])
            .min_by(|a, b| {
                let da = self.position(*a).distance_nm(&position);
                let db = self.position(*b).distance_nm(&position);
                da.total_cmp(&db)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::mask::{LandMask, OpenSea};

    fn grid(mask: &dyn NavigabilityMask) -> SearchGrid {
        SearchGrid::build(BoundingBox::new(0.0, 2.0, 0.0, 2.0), 1.0, mask)
    }

    #[test]
    fn builds_aligned_nodes() {
        let grid = grid(&OpenSea);
        assert_eq!((grid.rows(), grid.cols()), (3, 3));
        assert_eq!(grid.position(5), LatLon::new(1.0, 2.0));
        assert_eq!(grid.navigable_count(), 9);
    }

    #[test]
    fn neighbour_counts_follow_connectivity() {
        let grid = grid(&OpenSea);
        assert_eq!(grid.neighbors(4, Connectivity::Four).count(), 4);
        assert_eq!(grid.neighbors(4, Connectivity::Eight).count(), 8);
        assert_eq!(grid.neighbors(0, Connectivity::Eight).count(), 3);
        // Corner of a 3x3 grid reaches two knight moves.
        assert_eq!(grid.neighbors(0, Connectivity::Sixteen).count(), 5);
    }

    #[test]
    fn land_is_skipped_and_snapped_around() {
        let mask = LandMask::new().with_block(BoundingBox::new(0.5, 1.5, 0.5, 1.5));
        let grid = grid(&mask);
        assert!(!grid.is_navigable(4));
        assert_eq!(grid.neighbors(0, Connectivity::Eight).count(), 2);
        let snapped = grid.nearest_navigable(LatLon::new(1.1, 1.0)).unwrap();
        assert_ne!(snapped, 4);
        assert!(grid.position(snapped).distance_nm(&LatLon::new(1.0, 1.0)) < 61.0);
    }

    #[test]
    fn knight_moves_do_not_jump_land() {
        let mask = LandMask::new().with_block(BoundingBox::new(-0.5, 0.5, 0.5, 1.5));
        let grid = grid(&mask);
        let targets: Vec<usize> = grid.neighbors(0, Connectivity::Sixteen).collect();
        // (1, 2) passes between (0, 1), which is land, and (1, 1).
        assert!(!targets.contains(&5));
        // (2, 1) passes between (1, 0) and (1, 1), both water.
        assert!(targets.contains(&7));
    }

    #[test]
    fn longest_edge_is_the_equatorward_diagonal() {
        let grid = SearchGrid::build(BoundingBox::new(40.0, 42.0, -30.0, -28.0), 1.0, &OpenSea);
        let diagonal = LatLon::new(40.0, -30.0).distance_nm(&LatLon::new(41.0, -29.0));
        assert!((grid.longest_edge_nm(Connectivity::Eight) - diagonal).abs() < 1e-6);
        let knight = LatLon::new(40.0, -30.0).distance_nm(&LatLon::new(42.0, -29.0));
        assert!((grid.longest_edge_nm(Connectivity::Sixteen) - knight).abs() < 1e-6);
        assert!(grid.longest_edge_nm(Connectivity::Four) < diagonal);
    }

    #[test]
    fn connectivity_parses() {
        assert_eq!("16".parse::<Connectivity>().unwrap(), Connectivity::Sixteen);
        assert_eq!(Connectivity::Four.to_string(), "4");
        assert!("6".parse::<Connectivity>().is_err());
    }
}
