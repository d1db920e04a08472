//! Land and depth masks consulted when search grids are built.

use serde::{Deserialize, Serialize};

use crate::geo::{BoundingBox, LatLon};

/// Whether a position is traversable.
pub trait NavigabilityMask: Send + Sync {
    fn is_navigable(&self, position: LatLon) -> bool;
}

/// Everything is open water.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSea;

impl NavigabilityMask for OpenSea {
    fn is_navigable(&self, _position: LatLon) -> bool {
        true
    }
}

/// Blocked rectangles of land or shallow water.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandMask {
    blocked: Vec<BoundingBox>,
}

impl LandMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocked: Vec<BoundingBox>) -> Self {
        Self { blocked }
    }

    pub fn with_block(mut self, block: BoundingBox) -> Self {
        self.blocked.push(block);
        self
    }

    pub fn blocks(&self) -> &[BoundingBox] {
        &self.blocked
    }
}

impl NavigabilityMask for LandMask {
    fn is_navigable(&self, position: LatLon) -> bool {
        !self.blocked.iter().any(|block| block.contains(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn land_mask_blocks_rectangles() {
        let mask = LandMask::new().with_block(BoundingBox::new(40.0, 44.0, -10.0, -6.0));
        assert!(!mask.is_navigable(LatLon::new(42.0, -8.0)));
        assert!(mask.is_navigable(LatLon::new(45.0, -8.0)));
        assert!(OpenSea.is_navigable(LatLon::new(42.0, -8.0)));
    }
}
