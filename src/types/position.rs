//! Coordinates, locations and bounding regions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Integer block coordinate inside a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Componentwise minimum
    pub fn min(self, other: BlockPos) -> BlockPos {
        BlockPos::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Componentwise maximum
    pub fn max(self, other: BlockPos) -> BlockPos {
        BlockPos::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

impl FromStr for BlockPos {
    type Err = String;

    /// Parses `x,y,z` (whitespace around components is ignored)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(format!("expected x,y,z but got '{}'", s));
        }
        let parse = |p: &str| {
            p.parse::<i32>()
                .map_err(|e| format!("invalid coordinate '{}': {}", p, e))
        };
        Ok(BlockPos::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

/// A coordinate in a named world
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub pos: BlockPos,
}

impl Location {
    pub fn new(world: impl Into<String>, pos: BlockPos) -> Self {
        Self {
            world: world.into(),
            pos,
        }
    }
}

/// Axis-aligned bounding box in one world, inclusive on both corners
///
/// Always normalized: `min` is componentwise <= `max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub world: String,
    pub min: BlockPos,
    pub max: BlockPos,
}

impl Region {
    /// Build a region from two arbitrary corners
    pub fn new(world: impl Into<String>, a: BlockPos, b: BlockPos) -> Self {
        Self {
            world: world.into(),
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, world: &str, pos: BlockPos) -> bool {
        self.world == world
            && (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    /// Number of block positions covered
    pub fn volume(&self) -> u64 {
        let span = |lo: i32, hi: i32| (hi as i64 - lo as i64 + 1) as u64;
        span(self.min.x, self.max.x) * span(self.min.y, self.max.y) * span(self.min.z, self.max.z)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{} .. {}]", self.world, self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_normalizes_corners() {
        let region = Region::new("world", BlockPos::new(5, 70, -3), BlockPos::new(-2, 60, 4));
        assert_eq!(region.min, BlockPos::new(-2, 60, -3));
        assert_eq!(region.max, BlockPos::new(5, 70, 4));
        assert_eq!(region.volume(), 8 * 11 * 8);
    }

    #[test]
    fn test_region_contains_is_inclusive() {
        let region = Region::new("world", BlockPos::new(0, 0, 0), BlockPos::new(2, 2, 2));
        assert!(region.contains("world", BlockPos::new(2, 2, 2)));
        assert!(region.contains("world", BlockPos::new(0, 1, 0)));
        assert!(!region.contains("world", BlockPos::new(3, 0, 0)));
        assert!(!region.contains("nether", BlockPos::new(1, 1, 1)));
    }

    #[test]
    fn test_block_pos_parse() {
        assert_eq!("10, 64,-10".parse::<BlockPos>().unwrap(), BlockPos::new(10, 64, -10));
        assert!("10,64".parse::<BlockPos>().is_err());
        assert!("a,b,c".parse::<BlockPos>().is_err());
    }
}
