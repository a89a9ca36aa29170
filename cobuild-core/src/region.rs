//! Workspace partitioning.
//!
//! Every pair builds inside its own axis-aligned box. Boxes are laid out
//! along the x axis, one `cell_size` apart, so two distinct pairs can never
//! share a block. Both roles of a pair receive the same box.

use crate::{ConfigError, PairId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer block coordinate. Serialized as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 3]", into = "[i32; 3]")]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl From<[i32; 3]> for BlockPos {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<BlockPos> for [i32; 3] {
    fn from(pos: BlockPos) -> Self {
        [pos.x, pos.y, pos.z]
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

/// Axis-aligned inclusive bounding box, `min <= max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(try_from = "RawRegion")]
pub struct WorkspaceRegion {
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<i32>, example = json!([100, 64, 100])))]
    min: BlockPos,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<i32>, example = json!([120, 90, 120])))]
    max: BlockPos,
}

#[derive(Deserialize)]
struct RawRegion {
    min: BlockPos,
    max: BlockPos,
}

impl TryFrom<RawRegion> for WorkspaceRegion {
    type Error = ConfigError;

    fn try_from(raw: RawRegion) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
    }
}

impl WorkspaceRegion {
    pub fn new(min: BlockPos, max: BlockPos) -> Result<Self, ConfigError> {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            return Err(ConfigError::InvalidValue {
                field: "range".to_string(),
                value: format!("min=[{}] max=[{}]", min, max),
                reason: "min must not exceed max on any axis".to_string(),
            });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> BlockPos {
        self.min
    }

    pub fn max(&self) -> BlockPos {
        self.max
    }

    /// Inclusive containment on all three axes.
    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    pub fn intersects(&self, other: &WorkspaceRegion) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    /// Floor-rounded center of the box.
    pub fn centroid(&self) -> BlockPos {
        BlockPos {
            x: midpoint(self.min.x, self.max.x),
            y: midpoint(self.min.y, self.max.y),
            z: midpoint(self.min.z, self.max.z),
        }
    }

    /// Where an agent is sent on entering the acting phase: the horizontal
    /// center of the box, standing on its floor.
    pub fn arrival_point(&self) -> BlockPos {
        let center = self.centroid();
        BlockPos {
            y: self.min.y,
            ..center
        }
    }
}

fn midpoint(a: i32, b: i32) -> i32 {
    ((i64::from(a) + i64::from(b)).div_euclid(2)) as i32
}

impl fmt::Display for WorkspaceRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]..[{}]", self.min, self.max)
    }
}

/// Parameters of the pair-to-region layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Minimum corner of pair 1's region.
    pub origin: BlockPos,
    /// Size of each region (`max - min`) along each axis.
    pub extent: BlockPos,
    /// Distance along x between the minimum corners of consecutive pairs.
    pub cell_size: i32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            origin: BlockPos::new(100, 64, 100),
            extent: BlockPos::new(20, 26, 20),
            cell_size: 40,
        }
    }
}

impl PartitionConfig {
    /// Regions stay disjoint only when each cell is wider than a region.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let extent = self.extent;
        if extent.x < 0 || extent.y < 0 || extent.z < 0 {
            return Err(ConfigError::InvalidValue {
                field: "extent".to_string(),
                value: extent.to_string(),
                reason: "must be non-negative on every axis".to_string(),
            });
        }
        if self.cell_size <= extent.x {
            return Err(ConfigError::InvalidValue {
                field: "cell_size".to_string(),
                value: self.cell_size.to_string(),
                reason: format!("must be greater than the x extent ({})", extent.x),
            });
        }
        Ok(())
    }

    /// Region assigned to `pair`.
    pub fn region(&self, pair: PairId) -> Result<WorkspaceRegion, ConfigError> {
        let overflow = || ConfigError::InvalidPair {
            pair_id: i64::from(pair.get()),
        };
        let offset = i64::from(pair.slot()) * i64::from(self.cell_size);
        let min_x = i64::from(self.origin.x) + offset;
        let max_x = min_x + i64::from(self.extent.x);
        let min_x = i32::try_from(min_x).map_err(|_| overflow())?;
        let max_x = i32::try_from(max_x).map_err(|_| overflow())?;
        let max_y = self.origin.y.checked_add(self.extent.y).ok_or_else(overflow)?;
        let max_z = self.origin.z.checked_add(self.extent.z).ok_or_else(overflow)?;

        WorkspaceRegion::new(
            BlockPos::new(min_x, self.origin.y, self.origin.z),
            BlockPos::new(max_x, max_y, max_z),
        )
    }
}

/// Map a raw pair number to its region. Rejects `pair_id < 1`.
pub fn region_for(pair_id: i64, partition: &PartitionConfig) -> Result<WorkspaceRegion, ConfigError> {
    let pair = PairId::new(pair_id)?;
    partition.region(pair)
}
