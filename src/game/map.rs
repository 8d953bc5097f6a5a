//! Shared obstacle map generation
//!
//! Both clients in a room render the same layout; only player input differs.
//! The map is generated once per match from a logged seed and serialized a
//! single time so both sides receive identical bytes.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::net::protocol::PayloadError;

/// Map generation tunables
#[derive(Debug, Clone)]
pub struct MapConfig {
    pub obstacle_count: u32,
    /// Spawn X for every obstacle; spacing comes from the random offset
    pub start_position: i32,
    /// Random offset range, inclusive low, exclusive high
    pub offset_min: i32,
    pub offset_max: i32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            obstacle_count: 3,
            start_position: 1200,
            offset_min: 500,
            offset_max: 800,
        }
    }
}

/// One obstacle descriptor as sent in `GameStart`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obstacle {
    pub start_position: i32,
    pub random_offset: i32,
    pub index: u32,
}

impl Obstacle {
    fn serialize(&self) -> String {
        format!("{},{},{}", self.start_position, self.random_offset, self.index)
    }

    fn parse(text: &str) -> Result<Self, PayloadError> {
        let fields: Vec<&str> = text.split(',').collect();
        if fields.len() < 3 {
            return Err(PayloadError::TooFewFields {
                expected: 3,
                got: fields.len(),
            });
        }
        let field = |s: &str| -> Result<i64, PayloadError> {
            s.trim()
                .parse()
                .map_err(|_| PayloadError::InvalidField(s.to_string()))
        };
        Ok(Self {
            start_position: field(fields[0])? as i32,
            random_offset: field(fields[1])? as i32,
            index: field(fields[2])? as u32,
        })
    }
}

/// Ordered obstacle layout for one match, immutable after generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstacleMap {
    obstacles: Vec<Obstacle>,
}

impl ObstacleMap {
    /// Generate a layout from a seed. The same seed always yields the same
    /// map, which keeps match setup reproducible from the logs.
    pub fn generate(config: &MapConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let obstacles = (0..config.obstacle_count)
            .map(|index| Obstacle {
                start_position: config.start_position,
                random_offset: rng.gen_range(config.offset_min..config.offset_max),
                index,
            })
            .collect();
        Self { obstacles }
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// `GameStart` payload: `;`-joined `startPosition,randomOffset,index`
    pub fn serialize(&self) -> String {
        self.obstacles
            .iter()
            .map(Obstacle::serialize)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn parse(payload: &str) -> Result<Self, PayloadError> {
        if payload.is_empty() {
            return Ok(Self { obstacles: Vec::new() });
        }
        let obstacles = payload
            .split(';')
            .map(Obstacle::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { obstacles })
    }
}
