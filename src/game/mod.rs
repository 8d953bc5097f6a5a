//! Match state: obstacle maps and game rooms

pub mod map;
pub mod room;

pub use map::{MapConfig, Obstacle, ObstacleMap};
pub use room::{GameRoom, RoomPhase, RoomRegistry};
