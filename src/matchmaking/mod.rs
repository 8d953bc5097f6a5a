//! Matchmaking: waiting queue and pairing service

pub mod queue;
pub mod service;

pub use service::MatchmakingService;
