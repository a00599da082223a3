pub mod battle;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod leaderboard;
pub mod overworld;
pub mod placement;
pub mod progress;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod stages;
pub mod tilemap;
pub mod types;
pub mod world;
