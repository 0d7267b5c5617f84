//! Match ingestion service.
//!
//! Pulls ended and upcoming matches from a paginated betting-data API,
//! normalises them, and keeps two PostgreSQL tables in sync. Upcoming
//! matches can additionally be enriched with the lowest bookmaker odds.

pub mod config;
pub mod ended;
pub mod error;
pub mod fetch;
pub mod health;
pub mod http;
pub mod normalize;
pub mod odds;
pub mod pacing;
pub mod paginate;
pub mod report;
pub mod rows;
pub mod service;
pub mod store;
pub mod upcoming;
pub mod upstream;
pub mod wire;

#[cfg(test)]
mod testing;
