//! Authoritative game server for Skyfire.
//!
//! The server simulates every running match at a fixed 30 Hz timestep and
//! talks to clients over named-pipe channels: one well-known channel per
//! request type, per-client response channels, and one streaming channel per
//! game session. All gameplay state lives here; clients only render
//! snapshots and send inputs.

pub mod auth;
pub mod db;
pub mod game;
pub mod sandbox;
pub mod server;
pub mod transport;
pub mod utils;
