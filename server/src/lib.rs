//! Authoritative arena server.
//!
//! Clients connect over TCP and exchange newline-delimited JSON records.
//! The server owns all game state: it simulates the world at a fixed
//! tick rate, applies the latest input per connection, and broadcasts
//! full-state snapshots at a lower rate.

pub mod config;
pub mod network;
pub mod npc;
pub mod world;
