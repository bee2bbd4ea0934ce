//! Client-side networking for the arena server.
//!
//! Connects over TCP, validates the welcome handshake, then keeps the
//! latest received snapshot available to the caller while forwarding
//! input records upstream.

pub mod network;
