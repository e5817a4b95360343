//! LAN presence announcements over multicast UDP.
//!
//! This crate implements the sending side of the vanilla Minecraft LAN
//! discovery protocol: a [`LanBroadcaster`] owns a multicast-capable datagram
//! socket and periodically announces a display name and port to the fixed
//! discovery group, so clients on the same network segment can find the
//! service without prior configuration.
//!
//! The transport is fire-and-forget: no acknowledgment, no retries, no
//! authentication. A broadcaster is single-use: create it, optionally adjust
//! the display name and interval, run [`LanBroadcaster::broadcast`] on a
//! dedicated task, and call [`LanBroadcaster::close`] to stop it.

mod advertisement;
mod broadcast;
pub mod resolver;

pub use advertisement::Advertisement;
pub use broadcast::{
    BroadcastError, LanBroadcaster, LifecycleState, DEFAULT_INTERVAL, DISCOVERY_TARGET,
};
pub use resolver::ResolveError;
