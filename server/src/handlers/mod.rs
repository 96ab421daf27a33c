//! HTTP and WebSocket handlers.
//!
//! Write handlers commit through `topout_scoring::service` and then publish
//! a fresh snapshot of the affected competition.

pub mod attempts;
pub mod health;
pub mod live;
pub mod results;
pub mod rounds;
pub mod startlist;
