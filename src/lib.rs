//! Remote control for a network-attached LED strip.
//!
//! The strip speaks a small HTTP protocol. [`session::start`] runs a
//! reachability monitor around a [`device_client::PixelClient`] and hands out a
//! [`dispatcher::CommandDispatcher`] for UI commands plus receivers for the
//! published state.

pub mod config;
pub mod device_client;
pub mod dispatcher;
pub mod http_client;
pub mod monitor;
pub mod preferences;
pub mod session;
pub mod shell;
pub mod types;
