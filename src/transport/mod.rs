//! QUIC transport layer for plugin messages.
//!
//! This module provides [`client::CsiClient`] and [`server::CsiServer`] that
//! communicate [`crate::message::CsiMessage`] values over QUIC
//! bi-directional streams using `quinn`.

pub mod client;
pub mod server;
