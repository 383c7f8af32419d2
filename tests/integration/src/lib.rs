//! Integration test utilities for the gateway client
//!
//! This crate provides a mock gateway server that speaks the zlib-stream
//! compressed websocket protocol, for end-to-end tests of the real
//! websocket transport.

pub mod helpers;

pub use helpers::*;
