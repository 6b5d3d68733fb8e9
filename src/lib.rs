//! Open Pixel Control controller for parallel LED strips.
//!
//! Receives OPC frames over TCP, keeps a double-buffered frame for every
//! strip, and pushes committed frames to serial LED drivers. A fallback
//! pattern runs whenever no client is connected.

pub mod color;
pub mod config;
pub mod connection;
pub mod frame_buffer;
pub mod opc;
pub mod opc_server;
pub mod output;
pub mod pattern;
pub mod persist;
pub mod pixel_format;
pub mod protocol;
pub mod status;
