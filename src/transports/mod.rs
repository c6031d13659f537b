//! Concrete transport implementations.
//!
//! | Module / Feature                  | Transport                        |
//! |-----------------------------------|----------------------------------|
//! | `memory` (always available)       | In-process paired mpsc channels  |
//! | `websocket` (`transport-websocket`) | `tokio-tungstenite` over TCP   |
//!
//! The memory transport exists for tests, demos, and single-process
//! play; the WebSocket transport is the real peer link, with the bound
//! socket address doubling as the session code.

pub mod memory;

#[cfg(feature = "transport-websocket")]
pub mod websocket;

pub use memory::{MemoryChannel, MemoryEndpoint, MemoryNetwork};

#[cfg(feature = "transport-websocket")]
pub use websocket::{WsChannel, WsEndpoint};
