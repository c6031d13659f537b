//! # Scellé Session
//!
//! Host-authoritative session core for the "Opération Scellé" party
//! game. One terminal hosts the session and owns the single writable
//! copy of the game state; every other terminal mirrors it.
//!
//! This crate provides the host loop, the client mirror, and the JSON
//! wire protocol between them, over any bidirectional text transport.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Channel`] / [`Endpoint`]
//!   traits for any backend
//! - **Host-authoritative** — commands queue on the host and are applied
//!   one at a time; state flows back as wholesale snapshots
//! - **In-memory built-in** — [`transports::MemoryNetwork`] wires host
//!   and clients together in-process, for tests and local play
//! - **WebSocket built-in** — default `transport-websocket` feature
//!   provides [`transports::WsChannel`] and [`transports::WsEndpoint`]
//! - **Event-driven** — receive typed [`SessionEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```no_run
//! use scelle_session::transports::MemoryNetwork;
//! use scelle_session::transport::Endpoint;
//! use scelle_session::{ClientConfig, ClientSession, HostConfig, HostSession};
//!
//! # async fn run() -> scelle_session::Result<()> {
//! let network = MemoryNetwork::new();
//! let endpoint = network.open();
//! let code = endpoint.local_addr().to_string();
//!
//! let (host, mut host_events) = HostSession::start(endpoint, "Capitaine", HostConfig::new());
//!
//! let channel = network.connect(&code)?;
//! let (client, mut client_events) = ClientSession::join(channel, "Rossi", ClientConfig::new());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod host;
pub mod narrator;
pub mod protocol;
pub mod roles;
pub mod sabotage;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{ClientConfig, ClientSession};
pub use error::{Result, SessionError};
pub use event::SessionEvent;
pub use host::{HostConfig, HostSession};
pub use narrator::Narrator;
pub use protocol::{Envelope, GamePhase, GameSession, Message, Player, PlayerId, Role};
pub use sabotage::{SabotagePhase, SabotageState};
pub use transport::{Channel, Endpoint};
