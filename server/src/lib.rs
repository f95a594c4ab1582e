//! # Relay Server Library
//!
//! Authoritative server for the networked raycaster. It owns the canonical
//! world state, admits clients through a framed handshake, and mirrors every
//! pose update back out as a full-state broadcast so all connected clients
//! converge on the same view.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! The connection registry and world state store, owned as one unit behind a
//! single lock so player admission and eviction always mutate both together.
//!
//! ### Session Module (`session`)
//! The per-connection state machine: handshake (init, map, ack), the
//! steady-state relay loop, and eviction with a corrective broadcast.
//!
//! ### Network Module (`network`)
//! TCP listener, cooperative shutdown signal, and the per-connection writer
//! tasks that fan broadcasts out without letting one slow peer stall the rest.
//!
//! ## Protocol
//!
//! Every message is a 4-byte big-endian length prefix plus a UTF-8 JSON body.
//! The server sends `{"init_id": n}` and `{"map_data": {...}}` to a fresh
//! connection, waits for exactly one `{"ack": true}`, and only then does the
//! player become visible to anyone. From there every inbound frame is treated
//! as a pose update and answered with a full snapshot broadcast to every
//! streaming connection.

pub mod network;
pub mod registry;
pub mod session;
