//! # Raycaster Client Library
//!
//! Client-side implementation of the networked raycaster: the session
//! protocol that receives the authoritative map and world snapshots, the
//! local first-person simulation, and the projection code that turns the 2D
//! tile map into a pseudo-3D view.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The client half of the session protocol. Runs on a background thread with
//! its own tokio runtime so the render loop keeps the main thread: a receive
//! loop handles init/map/snapshot frames and a writer drains outgoing pose
//! updates. The pair of shared fields the render loop reads (own id, latest
//! snapshot) sits behind a single lock so a frame never sees them half
//! updated.
//!
//! ### Game Module (`game`)
//! Local player simulation: rotation, movement along the heading vector and
//! the tile-based collision rule. The local pose is owned here and only ever
//! mirrored to the server.
//!
//! ### Raycast Module (`raycast`)
//! The pure projection engine. Given a map, a pose and a viewport it marches
//! rays across the grid and produces ordered, shaded wall slices. No
//! rendering, no globals, fully deterministic.
//!
//! ### Minimap Module (`minimap`)
//! Projects the map and every known pose into overlay cells and markers.
//!
//! ### Input / Rendering Modules (`input`, `rendering`)
//! Thin macroquad layers: sampling the configured movement keys and drawing
//! the background, slices and minimap shapes.

pub mod game;
pub mod input;
pub mod minimap;
pub mod network;
pub mod raycast;
pub mod rendering;
