//! Scene state: the node arena, mesh handles and the ordered light list.
//!
//! # Invariants
//! - The node hierarchy is a tree: no node has two parents.
//! - The graph owns every node; handles are plain indices into its arena.
//! - Scene and lights are mutated only between frames.

pub mod config;
pub mod demo;
mod error;
pub mod graph;
pub mod light;
pub mod mesh;

pub use config::{GlobalLightConfig, SceneConfig};
pub use demo::{DemoMeshes, DemoScene};
pub use error::SceneError;
pub use graph::{DrawSink, NodeId, SceneGraph, SceneNode};
pub use light::{
    Attenuation, CUTOFF_THRESHOLD, GLOBAL_MARKER_SCALE, GLOBAL_RADIUS_SCALE, KeyLight, Light,
    LightList, MAX_LIGHTS, cutoff_radius,
};
pub use mesh::{MeshData, MeshHandle, MeshId, Vertex};
