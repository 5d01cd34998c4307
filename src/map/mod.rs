//! Tile map and the flood-fill search engine built over it

pub mod grid;
pub mod traversal;

pub use grid::{GameMap, LayerGrid, Terrain, Tile};
pub use traversal::{TerrainTraversal, TraversalVisitor, VisitResult};
