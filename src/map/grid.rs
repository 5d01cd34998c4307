//! Layered tile map: terrain, territory owner and landmass ids
//!
//! Read-only from the AI's point of view. Landmass ids are derived data:
//! call [`GameMap::compute_landmasses`] after editing terrain.

use serde::{Deserialize, Serialize};

use crate::core::types::{MapLayer, PlayerId, TilePos};
use crate::map::traversal::{TerrainTraversal, VisitResult};
use crate::units::unit_type::UnitDomain;

/// Base terrain of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Terrain {
    #[default]
    Land,
    Water,
    /// Constructed wall; blocks ground movement and can be sieged
    Wall,
    /// Impassable natural obstacle
    Rock,
}

impl Terrain {
    /// Kind of walkable region this terrain belongs to, if any
    fn region_kind(&self) -> Option<RegionKind> {
        match self {
            Terrain::Land => Some(RegionKind::Land),
            Terrain::Water => Some(RegionKind::Water),
            Terrain::Wall | Terrain::Rock => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionKind {
    Land,
    Water,
}

/// A single tile
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Tile {
    pub terrain: Terrain,
    /// Territory / wall owner
    pub owner: Option<PlayerId>,
    /// Connected-region id; 0 for tiles that belong to no region
    pub landmass: u32,
}

/// One map layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerGrid {
    pub width: u32,
    pub height: u32,
    tiles: Vec<Tile>,
}

impl LayerGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tiles: vec![Tile::default(); (width as usize) * (height as usize)],
        }
    }

    fn index(&self, pos: TilePos) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width as i32 || pos.y >= self.height as i32 {
            return None;
        }
        Some((pos.y as usize) * (self.width as usize) + pos.x as usize)
    }
}

/// The full map: one grid per layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMap {
    layers: Vec<LayerGrid>,
}

impl GameMap {
    /// Single-layer map of open land
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layers: vec![LayerGrid::new(width, height)],
        }
    }

    /// Add another layer, returning its index
    pub fn add_layer(&mut self, width: u32, height: u32) -> MapLayer {
        self.layers.push(LayerGrid::new(width, height));
        self.layers.len() - 1
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn width(&self, layer: MapLayer) -> u32 {
        self.layers.get(layer).map_or(0, |l| l.width)
    }

    pub fn height(&self, layer: MapLayer) -> u32 {
        self.layers.get(layer).map_or(0, |l| l.height)
    }

    /// Check if coordinate is within the bounds of a layer
    pub fn in_bounds(&self, pos: TilePos, layer: MapLayer) -> bool {
        self.layers
            .get(layer)
            .is_some_and(|l| l.index(pos).is_some())
    }

    pub fn tile(&self, pos: TilePos, layer: MapLayer) -> Option<&Tile> {
        let grid = self.layers.get(layer)?;
        grid.index(pos).map(|i| &grid.tiles[i])
    }

    pub fn tile_mut(&mut self, pos: TilePos, layer: MapLayer) -> Option<&mut Tile> {
        let grid = self.layers.get_mut(layer)?;
        let idx = grid.index(pos)?;
        Some(&mut grid.tiles[idx])
    }

    /// Set terrain at a coordinate
    pub fn set_terrain(&mut self, pos: TilePos, layer: MapLayer, terrain: Terrain) {
        if let Some(tile) = self.tile_mut(pos, layer) {
            tile.terrain = terrain;
        }
    }

    /// Set terrain over an inclusive rectangle
    pub fn fill_terrain(&mut self, from: TilePos, to: TilePos, layer: MapLayer, terrain: Terrain) {
        for y in from.y.min(to.y)..=from.y.max(to.y) {
            for x in from.x.min(to.x)..=from.x.max(to.x) {
                self.set_terrain(TilePos::new(x, y), layer, terrain);
            }
        }
    }

    /// Place an owned wall tile
    pub fn place_wall(&mut self, pos: TilePos, layer: MapLayer, owner: PlayerId) {
        if let Some(tile) = self.tile_mut(pos, layer) {
            tile.terrain = Terrain::Wall;
            tile.owner = Some(owner);
        }
    }

    pub fn terrain(&self, pos: TilePos, layer: MapLayer) -> Option<Terrain> {
        self.tile(pos, layer).map(|t| t.terrain)
    }

    pub fn is_water(&self, pos: TilePos, layer: MapLayer) -> bool {
        self.terrain(pos, layer) == Some(Terrain::Water)
    }

    /// Wall owner at a tile, if the tile is a wall
    pub fn wall_owner(&self, pos: TilePos, layer: MapLayer) -> Option<PlayerId> {
        self.tile(pos, layer)
            .filter(|t| t.terrain == Terrain::Wall)
            .and_then(|t| t.owner)
    }

    /// Landmass id of a tile (0 if out of bounds or not walkable)
    pub fn landmass(&self, pos: TilePos, layer: MapLayer) -> u32 {
        self.tile(pos, layer).map_or(0, |t| t.landmass)
    }

    /// Can a unit of `domain` stand on this tile?
    pub fn is_passable_for(&self, domain: UnitDomain, pos: TilePos, layer: MapLayer) -> bool {
        let Some(terrain) = self.terrain(pos, layer) else {
            return false;
        };
        match domain {
            UnitDomain::Land => terrain == Terrain::Land,
            UnitDomain::Naval => terrain == Terrain::Water,
            UnitDomain::Air | UnitDomain::Space => true,
        }
    }

    /// Land tile touching water
    pub fn is_coast(&self, pos: TilePos, layer: MapLayer) -> bool {
        self.terrain(pos, layer) == Some(Terrain::Land)
            && pos.neighbors().iter().any(|n| self.is_water(*n, layer))
    }

    /// Label every maximal connected land or water region with a fresh id
    ///
    /// Ids start at 1 and are unique across kinds within a layer. Walls and
    /// rock get 0. Returns the number of regions per layer.
    pub fn compute_landmasses(&mut self) -> Vec<u32> {
        let mut counts = Vec::with_capacity(self.layers.len());
        for layer in 0..self.layers.len() {
            counts.push(self.compute_layer_landmasses(layer));
        }
        counts
    }

    fn compute_layer_landmasses(&mut self, layer: MapLayer) -> u32 {
        let (width, height) = (self.width(layer), self.height(layer));
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                if let Some(tile) = self.tile_mut(TilePos::new(x, y), layer) {
                    tile.landmass = 0;
                }
            }
        }

        let mut next_id: u32 = 0;
        // one traversal for the whole layer: region cells stay marked, the
        // rejected border is forgotten so the next region can claim it
        let mut traversal = TerrainTraversal::for_layer(self, layer);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let start = TilePos::new(x, y);
                let Some(tile) = self.tile(start, layer) else {
                    continue;
                };
                if tile.landmass != 0 {
                    continue;
                }
                let Some(kind) = tile.terrain.region_kind() else {
                    continue;
                };

                next_id += 1;
                let mut region = Vec::new();
                let mut rejected = Vec::new();
                traversal.push_pos(start);
                let map: &GameMap = self;
                traversal.run(|_: &TerrainTraversal, pos: TilePos, _: TilePos| {
                    match map.terrain(pos, layer).and_then(|t| t.region_kind()) {
                        Some(k) if k == kind => {
                            region.push(pos);
                            VisitResult::Ok
                        }
                        _ => {
                            rejected.push(pos);
                            VisitResult::DeadEnd
                        }
                    }
                });
                for pos in rejected {
                    traversal.forget(pos);
                }

                for pos in region {
                    if let Some(tile) = self.tile_mut(pos, layer) {
                        tile.landmass = next_id;
                    }
                }
            }
        }
        next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_islands() -> GameMap {
        // Land | Water | Land, split along x
        let mut map = GameMap::new(12, 6);
        map.fill_terrain(TilePos::new(4, 0), TilePos::new(7, 5), 0, Terrain::Water);
        map.compute_landmasses();
        map
    }

    #[test]
    fn test_map_bounds() {
        let map = GameMap::new(10, 8);
        assert!(map.in_bounds(TilePos::new(9, 7), 0));
        assert!(!map.in_bounds(TilePos::new(10, 7), 0));
        assert!(!map.in_bounds(TilePos::INVALID, 0));
        assert!(!map.in_bounds(TilePos::new(0, 0), 1));
    }

    #[test]
    fn test_layers_have_own_size() {
        let mut map = GameMap::new(10, 10);
        let under = map.add_layer(4, 3);
        assert_eq!(under, 1);
        assert_eq!(map.width(under), 4);
        assert_eq!(map.height(under), 3);
        assert!(!map.in_bounds(TilePos::new(5, 5), under));
    }

    #[test]
    fn test_landmass_labels() {
        let map = two_islands();
        let west = map.landmass(TilePos::new(0, 0), 0);
        let sea = map.landmass(TilePos::new(5, 2), 0);
        let east = map.landmass(TilePos::new(11, 5), 0);

        assert_ne!(west, 0);
        assert_ne!(west, east);
        assert_ne!(west, sea);
        assert_ne!(sea, east);
        assert_eq!(west, map.landmass(TilePos::new(3, 5), 0));
    }

    #[test]
    fn test_wall_splits_nothing_but_has_no_landmass() {
        let mut map = GameMap::new(6, 6);
        map.place_wall(TilePos::new(2, 2), 0, PlayerId(1));
        map.compute_landmasses();
        assert_eq!(map.landmass(TilePos::new(2, 2), 0), 0);
        assert_eq!(map.wall_owner(TilePos::new(2, 2), 0), Some(PlayerId(1)));
        assert_eq!(
            map.landmass(TilePos::new(0, 0), 0),
            map.landmass(TilePos::new(5, 5), 0)
        );
    }

    #[test]
    fn test_landmass_ids_past_u16_range() {
        // land on every even (x, y), rock elsewhere: 256 * 256 islands
        let mut map = GameMap::new(512, 512);
        map.fill_terrain(TilePos::new(0, 0), TilePos::new(511, 511), 0, Terrain::Rock);
        for y in (0..512).step_by(2) {
            for x in (0..512).step_by(2) {
                map.set_terrain(TilePos::new(x, y), 0, Terrain::Land);
            }
        }

        assert_eq!(map.compute_landmasses(), vec![65_536]);
        assert_eq!(map.landmass(TilePos::new(0, 0), 0), 1);
        assert_eq!(map.landmass(TilePos::new(510, 510), 0), 65_536);
        assert_eq!(map.landmass(TilePos::new(1, 1), 0), 0);
    }

    #[test]
    fn test_passability_by_domain() {
        let map = two_islands();
        let sea = TilePos::new(5, 1);
        let shore = TilePos::new(3, 1);
        assert!(!map.is_passable_for(UnitDomain::Land, sea, 0));
        assert!(map.is_passable_for(UnitDomain::Naval, sea, 0));
        assert!(map.is_passable_for(UnitDomain::Air, sea, 0));
        assert!(map.is_passable_for(UnitDomain::Land, shore, 0));
        assert!(map.is_coast(shore, 0));
        assert!(!map.is_coast(TilePos::new(0, 1), 0));
    }
}
