//! Breadth-first flood fill over a bounded tile grid
//!
//! The single search primitive behind every goal search of the force AI:
//! enemy acquisition, rally points, landing sites and landmass labelling.
//! A visitor decides per cell whether to expand, stop the branch, or stop
//! the whole search.

use std::collections::VecDeque;

use crate::core::types::{MapLayer, TilePos};
use crate::map::grid::GameMap;

/// Verdict returned by a visitor for one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    /// Expand the neighbours of this cell
    Ok,
    /// Do not expand from this cell; other branches continue
    DeadEnd,
    /// Stop the whole search successfully
    Finished,
}

/// Per-cell callback driven by [`TerrainTraversal::run`]
pub trait TraversalVisitor {
    /// `from` is the cell this one was reached from (itself for start cells)
    fn visit(&mut self, traversal: &TerrainTraversal, pos: TilePos, from: TilePos) -> VisitResult;
}

impl<F> TraversalVisitor for F
where
    F: FnMut(&TerrainTraversal, TilePos, TilePos) -> VisitResult,
{
    fn visit(&mut self, traversal: &TerrainTraversal, pos: TilePos, from: TilePos) -> VisitResult {
        self(traversal, pos, from)
    }
}

/// Transient search state: visited-at-distance marks plus a work queue
///
/// Lives for exactly one search. Every enqueued cell is marked at enqueue
/// time, so no cell is queued twice and the search over a finite grid
/// always terminates.
#[derive(Debug)]
pub struct TerrainTraversal {
    width: i32,
    height: i32,
    marks: Vec<Option<u32>>,
    queue: VecDeque<(TilePos, TilePos)>,
}

impl TerrainTraversal {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as i32,
            height: height as i32,
            marks: vec![None; (width as usize) * (height as usize)],
            queue: VecDeque::new(),
        }
    }

    /// Traversal sized for one layer of the map
    pub fn for_layer(map: &GameMap, layer: MapLayer) -> Self {
        Self::new(map.width(layer), map.height(layer))
    }

    pub fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: TilePos) -> usize {
        (pos.y * self.width + pos.x) as usize
    }

    /// Minimum distance of `pos` from a start cell, if it was reached
    pub fn distance(&self, pos: TilePos) -> Option<u32> {
        if !self.in_bounds(pos) {
            return None;
        }
        self.marks[self.index(pos)]
    }

    pub fn is_visited(&self, pos: TilePos) -> bool {
        self.distance(pos).is_some()
    }

    /// Number of cells marked so far
    pub fn visited_count(&self) -> usize {
        self.marks.iter().filter(|m| m.is_some()).count()
    }

    fn enqueue(&mut self, pos: TilePos, from: TilePos, distance: u32) -> bool {
        if !self.in_bounds(pos) {
            return false;
        }
        let idx = self.index(pos);
        if self.marks[idx].is_some() {
            return false;
        }
        self.marks[idx] = Some(distance);
        self.queue.push_back((pos, from));
        true
    }

    /// Clear the mark of a cell so a later run may reach it again
    pub fn forget(&mut self, pos: TilePos) {
        if self.in_bounds(pos) {
            let idx = self.index(pos);
            self.marks[idx] = None;
        }
    }

    /// Add a start cell at distance 0; out-of-bounds cells are ignored
    pub fn push_pos(&mut self, pos: TilePos) {
        self.enqueue(pos, pos, 0);
    }

    /// Add every cell of a `w`x`h` footprint anchored at `pos`
    pub fn push_footprint(&mut self, pos: TilePos, w: u32, h: u32) {
        for dy in 0..h.max(1) as i32 {
            for dx in 0..w.max(1) as i32 {
                self.push_pos(TilePos::new(pos.x + dx, pos.y + dy));
            }
        }
    }

    /// Add the unvisited neighbours of an already visited cell
    pub fn push_neighbors(&mut self, pos: TilePos) {
        let next = self.distance(pos).map_or(1, |d| d + 1);
        for neighbor in pos.neighbors() {
            self.enqueue(neighbor, pos, next);
        }
    }

    /// Start from a unit: its footprint plus the ring around it
    ///
    /// A unit standing on a cell its own type cannot enter (a ship docked at
    /// a shore, a unit just unloaded) still gets a usable start this way.
    pub fn push_unit_pos_and_neighbors(&mut self, pos: TilePos, w: u32, h: u32) {
        self.push_footprint(pos, w, h);
        let (w, h) = (w.max(1) as i32, h.max(1) as i32);
        for y in (pos.y - 1)..=(pos.y + h) {
            for x in (pos.x - 1)..=(pos.x + w) {
                let cell = TilePos::new(x, y);
                self.enqueue(cell, pos, 1);
            }
        }
    }

    /// Run the flood fill to completion
    ///
    /// Returns true iff some visit returned [`VisitResult::Finished`].
    pub fn run<V: TraversalVisitor>(&mut self, mut visitor: V) -> bool {
        while let Some((pos, from)) = self.queue.pop_front() {
            match visitor.visit(self, pos, from) {
                VisitResult::Finished => {
                    self.queue.clear();
                    return true;
                }
                VisitResult::DeadEnd => {}
                VisitResult::Ok => self.push_neighbors(pos),
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;

    #[test]
    fn test_fill_visits_every_cell_once() {
        let mut traversal = TerrainTraversal::new(6, 4);
        traversal.push_pos(TilePos::new(0, 0));

        let mut seen = AHashSet::new();
        let finished = traversal.run(|_: &TerrainTraversal, pos: TilePos, _from: TilePos| {
            assert!(seen.insert(pos), "cell {:?} visited twice", pos);
            VisitResult::Ok
        });

        assert!(!finished);
        assert_eq!(seen.len(), 24);
        assert_eq!(traversal.visited_count(), 24);
    }

    #[test]
    fn test_forgotten_cell_is_reached_by_next_run() {
        let mut traversal = TerrainTraversal::new(3, 1);
        traversal.push_pos(TilePos::new(0, 0));
        traversal.run(|_: &TerrainTraversal, pos: TilePos, _: TilePos| {
            if pos.x == 0 {
                VisitResult::Ok
            } else {
                VisitResult::DeadEnd
            }
        });
        assert!(traversal.is_visited(TilePos::new(1, 0)));
        assert!(!traversal.is_visited(TilePos::new(2, 0)));

        traversal.forget(TilePos::new(1, 0));
        traversal.push_pos(TilePos::new(2, 0));
        let mut seen = Vec::new();
        traversal.run(|_: &TerrainTraversal, pos: TilePos, _: TilePos| {
            seen.push(pos);
            VisitResult::Ok
        });
        assert_eq!(seen, vec![TilePos::new(2, 0), TilePos::new(1, 0)]);
    }

    #[test]
    fn test_distances_are_chebyshev() {
        let mut traversal = TerrainTraversal::new(10, 10);
        traversal.push_pos(TilePos::new(2, 2));
        traversal.run(|_: &TerrainTraversal, _: TilePos, _: TilePos| VisitResult::Ok);

        assert_eq!(traversal.distance(TilePos::new(2, 2)), Some(0));
        assert_eq!(traversal.distance(TilePos::new(3, 3)), Some(1));
        assert_eq!(traversal.distance(TilePos::new(9, 4)), Some(7));
        assert_eq!(traversal.distance(TilePos::new(10, 4)), None);
    }

    #[test]
    fn test_dead_end_stops_branch_only() {
        // Column x == 3 is a wall; nothing beyond it is reachable
        let mut traversal = TerrainTraversal::new(7, 3);
        traversal.push_pos(TilePos::new(0, 1));
        let mut visited_right = false;
        traversal.run(|_: &TerrainTraversal, pos: TilePos, _: TilePos| {
            if pos.x > 3 {
                visited_right = true;
            }
            if pos.x == 3 {
                VisitResult::DeadEnd
            } else {
                VisitResult::Ok
            }
        });

        assert!(!visited_right);
        assert!(traversal.is_visited(TilePos::new(3, 0)));
        assert!(!traversal.is_visited(TilePos::new(4, 0)));
    }

    #[test]
    fn test_finished_stops_search() {
        let mut traversal = TerrainTraversal::new(20, 20);
        traversal.push_pos(TilePos::new(0, 0));
        let mut visits = 0;
        let finished = traversal.run(|_: &TerrainTraversal, pos: TilePos, _: TilePos| {
            visits += 1;
            if pos == TilePos::new(2, 2) {
                VisitResult::Finished
            } else {
                VisitResult::Ok
            }
        });

        assert!(finished);
        // Only cells up to distance 2 can have been visited
        assert!(visits <= 9);
    }

    #[test]
    fn test_out_of_bounds_start_ignored() {
        let mut traversal = TerrainTraversal::new(4, 4);
        traversal.push_pos(TilePos::INVALID);
        traversal.push_pos(TilePos::new(4, 0));
        let finished = traversal.run(|_: &TerrainTraversal, _: TilePos, _: TilePos| VisitResult::Finished);
        assert!(!finished);
        assert_eq!(traversal.visited_count(), 0);
    }

    #[test]
    fn test_unit_start_includes_ring() {
        let mut traversal = TerrainTraversal::new(10, 10);
        traversal.push_unit_pos_and_neighbors(TilePos::new(4, 4), 2, 2);
        assert_eq!(traversal.distance(TilePos::new(5, 5)), Some(0));
        assert_eq!(traversal.distance(TilePos::new(3, 3)), Some(1));
        assert_eq!(traversal.distance(TilePos::new(6, 6)), Some(1));
        assert_eq!(traversal.visited_count(), 16);
    }
}
