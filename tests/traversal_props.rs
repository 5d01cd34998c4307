//! Property tests for the flood-fill traversal

use ahash::AHashSet;
use arc_forces::core::types::TilePos;
use arc_forces::map::{TerrainTraversal, VisitResult};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Whatever the visitor answers, every cell is visited at most once and
    /// the search ends
    #[test]
    fn prop_no_cell_visited_twice(
        width in 1u32..24,
        height in 1u32..24,
        start in (0i32..24, 0i32..24),
        walls in prop::collection::hash_set((0i32..24, 0i32..24), 0..120),
    ) {
        let mut traversal = TerrainTraversal::new(width, height);
        traversal.push_pos(TilePos::new(start.0, start.1));

        let mut seen = AHashSet::new();
        let mut duplicate = None;
        traversal.run(|_: &TerrainTraversal, pos: TilePos, _: TilePos| {
            if !seen.insert(pos) {
                duplicate = Some(pos);
            }
            if walls.contains(&(pos.x, pos.y)) {
                VisitResult::DeadEnd
            } else {
                VisitResult::Ok
            }
        });

        prop_assert_eq!(duplicate, None);
        prop_assert!(seen.len() <= (width * height) as usize);
        prop_assert_eq!(seen.len(), traversal.visited_count());
    }

    /// On an open grid the recorded distance is the Chebyshev distance to
    /// the start and every cell is reached
    #[test]
    fn prop_open_grid_distances_are_chebyshev(
        width in 1u32..20,
        height in 1u32..20,
        sx in 0i32..20,
        sy in 0i32..20,
    ) {
        let start = TilePos::new(sx % width as i32, sy % height as i32);
        let mut traversal = TerrainTraversal::new(width, height);
        traversal.push_pos(start);
        let finished = traversal.run(|_: &TerrainTraversal, _: TilePos, _: TilePos| VisitResult::Ok);

        prop_assert!(!finished);
        prop_assert_eq!(traversal.visited_count(), (width * height) as usize);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let pos = TilePos::new(x, y);
                prop_assert_eq!(traversal.distance(pos), Some(pos.distance(&start)));
            }
        }
    }

    /// `Finished` stops the search at the cell that returned it
    #[test]
    fn prop_finished_stops_immediately(
        width in 2u32..20,
        height in 2u32..20,
        stop_after in 1usize..40,
    ) {
        let mut traversal = TerrainTraversal::new(width, height);
        traversal.push_pos(TilePos::new(0, 0));

        let mut visits = 0usize;
        let finished = traversal.run(|_: &TerrainTraversal, _: TilePos, _: TilePos| {
            visits += 1;
            if visits == stop_after {
                VisitResult::Finished
            } else {
                VisitResult::Ok
            }
        });

        let cells = (width * height) as usize;
        prop_assert_eq!(finished, stop_after <= cells);
        prop_assert_eq!(visits, stop_after.min(cells));
    }
}
