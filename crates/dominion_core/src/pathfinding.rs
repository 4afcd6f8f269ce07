//! Grid A* for ground battles.
//!
//! Ground units move cell by cell over a planet's battle grid. Terrain and
//! buildings block cells permanently; units block them transiently and are
//! passed in per query. Ordering is fully deterministic: equal scores are
//! broken by cell coordinates.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use crate::error::{GameError, Result};
use crate::surface::{SurfaceCell, SurfaceGrid};

/// Terrain of one battle cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BattleCell {
    /// Passable ground.
    #[default]
    Open,
    /// Impassable terrain.
    Blocked,
    /// Covered by a building.
    Building,
}

impl BattleCell {
    /// Whether units can enter.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Ground battle map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleGrid {
    width: u32,
    height: u32,
    cells: Vec<BattleCell>,
}

impl BattleGrid {
    /// All-open grid.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "BattleGrid width must be positive");
        assert!(height > 0, "BattleGrid height must be positive");
        Self {
            width,
            height,
            cells: vec![BattleCell::Open; (width as usize) * (height as usize)],
        }
    }

    /// Battle map of a planet surface: terrain and buildings block.
    #[must_use]
    pub fn from_surface(surface: &SurfaceGrid) -> Self {
        let mut grid = Self::new(surface.width(), surface.height());
        for y in 0..surface.height() {
            for x in 0..surface.width() {
                let cell = match surface.get_cell(x, y) {
                    Some(SurfaceCell::Blocked) => BattleCell::Blocked,
                    Some(SurfaceCell::Occupied(_)) => BattleCell::Building,
                    _ => BattleCell::Open,
                };
                grid.set_cell(x, y, cell);
            }
        }
        grid
    }

    /// Width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Whether a cell is on the map.
    #[must_use]
    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Terrain of a cell, `None` off the map.
    #[must_use]
    pub fn get_cell(&self, x: u32, y: u32) -> Option<BattleCell> {
        self.in_bounds(x, y).then(|| self.cells[self.index(x, y)])
    }

    /// Set a cell. Returns `false` off the map.
    pub fn set_cell(&mut self, x: u32, y: u32, cell: BattleCell) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        let index = self.index(x, y);
        self.cells[index] = cell;
        true
    }

    /// Whether terrain allows entering a cell.
    #[must_use]
    pub fn is_walkable(&self, x: u32, y: u32) -> bool {
        self.get_cell(x, y).is_some_and(BattleCell::is_walkable)
    }
}

/// A node in the A* open set.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    x: u32,
    y: u32,
    f_score: u32,
    /// Lower coordinates first on equal scores.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f_score.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 8-directional neighbour offsets.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

#[inline]
fn chebyshev(x1: u32, y1: u32, x2: u32, y2: u32) -> u32 {
    x1.abs_diff(x2).max(y1.abs_diff(y2))
}

#[inline]
fn tie_breaker(x: u32, y: u32) -> u64 {
    (u64::from(y) << 32) | u64::from(x)
}

/// Cells a unit may step through: terrain open and no unit standing there.
fn passable(grid: &BattleGrid, occupied: &BTreeSet<(u32, u32)>, cell: (u32, u32), goal: (u32, u32)) -> bool {
    grid.is_walkable(cell.0, cell.1) && (cell == goal || !occupied.contains(&cell))
}

/// Shortest path from `start` to `goal`, both included.
///
/// `occupied` cells (other units) are avoided except the goal itself. No
/// corner cutting past blocked cells.
///
/// # Errors
///
/// [`GameError::NoPath`] when the goal is off the map, blocked by terrain,
/// or unreachable.
pub fn find_path(
    grid: &BattleGrid,
    start: (u32, u32),
    goal: (u32, u32),
    occupied: &BTreeSet<(u32, u32)>,
) -> Result<Vec<(u32, u32)>> {
    let no_path = || GameError::NoPath { from: start, to: goal };
    if !grid.in_bounds(start.0, start.1) || !grid.is_walkable(goal.0, goal.1) {
        return Err(no_path());
    }
    if start == goal {
        return Ok(vec![start]);
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<(u32, u32), (u32, u32)> = HashMap::new();
    let mut g_score: HashMap<(u32, u32), u32> = HashMap::new();

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        x: start.0,
        y: start.1,
        f_score: chebyshev(start.0, start.1, goal.0, goal.1),
        tie_breaker: tie_breaker(start.0, start.1),
    });

    while let Some(current) = open_set.pop() {
        let here = (current.x, current.y);
        if here == goal {
            return Ok(reconstruct_path(&came_from, goal));
        }
        let current_g = g_score.get(&here).copied().unwrap_or(u32::MAX);

        for &(dx, dy) in &DIRECTIONS {
            let (Some(nx), Some(ny)) = (
                current.x.checked_add_signed(dx),
                current.y.checked_add_signed(dy),
            ) else {
                continue;
            };
            let next = (nx, ny);
            if !passable(grid, occupied, next, goal) {
                continue;
            }
            // Diagonals need both adjacent cardinals open.
            if dx != 0 && dy != 0
                && !(grid.is_walkable(nx, current.y) && grid.is_walkable(current.x, ny))
            {
                continue;
            }

            let tentative = current_g.saturating_add(1);
            if tentative < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, here);
                g_score.insert(next, tentative);
                open_set.push(AStarNode {
                    x: nx,
                    y: ny,
                    f_score: tentative + chebyshev(nx, ny, goal.0, goal.1),
                    tie_breaker: tie_breaker(nx, ny),
                });
            }
        }
    }

    Err(no_path())
}

fn reconstruct_path(came_from: &HashMap<(u32, u32), (u32, u32)>, goal: (u32, u32)) -> Vec<(u32, u32)> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::BuildingId;
    use crate::surface::Footprint;

    #[test]
    fn test_straight_path() {
        let grid = BattleGrid::new(5, 5);
        let path = find_path(&grid, (0, 0), (4, 0), &BTreeSet::new()).expect("path");
        assert_eq!(path.first(), Some(&(0, 0)));
        assert_eq!(path.last(), Some(&(4, 0)));
        assert_eq!(path.len(), 5);
    }

    #[test]
    fn test_path_around_wall() {
        let mut grid = BattleGrid::new(5, 5);
        for y in 0..4 {
            grid.set_cell(2, y, BattleCell::Blocked);
        }
        let path = find_path(&grid, (0, 0), (4, 0), &BTreeSet::new()).expect("path");
        assert!(path.iter().all(|&(x, y)| grid.is_walkable(x, y)));
        assert!(path.contains(&(2, 4)));
    }

    #[test]
    fn test_occupied_cells_avoided_but_goal_allowed() {
        let grid = BattleGrid::new(3, 1);
        let occupied: BTreeSet<_> = [(1, 0)].into_iter().collect();
        assert!(matches!(
            find_path(&grid, (0, 0), (2, 0), &occupied),
            Err(GameError::NoPath { .. })
        ));
        let path = find_path(&grid, (0, 0), (1, 0), &occupied).expect("goal may be occupied");
        assert_eq!(path, vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_blocked_goal_is_no_path() {
        let mut grid = BattleGrid::new(3, 3);
        grid.set_cell(2, 2, BattleCell::Building);
        assert!(find_path(&grid, (0, 0), (2, 2), &BTreeSet::new()).is_err());
    }

    #[test]
    fn test_from_surface_marks_buildings() {
        let mut surface = SurfaceGrid::new(4, 4).with_blocked(&[(3, 3)]);
        surface.occupy(0, 0, Footprint::new(2, 1), BuildingId(1));
        let grid = BattleGrid::from_surface(&surface);
        assert_eq!(grid.get_cell(1, 0), Some(BattleCell::Building));
        assert_eq!(grid.get_cell(3, 3), Some(BattleCell::Blocked));
        assert!(grid.is_walkable(2, 2));
    }

    #[test]
    fn test_deterministic() {
        let grid = BattleGrid::new(8, 8);
        let a = find_path(&grid, (0, 0), (7, 5), &BTreeSet::new()).expect("path");
        let b = find_path(&grid, (0, 0), (7, 5), &BTreeSet::new()).expect("path");
        assert_eq!(a, b);
    }
}
