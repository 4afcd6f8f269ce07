//! Planet surface grid and building placement.
//!
//! Buildings occupy rectangular footprints on a planet's cell grid. The
//! [`PlacementHelper`] answers "where would this footprint fit?" against a
//! grid plus a building index. Live planets pass the real index, which pulls
//! new buildings next to existing ones; snapshots pass an empty index and
//! take the first cell that fits.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::BuildingId;

// ============================================================================
// Surface Grid
// ============================================================================

/// Terrain family of a planet surface; buildings list the kinds they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// Temperate, earth-like worlds.
    Earth,
    /// Dry sand worlds.
    Desert,
    /// Frozen worlds.
    Frozen,
    /// Airless cratered rock.
    Cratered,
    /// Toxic swamp worlds.
    Liquid,
}

/// State of a cell in the surface grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SurfaceCell {
    /// Cell is empty and available for building.
    #[default]
    Empty,
    /// Cell is occupied by a building.
    Occupied(BuildingId),
    /// Cell is blocked by terrain.
    Blocked,
}

/// Cell grid of one planet surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceGrid {
    /// Grid width in cells.
    width: u32,
    /// Grid height in cells.
    height: u32,
    /// Cell data stored in row-major order.
    cells: Vec<SurfaceCell>,
}

impl SurfaceGrid {
    /// Create a new surface grid with all cells empty.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "SurfaceGrid width must be positive");
        assert!(height > 0, "SurfaceGrid height must be positive");

        let cell_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cells: vec![SurfaceCell::Empty; cell_count],
        }
    }

    /// Builder: mark the given cells as blocked terrain.
    #[must_use]
    pub fn with_blocked(mut self, blocked: &[(u32, u32)]) -> Self {
        for &(x, y) in blocked {
            self.set_cell(x, y, SurfaceCell::Blocked);
        }
        self
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn coords_to_index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Check if coordinates are within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Get cell state at coordinates.
    /// Returns `None` if out of bounds.
    #[must_use]
    pub fn get_cell(&self, x: u32, y: u32) -> Option<SurfaceCell> {
        if self.in_bounds(x, y) {
            Some(self.cells[self.coords_to_index(x, y)])
        } else {
            None
        }
    }

    /// Set cell state at coordinates.
    /// Returns `false` if out of bounds.
    pub fn set_cell(&mut self, x: u32, y: u32, cell: SurfaceCell) -> bool {
        if self.in_bounds(x, y) {
            let index = self.coords_to_index(x, y);
            self.cells[index] = cell;
            true
        } else {
            false
        }
    }

    /// Check if a cell is available for placement.
    #[must_use]
    pub fn is_available(&self, x: u32, y: u32) -> bool {
        matches!(self.get_cell(x, y), Some(SurfaceCell::Empty))
    }

    /// Mark cells as occupied by a building.
    ///
    /// Returns `false` (and changes nothing) if any cell is out of bounds.
    pub fn occupy(&mut self, x: u32, y: u32, footprint: Footprint, building: BuildingId) -> bool {
        if x + footprint.width > self.width || y + footprint.height > self.height {
            return false;
        }
        for (cx, cy) in footprint.cells_at(x, y) {
            self.set_cell(cx, cy, SurfaceCell::Occupied(building));
        }
        true
    }

    /// Clear every cell occupied by `building`.
    pub fn release(&mut self, building: BuildingId) {
        for cell in &mut self.cells {
            if *cell == SurfaceCell::Occupied(building) {
                *cell = SurfaceCell::Empty;
            }
        }
    }

    /// Iterate over all occupied cell coordinates.
    pub fn occupied_cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            matches!(cell, SurfaceCell::Occupied(_))
                .then(|| ((i as u32) % self.width, (i as u32) / self.width))
        })
    }

    /// Cells that block ground movement (terrain and buildings).
    pub fn obstacle_cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            (*cell != SurfaceCell::Empty).then(|| ((i as u32) % self.width, (i as u32) / self.width))
        })
    }
}

// ============================================================================
// Footprint
// ============================================================================

/// Size of a building in surface cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    /// Width in cells.
    pub width: u32,
    /// Height in cells.
    pub height: u32,
}

impl Footprint {
    /// Create a new footprint.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Cells covered when the top-left corner sits at `(x, y)`.
    pub fn cells_at(self, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> {
        (0..self.height).flat_map(move |dy| (0..self.width).map(move |dx| (x + dx, y + dy)))
    }
}

impl Default for Footprint {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

// ============================================================================
// Placement Validation
// ============================================================================

/// Result of placement validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementResult {
    /// Placement is valid.
    Valid,
    /// One or more cells are blocked or occupied.
    Blocked {
        /// List of blocked cell coordinates.
        cells: Vec<(u32, u32)>,
    },
    /// Footprint would extend outside the grid.
    OutOfBounds,
}

impl PlacementResult {
    /// Check if placement is valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, PlacementResult::Valid)
    }
}

/// Check if a footprint can be placed with its top-left corner at `(x, y)`.
#[must_use]
pub fn can_place(grid: &SurfaceGrid, x: u32, y: u32, footprint: Footprint) -> PlacementResult {
    if x + footprint.width > grid.width() || y + footprint.height > grid.height() {
        return PlacementResult::OutOfBounds;
    }

    let blocked: Vec<(u32, u32)> = footprint
        .cells_at(x, y)
        .filter(|&(cx, cy)| !grid.is_available(cx, cy))
        .collect();

    if blocked.is_empty() {
        PlacementResult::Valid
    } else {
        PlacementResult::Blocked { cells: blocked }
    }
}

// ============================================================================
// Placement Helper
// ============================================================================

/// Cells already covered by buildings, used to cluster new construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildingIndex {
    cells: BTreeSet<(u32, u32)>,
}

impl BuildingIndex {
    /// An index with no buildings: placement falls back to first fit.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index every occupied cell of `grid`.
    #[must_use]
    pub fn from_grid(grid: &SurfaceGrid) -> Self {
        Self {
            cells: grid.occupied_cells().collect(),
        }
    }

    /// Whether the index holds no buildings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of indexed cells touching the ring around a footprint.
    fn adjacency(&self, x: u32, y: u32, footprint: Footprint) -> usize {
        let x0 = i64::from(x) - 1;
        let y0 = i64::from(y) - 1;
        let x1 = i64::from(x + footprint.width);
        let y1 = i64::from(y + footprint.height);
        self.cells
            .iter()
            .filter(|&&(cx, cy)| {
                let (cx, cy) = (i64::from(cx), i64::from(cy));
                let in_box = cx >= x0 && cx <= x1 && cy >= y0 && cy <= y1;
                let on_ring = cx == x0 || cx == x1 || cy == y0 || cy == y1;
                in_box && on_ring
            })
            .count()
    }
}

/// Placement test bound to one grid and one building index.
#[derive(Debug, Clone)]
pub struct PlacementHelper<'a> {
    grid: &'a SurfaceGrid,
    index: BuildingIndex,
}

impl<'a> PlacementHelper<'a> {
    /// Create a helper over `grid` using `index` for clustering.
    #[must_use]
    pub fn new(grid: &'a SurfaceGrid, index: BuildingIndex) -> Self {
        Self { grid, index }
    }

    /// Check a specific location.
    #[must_use]
    pub fn can_place_at(&self, x: u32, y: u32, footprint: Footprint) -> bool {
        can_place(self.grid, x, y, footprint).is_valid()
    }

    /// Find the top-left cell for `footprint`, or `None` when nothing fits.
    ///
    /// Scans row-major. With an empty index the first fitting cell wins;
    /// otherwise the fitting cell with the most indexed neighbours wins,
    /// ties resolved toward scan order.
    #[must_use]
    pub fn find_location(&self, footprint: Footprint) -> Option<(u32, u32)> {
        if footprint.width > self.grid.width() || footprint.height > self.grid.height() {
            return None;
        }

        let mut best: Option<((u32, u32), usize)> = None;
        for y in 0..=(self.grid.height() - footprint.height) {
            for x in 0..=(self.grid.width() - footprint.width) {
                if !self.can_place_at(x, y, footprint) {
                    continue;
                }
                if self.index.is_empty() {
                    return Some((x, y));
                }
                let score = self.index.adjacency(x, y, footprint);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some(((x, y), score));
                }
            }
        }
        best.map(|(cell, _)| cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_place_valid_and_blocked() {
        let mut grid = SurfaceGrid::new(6, 6);
        assert!(can_place(&grid, 0, 0, Footprint::new(2, 2)).is_valid());

        grid.occupy(1, 1, Footprint::new(2, 2), BuildingId(7));
        match can_place(&grid, 0, 0, Footprint::new(2, 2)) {
            PlacementResult::Blocked { cells } => assert_eq!(cells, vec![(1, 1)]),
            other => panic!("expected blocked, got {other:?}"),
        }
        assert_eq!(
            can_place(&grid, 5, 5, Footprint::new(2, 2)),
            PlacementResult::OutOfBounds
        );
    }

    #[test]
    fn test_release_clears_only_that_building() {
        let mut grid = SurfaceGrid::new(4, 4);
        grid.occupy(0, 0, Footprint::new(2, 1), BuildingId(1));
        grid.occupy(2, 0, Footprint::new(2, 1), BuildingId(2));
        grid.release(BuildingId(1));
        assert!(grid.is_available(0, 0));
        assert!(!grid.is_available(2, 0));
        assert_eq!(grid.occupied_cells().count(), 2);
    }

    #[test]
    fn test_find_location_first_fit_with_empty_index() {
        let grid = SurfaceGrid::new(5, 5).with_blocked(&[(0, 0), (1, 0)]);
        let helper = PlacementHelper::new(&grid, BuildingIndex::empty());
        assert_eq!(helper.find_location(Footprint::new(2, 1)), Some((2, 0)));
    }

    #[test]
    fn test_find_location_prefers_neighbours_with_index() {
        let mut grid = SurfaceGrid::new(8, 8);
        grid.occupy(5, 5, Footprint::new(2, 2), BuildingId(3));
        let helper = PlacementHelper::new(&grid, BuildingIndex::from_grid(&grid));
        let (x, y) = helper
            .find_location(Footprint::new(1, 1))
            .expect("room available");
        // Must touch the existing building's ring
        assert!((4..=7).contains(&x) && (4..=7).contains(&y));
    }

    #[test]
    fn test_find_location_none_when_full() {
        let grid = SurfaceGrid::new(2, 2).with_blocked(&[(0, 0), (1, 1)]);
        let helper = PlacementHelper::new(&grid, BuildingIndex::empty());
        assert_eq!(helper.find_location(Footprint::new(2, 1)), None);
        assert_eq!(helper.find_location(Footprint::new(3, 1)), None);
    }
}
