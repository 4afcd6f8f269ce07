//! Battle kinematics: angle discretization and bounding-box tests.
//!
//! Every moving battle object carries a continuous facing angle. Sprites and
//! hit boxes only exist for a fixed number of rotations, so the angle is
//! mapped to a discrete column of a [`FrameMatrix`]. Rendering and
//! hit-testing go through the same [`CombatObject::current_frame`], which
//! keeps what is drawn and what is hit identical.

use std::cell::Cell;
use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::FrameLayout;
use crate::ids::PlayerId;

/// Corner vectors of the isometric reference diamond, in boundary order.
///
/// Starts at the south corner so that the boundary list wraps through zero
/// between the last two corners.
const REFERENCE_CORNERS: [(f64, f64); 4] = [(0.0, 15.0), (-28.0, 0.0), (0.0, -15.0), (28.0, 0.0)];

/// Continuous battle-space point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Angle of the vector from `self` to `other`, in radians.
    #[must_use]
    pub fn angle_to(self, other: Self) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// Move toward `target` by at most `step`; returns whether it was reached.
    pub fn step_toward(&mut self, target: Self, step: f64) -> bool {
        let dist = self.distance(target);
        if dist <= step {
            *self = target;
            return true;
        }
        let ratio = step / dist;
        self.x += (target.x - self.x) * ratio;
        self.y += (target.y - self.y) * ratio;
        false
    }
}

/// Axis-aligned rectangle given by its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Rectangle of the given size centred on `center`.
    #[must_use]
    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        Self {
            x: center.x - width / 2.0,
            y: center.y - height / 2.0,
            width,
            height,
        }
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether the two rectangles overlap (touching edges do not count).
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }

    /// Whether `self` lies entirely inside `outer`.
    #[must_use]
    pub fn within(&self, outer: &Self) -> bool {
        self.x >= outer.x && self.y >= outer.y && self.right() <= outer.right() && self.bottom() <= outer.bottom()
    }

    /// Whether `point` lies inside (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }
}

/// Precomputed boundary fractions for one angle count.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationTable {
    /// `n + 1` boundary fractions in `[0, 1)`; the last repeats the first.
    boundaries: Vec<f64>,
}

impl RotationTable {
    /// Build the table for `angles` discrete rotations.
    ///
    /// # Panics
    ///
    /// Panics if `angles` is zero or not a multiple of four.
    #[must_use]
    pub fn new(angles: u32) -> Self {
        assert!(angles > 0 && angles % 4 == 0, "angle count must be a positive multiple of 4");
        let per_edge = angles / 4;
        let mut boundaries = Vec::with_capacity(angles as usize + 1);
        for edge in 0..4 {
            let (x0, y0) = REFERENCE_CORNERS[edge];
            let (x1, y1) = REFERENCE_CORNERS[(edge + 1) % 4];
            for step in 0..per_edge {
                let t = f64::from(step) / f64::from(per_edge);
                let x = x0 + (x1 - x0) * t;
                let y = y0 + (y1 - y0) * t;
                boundaries.push(normalize_fraction(y.atan2(x) / TAU));
            }
        }
        boundaries.push(boundaries[0]);
        Self { boundaries }
    }

    /// Number of discrete angles.
    #[must_use]
    pub fn angles(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Boundary fraction of one discrete angle.
    #[must_use]
    pub fn boundary(&self, index: usize) -> f64 {
        self.boundaries[index % self.angles()]
    }

    /// Map a continuous angle (radians) to a discrete angle index.
    ///
    /// Finds the segment `[a0, a1)` containing the angle, wrapping when
    /// `a0 > a1`, and picks the closer endpoint. Ties go to the lower index.
    #[must_use]
    pub fn resolve(&self, angle: f64) -> usize {
        let n = self.angles();
        let f = normalize_fraction(angle / TAU);
        for i in 0..n {
            let a0 = self.boundaries[i];
            let a1 = self.boundaries[i + 1];
            let inside = if a0 <= a1 {
                f >= a0 && f < a1
            } else {
                f >= a0 || f < a1
            };
            if !inside {
                continue;
            }
            let to_lower = (f - a0).rem_euclid(1.0);
            let to_upper = (a1 - f).rem_euclid(1.0);
            return if to_lower <= to_upper { i } else { (i + 1) % n };
        }
        // Unreachable for a well-formed table; the segments cover [0, 1).
        0
    }
}

/// Fold a turn fraction into `[0, 1)`.
fn normalize_fraction(f: f64) -> f64 {
    let f = f.rem_euclid(1.0);
    if f >= 1.0 {
        0.0
    } else {
        f
    }
}

/// One sprite frame and its hit box size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Image id handed to the renderer.
    pub id: u32,
    /// Width in battle units.
    pub width: f64,
    /// Height in battle units.
    pub height: f64,
}

/// Frames indexed by `(phase, discrete angle)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMatrix {
    table: RotationTable,
    rows: Vec<Vec<Frame>>,
}

impl FrameMatrix {
    /// Build a matrix from explicit rows (one per phase).
    ///
    /// # Panics
    ///
    /// Panics if there are no rows or a row's length differs from the
    /// table's angle count.
    #[must_use]
    pub fn new(table: RotationTable, rows: Vec<Vec<Frame>>) -> Self {
        assert!(!rows.is_empty(), "frame matrix needs at least one phase");
        assert!(
            rows.iter().all(|row| row.len() == table.angles()),
            "every phase row needs one frame per angle"
        );
        Self { table, rows }
    }

    /// Build a uniform matrix from a sprite layout. Frame ids run row-major.
    ///
    /// # Panics
    ///
    /// Panics if the layout has zero phases or an invalid angle count.
    #[must_use]
    pub fn from_layout(layout: &FrameLayout) -> Self {
        assert!(layout.phases > 0, "frame matrix needs at least one phase");
        let table = RotationTable::new(layout.angles);
        let rows = (0..layout.phases)
            .map(|phase| {
                (0..layout.angles)
                    .map(|angle| Frame {
                        id: phase * layout.angles + angle,
                        width: layout.width,
                        height: layout.height,
                    })
                    .collect()
            })
            .collect();
        Self::new(table, rows)
    }

    /// Rotation table shared by every row.
    #[must_use]
    pub fn table(&self) -> &RotationTable {
        &self.table
    }

    /// Number of animation phases.
    #[must_use]
    pub fn phases(&self) -> usize {
        self.rows.len()
    }

    /// Frame for a phase and discrete angle; the phase wraps.
    #[must_use]
    pub fn frame(&self, phase: usize, angle_index: usize) -> Frame {
        self.rows[phase % self.rows.len()][angle_index % self.table.angles()]
    }
}

/// A positioned, rotating battle object.
#[derive(Debug, Clone)]
pub struct CombatObject {
    /// Centre position.
    pub position: Point,
    /// Owner.
    pub owner: PlayerId,
    angle: f64,
    /// Animation phase.
    pub phase: usize,
    matrix: Arc<FrameMatrix>,
    memo: Cell<Option<(f64, usize)>>,
}

impl CombatObject {
    /// Create an object facing `angle` radians.
    #[must_use]
    pub fn new(position: Point, owner: PlayerId, angle: f64, matrix: Arc<FrameMatrix>) -> Self {
        Self {
            position,
            owner,
            angle,
            phase: 0,
            matrix,
            memo: Cell::new(None),
        }
    }

    /// Continuous facing angle.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Set the facing angle.
    pub fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
    }

    /// Discrete angle index for the current facing.
    ///
    /// Recomputed only when the angle changed since the previous read.
    #[must_use]
    pub fn angle_index(&self) -> usize {
        if let Some((angle, index)) = self.memo.get() {
            if angle.to_bits() == self.angle.to_bits() {
                return index;
            }
        }
        let index = self.matrix.table().resolve(self.angle);
        self.memo.set(Some((self.angle, index)));
        index
    }

    /// Whether the cached index matches the current angle.
    #[must_use]
    pub fn is_memoized(&self) -> bool {
        self.memo
            .get()
            .is_some_and(|(angle, _)| angle.to_bits() == self.angle.to_bits())
    }

    /// Frame to draw and to hit-test against.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.matrix.frame(self.phase, self.angle_index())
    }

    /// Bounding box of the current frame centred on the position.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        let frame = self.current_frame();
        Rect::centered(self.position, frame.width, frame.height)
    }

    /// Whether the bounding boxes overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.bounds().intersects(&other.bounds())
    }

    /// Whether the bounding box lies fully inside `rect`.
    #[must_use]
    pub fn within(&self, rect: &Rect) -> bool {
        self.bounds().within(rect)
    }

    /// Whether `point` lies inside the bounding box.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        self.bounds().contains(point)
    }

    /// Distance between centres.
    #[must_use]
    pub fn distance_to(&self, other: Point) -> f64 {
        self.position.distance(other)
    }

    /// Turn toward `target` by at most `step` radians; returns whether facing it.
    pub fn rotate_toward(&mut self, target: Point, step: f64) -> bool {
        let wanted = self.position.angle_to(target);
        let diff = shortest_turn(self.angle, wanted);
        if diff.abs() <= step {
            self.angle = wanted;
            true
        } else {
            self.angle += step.copysign(diff);
            false
        }
    }
}

/// Signed turn from `from` to `to`, in `(-PI, PI]`.
fn shortest_turn(from: f64, to: f64) -> f64 {
    let diff = (to - from).rem_euclid(TAU);
    if diff > PI {
        diff - TAU
    } else {
        diff
    }
}
