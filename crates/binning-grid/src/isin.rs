//! Integerized-sinusoidal global grid.

use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::Result;

/// Default number of latitude bands (roughly 9.28 km cells at the equator).
pub const DEFAULT_NUM_ROWS: usize = 2160;

/// Ownership convention for coordinates that fall exactly on a cell edge.
///
/// Applied consistently by both mapping directions and by region
/// containment tests, so a boundary coordinate is never assigned to two
/// cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRule {
    /// A cell owns its south and west edges; its north and east edges
    /// belong to the neighboring cell. The north pole and the +180°
    /// meridian fold into the last band / wrap to the antimeridian cell
    /// so the mapping stays total.
    #[default]
    SouthWestClosed,
    /// Mirror convention: a cell owns its north and east edges.
    NorthEastClosed,
}

impl EdgeRule {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "north_east_closed" | "northeast" => Self::NorthEastClosed,
            _ => Self::SouthWestClosed,
        }
    }

    /// Get the rule name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SouthWestClosed => "south_west_closed",
            Self::NorthEastClosed => "north_east_closed",
        }
    }
}

impl std::fmt::Display for EdgeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position of a cell within the grid: latitude band and cell within band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    /// Latitude band, numbered south to north (band 0 touches the south pole).
    pub row: usize,
    /// Longitude cell within the band, numbered west to east from -180°.
    pub col: usize,
}

/// Geographic bounds of a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    pub lat_south: f64,
    pub lat_north: f64,
    pub lon_west: f64,
    pub lon_east: f64,
}

impl CellBounds {
    /// Center coordinate of the cell.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.lat_south + self.lat_north) / 2.0,
            (self.lon_west + self.lon_east) / 2.0,
        )
    }
}

/// A fixed global grid of latitude bands subdivided into longitude cells.
///
/// The sphere is split into `num_rows` bands of equal height. Band `r`
/// holds `round(2 * num_rows * cos(center_lat))` cells (at least 1 near
/// the poles), which keeps cell areas approximately equal from equator to
/// pole. Bin indices count cells west to east within a band, bands south
/// to north, so the `u64` index orders by band, then by cell.
///
/// The grid is immutable after construction and safe to share across
/// threads.
#[derive(Debug, Clone)]
pub struct IsinGrid {
    num_rows: usize,
    row_height: f64,
    edge_rule: EdgeRule,
    /// Cells per band, south to north.
    num_cols: Vec<u64>,
    /// First bin index of each band.
    base_index: Vec<u64>,
    num_bins: u64,
}

impl IsinGrid {
    /// Create a grid with the given number of latitude bands and the
    /// default edge rule.
    ///
    /// `num_rows` must be an even number >= 2 so that no band straddles
    /// the equator.
    pub fn new(num_rows: usize) -> Result<Self> {
        Self::with_edge_rule(num_rows, EdgeRule::default())
    }

    /// Create a grid with an explicit boundary ownership rule.
    pub fn with_edge_rule(num_rows: usize, edge_rule: EdgeRule) -> Result<Self> {
        if num_rows < 2 || num_rows % 2 != 0 {
            return Err(GridError::InvalidParameters(format!(
                "num_rows must be an even number >= 2, got {}",
                num_rows
            )));
        }

        let row_height = 180.0 / num_rows as f64;
        let mut num_cols = Vec::with_capacity(num_rows);
        let mut base_index = Vec::with_capacity(num_rows);
        let mut next_index = 0u64;

        for row in 0..num_rows {
            let center_lat = -90.0 + (row as f64 + 0.5) * row_height;
            let cols = (2.0 * num_rows as f64 * center_lat.to_radians().cos()).round() as u64;
            let cols = cols.max(1);
            num_cols.push(cols);
            base_index.push(next_index);
            next_index += cols;
        }

        Ok(Self {
            num_rows,
            row_height,
            edge_rule,
            num_cols,
            base_index,
            num_bins: next_index,
        })
    }

    /// Create the default global grid (2160 bands).
    pub fn default_grid() -> Self {
        // The default parameters are always valid.
        Self::new(DEFAULT_NUM_ROWS).unwrap()
    }

    /// Number of latitude bands.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Total number of cells in the grid.
    pub fn num_bins(&self) -> u64 {
        self.num_bins
    }

    /// The boundary ownership rule this grid applies.
    pub fn edge_rule(&self) -> EdgeRule {
        self.edge_rule
    }

    /// Number of longitude cells in the given band.
    pub fn num_cols_in_row(&self, row: usize) -> Option<u64> {
        self.num_cols.get(row).copied()
    }

    /// Map a geographic coordinate to its bin index.
    ///
    /// Latitude must lie in [-90, 90]. Longitude is normalized modulo 360
    /// into [-180, 180) first (+180 wraps to -180), so any finite
    /// longitude is accepted. Non-finite input fails with
    /// [`GridError::OutOfRange`].
    pub fn index(&self, lat: f64, lon: f64) -> Result<u64> {
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GridError::OutOfRange { lat, lon });
        }

        let lon = normalize_lon(lon);
        let row = self.slot((lat + 90.0) / self.row_height, self.num_rows as u64, false);
        let cols = self.num_cols[row as usize];
        let col = self.slot((lon + 180.0) / 360.0 * cols as f64, cols, true);

        Ok(self.base_index[row as usize] + col)
    }

    /// Recover the band/cell position for a bin index.
    pub fn cell_of(&self, index: u64) -> Result<GridCell> {
        if index >= self.num_bins {
            return Err(GridError::InvalidIndex {
                index,
                num_bins: self.num_bins,
            });
        }

        // base_index is sorted, so the owning band is the last one whose
        // first index is <= index.
        let row = self.base_index.partition_point(|&base| base <= index) - 1;
        let col = (index - self.base_index[row]) as usize;

        Ok(GridCell { row, col })
    }

    /// Geographic bounds of the cell identified by a bin index.
    pub fn bounds_of(&self, index: u64) -> Result<CellBounds> {
        let cell = self.cell_of(index)?;
        let cell_width = 360.0 / self.num_cols[cell.row] as f64;

        Ok(CellBounds {
            lat_south: -90.0 + cell.row as f64 * self.row_height,
            lat_north: -90.0 + (cell.row + 1) as f64 * self.row_height,
            lon_west: -180.0 + cell.col as f64 * cell_width,
            lon_east: -180.0 + (cell.col + 1) as f64 * cell_width,
        })
    }

    /// Representative (center) coordinate of the cell identified by a bin
    /// index, as `(lat, lon)`.
    ///
    /// Feeding the center back through [`IsinGrid::index`] returns the
    /// same index.
    pub fn center_of(&self, index: u64) -> Result<(f64, f64)> {
        Ok(self.bounds_of(index)?.center())
    }

    /// Resolve a fractional slot position `t` in `[0, n]` to a slot,
    /// applying the edge rule when `t` sits exactly on a boundary.
    ///
    /// `wrap` selects cyclic behavior (longitude) over clamping (latitude).
    fn slot(&self, t: f64, n: u64, wrap: bool) -> u64 {
        let k = match self.edge_rule {
            EdgeRule::SouthWestClosed => t.floor() as i64,
            EdgeRule::NorthEastClosed => {
                if t == t.floor() {
                    t as i64 - 1
                } else {
                    t.floor() as i64
                }
            }
        };

        if wrap {
            k.rem_euclid(n as i64) as u64
        } else {
            k.clamp(0, n as i64 - 1) as u64
        }
    }
}

/// Normalize a longitude modulo 360 into [-180, 180).
fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}
