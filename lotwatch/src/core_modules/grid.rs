// THEORY:
// The `grid` module partitions a frame into a fixed lattice of equal-size
// rectangular cells and reduces each cell to a single scalar: its mean
// intensity. This is the spatial-pooling step that turns hundreds of thousands
// of pixels into a handful of region statistics cheap enough to compare every
// frame.
//
// Key architectural principles:
// 1.  **Exact tiling**: cells are non-overlapping and cover the frame with no
//     remainder. The frame must measure exactly `cols*cell_size` by
//     `rows*cell_size`; anything else is a caller contract violation and is
//     rejected rather than silently truncated or misaligned.
// 2.  **Row-major order**: cell `idx` maps to `row = idx / cols`,
//     `col = idx % cols`. This ordering is load-bearing — it is the order in
//     which baselines are initialized, evaluated, and reported.
// 3.  **Statelessness**: the grid holds only its configuration. Computing cell
//     means has no side effects, which keeps the temporal logic isolated in
//     the baseline tracker.

use crate::core_modules::frame::GrayFrame;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("grid needs at least one row and one column, got {rows}x{cols}")]
    EmptyGrid { rows: u32, cols: u32 },
    #[error("cell size must be at least 1 pixel")]
    ZeroCellSize,
    #[error(
        "frame is {actual_width}x{actual_height} but the grid expects {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Immutable geometry and sensitivity settings for one monitoring run.
#[derive(Debug, Clone, Copy)]
pub struct GridConfig {
    /// Number of cell rows in the lattice.
    pub rows: u32,
    /// Number of cell columns in the lattice.
    pub cols: u32,
    /// Width and height of a single square cell, in pixels.
    pub cell_size: u32,
    /// Minimum absolute mean-intensity deviation that counts as a change.
    pub threshold: f64,
}

impl GridConfig {
    /// Builds a validated configuration. A degenerate lattice (zero rows,
    /// columns, or cell size) would produce zero-pixel cells and is rejected.
    pub fn new(rows: u32, cols: u32, cell_size: u32, threshold: f64) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::EmptyGrid { rows, cols });
        }
        if cell_size == 0 {
            return Err(GridError::ZeroCellSize);
        }
        Ok(Self {
            rows,
            cols,
            cell_size,
            threshold,
        })
    }

    /// The exact frame width this grid tiles.
    pub fn frame_width(&self) -> u32 {
        self.cols * self.cell_size
    }

    /// The exact frame height this grid tiles.
    pub fn frame_height(&self) -> u32 {
        self.rows * self.cell_size
    }

    /// Total number of cells in the lattice.
    pub fn cell_count(&self) -> usize {
        (self.rows as usize) * (self.cols as usize)
    }

    /// Top-left pixel coordinate of cell `idx`, in row-major order.
    pub fn cell_origin(&self, idx: usize) -> (u32, u32) {
        let row = idx as u32 / self.cols;
        let col = idx as u32 % self.cols;
        (col * self.cell_size, row * self.cell_size)
    }
}

/// Stateless reducer from a normalized frame to per-cell mean intensities.
pub struct Grid {
    config: GridConfig,
}

impl Grid {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Computes the arithmetic mean intensity of every cell, in row-major
    /// order. The frame must match the grid's dimensions exactly.
    pub fn cell_means(&self, frame: &GrayFrame) -> Result<Vec<f64>, GridError> {
        let expected_width = self.config.frame_width();
        let expected_height = self.config.frame_height();
        if frame.width() != expected_width || frame.height() != expected_height {
            return Err(GridError::DimensionMismatch {
                expected_width,
                expected_height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        let cell_size = self.config.cell_size as usize;
        let frame_width = expected_width as usize;
        let samples_per_cell = (cell_size * cell_size) as u64;
        let data = frame.data();

        let mut means = Vec::with_capacity(self.config.cell_count());
        for idx in 0..self.config.cell_count() {
            let (start_x, start_y) = self.config.cell_origin(idx);
            let mut sum = 0u64;
            for row_in_cell in 0..cell_size {
                let row_start = (start_y as usize + row_in_cell) * frame_width + start_x as usize;
                for &sample in &data[row_start..row_start + cell_size] {
                    sum += sample as u64;
                }
            }
            means.push(sum as f64 / samples_per_cell as f64);
        }
        Ok(means)
    }
}
