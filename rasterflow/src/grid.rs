//! Block decomposition of an image.
//!
//! The grid splits a `cols × rows` image into blocks of the resource's
//! preferred size, scanning rows of blocks top to bottom and blocks within a
//! row left to right. Blocks in the last row and column are clipped to the
//! image bounds.
//!
//! ```text
//! 25×25 image, 10×10 blocks
//!
//!      0    10   20 25
//!    0 ┌────┬────┬──┐
//!      │ 0  │ 1  │2 │
//!   10 ├────┼────┼──┤
//!      │ 3  │ 4  │5 │
//!   20 ├────┼────┼──┤
//!      │ 6  │ 7  │8 │  block 8: (20, 20) 5×5
//!   25 └────┴────┴──┘
//! ```

use crate::error::PipelineError;
use crate::geometry::{BBox, Extent};

/// One unit of rasterization and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    /// Row-major position: `block_row * blocks_per_row + block_col`.
    pub index: usize,
    /// Pixel region covered, clipped to the image.
    pub bbox: BBox,
}

/// The full set of blocks for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    cols: u32,
    rows: u32,
    block_size: Extent,
    blocks_per_row: usize,
    blocks_per_column: usize,
}

impl BlockGrid {
    /// Computes the grid for a `cols × rows` image.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Usage` if either block dimension is zero.
    pub fn new(cols: u32, rows: u32, block_size: Extent) -> Result<Self, PipelineError> {
        if block_size.is_empty() {
            return Err(PipelineError::Usage(format!(
                "block size must be non-zero, got {}",
                block_size
            )));
        }
        Ok(Self {
            cols,
            rows,
            block_size,
            blocks_per_row: cols.div_ceil(block_size.width) as usize,
            blocks_per_column: rows.div_ceil(block_size.height) as usize,
        })
    }

    /// Total number of blocks.
    pub fn len(&self) -> usize {
        self.blocks_per_row * self.blocks_per_column
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn blocks_per_row(&self) -> usize {
        self.blocks_per_row
    }

    pub fn blocks_per_column(&self) -> usize {
        self.blocks_per_column
    }

    /// Nominal (unclipped) block size.
    pub fn block_size(&self) -> Extent {
        self.block_size
    }

    /// Image size covered by the grid.
    pub fn extent(&self) -> Extent {
        Extent::new(self.cols, self.rows)
    }

    /// Returns the block at `index`, or `None` past the end.
    pub fn block(&self, index: usize) -> Option<Block> {
        if index >= self.len() {
            return None;
        }
        let block_row = (index / self.blocks_per_row) as u32;
        let block_col = (index % self.blocks_per_row) as u32;
        let x = block_col * self.block_size.width;
        let y = block_row * self.block_size.height;
        let bbox = BBox::from_corners(
            x,
            y,
            x.saturating_add(self.block_size.width).min(self.cols),
            y.saturating_add(self.block_size.height).min(self.rows),
        );
        Some(Block { index, bbox })
    }

    /// Index of the block containing pixel `(x, y)`.
    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        let block_row = (y / self.block_size.height) as usize;
        let block_col = (x / self.block_size.width) as usize;
        Some(block_row * self.blocks_per_row + block_col)
    }

    /// Blocks in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.len()).filter_map(move |index| self.block(index))
    }
}
