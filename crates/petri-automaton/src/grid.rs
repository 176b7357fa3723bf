//! Column-major cell storage.
//!
//! Columns are the unit of exchange between fragments, so each column is one
//! contiguous run of `height` cells.

use crate::{Error, Result, EMPTY, MAX_MASS};

/// A single cell value. See the crate docs for the encoding.
pub type Cell = i8;

/// A `width` x `height` grid of cells stored column by column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create a grid with every cell empty.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            cells: vec![EMPTY; width * height],
        })
    }

    /// Build a grid from whole columns, left to right.
    pub fn from_columns<'a, I>(height: usize, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [Cell]>,
    {
        let mut cells = Vec::new();
        let mut width = 0;
        for column in columns {
            if column.len() != height {
                return Err(Error::HeightMismatch {
                    expected: height,
                    actual: column.len(),
                });
            }
            cells.extend_from_slice(column);
            width += 1;
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Read a cell, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        if x < self.width && y < self.height {
            Some(self.cells[x * self.height + y])
        } else {
            None
        }
    }

    /// Overwrite a cell.
    pub fn set(&mut self, x: usize, y: usize, value: Cell) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(Error::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        self.cells[x * self.height + y] = value;
        Ok(())
    }

    /// Unchecked read for the stepping hot loop.
    #[inline]
    pub(crate) fn at(&self, x: usize, y: usize) -> Cell {
        self.cells[x * self.height + y]
    }

    #[inline]
    pub(crate) fn put(&mut self, x: usize, y: usize, value: Cell) {
        self.cells[x * self.height + y] = value;
    }

    /// Borrow column `x`.
    ///
    /// # Panics
    ///
    /// Panics if `x >= width`.
    pub fn column(&self, x: usize) -> &[Cell] {
        &self.cells[x * self.height..(x + 1) * self.height]
    }

    /// Mutably borrow column `x`.
    ///
    /// # Panics
    ///
    /// Panics if `x >= width`.
    pub fn column_mut(&mut self, x: usize) -> &mut [Cell] {
        &mut self.cells[x * self.height..(x + 1) * self.height]
    }

    /// Overwrite column `x` with `values`.
    pub fn replace_column(&mut self, x: usize, values: &[Cell]) -> Result<()> {
        if values.len() != self.height {
            return Err(Error::HeightMismatch {
                expected: self.height,
                actual: values.len(),
            });
        }
        if x >= self.width {
            return Err(Error::OutOfBounds {
                x,
                y: 0,
                width: self.width,
                height: self.height,
            });
        }
        self.column_mut(x).copy_from_slice(values);
        Ok(())
    }

    /// Iterate over columns left to right.
    pub fn columns(&self) -> impl ExactSizeIterator<Item = &[Cell]> + '_ {
        self.cells.chunks_exact(self.height)
    }

    /// Raw column-major cells.
    pub fn as_slice(&self) -> &[Cell] {
        &self.cells
    }

    /// Occupancy summary of the whole grid, halo included.
    pub fn population(&self) -> Population {
        let mut population = Population::default();
        for &cell in &self.cells {
            if cell == EMPTY {
                population.empty += 1;
            } else {
                population.occupied += 1;
                population.total_mass += i64::from(cell) - i64::from(EMPTY);
                if cell == MAX_MASS {
                    population.saturated += 1;
                }
            }
        }
        population
    }
}

/// Cell counts for a grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Population {
    /// Cells holding an organism.
    pub occupied: usize,
    /// Empty cells.
    pub empty: usize,
    /// Organisms at full mass.
    pub saturated: usize,
    /// Sum of organism masses measured from empty (so a new organism counts 1).
    pub total_mass: i64,
}
