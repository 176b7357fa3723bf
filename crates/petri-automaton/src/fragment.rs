//! One node's slice of the global grid and the update rule that advances it.

use std::fmt;
use std::sync::Arc;

use crate::hooks::{ConstantFood, FoodField, NoCost, StepCost};
use crate::{
    Cell, Error, Grid, Result, EAT_RATE_MULTIPLIER, EMPTY, HUNGER_RATE, MAX_MASS,
    NEIGHBOR_HUNGER_FACTOR, NEW_ORGANISM, SPLIT_RATE, SPLIT_SIZE,
};

/// The 8-connected neighborhood, as (dx, dy) offsets.
const NEIGHBORHOOD: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// A vertical slice of the shared grid, owned by one worker.
///
/// Holds the mutable grid (written during a step) and the read grid (the
/// previous step's final state). `x_offset` is the global column of the
/// fragment's leftmost column, halo included.
pub struct Fragment {
    grid: Grid,
    read: Grid,
    x_offset: i64,
    food: Arc<dyn FoodField>,
    cost: Arc<dyn StepCost>,
}

impl Fragment {
    /// Create an empty fragment with constant food and no step cost.
    pub fn new(width: usize, height: usize, x_offset: i64) -> Result<Self> {
        let grid = Grid::new(width, height)?;
        Ok(Self {
            read: grid.clone(),
            grid,
            x_offset,
            food: Arc::new(ConstantFood::default()),
            cost: Arc::new(NoCost),
        })
    }

    /// Replace the food field.
    #[must_use]
    pub fn with_food(mut self, food: Arc<dyn FoodField>) -> Self {
        self.food = food;
        self
    }

    /// Replace the step-cost simulator.
    #[must_use]
    pub fn with_step_cost(mut self, cost: Arc<dyn StepCost>) -> Self {
        self.cost = cost;
        self
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn x_offset(&self) -> i64 {
        self.x_offset
    }

    /// The current (mutable) grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The snapshot taken at the start of the last step.
    pub fn read_grid(&self) -> &Grid {
        &self.read
    }

    /// Overwrite one cell. Used for initial seeding, never mid-step.
    pub fn set_cell(&mut self, x: usize, y: usize, value: Cell) -> Result<()> {
        self.grid.set(x, y, value)
    }

    /// Swap in a grid produced by a border exchange and move the offset.
    pub fn replace_grid(&mut self, grid: Grid, x_shift: i64) -> Result<()> {
        if grid.height() != self.grid.height() {
            return Err(Error::HeightMismatch {
                expected: self.grid.height(),
                actual: grid.height(),
            });
        }
        self.grid = grid;
        self.x_offset += x_shift;
        Ok(())
    }

    /// Advance every interior cell by one step.
    ///
    /// Edge rows and columns are left untouched.
    pub fn step(&mut self) {
        self.read.clone_from(&self.grid);

        let width = self.grid.width();
        let height = self.grid.height();
        if width < 3 || height < 3 {
            return;
        }
        for x in 1..width - 1 {
            for y in 1..height - 1 {
                let value = self.next_value(x, y);
                self.grid.put(x, y, value);
            }
        }
    }

    fn next_value(&self, x: usize, y: usize) -> Cell {
        let current = self.read.at(x, y);
        if current == EMPTY {
            return self.spawn_value(x, y);
        }

        self.cost.simulate();

        let food = self.food.food_at(self.x_offset + x as i64, y);
        let gain = (EAT_RATE_MULTIPLIER * 255.0 * food) as i32;
        let mut value = (i32::from(current) + gain).min(i32::from(MAX_MASS));

        let mut empty_neighbors = 0;
        let mut occupied_neighbors = 0;
        for neighbor in self.neighbors(x, y) {
            if neighbor == EMPTY {
                empty_neighbors += 1;
            } else {
                occupied_neighbors += 1;
            }
        }

        if value > SPLIT_SIZE {
            value -= SPLIT_RATE * empty_neighbors;
        }

        let hunger = HUNGER_RATE + NEIGHBOR_HUNGER_FACTOR * f64::from(occupied_neighbors);
        let remaining = f64::from(value) - hunger;
        if remaining > f64::from(EMPTY) {
            // Truncates toward zero; always within (-128, 127].
            remaining as i32 as Cell
        } else {
            EMPTY
        }
    }

    fn spawn_value(&self, x: usize, y: usize) -> Cell {
        let mut value = i32::from(EMPTY);
        let mut spawned = false;
        for neighbor in self.neighbors(x, y) {
            if i32::from(neighbor) > SPLIT_SIZE {
                if !spawned {
                    spawned = true;
                    value = i32::from(NEW_ORGANISM);
                }
                value += SPLIT_RATE;
            }
        }
        value as Cell
    }

    fn neighbors(&self, x: usize, y: usize) -> impl Iterator<Item = Cell> + '_ {
        NEIGHBORHOOD.iter().map(move |&(dx, dy)| {
            self.read
                .at(x.wrapping_add_signed(dx), y.wrapping_add_signed(dy))
        })
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("x_offset", &self.x_offset)
            .finish_non_exhaustive()
    }
}
