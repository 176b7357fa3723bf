//! Pluggable inputs to the update rule.
//!
//! Neither hook changes which cells live or die beyond what the food value
//! dictates: [`FoodField`] scales the per-step gain and [`StepCost`] only burns
//! wall-clock time so that fragments finish their steps at different speeds.

use rand::Rng;

/// Food level used when no spatial field is configured.
pub const DEFAULT_FOOD: f64 = 0.8;

/// Food available at a global grid position, in `[0, 1]`.
pub trait FoodField: Send + Sync {
    fn food_at(&self, global_x: i64, y: usize) -> f64;
}

/// The same food level everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantFood(pub f64);

impl Default for ConstantFood {
    fn default() -> Self {
        Self(DEFAULT_FOOD)
    }
}

impl FoodField for ConstantFood {
    fn food_at(&self, _global_x: i64, _y: usize) -> f64 {
        self.0
    }
}

/// Work performed once per occupied-cell update.
pub trait StepCost: Send + Sync {
    fn simulate(&self);
}

/// No artificial work.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCost;

impl StepCost for NoCost {
    fn simulate(&self) {}
}

/// Proof-of-work style busy loop.
///
/// Hashes a random target with an increasing counter until the first digest
/// byte, read as a signed value, reaches `difficulty`. Higher difficulty means
/// more hashes on average; `i8::MIN` returns after a single hash.
#[derive(Debug, Clone, Copy)]
pub struct HashWork {
    pub difficulty: i8,
}

impl HashWork {
    pub fn new(difficulty: i8) -> Self {
        Self { difficulty }
    }

    /// Run the loop and report how many hashes it took.
    pub fn run(&self) -> u32 {
        let target: u32 = rand::thread_rng().gen();
        let mut counter: u32 = 0;
        loop {
            let mut hasher = blake3::Hasher::new();
            hasher.update(&target.to_be_bytes());
            hasher.update(&counter.to_be_bytes());
            let digest = hasher.finalize();
            counter = counter.wrapping_add(1);
            if digest.as_bytes()[0] as i8 >= self.difficulty {
                return counter;
            }
        }
    }
}

impl StepCost for HashWork {
    fn simulate(&self) {
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_food_ignores_position() {
        let food = ConstantFood::default();
        assert_eq!(food.food_at(0, 0), DEFAULT_FOOD);
        assert_eq!(food.food_at(-40, 900), DEFAULT_FOOD);
    }

    #[test]
    fn easiest_hash_work_takes_one_hash() {
        assert_eq!(HashWork::new(i8::MIN).run(), 1);
    }

    #[test]
    fn hash_work_terminates() {
        // Roughly one in four digests start with a byte >= 64.
        let hashes = HashWork::new(64).run();
        assert!(hashes >= 1);
    }
}
