//! Per-frame snapshot hook.

use petri_automaton::Grid;

/// Receives the fragment once per frame, after the frame's last step.
pub trait Renderer: Send {
    fn render(&mut self, frame: u32, grid: &Grid, x_offset: i64);
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _frame: u32, _grid: &Grid, _x_offset: i64) {}
}

/// Logs occupancy per frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&mut self, frame: u32, grid: &Grid, x_offset: i64) {
        let population = grid.population();
        tracing::info!(
            frame,
            x_offset,
            width = grid.width(),
            occupied = population.occupied,
            saturated = population.saturated,
            "Frame rendered"
        );
    }
}

impl<F> Renderer for F
where
    F: FnMut(u32, &Grid, i64) + Send,
{
    fn render(&mut self, frame: u32, grid: &Grid, x_offset: i64) {
        self(frame, grid, x_offset)
    }
}
