//! Executor construction knobs, mirroring the builder shape `ThreadPoolBuilder`
//! uses in the teacher crate: a plain data struct with defaults plus a
//! method-chaining builder that materializes it.

/// A-star orthogonal step cost, in the grid's fixed-point cost units.
pub const DEFAULT_A_STAR_STEP_COST_CARDINAL: u32 = 10;
/// A-star diagonal step cost (`10 * sqrt(2)` rounded), in the same units.
pub const DEFAULT_A_STAR_STEP_COST_DIAGONAL: u32 = 14;

#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) worker_thread_count: u32,
    pub(crate) path_entry_refresh_interval_ticks: u64,
    pub(crate) a_star_step_cost_cardinal: u32,
    pub(crate) a_star_step_cost_diagonal: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            worker_thread_count: default_worker_thread_count(),
            path_entry_refresh_interval_ticks: 0,
            a_star_step_cost_cardinal: DEFAULT_A_STAR_STEP_COST_CARDINAL,
            a_star_step_cost_diagonal: DEFAULT_A_STAR_STEP_COST_DIAGONAL,
        }
    }
}

/// Leaves one core for the main thread, matching the teacher's own default
/// worker count heuristic.
fn default_worker_thread_count() -> u32 {
    num_cpus::get().saturating_sub(1) as u32
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn worker_thread_count(&self) -> u32 {
        self.worker_thread_count
    }

    pub fn path_entry_refresh_interval_ticks(&self) -> u64 {
        self.path_entry_refresh_interval_ticks
    }

    pub fn a_star_step_cost_cardinal(&self) -> u32 {
        self.a_star_step_cost_cardinal
    }

    pub fn a_star_step_cost_diagonal(&self) -> u32 {
        self.a_star_step_cost_diagonal
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder { config: Config::default() }
    }

    /// `0` runs everything on the calling thread; see spec.md §5's
    /// single-threaded fallback mode.
    pub fn worker_thread_count(mut self, count: u32) -> Self {
        self.config.worker_thread_count = count;
        self
    }

    /// `0` disables expiry: path entries never get reclaimed on a refresh
    /// sweep (only on explicit release).
    pub fn path_entry_refresh_interval_ticks(mut self, ticks: u64) -> Self {
        self.config.path_entry_refresh_interval_ticks = ticks;
        self
    }

    pub fn a_star_step_cost_cardinal(mut self, cost: u32) -> Self {
        self.config.a_star_step_cost_cardinal = cost;
        self
    }

    pub fn a_star_step_cost_diagonal(mut self, cost: u32) -> Self {
        self.config.a_star_step_cost_diagonal = cost;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
