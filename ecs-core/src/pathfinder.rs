//! Per-thread A* pathfinding over a cost grid, plus flood-fill reachability
//! checks and tick-expiring path handles.
//!
//! Each worker thread (and the main thread) owns its own search grid,
//! binary heap, path-node pool and path-entry table so that concurrent
//! `pathfind` calls from different workers never share mutable state. The
//! search grid is tagged with a per-thread search version instead of being
//! cleared between searches: a cell only counts as visited in the current
//! search if its stored version equals the thread's current version.

use crate::executor::Executor;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub const UNINITIALIZED_FLOOD_FILL_CELL: u32 = 0;

const DIRECTION_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    fn offset(self, dx: i32, dy: i32) -> Point {
        Point { x: self.x + dx, y: self.y + dy }
    }
}

/// Per-cell movement cost; `0` means impassable.
pub struct CostGrid {
    width: u32,
    height: u32,
    costs: Vec<u32>,
}

impl CostGrid {
    pub fn new(width: u32, height: u32, default_cost: u32) -> Self {
        CostGrid {
            width,
            height,
            costs: vec![default_cost; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set(&mut self, p: Point, cost: u32) {
        let i = self.index(p).expect("position out of bounds");
        self.costs[i] = cost;
    }

    pub fn get(&self, p: Point) -> Option<u32> {
        self.costs.get(self.index(p)?).copied()
    }

    fn index(&self, p: Point) -> Option<usize> {
        if p.x < 0 || p.y < 0 || p.x as u32 >= self.width || p.y as u32 >= self.height {
            return None;
        }
        Some((p.y as u32 * self.width + p.x as u32) as usize)
    }
}

/// Connected-region labeling; two points are mutually reachable iff both
/// carry the same non-sentinel region id.
pub struct FloodFillGrid {
    width: u32,
    height: u32,
    regions: Vec<u32>,
}

impl FloodFillGrid {
    pub fn new(width: u32, height: u32) -> Self {
        FloodFillGrid {
            width,
            height,
            regions: vec![UNINITIALIZED_FLOOD_FILL_CELL; (width * height) as usize],
        }
    }

    pub fn set_region(&mut self, p: Point, region: u32) {
        let i = self.index(p).expect("position out of bounds");
        self.regions[i] = region;
    }

    fn get(&self, p: Point) -> Option<u32> {
        self.regions.get(self.index(p)?).copied()
    }

    fn index(&self, p: Point) -> Option<usize> {
        if p.x < 0 || p.y < 0 || p.x as u32 >= self.width || p.y as u32 >= self.height {
            return None;
        }
        Some((p.y as u32 * self.width + p.x as u32) as usize)
    }
}

#[derive(Clone, Copy)]
struct AstarSearchNode {
    current_position: Point,
    next_position: Point,
    g: u32,
    h: u32,
    version: u32,
}

impl Default for AstarSearchNode {
    fn default() -> Self {
        AstarSearchNode {
            current_position: Point::new(0, 0),
            next_position: Point::new(0, 0),
            g: 0,
            h: 0,
            version: 0,
        }
    }
}

/// Entry in a thread's search grid, ordered for a min-heap on `g + h`.
#[derive(Clone, Copy)]
struct QueueEntry {
    f: u32,
    position: Point,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the lowest `f` first.
        other.f.cmp(&self.f)
    }
}

struct PathNode {
    x: u16,
    y: u16,
    next: Option<u32>,
}

struct PathNodePool {
    nodes: Vec<PathNode>,
    free: Vec<u32>,
}

impl PathNodePool {
    fn new() -> Self {
        PathNodePool { nodes: Vec::new(), free: Vec::new() }
    }

    fn acquire(&mut self, x: u16, y: u16, next: Option<u32>) -> u32 {
        let node = PathNode { x, y, next };
        if let Some(index) = self.free.pop() {
            self.nodes[index as usize] = node;
            index
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    fn release(&mut self, index: u32) {
        self.free.push(index);
    }

    fn get(&self, index: u32) -> &PathNode {
        &self.nodes[index as usize]
    }
}

struct PathEntry {
    expiry_world_tick: u64,
    head: Option<u32>,
    current: Option<u32>,
    from: Point,
    to: Point,
}

struct PathEntryPool {
    entries: Vec<Option<PathEntry>>,
    free: Vec<u32>,
}

impl PathEntryPool {
    fn new() -> Self {
        PathEntryPool { entries: Vec::new(), free: Vec::new() }
    }

    fn emplace(&mut self, entry: PathEntry) -> u32 {
        if let Some(index) = self.free.pop() {
            self.entries[index as usize] = Some(entry);
            index
        } else {
            self.entries.push(Some(entry));
            (self.entries.len() - 1) as u32
        }
    }

    fn get(&self, index: u32) -> Option<&PathEntry> {
        self.entries.get(index as usize)?.as_ref()
    }

    fn get_mut(&mut self, index: u32) -> Option<&mut PathEntry> {
        self.entries.get_mut(index as usize)?.as_mut()
    }

    fn erase(&mut self, index: u32) {
        self.entries[index as usize] = None;
        self.free.push(index);
    }

    fn iter(&self) -> impl Iterator<Item = (u32, &PathEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as u32, e)))
    }
}

struct PerThreadContext {
    search_version: u32,
    search_grid_size: (u32, u32),
    search_nodes: Vec<AstarSearchNode>,
    path_node_pool: PathNodePool,
    path_entry_pool: PathEntryPool,
}

impl PerThreadContext {
    fn new() -> Self {
        PerThreadContext {
            search_version: 0,
            search_grid_size: (0, 0),
            search_nodes: Vec::new(),
            path_node_pool: PathNodePool::new(),
            path_entry_pool: PathEntryPool::new(),
        }
    }

    fn ensure_grid_size(&mut self, width: u32, height: u32) {
        if self.search_grid_size != (width, height) {
            self.search_nodes = vec![AstarSearchNode::default(); (width * height) as usize];
            self.search_grid_size = (width, height);
        }
    }

    fn node_index(&self, width: u32, p: Point) -> usize {
        (p.y as u32 * width + p.x as u32) as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PathHandle {
    thread_id: u32,
    entry_id: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct PathContext {
    pub from: Point,
    pub to: Point,
    pub current: Option<Point>,
}

pub struct Pathfinder {
    per_thread: Vec<std::sync::Mutex<PerThreadContext>>,
    step_cost_cardinal: u32,
    step_cost_diagonal: u32,
    refresh_interval_ticks: u64,
}

impl Pathfinder {
    pub fn new(thread_count: u32, step_cost_cardinal: u32, step_cost_diagonal: u32, refresh_interval_ticks: u64) -> Self {
        Pathfinder {
            per_thread: (0..thread_count).map(|_| std::sync::Mutex::new(PerThreadContext::new())).collect(),
            step_cost_cardinal,
            step_cost_diagonal,
            refresh_interval_ticks,
        }
    }

    fn heuristic(&self, from: Point, to: Point) -> u32 {
        let dx = (from.x - to.x).unsigned_abs();
        let dy = (from.y - to.y).unsigned_abs();
        let (min, max) = (dx.min(dy), dx.max(dy));
        self.step_cost_cardinal * max + (self.step_cost_diagonal - self.step_cost_cardinal) * min
    }

    /// Searches backward from `to` until `from` is reached, then walks the
    /// parent chain forward to build the path's node list. Returns a handle
    /// even on failure: an empty path (`current() == None` forever) is a
    /// normal, queryable result rather than an error.
    pub fn pathfind(&self, thread_id: u32, costs: &CostGrid, from: Point, to: Point) -> PathHandle {
        let mut ctx = self.per_thread[thread_id as usize].lock().unwrap();
        ctx.search_version += 1;
        let version = ctx.search_version;
        ctx.ensure_grid_size(costs.width(), costs.height());
        let width = costs.width();

        let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
        {
            let idx = ctx.node_index(width, to);
            ctx.search_nodes[idx] = AstarSearchNode {
                current_position: to,
                next_position: to,
                g: 0,
                h: self.heuristic(from, to),
                version,
            };
            queue.push(QueueEntry { f: ctx.search_nodes[idx].g + ctx.search_nodes[idx].h, position: to });
        }

        while let Some(QueueEntry { position: current, .. }) = queue.pop() {
            let from_idx = ctx.node_index(width, from);
            if ctx.search_nodes[from_idx].version == version {
                break;
            }
            let current_idx = ctx.node_index(width, current);
            let current_g = ctx.search_nodes[current_idx].g;

            for &(dx, dy) in &DIRECTION_OFFSETS {
                let near = current.offset(dx, dy);
                let near_cost = match costs.get(near) {
                    Some(c) if c > 0 => c,
                    _ => continue,
                };
                let near_idx = ctx.node_index(width, near);
                if ctx.search_nodes[near_idx].version == version {
                    continue;
                }

                let step_cost = if dx != 0 && dy != 0 { self.step_cost_diagonal } else { self.step_cost_cardinal };
                let g = current_g + step_cost * near_cost;
                let h = self.heuristic(from, near);
                ctx.search_nodes[near_idx] = AstarSearchNode {
                    current_position: near,
                    next_position: current,
                    g,
                    h,
                    version,
                };
                queue.push(QueueEntry { f: g + h, position: near });
            }
        }

        let from_idx = ctx.node_index(width, from);
        if ctx.search_nodes[from_idx].version != version {
            let entry_id = ctx.path_entry_pool.emplace(PathEntry {
                expiry_world_tick: 0,
                head: None,
                current: None,
                from,
                to,
            });
            return PathHandle { thread_id, entry_id };
        }

        let mut stack = Vec::new();
        let mut current = from;
        loop {
            stack.push(current);
            if current == to {
                break;
            }
            let idx = ctx.node_index(width, current);
            current = ctx.search_nodes[idx].next_position;
        }

        let mut next_node = None;
        for p in stack.into_iter().rev() {
            next_node = Some(ctx.path_node_pool.acquire(p.x as u16, p.y as u16, next_node));
        }
        let head = next_node;

        let entry_id = ctx.path_entry_pool.emplace(PathEntry {
            expiry_world_tick: 0,
            head,
            current: head,
            from,
            to,
        });
        PathHandle { thread_id, entry_id }
    }

    pub fn can_reach(&self, flood_fill: &FloodFillGrid, from: Point, to: Point) -> bool {
        match (flood_fill.get(from), flood_fill.get(to)) {
            (Some(a), Some(b)) => a != UNINITIALIZED_FLOOD_FILL_CELL && a == b,
            _ => false,
        }
    }

    /// Steps `handle`'s cursor to the next node and, as the one place that
    /// counts as active consumption of the path, pushes its expiry another
    /// `2 * refresh_interval_ticks` out from `current_world_tick`.
    pub fn advance_path(&self, handle: PathHandle, current_world_tick: u64) {
        let mut ctx = self.per_thread[handle.thread_id as usize].lock().unwrap();
        let current_node = match ctx.path_entry_pool.get(handle.entry_id) {
            Some(entry) => entry.current,
            None => return,
        };
        let next = match current_node {
            Some(node) => ctx.path_node_pool.get(node).next,
            None => return,
        };
        if let Some(entry) = ctx.path_entry_pool.get_mut(handle.entry_id) {
            entry.current = next;
            entry.expiry_world_tick = current_world_tick + 2 * self.refresh_interval_ticks;
        }
    }

    /// A pure read: does not touch `expiry_world_tick`. Only [`advance_path`]
    /// and the first [`process`] sweep after [`pathfind`] refresh expiry, so
    /// repeated reads at the same tick never extend an entry's lifetime.
    /// Returns `None` if `entry_id` is unknown or has already expired but
    /// has not yet been swept by `process`.
    pub fn get_path_context(&self, handle: PathHandle, current_world_tick: u64) -> Option<PathContext> {
        let ctx = self.per_thread[handle.thread_id as usize].lock().unwrap();
        let entry = ctx.path_entry_pool.get(handle.entry_id)?;
        if entry.expiry_world_tick != 0 && entry.expiry_world_tick < current_world_tick {
            return None;
        }
        let current = entry.current.map(|node| {
            let node = ctx.path_node_pool.get(node);
            Point::new(node.x as i32, node.y as i32)
        });
        Some(PathContext { from: entry.from, to: entry.to, current })
    }

    /// Sweeps every thread's expired path entries: the main thread's
    /// context runs synchronously, the rest fan out across the worker pool.
    pub fn process(&self, executor: &Executor, current_world_tick: u64) {
        self.process_thread_context(crate::thread_registry::MAIN_THREAD_ID, current_world_tick);
        executor.parallel_for_worker_threads::<(), (), _>(&(), |thread_id, _ctx| {
            self.process_thread_context(thread_id, current_world_tick);
            None
        });
    }

    fn process_thread_context(&self, thread_id: u32, current_world_tick: u64) {
        let mut ctx = self.per_thread[thread_id as usize].lock().unwrap();
        if self.refresh_interval_ticks == 0 {
            return;
        }
        let expired: Vec<u32> = ctx
            .path_entry_pool
            .iter()
            .filter_map(|(id, entry)| {
                if entry.expiry_world_tick != 0 && entry.expiry_world_tick < current_world_tick {
                    Some(id)
                } else {
                    None
                }
            })
            .collect();

        let needs_init: Vec<u32> = ctx
            .path_entry_pool
            .iter()
            .filter_map(|(id, entry)| if entry.expiry_world_tick == 0 { Some(id) } else { None })
            .collect();
        for id in needs_init {
            if let Some(entry) = ctx.path_entry_pool.get_mut(id) {
                entry.expiry_world_tick = current_world_tick + 2 * self.refresh_interval_ticks;
            }
        }

        for id in expired {
            let head = ctx.path_entry_pool.get(id).and_then(|e| e.head);
            let mut current = head;
            while let Some(node) = current {
                let next = ctx.path_node_pool.get(node).next;
                ctx.path_node_pool.release(node);
                current = next;
            }
            ctx.path_entry_pool.erase(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::thread_registry::ThreadRegistry;
    use std::sync::Arc;

    fn test_executor(worker_count: u32) -> Executor {
        let config = Config::builder().worker_thread_count(worker_count).build();
        let registry = Arc::new(ThreadRegistry::new());
        registry.register_current(crate::thread_registry::MAIN_THREAD_ID);
        Executor::new(&config, registry).unwrap()
    }

    #[test]
    fn finds_a_straight_path_on_an_empty_grid() {
        let pathfinder = Pathfinder::new(1, 10, 14, 100);
        let grid = CostGrid::new(64, 64, 1);
        let handle = pathfinder.pathfind(0, &grid, Point::new(0, 0), Point::new(5, 0));
        let ctx = pathfinder.get_path_context(handle, 0).unwrap();
        assert_eq!(ctx.from, Point::new(0, 0));
        assert_eq!(ctx.current, Some(Point::new(0, 0)));

        let mut steps = 0;
        let mut handle_tick = 0u64;
        loop {
            let ctx = pathfinder.get_path_context(handle, handle_tick).unwrap();
            if ctx.current.is_none() {
                break;
            }
            pathfinder.advance_path(handle, handle_tick);
            steps += 1;
            handle_tick += 1;
            if steps > 20 {
                panic!("path did not terminate");
            }
        }
        assert_eq!(steps, 6);
    }

    #[test]
    fn obstacle_column_forces_a_detour() {
        let pathfinder = Pathfinder::new(1, 10, 14, 100);
        let mut grid = CostGrid::new(10, 10, 1);
        for y in 0..9 {
            grid.set(Point::new(5, y), 0);
        }

        let handle = pathfinder.pathfind(0, &grid, Point::new(0, 0), Point::new(9, 0));
        let ctx = pathfinder.get_path_context(handle, 0).unwrap();
        assert!(ctx.current.is_some(), "a detour around the column must exist");
    }

    #[test]
    fn unreachable_target_yields_an_empty_path() {
        let pathfinder = Pathfinder::new(1, 10, 14, 100);
        let mut grid = CostGrid::new(10, 10, 1);
        for y in 0..10 {
            grid.set(Point::new(5, y), 0);
        }

        let handle = pathfinder.pathfind(0, &grid, Point::new(0, 0), Point::new(9, 0));
        let ctx = pathfinder.get_path_context(handle, 0).unwrap();
        assert!(ctx.current.is_none());
    }

    #[test]
    fn can_reach_matches_equal_non_sentinel_regions() {
        let mut flood = FloodFillGrid::new(4, 4);
        flood.set_region(Point::new(0, 0), 1);
        flood.set_region(Point::new(3, 3), 1);
        flood.set_region(Point::new(1, 1), 2);

        let pathfinder = Pathfinder::new(1, 10, 14, 100);
        assert!(pathfinder.can_reach(&flood, Point::new(0, 0), Point::new(3, 3)));
        assert!(!pathfinder.can_reach(&flood, Point::new(0, 0), Point::new(1, 1)));
    }

    #[test]
    fn process_expires_stale_entries_across_the_pool() {
        let pathfinder = Pathfinder::new(4, 10, 14, 5);
        let grid = CostGrid::new(8, 8, 1);
        let handle = pathfinder.pathfind(0, &grid, Point::new(0, 0), Point::new(1, 0));
        let exec = test_executor(2);

        pathfinder.process(&exec, 0);
        assert!(pathfinder.get_path_context(handle, 0).is_some());

        pathfinder.process(&exec, 1000);
        {
            let ctx = pathfinder.per_thread[0].lock().unwrap();
            assert!(ctx.path_entry_pool.get(handle.entry_id()).is_none());
        }
    }

    #[test]
    fn get_path_context_holds_through_the_refresh_window_then_process_erases_on_the_next_tick() {
        let refresh = 5u64;
        let pathfind_tick = 100u64;
        let pathfinder = Pathfinder::new(1, 10, 14, refresh);
        let grid = CostGrid::new(8, 8, 1);
        let handle = pathfinder.pathfind(0, &grid, Point::new(0, 0), Point::new(1, 0));
        let exec = test_executor(1);

        // needs_init: the first process() after pathfind() establishes the
        // initial expiry window, T + 2R.
        pathfinder.process(&exec, pathfind_tick);
        let expiry = pathfind_tick + 2 * refresh;

        assert!(pathfinder.get_path_context(handle, expiry).is_some());

        pathfinder.process(&exec, expiry + 1);
        {
            let ctx = pathfinder.per_thread[0].lock().unwrap();
            assert!(ctx.path_entry_pool.get(handle.entry_id()).is_none());
        }
        assert!(pathfinder.get_path_context(handle, expiry + 1).is_none());
    }

    impl PathHandle {
        fn entry_id(self) -> u32 {
            self.entry_id
        }
    }
}
