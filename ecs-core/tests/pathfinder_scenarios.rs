use ecs_core::{CostGrid, FloodFillGrid, Pathfinder, Point};

const MAIN_THREAD: u32 = 0;

fn walk(pathfinder: &Pathfinder, handle: ecs_core::PathHandle, to: Point) -> Vec<Point> {
    let mut visited = Vec::new();
    let mut tick = 0u64;
    loop {
        let ctx = pathfinder.get_path_context(handle, tick).unwrap();
        let Some(current) = ctx.current else { break };
        visited.push(current);
        if current == to {
            break;
        }
        pathfinder.advance_path(handle, tick);
        tick += 1;
        if visited.len() > 256 {
            panic!("path walk did not terminate");
        }
    }
    visited
}

#[test]
fn straight_line_on_an_empty_sixty_four_grid_is_diagonal_then_cardinal() {
    let pathfinder = Pathfinder::new(1, 10, 14, 0);
    let costs = CostGrid::new(64, 64, 1);

    let from = Point::new(0, 0);
    let to = Point::new(10, 4);
    let handle = pathfinder.pathfind(MAIN_THREAD, &costs, from, to);

    let visited = walk(&pathfinder, handle, to);
    assert_eq!(*visited.first().unwrap(), from);
    assert_eq!(*visited.last().unwrap(), to);
    // 4 diagonal steps close the row gap, then 6 cardinal steps finish the column.
    assert_eq!(visited.len(), 11);
}

#[test]
fn obstacle_column_forces_a_costlier_detour() {
    let pathfinder = Pathfinder::new(1, 10, 14, 0);
    let mut costs = CostGrid::new(16, 16, 1);
    for y in 0..15 {
        costs.set(Point::new(8, y), 0);
    }

    let from = Point::new(0, 8);
    let to = Point::new(15, 8);
    let handle = pathfinder.pathfind(MAIN_THREAD, &costs, from, to);

    let visited = walk(&pathfinder, handle, to);
    assert_eq!(*visited.first().unwrap(), from);
    assert_eq!(*visited.last().unwrap(), to);
    // Without the wall a straight line is 15 steps; routing around the gap costs more.
    assert!(visited.len() > 15);
}

#[test]
fn fully_enclosed_target_yields_an_empty_path() {
    let pathfinder = Pathfinder::new(1, 10, 14, 0);
    let mut costs = CostGrid::new(8, 8, 1);
    for x in 0..8 {
        costs.set(Point::new(x, 3), 0);
    }
    for x in 0..8 {
        costs.set(Point::new(x, 4), 0);
    }

    let from = Point::new(0, 0);
    let to = Point::new(0, 7);
    let handle = pathfinder.pathfind(MAIN_THREAD, &costs, from, to);

    let ctx = pathfinder.get_path_context(handle, 0).unwrap();
    assert!(ctx.current.is_none());
}

#[test]
fn can_reach_agrees_with_flood_fill_regions() {
    let pathfinder = Pathfinder::new(1, 10, 14, 0);
    let mut flood_fill = FloodFillGrid::new(8, 8);
    for y in 0..8 {
        for x in 0..4 {
            flood_fill.set_region(Point::new(x, y), 1);
        }
        for x in 4..8 {
            flood_fill.set_region(Point::new(x, y), 2);
        }
    }

    assert!(pathfinder.can_reach(&flood_fill, Point::new(0, 0), Point::new(3, 7)));
    assert!(!pathfinder.can_reach(&flood_fill, Point::new(0, 0), Point::new(7, 7)));
}
