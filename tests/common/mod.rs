#![allow(dead_code)]
use grid_delivery::{Grid, Point};
use grid_delivery_benchmark::WorldSpec;

/// Builds a [Grid] from a generated or parsed world. Adjacent cells are connected in both
/// directions with their traffic cost (1 if unlisted); obstacles block both directions.
pub fn build_grid(world: &WorldSpec) -> Grid {
    let mut grid = Grid::uniform(world.width, world.height, 1);
    for &(a, b, cost) in &world.traffic {
        grid.set_edge_bidirectional(a, b, cost);
    }
    for &(a, b) in &world.obstacles {
        grid.block_edge(a, b);
        grid.block_edge(b, a);
    }
    for &(a, b) in &world.tunnels {
        grid.add_tunnel(a, b);
    }
    for &store in &world.stores {
        grid.add_store(store);
    }
    for &destination in &world.destinations {
        grid.add_destination(destination);
    }
    for (id, position) in world.agents() {
        grid.add_agent(id, position);
    }
    grid
}

/// Every cell of the grid, row by row.
pub fn cells(grid: &Grid) -> Vec<Point> {
    (0..grid.height as i32)
        .flat_map(|y| (0..grid.width as i32).map(move |x| Point::new(x, y)))
        .collect()
}

/// Positions with consecutive duplicates removed.
pub fn without_waits(route: &[Point]) -> Vec<Point> {
    let mut out = route.to_vec();
    out.dedup();
    out
}
