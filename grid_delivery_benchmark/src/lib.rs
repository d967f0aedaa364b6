//! Delivery worlds for tests and benchmarks: seeded random generation and the
//! `m;n;P;S;stores;destinations;tunnels;obstacles;` world string.
//!
//! Worlds are plain data so they can be turned into whatever grid type the consumer uses.
//! One agent starts on every store.
use std::collections::HashSet;

use grid_util::point::Point;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldSpec {
    pub width: usize,
    pub height: usize,
    pub stores: Vec<Point>,
    pub destinations: Vec<Point>,
    pub tunnels: Vec<(Point, Point)>,
    /// Adjacent cells whose connecting edge is blocked in both directions.
    pub obstacles: Vec<(Point, Point)>,
    /// Cost of moving between adjacent cells in either direction. Unlisted pairs cost 1.
    pub traffic: Vec<(Point, Point, u32)>,
}

impl WorldSpec {
    /// One agent per store, named `truck0`, `truck1`, ...
    pub fn agents(&self) -> Vec<(String, Point)> {
        self.stores
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("truck{i}"), *s))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("field `{field}` lists {len} numbers, expected a multiple of {chunk}")]
    Ragged {
        field: &'static str,
        len: usize,
        chunk: usize,
    },
    #[error("{field} count is {declared} but {found} were listed")]
    CountMismatch {
        field: &'static str,
        declared: usize,
        found: usize,
    },
}

fn parse_number<T: std::str::FromStr>(token: &str) -> Result<T, WorldError> {
    token
        .trim()
        .parse()
        .map_err(|_| WorldError::InvalidNumber(token.trim().to_owned()))
}

fn parse_numbers(field: &'static str, s: &str, chunk: usize) -> Result<Vec<i32>, WorldError> {
    let numbers = s
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(parse_number::<i32>)
        .collect::<Result<Vec<_>, _>>()?;
    if numbers.len() % chunk != 0 {
        return Err(WorldError::Ragged {
            field,
            len: numbers.len(),
            chunk,
        });
    }
    Ok(numbers)
}

fn points(field: &'static str, s: &str) -> Result<Vec<Point>, WorldError> {
    Ok(parse_numbers(field, s, 2)?
        .chunks(2)
        .map(|c| Point::new(c[0], c[1]))
        .collect())
}

fn point_pairs(field: &'static str, s: &str) -> Result<Vec<(Point, Point)>, WorldError> {
    Ok(parse_numbers(field, s, 4)?
        .chunks(4)
        .map(|c| (Point::new(c[0], c[1]), Point::new(c[2], c[3])))
        .collect())
}

/// Parses `m;n;P;S;stores;destinations;tunnels;obstacles;`, where `P` counts destinations and
/// `S` stores. Coordinates are flat comma-separated lists; a tunnel or obstacle takes four
/// numbers. The tunnel and obstacle fields may be omitted and anything after them is ignored.
pub fn parse_world(s: &str) -> Result<WorldSpec, WorldError> {
    let fields = s.trim().split(';').collect::<Vec<_>>();
    let field = |i: usize, name: &'static str| {
        fields
            .get(i)
            .copied()
            .ok_or(WorldError::MissingField(name))
    };
    let width = parse_number(field(0, "m")?)?;
    let height = parse_number(field(1, "n")?)?;
    let n_destinations: usize = parse_number(field(2, "P")?)?;
    let n_stores: usize = parse_number(field(3, "S")?)?;
    let stores = points("stores", field(4, "stores")?)?;
    let destinations = points("destinations", field(5, "destinations")?)?;
    let tunnels = point_pairs("tunnels", fields.get(6).copied().unwrap_or(""))?;
    let obstacles = point_pairs("obstacles", fields.get(7).copied().unwrap_or(""))?;
    if stores.len() != n_stores {
        return Err(WorldError::CountMismatch {
            field: "store",
            declared: n_stores,
            found: stores.len(),
        });
    }
    if destinations.len() != n_destinations {
        return Err(WorldError::CountMismatch {
            field: "destination",
            declared: n_destinations,
            found: destinations.len(),
        });
    }
    Ok(WorldSpec {
        width,
        height,
        stores,
        destinations,
        tunnels,
        obstacles,
        traffic: Vec::new(),
    })
}

fn join_points(points: impl IntoIterator<Item = Point>) -> String {
    points
        .into_iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [parse_world]. Traffic costs are not part of the string.
pub fn format_world(world: &WorldSpec) -> String {
    let pairs = |ps: &[(Point, Point)]| join_points(ps.iter().flat_map(|(a, b)| [*a, *b]));
    format!(
        "{};{};{};{};{};{};{};{};",
        world.width,
        world.height,
        world.destinations.len(),
        world.stores.len(),
        join_points(world.stores.iter().copied()),
        join_points(world.destinations.iter().copied()),
        pairs(&world.tunnels),
        pairs(&world.obstacles),
    )
}

/// Bounds for [random_world].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldParams {
    /// Smallest width and height; at least 5 so every object fits.
    pub min_size: usize,
    pub max_size: usize,
    pub max_objects: usize,
    pub max_tunnels: usize,
    /// Fraction of cells that receive a blocked edge attempt.
    pub obstacle_ratio: f64,
    pub max_traffic: u32,
}

impl Default for WorldParams {
    fn default() -> Self {
        WorldParams {
            min_size: 5,
            max_size: 15,
            max_objects: 10,
            max_tunnels: 3,
            obstacle_ratio: 0.1,
            max_traffic: 4,
        }
    }
}

fn free_cell(rng: &mut StdRng, w: usize, h: usize, used: &mut HashSet<Point>) -> Point {
    loop {
        let p = Point::new(rng.gen_range(0..w as i32), rng.gen_range(0..h as i32));
        if used.insert(p) {
            return p;
        }
    }
}

/// Generates a world where stores, destinations and tunnel entrances occupy distinct cells.
pub fn random_world(rng: &mut StdRng, params: &WorldParams) -> WorldSpec {
    let min_size = params.min_size.max(5);
    let max_size = params.max_size.max(min_size);
    let width = rng.gen_range(min_size..=max_size);
    let height = rng.gen_range(min_size..=max_size);
    let max_objects = params.max_objects.min(width * height / 4).max(1);
    let mut used = HashSet::new();

    let n_stores = rng.gen_range(1..=max_objects);
    let stores = (0..n_stores)
        .map(|_| free_cell(rng, width, height, &mut used))
        .collect();
    let n_destinations = rng.gen_range(1..=max_objects);
    let destinations = (0..n_destinations)
        .map(|_| free_cell(rng, width, height, &mut used))
        .collect();
    let n_tunnels = rng
        .gen_range(0..=params.max_tunnels)
        .min((width * height - used.len()) / 2);
    let tunnels = (0..n_tunnels)
        .map(|_| {
            let a = free_cell(rng, width, height, &mut used);
            let b = free_cell(rng, width, height, &mut used);
            (a, b)
        })
        .collect();

    let attempts = (width as f64 * height as f64 * params.obstacle_ratio) as usize;
    let obstacles = (0..attempts)
        .filter_map(|_| {
            let a = Point::new(
                rng.gen_range(0..width as i32),
                rng.gen_range(0..height as i32),
            );
            let b = if rng.gen_bool(0.5) {
                Point::new(a.x + 1, a.y)
            } else {
                Point::new(a.x, a.y + 1)
            };
            ((b.x as usize) < width && (b.y as usize) < height).then_some((a, b))
        })
        .collect();

    let max_traffic = params.max_traffic.max(1);
    let mut traffic = Vec::new();
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let p = Point::new(x, y);
            if (x as usize) + 1 < width {
                traffic.push((p, Point::new(x + 1, y), rng.gen_range(1..=max_traffic)));
            }
            if (y as usize) + 1 < height {
                traffic.push((p, Point::new(x, y + 1), rng.gen_range(1..=max_traffic)));
            }
        }
    }

    WorldSpec {
        width,
        height,
        stores,
        destinations,
        tunnels,
        obstacles,
        traffic,
    }
}

/// `n` worlds from a fixed seed.
pub fn seeded_worlds(seed: u64, n: usize, params: &WorldParams) -> Vec<WorldSpec> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| random_world(&mut rng, params)).collect()
}
