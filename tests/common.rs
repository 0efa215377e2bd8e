#![allow(dead_code)]

use blockscan::geo::{Affine, Point, Rgb};
use blockscan::RawBlock;

/// 20 x 20 outline, local centre (10, 10).
pub const CHAIR: &str = "0 0 m 20 0 l 20 20 l 0 20 l h S";
/// 60 x 30 filled rectangle, local centre (30, 15).
pub const DESK: &str = "0 0 60 30 re f";

pub const CHAIR_CENTRE: Point = Point::new(10.0, 10.0);
pub const DESK_CENTRE: Point = Point::new(30.0, 15.0);

/// Small seeded generator so "random" layouts are the same on every run.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        XorShift(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
    }
}

/// A block whose local centre lands on `centroid` under a pure translation.
pub fn placed(page: u32, commands: &str, local_centre: Point, centroid: Point) -> RawBlock {
    RawBlock {
        page,
        commands: commands.to_string(),
        transform: Affine::translate(centroid.x - local_centre.x, centroid.y - local_centre.y),
        color: None,
    }
}

pub fn chair(page: u32, centroid: Point) -> RawBlock {
    placed(page, CHAIR, CHAIR_CENTRE, centroid)
}

pub fn desk(page: u32, centroid: Point) -> RawBlock {
    RawBlock {
        color: Some(Rgb::new(0.6, 0.4, 0.2)),
        ..placed(page, DESK, DESK_CENTRE, centroid)
    }
}

/// Chair/desk pairs far enough apart that no pair sees another. The desk sits
/// `offset` from its chair, plus up to `jitter` on each axis.
pub fn chair_desk_pairs(
    page: u32,
    pairs: usize,
    offset: Point,
    jitter: f64,
    rng: &mut XorShift,
) -> Vec<RawBlock> {
    (0..pairs)
        .flat_map(|i| {
            let origin = Point::new((i % 5) as f64 * 1000.0, (i / 5) as f64 * 1000.0);
            let desk_at = Point::new(
                origin.x + offset.x + rng.range(-jitter, jitter),
                origin.y + offset.y + rng.range(-jitter, jitter),
            );
            [chair(page, origin), desk(page, desk_at)]
        })
        .collect()
}
