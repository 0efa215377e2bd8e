use blockscan::geo::Point;
use blockscan::spatial::{brute_force_radius, SpatialIndex};

mod common;
use common::XorShift;

fn random_points(rng: &mut XorShift, n: usize, extent: f64) -> Vec<(usize, Point)> {
    (0..n)
        .map(|slot| (slot, Point::new(rng.range(0.0, extent), rng.range(0.0, extent))))
        .collect()
}

#[test]
fn test_radius_query_matches_brute_force() {
    let mut rng = XorShift::new(2024);
    let points = random_points(&mut rng, 2_000, 1_000.0);
    let index = SpatialIndex::build(points.iter().copied());
    assert_eq!(index.len(), points.len());

    for _ in 0..200 {
        let center = Point::new(rng.range(-50.0, 1_050.0), rng.range(-50.0, 1_050.0));
        let radius = rng.range(1.0, 200.0);

        let mut found = index.query_radius(center, radius);
        found.sort_unstable();
        let expected = brute_force_radius(&points, center, radius);
        assert_eq!(found, expected, "center {} radius {}", center, radius);
    }
}

#[test]
fn test_duplicate_points_are_all_returned() {
    let points: Vec<(usize, Point)> = (0..5).map(|slot| (slot, Point::new(10.0, 10.0))).collect();
    let index = SpatialIndex::build(points.iter().copied());
    let mut found = index.query_radius(Point::new(10.0, 10.0), 0.0);
    found.sort_unstable();
    assert_eq!(found, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_clustered_layout() {
    let mut rng = XorShift::new(77);
    // Tight clusters far apart: a query on one cluster never sees another.
    let points: Vec<(usize, Point)> = (0..400)
        .map(|slot| {
            let cluster = (slot / 40) as f64;
            (
                slot,
                Point::new(cluster * 5_000.0 + rng.range(0.0, 50.0), rng.range(0.0, 50.0)),
            )
        })
        .collect();
    let index = SpatialIndex::build(points.iter().copied());

    for cluster in 0..10 {
        let center = Point::new(cluster as f64 * 5_000.0 + 25.0, 25.0);
        let mut found = index.query_radius(center, 150.0);
        found.sort_unstable();
        let expected: Vec<usize> = (cluster * 40..cluster * 40 + 40).collect();
        assert_eq!(found, expected);
    }
}
