use crate::series::Positioned;

/// Drops points closer than `min_distance` pixels to the last kept point.
///
/// Greedy single forward pass: the first point is always kept, and each later
/// point is kept only if it lies strictly farther than `min_distance` from the
/// previously kept one. A non-positive distance returns the input unchanged.
/// Works on pixel coordinates, so the result depends on the current zoom.
pub fn decimate<P: Positioned + Clone>(points: &[P], min_distance: f64) -> Vec<P> {
    if !(min_distance > 0.0) {
        return points.to_vec();
    }

    let mut out: Vec<P> = Vec::with_capacity(points.len());
    let mut last = None;
    for p in points {
        let pos = p.position();
        let keep = match last {
            None => true,
            Some(prev) => pos.distance(&prev) > min_distance,
        };
        if keep {
            last = Some(pos);
            out.push(p.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{DataPoint, Point};

    fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_decimate_example() {
        let input = pts(&[(0.0, 0.0), (1.0, 0.0), (10.0, 0.0), (10.5, 0.0), (20.0, 0.0)]);
        assert_eq!(decimate(&input, 5.0), pts(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]));
    }

    #[test]
    fn test_non_positive_distance_is_identity() {
        let input = pts(&[(0.0, 0.0), (0.0, 0.0), (0.1, 0.0)]);
        assert_eq!(decimate(&input, 0.0), input);
        assert_eq!(decimate(&input, -1.0), input);
    }

    #[test]
    fn test_empty_and_single() {
        assert!(decimate::<Point>(&[], 5.0).is_empty());
        assert_eq!(decimate(&pts(&[(3.0, 4.0)]), 5.0), pts(&[(3.0, 4.0)]));
    }

    #[test]
    fn test_distance_is_strictly_greater() {
        let input = pts(&[(0.0, 0.0), (3.0, 4.0), (6.0, 8.0)]);
        // (3,4) is exactly 5 away and must go; (6,8) is 10 away from (0,0)
        assert_eq!(decimate(&input, 5.0), pts(&[(0.0, 0.0), (6.0, 8.0)]));
    }

    #[test]
    fn test_kept_points_are_spaced_and_ordered() {
        let input: Vec<Point> = (0..200)
            .map(|i| {
                let t = i as f64 * 0.37;
                Point::new(t * 3.0, (t * 1.7).sin() * 40.0)
            })
            .collect();
        let t = 6.0;
        let out = decimate(&input, t);

        assert_eq!(out[0], input[0]);
        for pair in out.windows(2) {
            assert!(pair[0].distance(&pair[1]) > t);
        }
        // subsequence check
        let mut cursor = input.iter();
        for kept in &out {
            assert!(cursor.any(|p| p == kept));
        }
    }

    #[test]
    fn test_decimate_data_points_keeps_metadata() {
        let input = vec![
            DataPoint { pt: Point::new(0.0, 0.0), rule: Some("a".into()), dataset_id: 1 },
            DataPoint { pt: Point::new(1.0, 0.0), rule: Some("b".into()), dataset_id: 1 },
            DataPoint { pt: Point::new(9.0, 0.0), rule: Some("c".into()), dataset_id: 1 },
        ];
        let out = decimate(&input, 5.0);
        let rules: Vec<_> = out.iter().filter_map(|p| p.rule.as_deref()).collect();
        assert_eq!(rules, vec!["a", "c"]);
    }
}
