// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{earth_distance, Coordinate};

/// KDTree implements the [k-d tree data structure](https://en.wikipedia.org/wiki/K-d_tree),
/// used to snap query coordinates onto the nearest node of a [RouteGraph](crate::RouteGraph).
/// Every loaded graph owns one, so snapping does not require computing the distance
/// to every node for every query.
///
/// This implementation assumes euclidean geometry, even though the distance function
/// used is [earth_distance]. This results in undefined behavior when points
/// are close to the ante meridian (180°/-180° longitude) or poles (90°/-90° latitude),
/// which is acceptable for city-sized graphs.
#[derive(Debug, Clone)]
pub struct KDTree {
    pivot: (u32, Coordinate),
    left: Option<Box<KDTree>>,
    right: Option<Box<KDTree>>,
}

impl KDTree {
    /// Finds the closest point to the given position.
    /// Returns its id and the distance to it, in kilometers.
    pub fn find_nearest(&self, at: Coordinate) -> (u32, f64) {
        self.find_nearest_impl(at, false)
    }

    fn find_nearest_impl(&self, at: Coordinate, lon_divides: bool) -> (u32, f64) {
        // Start by assuming that pivot is the closest
        let mut best = self.pivot.0;
        let mut best_dist = earth_distance(at, self.pivot.1);

        // Select which branch to recurse into first
        let first_left = if lon_divides {
            at.lon < self.pivot.1.lon
        } else {
            at.lat < self.pivot.1.lat
        };
        let (first, second) = if first_left {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        // Recurse into the first branch
        if let Some(ref branch) = first {
            let (alt, alt_dist) = branch.find_nearest_impl(at, !lon_divides);
            if alt_dist < best_dist || (alt_dist == best_dist && alt < best) {
                best = alt;
                best_dist = alt_dist;
            }
        }

        // (Optionally) recurse into the second branch
        if let Some(ref branch) = second {
            // A closer point is possible in the second branch if and only if
            // the splitting axis is closer than the current best candidate.
            let axis = if lon_divides {
                Coordinate::new(at.lat, self.pivot.1.lon)
            } else {
                Coordinate::new(self.pivot.1.lat, at.lon)
            };

            if earth_distance(at, axis) <= best_dist {
                let (alt, alt_dist) = branch.find_nearest_impl(at, !lon_divides);
                if alt_dist < best_dist || (alt_dist == best_dist && alt < best) {
                    best = alt;
                    best_dist = alt_dist;
                }
            }
        }

        (best, best_dist)
    }

    /// Builds a k-d tree from an iterable of `(id, position)` pairs.
    /// Points with non-finite coordinates are skipped.
    pub fn from_iter<I: IntoIterator<Item = (u32, Coordinate)>>(points: I) -> Option<Self> {
        let mut points = points
            .into_iter()
            .filter(|(_, c)| c.lat.is_finite() && c.lon.is_finite())
            .collect::<Vec<_>>();
        Self::build(points.as_mut_slice())
    }

    /// Builds a k-d tree from a mutable slice of points. Points will be reordered
    /// in the slice to facilitate building the tree.
    pub fn build(points: &mut [(u32, Coordinate)]) -> Option<Self> {
        Self::build_impl(points, false)
    }

    fn build_impl(points: &mut [(u32, Coordinate)], lon_divides: bool) -> Option<Self> {
        match points.len() {
            0 => None,
            1 => Some(Self {
                pivot: points[0],
                left: None,
                right: None,
            }),
            _ => {
                if lon_divides {
                    points.sort_by(|a, b| a.1.lon.total_cmp(&b.1.lon).then(a.0.cmp(&b.0)));
                } else {
                    points.sort_by(|a, b| a.1.lat.total_cmp(&b.1.lat).then(a.0.cmp(&b.0)));
                }
                let median = points.len() / 2;
                let pivot = points[median];
                let (left, right_and_pivot) = points.split_at_mut(median);
                let right = &mut right_and_pivot[1..];
                Some(Self {
                    pivot,
                    left: Self::build_impl(left, !lon_divides).map(Box::new),
                    right: Self::build_impl(right, !lon_divides).map(Box::new),
                })
            }
        }
    }
}
