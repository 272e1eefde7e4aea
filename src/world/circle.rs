//! # Circle Module
//!
//! This module provides `Circle<T>`, a fixed-capacity cache of elements
//! keyed by 2-D integer points inside a disk around a movable center.
//!
//! ## Layout
//!
//! The candidate points of the disk are enumerated once at construction and
//! sorted by distance from the center, so iteration visits the closest
//! points first. Lookups go through a power-of-two table indexed by the low
//! bits of each coordinate; the table spans the disk's diameter, so two
//! distinct in-disk points can never collide. Re-centering shifts which
//! world points the table slots mean, without moving any entries.
//!
//! ## Eviction
//!
//! `recenter` removes every element that falls outside the disk around the
//! new center and returns them to the caller, which owns their disposal
//! (dropping meshes, notifying neighbors). The circle itself never drops
//! an element silently.

use cgmath::{Point2, Vector2};
use log::trace;

/// A 2-D chunk coordinate. The `y` field holds the z axis.
pub type ChunkPos = Point2<i32>;

/// The squared length of an integer offset.
#[inline]
pub fn norm_squared(v: Vector2<i32>) -> i64 {
    let (x, z) = (v.x as i64, v.y as i64);
    x * x + z * z
}

/// An element that knows which point it occupies.
pub trait CircleElement {
    /// The point this element is stored at.
    fn point(&self) -> ChunkPos;
}

/// A disk-shaped cache of elements around a movable center.
pub struct Circle<T> {
    center: ChunkPos,
    mask: i32,
    shift: u32,
    points: Vec<Vector2<i32>>,
    deltas: Vec<i32>,
    lookup: Vec<Option<T>>,
    used: usize,
}

impl<T: CircleElement> Circle<T> {
    /// Creates an empty circle of the given radius, centered at the origin.
    pub fn new(radius: f64) -> Self {
        let bound = radius * radius;
        let floor = radius.floor() as i32;

        let mut points = Vec::new();
        let mut deltas = vec![-1; floor as usize + 1];
        for x in -floor..=floor {
            for z in -floor..=floor {
                let offset = Vector2::new(x, z);
                if (norm_squared(offset) as f64) <= bound {
                    points.push(offset);
                    let ax = x.unsigned_abs() as usize;
                    deltas[ax] = deltas[ax].max(z.abs());
                }
            }
        }
        points.sort_by_key(|&offset| norm_squared(offset));

        let diameter = 2 * floor + 1;
        let mut shift = 0;
        while (1 << shift) < diameter {
            shift += 1;
        }
        let mask = (1 << shift) - 1;
        let mut lookup = Vec::new();
        lookup.resize_with(1 << (2 * shift), || None);

        trace!("circle of radius {} holds {} points", radius, points.len());
        Circle { center: Point2::new(0, 0), mask, shift, points, deltas, lookup, used: 0 }
    }

    /// The number of points inside the disk.
    pub fn capacity(&self) -> usize {
        self.points.len()
    }

    /// The number of stored elements.
    pub fn len(&self) -> usize {
        self.used
    }

    /// Whether the circle holds no elements.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// The current center.
    pub fn center(&self) -> ChunkPos {
        self.center
    }

    /// Whether `point` lies inside the disk around the current center.
    pub fn contains(&self, point: ChunkPos) -> bool {
        let diff = point - self.center;
        let ax = diff.x.unsigned_abs() as usize;
        ax < self.deltas.len() && diff.y.abs() <= self.deltas[ax]
    }

    #[inline]
    fn index(&self, point: ChunkPos) -> usize {
        ((point.y & self.mask) << self.shift | (point.x & self.mask)) as usize
    }

    /// Visits every in-disk point, closest to the center first. The visitor
    /// returns `true` to stop early.
    pub fn each(&self, mut visit: impl FnMut(ChunkPos) -> bool) {
        for &offset in &self.points {
            if visit(self.center + offset) {
                return;
            }
        }
    }

    /// Returns the element at `point`, if present.
    pub fn get(&self, point: ChunkPos) -> Option<&T> {
        self.lookup[self.index(point)]
            .as_ref()
            .filter(|value| value.point() == point)
    }

    /// Returns the element at `point` mutably, if present.
    pub fn get_mut(&mut self, point: ChunkPos) -> Option<&mut T> {
        let index = self.index(point);
        self.lookup[index]
            .as_mut()
            .filter(|value| value.point() == point)
    }

    /// Stores an element at its own point.
    ///
    /// # Panics
    ///
    /// Panics if the point is outside the disk or already occupied.
    pub fn set(&mut self, value: T) {
        let point = value.point();
        assert!(self.contains(point), "{:?} is outside the circle", point);
        let index = self.index(point);
        assert!(self.lookup[index].is_none(), "{:?} is already occupied", point);
        self.lookup[index] = Some(value);
        self.used += 1;
        assert!(self.used <= self.points.len());
    }

    /// Removes and returns the element at `point`, if present.
    pub fn remove(&mut self, point: ChunkPos) -> Option<T> {
        let index = self.index(point);
        if self.lookup[index].as_ref()?.point() != point {
            return None;
        }
        self.used -= 1;
        self.lookup[index].take()
    }

    /// Moves the center to `center` and returns every element that fell
    /// outside the disk. The caller owns disposal of the returned elements.
    pub fn recenter(&mut self, center: ChunkPos) -> Vec<T> {
        if center == self.center {
            return Vec::new();
        }
        let mut evicted = Vec::new();
        let old = self.center;
        self.center = center;
        for &offset in &self.points {
            let point = old + offset;
            if self.contains(point) {
                continue;
            }
            let index = self.index(point);
            if let Some(value) = self.lookup[index].take() {
                debug_assert_eq!(value.point(), point);
                self.used -= 1;
                evicted.push(value);
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag(ChunkPos);

    impl CircleElement for Tag {
        fn point(&self) -> ChunkPos {
            self.0
        }
    }

    #[test]
    fn points_are_sorted_by_distance() {
        let circle = Circle::<Tag>::new(4.5);
        let mut last = -1;
        circle.each(|point| {
            let d = norm_squared(point - circle.center());
            assert!(d >= last);
            last = d;
            false
        });
    }

    #[test]
    fn get_returns_only_exact_points() {
        let mut circle = Circle::new(2.5);
        circle.set(Tag(Point2::new(1, -2)));
        assert!(circle.get(Point2::new(1, -2)).is_some());
        assert!(circle.get(Point2::new(-2, 1)).is_none());
        assert!(circle.get(Point2::new(0, 0)).is_none());
    }

    #[test]
    #[should_panic(expected = "already occupied")]
    fn double_set_panics() {
        let mut circle = Circle::new(2.5);
        circle.set(Tag(Point2::new(0, 1)));
        circle.set(Tag(Point2::new(0, 1)));
    }

    #[test]
    fn recenter_evicts_exactly_the_outsiders() {
        let mut circle = Circle::new(3.5);
        let mut points = Vec::new();
        circle.each(|point| {
            points.push(point);
            false
        });
        for &point in &points {
            circle.set(Tag(point));
        }
        assert_eq!(circle.len(), circle.capacity());

        let center = Point2::new(2, -1);
        let evicted = circle.recenter(center);
        for tag in &evicted {
            assert!(!circle.contains(tag.0));
        }
        for &point in &points {
            if circle.contains(point) {
                assert!(circle.get(point).is_some(), "{:?} should survive", point);
            }
        }
        assert_eq!(circle.len() + evicted.len(), points.len());
    }

    #[test]
    fn recenter_far_away_evicts_everything() {
        let mut circle = Circle::new(2.5);
        let mut points = Vec::new();
        circle.each(|point| {
            points.push(point);
            false
        });
        for &point in &points {
            circle.set(Tag(point));
        }
        let evicted = circle.recenter(Point2::new(1000, 1000));
        assert_eq!(evicted.len(), points.len());
        assert!(circle.is_empty());
    }
}
