//! Uniform bucket grid over world space
//!
//! Used for road network node lookups while connecting lanes and for the
//! per-tick vehicle neighbor index. It is always derived data; callers
//! rebuild it rather than treat it as a source of truth.

use super::types::Position;

#[derive(Debug, Clone)]
pub struct BucketGrid<T> {
    bucket_size: f32,
    buckets_x: usize,
    buckets_y: usize,
    buckets: Vec<Vec<(T, Position)>>,
}

impl<T: Copy + PartialEq> BucketGrid<T> {
    /// Grid covering `width` x `height` world units. Positions outside the
    /// covered area are clamped into the border buckets.
    pub fn new(width: f32, height: f32, bucket_size: f32) -> Self {
        let bucket_size = bucket_size.max(1.0);
        let buckets_x = (width.max(0.0) / bucket_size) as usize + 1;
        let buckets_y = (height.max(0.0) / bucket_size) as usize + 1;
        Self {
            bucket_size,
            buckets_x,
            buckets_y,
            buckets: (0..buckets_x * buckets_y).map(|_| Vec::new()).collect(),
        }
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    pub fn insert(&mut self, item: T, position: Position) {
        let idx = self.flat_index(self.bucket_of(position.x), self.bucket_of_y(position.y));
        self.buckets[idx].push((item, position));
    }

    /// Remove an item previously inserted at `position`
    pub fn remove(&mut self, item: T, position: Position) -> bool {
        let idx = self.flat_index(self.bucket_of(position.x), self.bucket_of_y(position.y));
        let bucket = &mut self.buckets[idx];
        match bucket.iter().position(|(candidate, _)| *candidate == item) {
            Some(found) => {
                bucket.swap_remove(found);
                true
            }
            None => false,
        }
    }

    /// Items in every bucket touching the rectangle. May include items
    /// slightly outside of it; callers filter by exact distance.
    pub fn query_rect(&self, min: Position, max: Position) -> Vec<(T, Position)> {
        let min_bx = self.bucket_of(min.x);
        let max_bx = self.bucket_of(max.x);
        let min_by = self.bucket_of_y(min.y);
        let max_by = self.bucket_of_y(max.y);

        let mut result = Vec::new();
        for by in min_by..=max_by {
            for bx in min_bx..=max_bx {
                result.extend_from_slice(&self.buckets[self.flat_index(bx, by)]);
            }
        }
        result
    }

    /// Items within `radius` of `center`
    pub fn query_radius(&self, center: Position, radius: f32) -> Vec<(T, Position)> {
        let min = Position::new(center.x - radius, center.y - radius);
        let max = Position::new(center.x + radius, center.y + radius);
        self.query_rect(min, max)
            .into_iter()
            .filter(|(_, position)| position.distance(&center) <= radius)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|v| v.is_empty())
    }

    fn bucket_of(&self, x: f32) -> usize {
        ((x / self.bucket_size).floor().max(0.0) as usize).min(self.buckets_x - 1)
    }

    fn bucket_of_y(&self, y: f32) -> usize {
        ((y / self.bucket_size).floor().max(0.0) as usize).min(self.buckets_y - 1)
    }

    #[inline]
    fn flat_index(&self, bx: usize, by: usize) -> usize {
        by * self.buckets_x + bx
    }
}
