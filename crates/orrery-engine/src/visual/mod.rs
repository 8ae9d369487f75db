//! Producer-side views of visual data.

/// Read-only access to the current vertex data.
pub trait VisualAccess {
    fn vertex_count(&self) -> usize;
    fn x(&self, index: usize) -> f32;
    fn y(&self, index: usize) -> f32;
    fn z(&self, index: usize) -> f32;

    #[inline]
    fn position(&self, index: usize) -> [f32; 3] {
        [self.x(index), self.y(index), self.z(index)]
    }
}

/// Ordered list of changed vertex indices.
pub trait VisualChange {
    fn len(&self) -> usize;
    fn element_at(&self, i: usize) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn indices(&self) -> Vec<usize> {
        (0..self.len()).map(|i| self.element_at(i)).collect()
    }
}

/// Point positions owned by the producer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f32; 3]>,
}

impl PointCloud {
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    /// Replaces the listed points and returns the matching change set.
    pub fn set(&mut self, updates: &[(usize, [f32; 3])]) -> ChangeSet {
        let mut changed = Vec::with_capacity(updates.len());
        for &(index, p) in updates {
            if let Some(slot) = self.points.get_mut(index) {
                *slot = p;
                changed.push(index);
            }
        }
        ChangeSet::new(changed)
    }

    pub fn push(&mut self, p: [f32; 3]) {
        self.points.push(p);
    }
}

impl VisualAccess for PointCloud {
    fn vertex_count(&self) -> usize {
        self.points.len()
    }

    fn x(&self, index: usize) -> f32 {
        self.points[index][0]
    }

    fn y(&self, index: usize) -> f32 {
        self.points[index][1]
    }

    fn z(&self, index: usize) -> f32 {
        self.points[index][2]
    }

    fn position(&self, index: usize) -> [f32; 3] {
        self.points[index]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    indices: Vec<usize>,
}

impl ChangeSet {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }
}

impl VisualChange for ChangeSet {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn element_at(&self, i: usize) -> usize {
        self.indices[i]
    }

    fn indices(&self) -> Vec<usize> {
        self.indices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_only_existing_indices() {
        let mut cloud = PointCloud::new(vec![[0.0; 3]; 4]);
        let change = cloud.set(&[(1, [1.0, 2.0, 3.0]), (9, [0.0; 3])]);
        assert_eq!(change.indices(), vec![1]);
        assert_eq!(cloud.position(1), [1.0, 2.0, 3.0]);
        assert_eq!(cloud.y(1), 2.0);
    }

    #[test]
    fn empty_change_set() {
        assert!(ChangeSet::default().is_empty());
    }
}
