use rand::{Rng, RngCore};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// A partition key and its relative share of the generated load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    id: Arc<str>,
    weight: u64,
}

impl Category {
    pub fn new(id: impl Into<Arc<str>>, weight: u64) -> Self {
        Self {
            id: id.into(),
            weight,
        }
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleSpaceError {
    #[error("at least one category is required")]
    Empty,
    #[error("category ids must not be empty")]
    EmptyId,
    #[error("category `{0}` has a zero weight")]
    ZeroWeight(String),
    #[error("category `{0}` is listed more than once")]
    Duplicate(String),
    #[error("the sum of category weights overflows")]
    Overflow,
}

/// The fixed, ordered set of categories a workload draws from.
///
/// The order given at construction is kept for the life of the process: it
/// decides which category owns each draw and the column order of reports.
#[derive(Clone, Debug)]
pub struct SampleSpace {
    categories: Vec<Category>,
    total: u64,
}

impl SampleSpace {
    pub fn new(categories: Vec<Category>) -> Result<Self, SampleSpaceError> {
        if categories.is_empty() {
            return Err(SampleSpaceError::Empty);
        }

        let mut seen = HashSet::with_capacity(categories.len());
        let mut total: u64 = 0;

        for category in &categories {
            if category.id.is_empty() {
                return Err(SampleSpaceError::EmptyId);
            }
            if category.weight == 0 {
                return Err(SampleSpaceError::ZeroWeight(category.id.to_string()));
            }
            if !seen.insert(category.id.clone()) {
                return Err(SampleSpaceError::Duplicate(category.id.to_string()));
            }
            total = total
                .checked_add(category.weight)
                .ok_or(SampleSpaceError::Overflow)?;
        }

        Ok(Self { categories, total })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, index: usize) -> Option<&Category> {
        self.categories.get(index)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    /// Draws uniformly from `[0, total_weight)` and returns the index of the
    /// selected category.
    pub fn sample_with(&self, rng: &mut dyn RngCore) -> usize {
        sample(self, rng.random_range(0..self.total_weight()))
    }
}

/// Maps a draw in `[0, total_weight)` to the index of a category.
///
/// Categories are walked in order, subtracting each weight from the draw. The
/// first category whose weight exceeds the remainder is selected, so category
/// `i` owns the draws in `[cum[i - 1], cum[i])` and exactly `weight` of them.
/// A draw that exhausts the walk falls back to the first category.
pub fn sample(space: &SampleSpace, draw: u64) -> usize {
    let mut remaining = draw;

    for (index, category) in space.categories.iter().enumerate() {
        if remaining < category.weight() {
            return index;
        }
        remaining -= category.weight();
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro512PlusPlus;

    fn space(weights: &[u64]) -> SampleSpace {
        SampleSpace::new(
            weights
                .iter()
                .enumerate()
                .map(|(i, w)| Category::new(format!("c{i}"), *w))
                .collect(),
        )
        .expect("valid sample space")
    }

    #[test]
    fn every_draw_lands_in_its_interval() {
        let space = space(&[3, 2, 5]);
        assert_eq!(space.total_weight(), 10);

        let expected = [0, 0, 0, 1, 1, 2, 2, 2, 2, 2];
        for (draw, index) in expected.iter().enumerate() {
            assert_eq!(sample(&space, draw as u64), *index, "draw {draw}");
        }
    }

    #[test]
    fn last_draw_selects_last_category() {
        let space = space(&[13, 8, 4, 1]);
        assert_eq!(sample(&space, space.total_weight() - 1), 3);

        let space = self::space(&[1]);
        assert_eq!(sample(&space, 0), 0);
    }

    #[test]
    fn each_category_owns_exactly_its_weight_in_draws() {
        for weights in [&[1, 2, 7][..], &[13, 8, 4, 1], &[1], &[5, 1, 1, 5]] {
            let space = space(weights);
            let mut counts = vec![0_u64; weights.len()];

            for draw in 0..space.total_weight() {
                counts[sample(&space, draw)] += 1;
            }

            assert_eq!(counts, weights, "weights {weights:?}");
        }
    }

    #[test]
    fn exhausted_walk_falls_back_to_first() {
        let space = space(&[2, 2, 2]);
        assert_eq!(sample(&space, space.total_weight() + 1), 0);
        assert_eq!(sample(&space, u64::MAX), 0);
    }

    #[test]
    fn uniform_draws_converge_to_weights() {
        let space = space(&[1, 2, 7]);
        let mut rng = Xoshiro512PlusPlus::seed_from_u64(42);
        let mut counts = [0_u64; 3];

        let draws = 1_000_000;
        for _ in 0..draws {
            counts[space.sample_with(&mut rng)] += 1;
        }

        for (index, category) in space.categories().iter().enumerate() {
            let expected = category.weight() as f64 / space.total_weight() as f64;
            let observed = counts[index] as f64 / draws as f64;
            assert!(
                (expected - observed).abs() < 0.005,
                "category {index}: expected {expected} observed {observed}"
            );
        }
    }

    #[test]
    fn rejects_bad_tables() {
        assert_eq!(SampleSpace::new(vec![]).unwrap_err(), SampleSpaceError::Empty);
        assert_eq!(
            SampleSpace::new(vec![Category::new("a", 1), Category::new("b", 0)]).unwrap_err(),
            SampleSpaceError::ZeroWeight("b".into())
        );
        assert_eq!(
            SampleSpace::new(vec![Category::new("a", 1), Category::new("a", 2)]).unwrap_err(),
            SampleSpaceError::Duplicate("a".into())
        );
        assert_eq!(
            SampleSpace::new(vec![Category::new("", 1)]).unwrap_err(),
            SampleSpaceError::EmptyId
        );
        assert_eq!(
            SampleSpace::new(vec![Category::new("a", u64::MAX), Category::new("b", 1)])
                .unwrap_err(),
            SampleSpaceError::Overflow
        );
    }
}
