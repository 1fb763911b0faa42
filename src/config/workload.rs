use super::*;
use crate::workload::SampleSpace;

// Canadian provinces and territories weighted by population. The skew puts
// most of the load on a handful of partition keys.
const PROVINCES: &[(&str, u64)] = &[
    ("ON", 13_448_494),
    ("QC", 8_164_361),
    ("BC", 4_648_055),
    ("AB", 4_067_175),
    ("MB", 1_278_365),
    ("SK", 1_098_352),
    ("NS", 923_598),
    ("NB", 747_101),
    ("NL", 519_716),
    ("PE", 142_907),
    ("NT", 41_786),
    ("NU", 35_944),
    ("YT", 35_874),
];

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Workload {
    /// Writes per second admitted by the generator. Zero is invalid.
    ratelimit: u64,
    /// Partition keys and their relative weights, in reporting order.
    categories: Vec<Category>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Category {
    id: String,
    weight: u64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            ratelimit: 55,
            categories: PROVINCES
                .iter()
                .map(|(id, weight)| Category {
                    id: (*id).to_string(),
                    weight: *weight,
                })
                .collect(),
        }
    }
}

impl Workload {
    pub fn ratelimit(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.ratelimit)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn sample_space(&self) -> Result<SampleSpace, SampleSpaceError> {
        SampleSpace::new(
            self.categories
                .iter()
                .map(|c| crate::workload::Category::new(c.id.as_str(), c.weight))
                .collect(),
        )
    }
}
