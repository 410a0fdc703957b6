use serde::{Serialize, Deserialize};

/// Channel width per block: `base * 2^index`.
///
/// The contracting path uses it directly; the expansive path uses half the
/// width of the level it climbs back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSchedule {
    pub base: usize,
}

impl FilterSchedule {
    pub fn new(base: usize) -> FilterSchedule {
        FilterSchedule { base }
    }

    pub fn filters(&self, block_index: usize) -> usize {
        self.base * (1usize << block_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_base_and_doubles() {
        let schedule = FilterSchedule::new(64);
        assert_eq!(schedule.filters(0), 64);
        for n in 1..8 {
            assert_eq!(schedule.filters(n), 2 * schedule.filters(n - 1));
        }
        assert_eq!(FilterSchedule::new(3).filters(4), 48);
    }
}
