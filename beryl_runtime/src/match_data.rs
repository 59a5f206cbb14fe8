//! Match results in host numbering.
//!
//! The engine numbers capture groups from 1, with 0 meaning the whole
//! match. Hosts index groups from 0 and treat the full span separately,
//! so the translation happens once, here, when a raw match crosses into
//! the runtime.

use beryl_engine::RawMatch;

/// Spans of one successful match, host numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchData {
    full: (usize, usize),
    /// Group `i` of the host is engine group `i + 1`.
    groups: Vec<Option<(usize, usize)>>,
}

impl MatchData {
    pub(crate) fn from_raw(raw: &RawMatch) -> Self {
        Self {
            full: raw.full(),
            groups: raw
                .spans
                .iter()
                .skip(1)
                .copied()
                .collect(),
        }
    }

    /// Byte span of the whole match, half-open.
    #[inline]
    pub fn full(&self) -> (usize, usize) {
        self.full
    }

    /// Byte span of capture group `index` (0-based), `None` when the
    /// group did not participate in the match.
    #[inline]
    pub fn group(&self, index: usize) -> Option<(usize, usize)> {
        self.groups.get(index).copied().flatten()
    }

    /// All group spans in order, participation included.
    #[inline]
    pub fn groups(&self) -> &[Option<(usize, usize)>] {
        &self.groups
    }

    /// Number of capture groups the pattern defines.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_host_numbering_shifts_groups_down() {
        let raw = RawMatch {
            spans: smallvec![Some((6, 10)), Some((6, 8)), None, Some((9, 10))],
        };
        let m = MatchData::from_raw(&raw);
        assert_eq!(m.full(), (6, 10));
        assert_eq!(m.group(0), Some((6, 8)));
        assert_eq!(m.group(1), None);
        assert_eq!(m.group(2), Some((9, 10)));
        assert_eq!(m.group(3), None);
        assert_eq!(m.group_count(), 3);
    }

    #[test]
    fn test_groupless_match() {
        let raw = RawMatch {
            spans: smallvec![Some((0, 4))],
        };
        let m = MatchData::from_raw(&raw);
        assert_eq!(m.full(), (0, 4));
        assert_eq!(m.group_count(), 0);
        assert!(m.groups().is_empty());
    }
}
