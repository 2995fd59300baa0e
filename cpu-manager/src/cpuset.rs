//! CPU sets: the currency the allocator, the state store, and the runtime
//! client all pass around.
//!
//! A [`CpuSet`] is immutable and value-typed — every operation that looks
//! like a mutation (`union`, `difference`, ...) returns a new set. The
//! canonical textual form is the one accepted by Linux cpuset cgroups:
//! ascending, comma-separated ranges (`"0-3,7,10-11"`). Formatting and
//! parsing are exact inverses of each other.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// An immutable set of non-negative CPU ids.
///
/// Backed by a `BTreeSet` so iteration is always ascending — the same
/// determinism the teacher gets from `BTreeMap`-keyed state in its
/// scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct CpuSet(BTreeSet<u32>);

impl CpuSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// A set containing exactly `cpus`.
    pub fn from_iter<I: IntoIterator<Item = u32>>(cpus: I) -> Self {
        Self(cpus.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, cpu: u32) -> bool {
        self.0.contains(&cpu)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &CpuSet) -> CpuSet {
        CpuSet(self.0.union(&other.0).copied().collect())
    }

    pub fn intersection(&self, other: &CpuSet) -> CpuSet {
        CpuSet(self.0.intersection(&other.0).copied().collect())
    }

    pub fn difference(&self, other: &CpuSet) -> CpuSet {
        CpuSet(self.0.difference(&other.0).copied().collect())
    }

    pub fn is_disjoint(&self, other: &CpuSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn is_subset(&self, other: &CpuSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn with_inserted(&self, cpu: u32) -> CpuSet {
        let mut set = self.0.clone();
        set.insert(cpu);
        CpuSet(set)
    }
}

// ── Canonical textual form ──────────────────────────────────────────────────

impl fmt::Display for CpuSet {
    /// Renders ascending comma-separated ranges, e.g. `"0-3,7,10-11"`.
    /// The empty set renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for cpu in self.0.iter().copied() {
            match ranges.last_mut() {
                Some((_, end)) if cpu == *end + 1 => *end = cpu,
                _ => ranges.push((cpu, cpu)),
            }
        }

        let rendered: Vec<String> = ranges
            .into_iter()
            .map(|(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}-{end}")
                }
            })
            .collect();

        write!(f, "{}", rendered.join(","))
    }
}

/// Error returned when a string is not a valid canonical (or near-canonical)
/// cpuset expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuSetParseError {
    #[error("invalid cpu id token: '{0}'")]
    InvalidToken(String),
    #[error("range '{0}' is descending or empty (start must be < end)")]
    DescendingRange(String),
}

impl FromStr for CpuSet {
    type Err = CpuSetParseError;

    /// Parses the canonical cpuset cgroup form. The empty string parses to
    /// the empty set. This is the exact inverse of [`Display`](CpuSet).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(CpuSet::empty());
        }

        let mut cpus = BTreeSet::new();
        for token in trimmed.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(CpuSetParseError::InvalidToken(token.to_string()));
            }
            if let Some((start, end)) = token.split_once('-') {
                let start: u32 = start
                    .parse()
                    .map_err(|_| CpuSetParseError::InvalidToken(token.to_string()))?;
                let end: u32 = end
                    .parse()
                    .map_err(|_| CpuSetParseError::InvalidToken(token.to_string()))?;
                if start >= end {
                    return Err(CpuSetParseError::DescendingRange(token.to_string()));
                }
                cpus.extend(start..=end);
            } else {
                let cpu: u32 = token
                    .parse()
                    .map_err(|_| CpuSetParseError::InvalidToken(token.to_string()))?;
                cpus.insert(cpu);
            }
        }

        Ok(CpuSet(cpus))
    }
}

impl serde::Serialize for CpuSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for CpuSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CpuSet::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl FromIterator<u32> for CpuSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        CpuSet(iter.into_iter().collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_formats_as_empty_string() {
        assert_eq!(CpuSet::empty().to_string(), "");
    }

    #[test]
    fn single_cpu_formats_without_range() {
        let set: CpuSet = [5].into_iter().collect();
        assert_eq!(set.to_string(), "5");
    }

    #[test]
    fn contiguous_run_formats_as_range() {
        let set: CpuSet = (0..=3).collect();
        assert_eq!(set.to_string(), "0-3");
    }

    #[test]
    fn mixed_ranges_and_singletons_format_correctly() {
        let set: CpuSet = [0, 1, 2, 3, 7, 10, 11].into_iter().collect();
        assert_eq!(set.to_string(), "0-3,7,10-11");
    }

    #[test]
    fn parse_is_exact_inverse_of_format() {
        for text in ["", "0", "0-3", "0-3,7,10-11", "5,6,7,9"] {
            let parsed: CpuSet = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text, "round-trip failed for '{text}'");
        }
    }

    #[test]
    fn empty_string_parses_to_empty_set() {
        let set: CpuSet = "".parse().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn descending_range_is_rejected() {
        let err = "3-0".parse::<CpuSet>().unwrap_err();
        assert!(matches!(err, CpuSetParseError::DescendingRange(_)));
    }

    #[test]
    fn equal_bounds_range_is_rejected() {
        // "3-3" must be written as "3"
        let err = "3-3".parse::<CpuSet>().unwrap_err();
        assert!(matches!(err, CpuSetParseError::DescendingRange(_)));
    }

    #[test]
    fn non_numeric_token_is_rejected() {
        let err = "0,abc,2".parse::<CpuSet>().unwrap_err();
        assert!(matches!(err, CpuSetParseError::InvalidToken(_)));
    }

    #[test]
    fn set_algebra_matches_expectations() {
        let a: CpuSet = [0, 1, 2, 3].into_iter().collect();
        let b: CpuSet = [2, 3, 4, 5].into_iter().collect();
        assert_eq!(a.union(&b), [0, 1, 2, 3, 4, 5].into_iter().collect());
        assert_eq!(a.intersection(&b), [2, 3].into_iter().collect());
        assert_eq!(a.difference(&b), [0, 1].into_iter().collect());
        assert!(!a.is_disjoint(&b));

        let c: CpuSet = [8, 9].into_iter().collect();
        assert!(a.is_disjoint(&c));
    }

    #[test]
    fn subset_check() {
        let reserved: CpuSet = [0].into_iter().collect();
        let default_set: CpuSet = [0, 1, 2, 3].into_iter().collect();
        assert!(reserved.is_subset(&default_set));
        assert!(!default_set.is_subset(&reserved));
    }

    #[test]
    fn serde_round_trips_through_json() {
        let set: CpuSet = [0, 1, 2, 3, 7].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "\"0-3,7\"");
        let back: CpuSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
