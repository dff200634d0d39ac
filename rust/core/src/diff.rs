// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Selection diffing.
//!
//! Partitions a desired code set against what is currently selected and
//! what has ever been materialized:
//!
//! - `to_conceal` = previously selected − desired
//! - `to_fetch`   = (desired − previously selected) − ever loaded
//! - `to_reveal`  = (desired − previously selected) − `to_fetch`
//!
//! Pure and I/O-free; the session feeds it its own state.

use crate::types::Code;
use rustc_hash::FxHashSet;

/// Outcome of comparing a desired selection with the session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionDiff {
    /// Newly wanted and never fetched.
    pub to_fetch: Vec<Code>,
    /// Newly wanted and already resident in the scene.
    pub to_reveal: Vec<Code>,
    /// Selected before, no longer wanted.
    pub to_conceal: Vec<Code>,
}

impl SelectionDiff {
    /// Compute the diff. Output order follows `desired` for fetch/reveal and
    /// `previously_selected` for conceal; duplicates are dropped.
    pub fn compute(
        desired: &[Code],
        previously_selected: &[Code],
        ever_loaded: &FxHashSet<Code>,
    ) -> Self {
        let desired = dedup_codes(desired);
        let wanted: FxHashSet<&Code> = desired.iter().collect();
        let selected: FxHashSet<&Code> = previously_selected.iter().collect();

        let mut diff = SelectionDiff::default();

        let mut seen = FxHashSet::default();
        for code in previously_selected {
            if !wanted.contains(code) && seen.insert(code) {
                diff.to_conceal.push(code.clone());
            }
        }

        for code in desired.iter().filter(|c| !selected.contains(c)) {
            if ever_loaded.contains(code) {
                diff.to_reveal.push(code.clone());
            } else {
                diff.to_fetch.push(code.clone());
            }
        }

        diff
    }

    /// True when applying this diff changes nothing.
    pub fn is_noop(&self) -> bool {
        self.to_fetch.is_empty() && self.to_reveal.is_empty() && self.to_conceal.is_empty()
    }
}

/// Drop repeated codes, keeping the first occurrence of each.
pub fn dedup_codes(codes: &[Code]) -> Vec<Code> {
    let mut seen = FxHashSet::default();
    codes
        .iter()
        .filter(|c| seen.insert(*c))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(names: &[&str]) -> Vec<Code> {
        names.iter().map(|n| Code::from(*n)).collect()
    }

    fn set(names: &[&str]) -> FxHashSet<Code> {
        codes(names).into_iter().collect()
    }

    #[test]
    fn test_first_selection_fetches_everything() {
        let diff = SelectionDiff::compute(&codes(&["A", "B"]), &[], &set(&[]));
        assert_eq!(diff.to_fetch, codes(&["A", "B"]));
        assert!(diff.to_reveal.is_empty());
        assert!(diff.to_conceal.is_empty());
    }

    #[test]
    fn test_identical_selection_is_noop() {
        let diff = SelectionDiff::compute(
            &codes(&["A", "B"]),
            &codes(&["A", "B"]),
            &set(&["A", "B"]),
        );
        assert!(diff.is_noop());
    }

    #[test]
    fn test_empty_selection_conceals_everything() {
        let diff = SelectionDiff::compute(&[], &codes(&["A", "B"]), &set(&["A", "B"]));
        assert_eq!(diff.to_conceal, codes(&["A", "B"]));
        assert!(diff.to_fetch.is_empty());
        assert!(diff.to_reveal.is_empty());
    }

    #[test]
    fn test_previously_loaded_code_is_revealed() {
        let diff = SelectionDiff::compute(&codes(&["A", "B"]), &codes(&["B"]), &set(&["A", "B"]));
        assert_eq!(diff.to_reveal, codes(&["A"]));
        assert!(diff.to_fetch.is_empty());
        assert!(diff.to_conceal.is_empty());
    }

    #[test]
    fn test_duplicates_in_desired() {
        let diff = SelectionDiff::compute(&codes(&["C", "A", "C", "A"]), &[], &set(&[]));
        assert_eq!(diff.to_fetch, codes(&["C", "A"]));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        assert_eq!(
            dedup_codes(&codes(&["b", "a", "b", "c", "a"])),
            codes(&["b", "a", "c"])
        );
    }

    /// Every combination of subsets over a small universe: the three
    /// partitions are disjoint and, together with the unchanged codes,
    /// cover exactly the desired set.
    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let universe = codes(&["A", "B", "C", "D"]);
        let subset = |mask: u32| -> Vec<Code> {
            universe
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, c)| c.clone())
                .collect()
        };

        for d in 0..16 {
            for p in 0..16 {
                for l in 0..16 {
                    let desired = subset(d);
                    let previous = subset(p);
                    let loaded: FxHashSet<Code> = subset(l).into_iter().collect();
                    let diff = SelectionDiff::compute(&desired, &previous, &loaded);

                    let fetch: FxHashSet<&Code> = diff.to_fetch.iter().collect();
                    let reveal: FxHashSet<&Code> = diff.to_reveal.iter().collect();
                    let conceal: FxHashSet<&Code> = diff.to_conceal.iter().collect();
                    assert!(fetch.is_disjoint(&reveal));
                    assert!(fetch.is_disjoint(&conceal));
                    assert!(reveal.is_disjoint(&conceal));

                    let unchanged: FxHashSet<&Code> =
                        desired.iter().filter(|c| previous.contains(*c)).collect();
                    let mut covered: FxHashSet<&Code> = unchanged.clone();
                    covered.extend(fetch.iter().copied());
                    covered.extend(reveal.iter().copied());
                    let wanted: FxHashSet<&Code> = desired.iter().collect();
                    assert_eq!(covered, wanted);
                    assert!(unchanged.is_disjoint(&fetch));
                    assert!(unchanged.is_disjoint(&reveal));

                    for code in &diff.to_fetch {
                        assert!(!loaded.contains(code));
                    }
                    for code in &diff.to_conceal {
                        assert!(!desired.contains(code));
                    }
                }
            }
        }
    }
}
