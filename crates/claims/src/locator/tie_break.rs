//! Choosing the most specific claim among several that contain a point.
//!
//! A 1x1x1 subdivision and its 50x50 parent can both contain the same block.
//! 3D claims whose vertical range holds the point's Y beat everything else;
//! among them the shallower volume wins, with footprint area as the fallback
//! when extents tie or are zero/unknown. Without such a claim the smallest
//! footprint wins. Ties keep the earlier candidate, so the result is stable
//! for a stable enumeration order.

/// What the policy needs to know about one containing claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub area: Option<i64>,
    pub vertical: Option<(i64, i64)>,
    pub is_3d: bool,
}

impl Candidate {
    fn holds_y(&self, y: i64) -> bool {
        self.is_3d && self.vertical.is_some_and(|(lo, hi)| y >= lo && y <= hi)
    }

    fn extent(&self) -> Option<i64> {
        self.vertical.map(|(lo, hi)| hi - lo)
    }

    fn area_key(&self) -> i64 {
        self.area.unwrap_or(i64::MAX)
    }
}

fn smaller_area(challenger: &Candidate, best: &Candidate) -> bool {
    challenger.area_key() < best.area_key()
}

fn more_specific_3d(challenger: &Candidate, best: &Candidate) -> bool {
    match (challenger.extent(), best.extent()) {
        (Some(a), Some(b)) if a > 0 && b > 0 && a != b => a < b,
        _ => smaller_area(challenger, best),
    }
}

fn fold_best(
    indices: impl Iterator<Item = usize>,
    candidates: &[Candidate],
    better: fn(&Candidate, &Candidate) -> bool,
) -> Option<usize> {
    indices.fold(None, |best, i| match best {
        Some(b) if !better(&candidates[i], &candidates[b]) => Some(b),
        _ => Some(i),
    })
}

/// Index of the winning candidate for a query at block height `y`.
pub fn pick(candidates: &[Candidate], y: i64) -> Option<usize> {
    let y_matching = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.holds_y(y))
        .map(|(i, _)| i);
    if let Some(best) = fold_best(y_matching, candidates, more_specific_3d) {
        return Some(best);
    }
    fold_best(0..candidates.len(), candidates, smaller_area)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(area: i64) -> Candidate {
        Candidate {
            area: Some(area),
            vertical: Some((-64, 320)),
            is_3d: false,
        }
    }

    fn volume(area: i64, lo: i64, hi: i64) -> Candidate {
        Candidate {
            area: Some(area),
            vertical: Some((lo, hi)),
            is_3d: true,
        }
    }

    #[test]
    fn test_empty_has_no_winner() {
        assert_eq!(pick(&[], 64), None);
    }

    #[test]
    fn test_single_block_subdivision_beats_parent() {
        let parent = volume(51 * 51, 0, 255);
        let mailbox = volume(1, 64, 64);
        assert_eq!(pick(&[parent, mailbox], 64), Some(1));
        assert_eq!(pick(&[mailbox, parent], 64), Some(0));
    }

    #[test]
    fn test_shallower_volume_wins_over_smaller_area() {
        let tall_narrow = volume(4, 0, 100);
        let flat_wide = volume(400, 60, 70);
        assert_eq!(pick(&[tall_narrow, flat_wide], 65), Some(1));
    }

    #[test]
    fn test_equal_extents_fall_back_to_area() {
        let a = volume(100, 60, 70);
        let b = volume(25, 60, 70);
        assert_eq!(pick(&[a, b], 65), Some(1));
    }

    #[test]
    fn test_no_y_match_falls_back_to_area_over_all() {
        let column_claim = column(2500);
        let basement = volume(1, 0, 10);
        let attic = volume(400, 200, 210);
        // Nothing holds y=64 in 3D, so every footprint competes on area.
        assert_eq!(pick(&[column_claim, attic, basement], 64), Some(2));
        assert_eq!(pick(&[column_claim, attic], 64), Some(1));
    }

    #[test]
    fn test_without_3d_smallest_area_wins() {
        assert_eq!(pick(&[column(900), column(100), column(400)], 64), Some(1));
    }

    #[test]
    fn test_y_matching_3d_beats_smaller_2d() {
        let big_volume = volume(10_000, 50, 80);
        let tiny_column = column(1);
        assert_eq!(pick(&[tiny_column, big_volume], 64), Some(1));
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        assert_eq!(pick(&[column(100), column(100)], 64), Some(0));
        assert_eq!(pick(&[volume(9, 60, 70), volume(9, 60, 70)], 64), Some(0));
    }

    #[test]
    fn test_unknown_area_loses() {
        let unknown = Candidate {
            area: None,
            vertical: None,
            is_3d: false,
        };
        assert_eq!(pick(&[unknown, column(10_000)], 64), Some(1));
        assert_eq!(pick(&[unknown], 64), Some(0));
    }

    #[test]
    fn test_repeated_picks_are_stable() {
        let set = [volume(2601, 0, 255), column(4000), volume(1, 64, 64), volume(16, 60, 68)];
        let first = pick(&set, 64);
        for _ in 0..10 {
            assert_eq!(pick(&set, 64), first);
        }
        assert_eq!(first, Some(2));
    }
}
