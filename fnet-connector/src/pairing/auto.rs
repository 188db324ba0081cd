//! Deterministic sequential auto-pairing

/// Pair free tube numbers of both sides
///
/// Walks a cursor `t` from 1: the smallest free left number `>= t` is paired
/// with the smallest free right number `>= t`, then `t` moves one past the
/// larger of the two. Stops as soon as either side runs out. Equal tube
/// numbers are matched wherever both sides have them free.
///
/// Inputs need not be sorted; duplicates are ignored.
pub fn auto_pair(free_left: &[u32], free_right: &[u32]) -> Vec<(u32, u32)> {
    let mut left = free_left.to_vec();
    let mut right = free_right.to_vec();
    left.sort_unstable();
    left.dedup();
    right.sort_unstable();
    right.dedup();

    let mut pairs = Vec::with_capacity(left.len().min(right.len()));
    let (mut li, mut ri) = (0, 0);
    let mut cursor: u32 = 1;

    loop {
        while li < left.len() && left[li] < cursor {
            li += 1;
        }
        while ri < right.len() && right[ri] < cursor {
            ri += 1;
        }
        let (Some(&l), Some(&r)) = (left.get(li), right.get(ri)) else {
            break;
        };

        pairs.push((l, r));
        match l.max(r).checked_add(1) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_free_lists_pair_by_number() {
        assert_eq!(auto_pair(&[1, 2, 3], &[1, 2, 3]), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_cursor_advances_past_larger_number() {
        assert_eq!(auto_pair(&[1, 3, 5], &[1, 2, 4]), vec![(1, 1), (3, 2), (5, 4)]);
    }

    #[test]
    fn test_skipped_numbers_are_not_revisited() {
        // After (4, 1) the cursor is 5, so right 2 and 3 stay unpaired
        assert_eq!(auto_pair(&[4, 6], &[1, 2, 3, 7]), vec![(4, 1), (6, 7)]);
    }

    #[test]
    fn test_stops_when_one_side_is_empty() {
        assert!(auto_pair(&[], &[1, 2]).is_empty());
        assert_eq!(auto_pair(&[2, 3, 4], &[1]), vec![(2, 1)]);
    }

    #[test]
    fn test_unsorted_input() {
        assert_eq!(auto_pair(&[5, 1, 3], &[4, 2, 1]), vec![(1, 1), (3, 2), (5, 4)]);
    }
}
