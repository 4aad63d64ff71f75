//! Three-way list merge.
//!
//! Both sides are diffed against the common ancestor `o` with an LCS
//! alignment. Stretches of `o` touched by at most one side merge cleanly;
//! stretches touched by both become [`Hunk::Conflict`] unless
//! [`merge`] is asked to drop false conflicts (both sides made the same
//! change).

use std::cmp::{max, min};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hunk<T> {
    Ok(Vec<T>),
    Conflict { a: Vec<T>, o: Vec<T>, b: Vec<T> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

/// A changed stretch: `o[o_start..o_start + o_len]` became
/// `side[s_start..s_start + s_len]`.
#[derive(Debug, Clone, Copy)]
struct Change {
    side: Side,
    o_start: usize,
    o_len: usize,
    s_start: usize,
    s_len: usize,
}

/// Matched index pairs of a longest common subsequence, ascending. The
/// common prefix and suffix are matched directly; only the middle goes
/// through the quadratic table.
fn lcs_pairs<T: PartialEq>(o: &[T], s: &[T]) -> Vec<(usize, usize)> {
    let prefix = o.iter().zip(s).take_while(|(x, y)| x == y).count();
    let suffix = o[prefix..]
        .iter()
        .rev()
        .zip(s[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (o_end, s_end) = (o.len() - suffix, s.len() - suffix);

    let mut pairs: Vec<(usize, usize)> = (0..prefix).map(|i| (i, i)).collect();
    pairs.extend(
        table_pairs(&o[prefix..o_end], &s[prefix..s_end])
            .into_iter()
            .map(|(i, j)| (i + prefix, j + prefix)),
    );
    pairs.extend((0..suffix).map(|k| (o_end + k, s_end + k)));
    pairs
}

fn table_pairs<T: PartialEq>(o: &[T], s: &[T]) -> Vec<(usize, usize)> {
    let (n, m) = (o.len(), s.len());
    if n == 0 || m == 0 {
        return Vec::new();
    }
    let mut table = vec![vec![0_usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if o[i] == s[j] {
                table[i + 1][j + 1] + 1
            } else {
                max(table[i + 1][j], table[i][j + 1])
            };
        }
    }
    let mut pairs = Vec::with_capacity(table[0][0]);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if o[i] == s[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

fn changes<T: PartialEq>(o: &[T], s: &[T], side: Side) -> Vec<Change> {
    let mut out = Vec::new();
    let (mut oi, mut si) = (0, 0);
    let sentinel = (o.len(), s.len());
    for (mo, ms) in lcs_pairs(o, s).into_iter().chain(std::iter::once(sentinel)) {
        if mo > oi || ms > si {
            out.push(Change {
                side,
                o_start: oi,
                o_len: mo - oi,
                s_start: si,
                s_len: ms - si,
            });
        }
        oi = mo + 1;
        si = ms + 1;
    }
    out
}

enum Region {
    Stable(Side, usize, usize),
    Common(usize, usize),
    Unstable {
        a: (usize, usize),
        o: (usize, usize),
        b: (usize, usize),
    },
}

/// Span of one side covered by the changes of an unstable region, widened to
/// the region's extent in `o`.
fn side_span(changes: &[Change], side: Side, lhs: usize, rhs: usize) -> (usize, usize) {
    let mut s_lo = usize::MAX;
    let mut s_hi = 0;
    let mut o_lo = usize::MAX;
    let mut o_hi = 0;
    for c in changes.iter().filter(|c| c.side == side) {
        s_lo = min(s_lo, c.s_start);
        s_hi = max(s_hi, c.s_start + c.s_len);
        o_lo = min(o_lo, c.o_start);
        o_hi = max(o_hi, c.o_start + c.o_len);
    }
    if s_lo == usize::MAX {
        // Untouched by this side: it still holds the ancestor's stretch.
        return (lhs, rhs);
    }
    // Stretches of `o` outside this side's changes are unchanged on this side.
    (s_lo - (o_lo - lhs), s_hi + (rhs - o_hi))
}

fn regions<T: PartialEq>(a: &[T], o: &[T], b: &[T]) -> Vec<Region> {
    let mut hunks = changes(o, a, Side::A);
    hunks.extend(changes(o, b, Side::B));
    hunks.sort_by_key(|h| h.o_start);

    let mut out = Vec::new();
    let mut common = 0;
    let mut i = 0;
    while i < hunks.len() {
        let first = i;
        let lhs = hunks[i].o_start;
        let mut rhs = lhs + hunks[i].o_len;
        while i + 1 < hunks.len() && hunks[i + 1].o_start <= rhs {
            rhs = max(rhs, hunks[i + 1].o_start + hunks[i + 1].o_len);
            i += 1;
        }
        if lhs > common {
            out.push(Region::Common(common, lhs));
        }
        if first == i {
            let h = hunks[i];
            if h.s_len > 0 {
                out.push(Region::Stable(h.side, h.s_start, h.s_start + h.s_len));
            }
        } else {
            let group = &hunks[first..=i];
            out.push(Region::Unstable {
                a: side_span(group, Side::A, lhs, rhs),
                o: (lhs, rhs),
                b: side_span(group, Side::B, lhs, rhs),
            });
        }
        common = max(common, rhs);
        i += 1;
    }
    if o.len() > common {
        out.push(Region::Common(common, o.len()));
    }
    out
}

/// Merge `a` and `b`, both derived from `o`.
///
/// With `exclude_false_conflicts`, a stretch both sides changed identically
/// is emitted as `Ok`. Consecutive clean stretches are coalesced.
pub fn merge<T: PartialEq + Clone>(a: &[T], o: &[T], b: &[T], exclude_false_conflicts: bool) -> Vec<Hunk<T>> {
    let mut out = Vec::new();
    let mut ok: Vec<T> = Vec::new();
    for region in regions(a, o, b) {
        match region {
            Region::Common(lo, hi) => ok.extend_from_slice(&o[lo..hi]),
            Region::Stable(Side::A, lo, hi) => ok.extend_from_slice(&a[lo..hi]),
            Region::Stable(Side::B, lo, hi) => ok.extend_from_slice(&b[lo..hi]),
            Region::Unstable {
                a: (alo, ahi),
                o: (olo, ohi),
                b: (blo, bhi),
            } => {
                let (sa, so, sb) = (&a[alo..ahi], &o[olo..ohi], &b[blo..bhi]);
                if exclude_false_conflicts && sa == sb {
                    ok.extend_from_slice(sa);
                    continue;
                }
                if !ok.is_empty() {
                    out.push(Hunk::Ok(std::mem::take(&mut ok)));
                }
                out.push(Hunk::Conflict {
                    a: sa.to_vec(),
                    o: so.to_vec(),
                    b: sb.to_vec(),
                });
            }
        }
    }
    if !ok.is_empty() {
        out.push(Hunk::Ok(ok));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(items: &[&'static str]) -> Hunk<&'static str> {
        Hunk::Ok(items.to_vec())
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let o = ["p1", "p2", "p3", "p4", "p1"];
        let a = ["p1", "r1", "r2", "p3", "p4", "p1"];
        let b = ["p1", "p2", "p3", "r3", "r4", "p1"];
        assert_eq!(
            merge(&a, &o, &b, true),
            vec![ok(&["p1", "r1", "r2", "p3", "r3", "r4", "p1"])]
        );
    }

    #[test]
    fn overlapping_edits_conflict() {
        let o = ["p1", "p2", "p3"];
        let a = ["p1", "r1", "p3"];
        let b = ["p1", "r2", "p3"];
        assert_eq!(
            merge(&a, &o, &b, true),
            vec![
                ok(&["p1"]),
                Hunk::Conflict {
                    a: vec!["r1"],
                    o: vec!["p2"],
                    b: vec!["r2"],
                },
                ok(&["p3"]),
            ]
        );
    }

    #[test]
    fn identical_edits_are_false_conflicts() {
        let o = ["x", "y"];
        let a = ["x", "z"];
        let b = ["x", "z"];
        assert_eq!(merge(&a, &o, &b, true), vec![ok(&["x", "z"])]);
        assert!(matches!(merge(&a, &o, &b, false)[1], Hunk::Conflict { .. }));
    }

    #[test]
    fn deletions_on_one_side_apply() {
        let o = [1, 2, 3, 4];
        let a = [1, 3, 4];
        let b = [1, 2, 3, 4, 5];
        assert_eq!(merge(&a, &o, &b, true), vec![Hunk::Ok(vec![1, 3, 4, 5])]);
    }

    #[test]
    fn long_lists_with_small_edits_merge() {
        let o: Vec<u32> = (0..20_000).collect();
        let mut a = o.clone();
        a[10] = 900_000;
        let mut b = o.clone();
        b.insert(19_990, 900_001);
        let mut expected = a.clone();
        expected.insert(19_990, 900_001);
        assert_eq!(merge(&a, &o, &b, true), vec![Hunk::Ok(expected)]);
    }

    #[test]
    fn common_suffix_after_an_edit_stays_aligned() {
        let o = ["p1", "p2", "p3", "p1"];
        let a = ["p1", "p3", "p1"];
        let b = ["p1", "p2", "p3", "x", "p1"];
        assert_eq!(merge(&a, &o, &b, true), vec![ok(&["p1", "p3", "x", "p1"])]);
    }

    #[test]
    fn empty_ancestor() {
        let o: [u8; 0] = [];
        assert_eq!(merge(&[1, 2], &o, &[], true), vec![Hunk::Ok(vec![1, 2])]);
    }
}
