// SPDX-License-Identifier: GPL-3.0-or-later

//! Edit-distance scoring between a candidate title and the query text.
//!
//! Sources disagree on whether a release is listed as `Artist - Title` or
//! `Title - Artist`, so when the second argument contains the `" - "`
//! separator the distance against its segment-reversed form is also taken and
//! the smaller of the two wins.

const SEGMENT_SEPARATOR: &str = " - ";

/// Levenshtein distance in characters, with the segment-reversal heuristic applied to `b`.
pub fn distance(a: &str, b: &str) -> usize {
    let direct = levenshtein(a, b);
    if !b.contains(SEGMENT_SEPARATOR) {
        return direct;
    }
    direct.min(levenshtein(a, &reverse_segments(b)))
}

/// `(len(a) - distance(a, b)) / len(a) * 100`.
///
/// `a` is the denominator. The result goes negative when `a` is much shorter
/// than `b`, and is negative infinity for an empty `a` against a non-empty `b`.
pub fn similarity_percent(a: &str, b: &str) -> f64 {
    let length = a.chars().count() as f64;
    let distance = distance(a, b) as f64;
    if length == 0.0 {
        return if distance == 0.0 { 100.0 } else { f64::NEG_INFINITY };
    }
    (length - distance) / length * 100.0
}

/// `"A - B - C"` becomes `"C - B - A"`. Empty segments are dropped.
fn reverse_segments(value: &str) -> String {
    let mut segments: Vec<&str> = value
        .split(SEGMENT_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect();
    segments.reverse();
    segments.join(SEGMENT_SEPARATOR)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let m = a.len();
    let n = b.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];

    #[allow(clippy::needless_range_loop)]
    for i in 0..=m {
        dp[i][0] = i;
    }
    #[allow(clippy::needless_range_loop)]
    for j in 0..=n {
        dp[0][j] = j;
    }

    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }

    dp[m][n]
}
