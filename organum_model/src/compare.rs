// Musical ordering for interval and n-gram tokens.
//
// Every sorted listing in the statistics store is backed by these two
// comparators. They order token *strings*, because that is what the store
// keys are; both accept quality-heeded and quality-insensitive forms and
// mix them in one total order.
//
// The quality rank is d < m < P < M < A, with an unqualified token ranking
// as perfect. Making unqualified compare *equal* to explicit P (rather than
// above or below it) is what keeps the order total and transitive; the
// transitivity property is unit-tested below because this is the one spot
// where an ad-hoc rank table historically went wrong.

use std::cmp::Ordering;

use crate::interval::Quality;

/// Sort rank of a quality letter; unqualified ranks with perfect.
fn quality_rank(q: Option<Quality>) -> u8 {
    match q {
        Some(Quality::Diminished) => 0,
        Some(Quality::Minor) => 1,
        Some(Quality::Perfect) | None => 2,
        Some(Quality::Major) => 3,
        Some(Quality::Augmented) => 4,
    }
}

/// Pull (quality, generic size) out of a token, ignoring all direction
/// signs: "+P4", "m-3", "-3", and "10" all reduce to a (quality, size) pair.
/// Tokens that do not fit the grammar yield `None`.
fn token_key(token: &str) -> Option<(Option<Quality>, u32)> {
    let mut rest = token.strip_prefix(['+', '-']).unwrap_or(token);
    let mut quality = None;
    if let Some(c) = rest.chars().next() {
        if let Some(q) = Quality::from_letter(c) {
            quality = Some(q);
            rest = &rest[1..];
        }
    }
    // Interior '-' of the directed vertical form ("m-3").
    let rest = rest.strip_prefix('-').unwrap_or(rest);
    rest.parse::<u32>().ok().map(|size| (quality, size))
}

/// Total order over single interval tokens: generic size first, then the
/// fixed quality rank. Direction signs are ignored. Tokens outside the
/// grammar (which cannot arrive through public APIs) fall back to plain
/// string order so the comparator stays total.
pub fn compare_intervals(a: &str, b: &str) -> Ordering {
    match (token_key(a), token_key(b)) {
        (Some((qa, sa)), Some((qb, sb))) => sa
            .cmp(&sb)
            .then_with(|| quality_rank(qa).cmp(&quality_rank(qb))),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Total order over n-gram token strings (space-separated interval and
/// movement fields). A string with strictly fewer fields sorts first;
/// between equal lengths, fields are compared left to right with
/// `compare_intervals`.
pub fn compare_ngrams(a: &str, b: &str) -> Ordering {
    let xs: Vec<&str> = a.split_whitespace().collect();
    let ys: Vec<&str> = b.split_whitespace().collect();

    // The shorter n-gram is the smaller one, regardless of content.
    let by_len = xs.len().cmp(&ys.len());
    if by_len != Ordering::Equal {
        return by_len;
    }

    for (x, y) in xs.iter().zip(&ys) {
        let ord = compare_intervals(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_intervals_basics() {
        assert_eq!(compare_intervals("m3", "m3"), Ordering::Equal);
        assert_eq!(compare_intervals("m3", "M3"), Ordering::Less);
        assert_eq!(compare_intervals("A4", "d4"), Ordering::Greater);
        assert_eq!(compare_intervals("P5", "m6"), Ordering::Less);
        assert_eq!(compare_intervals("m10", "M9"), Ordering::Greater);
    }

    #[test]
    fn test_compare_intervals_ignores_direction() {
        assert_eq!(compare_intervals("m-3", "m3"), Ordering::Equal);
        assert_eq!(compare_intervals("+P4", "P4"), Ordering::Equal);
        assert_eq!(compare_intervals("-2", "3"), Ordering::Less);
    }

    #[test]
    fn test_unqualified_ranks_as_perfect() {
        assert_eq!(compare_intervals("4", "P4"), Ordering::Equal);
        assert_eq!(compare_intervals("3", "m3"), Ordering::Greater);
        assert_eq!(compare_intervals("3", "M3"), Ordering::Less);
    }

    #[test]
    fn test_compare_intervals_transitive() {
        // Every pairing of size 1-12 with each quality form, both signs.
        let mut tokens = Vec::new();
        for size in 1u32..=12 {
            for q in ["", "d", "m", "P", "M", "A"] {
                tokens.push(format!("{q}{size}"));
                tokens.push(format!("{q}-{size}"));
            }
        }
        for a in &tokens {
            for b in &tokens {
                for c in &tokens {
                    if compare_intervals(a, b) != Ordering::Greater
                        && compare_intervals(b, c) != Ordering::Greater
                    {
                        assert_ne!(
                            compare_intervals(a, c),
                            Ordering::Greater,
                            "transitivity broken: {a} <= {b} <= {c}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_compare_ngrams_by_first_difference() {
        assert_eq!(compare_ngrams("3 +4 7", "5 +2 4"), Ordering::Less);
        assert_eq!(compare_ngrams("3 +5 6", "3 +4 6"), Ordering::Greater);
        assert_eq!(compare_ngrams("M3 1 m2", "M3 1 M2"), Ordering::Less);
        assert_eq!(compare_ngrams("9 -2 -3", "9 -2 -3"), Ordering::Equal);
    }

    #[test]
    fn test_compare_ngrams_shorter_sorts_first() {
        assert_eq!(compare_ngrams("3 -2 3 -2 3", "6 +2 6"), Ordering::Greater);
        assert_eq!(compare_ngrams("3 -2 3 -2 3", "3 -2 3"), Ordering::Greater);
        assert_eq!(compare_ngrams("3 -2 3", "3 -2 3 -2 3"), Ordering::Less);
    }
}
