// The nested statistics store.
//
// Counts are kept in explicit typed maps rather than anything
// auto-vivifying, keyed by plain token strings so they round-trip through
// JSON unchanged:
//
//   intervals: granularity -> quality-insensitive token -> quality token
//              -> Occurrences
//   n-grams:   granularity -> n -> quality-insensitive token -> quality
//              token -> Occurrences
//
// The quality-insensitive token is always the parent key; the
// quality-preserving token nests beneath it, so "how many quality variants
// exist for this generic shape" is one map lookup. Both granularities are
// written from every single add call and can never drift apart.
//
// Invariant on every leaf: the stored total equals the sum of the per-piece
// counts. In memory, trailing zero entries of a per-piece list may be
// omitted; serialization pads every list to the registry length, and
// externally supplied data (deserialization) is re-validated against the
// padded form before a store is returned.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use organum_model::compare::{compare_intervals, compare_ngrams};
use organum_model::error::{AnalysisError, Result};
use organum_model::interval::{Granularity, Interval, Quality};
use organum_model::ngram::NGram;
use organum_model::parse::{parse_interval_token, parse_ngram};

/// One leaf counter: a running total plus per-piece counts indexed by the
/// piece's position in the registry. Trailing zero entries may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrences {
    pub total: u64,
    pub by_piece: Vec<u64>,
}

impl Occurrences {
    fn bump(&mut self, piece: usize) {
        self.total += 1;
        if self.by_piece.len() <= piece {
            self.by_piece.resize(piece + 1, 0);
        }
        self.by_piece[piece] += 1;
    }

    fn absorb(&mut self, other: Occurrences) {
        self.total += other.total;
        if self.by_piece.len() < other.by_piece.len() {
            self.by_piece.resize(other.by_piece.len(), 0);
        }
        for (slot, count) in self.by_piece.iter_mut().zip(other.by_piece) {
            *slot += count;
        }
    }

    fn padded(&self, pieces: usize) -> Vec<u64> {
        let mut list = self.by_piece.clone();
        list.resize(pieces.max(list.len()), 0);
        list
    }
}

type QualityMap = BTreeMap<String, Occurrences>;
type TokenMap = BTreeMap<String, QualityMap>;
type NGramMap = BTreeMap<usize, TokenMap>;

/// Which axis a listing is ordered by. `Name` is the musical comparator
/// order; `Frequency` is a stable re-sort by total on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    Name,
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Parameters for an interval listing.
#[derive(Debug, Clone)]
pub struct IntervalQuery {
    pub heed_quality: bool,
    pub granularity: Granularity,
    pub threshold: Option<u64>,
    pub top_x: Option<usize>,
    pub sort_by: SortBy,
    pub order: SortOrder,
    pub per_piece: bool,
}

impl Default for IntervalQuery {
    fn default() -> IntervalQuery {
        IntervalQuery {
            heed_quality: false,
            granularity: Granularity::Compound,
            threshold: None,
            top_x: None,
            sort_by: SortBy::Name,
            order: SortOrder::Ascending,
            per_piece: false,
        }
    }
}

/// Parameters for an n-gram listing.
#[derive(Debug, Clone)]
pub struct NGramQuery {
    pub n_values: Vec<usize>,
    pub heed_quality: bool,
    pub granularity: Granularity,
    pub threshold: Option<u64>,
    pub top_x: Option<usize>,
    pub sort_by: SortBy,
    pub order: SortOrder,
    pub per_piece: bool,
}

impl Default for NGramQuery {
    fn default() -> NGramQuery {
        NGramQuery {
            n_values: vec![2],
            heed_quality: false,
            granularity: Granularity::Compound,
            threshold: None,
            top_x: None,
            sort_by: SortBy::Name,
            order: SortOrder::Ascending,
            per_piece: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalRow {
    pub token: String,
    pub total: u64,
    pub by_piece: Option<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NGramRow {
    pub n: usize,
    pub token: String,
    /// The token reconstructed through the canonical parser.
    pub ngram: NGram,
    pub total: u64,
    pub by_piece: Option<Vec<u64>>,
}

/// Interval and n-gram occurrence counts for a set of pieces. Created
/// empty, mutated only through the add and merge operations, read through
/// queries that never mutate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsStore {
    pieces: Vec<String>,
    simple_intervals: TokenMap,
    compound_intervals: TokenMap,
    simple_ngrams: NGramMap,
    compound_ngrams: NGramMap,
}

impl StatisticsStore {
    pub fn new() -> StatisticsStore {
        StatisticsStore::default()
    }

    /// Register a piece and return its index. Duplicate names are allowed;
    /// pieces are tracked positionally, not by identity.
    pub fn add_piece(&mut self, name: &str) -> usize {
        self.pieces.push(name.to_string());
        self.pieces.len() - 1
    }

    pub fn pieces(&self) -> &[String] {
        &self.pieces
    }

    fn interval_map(&self, granularity: Granularity) -> &TokenMap {
        match granularity {
            Granularity::Simple => &self.simple_intervals,
            Granularity::Compound => &self.compound_intervals,
        }
    }

    fn ngram_map(&self, granularity: Granularity) -> &NGramMap {
        match granularity {
            Granularity::Simple => &self.simple_ngrams,
            Granularity::Compound => &self.compound_ngrams,
        }
    }

    /// Count one vertical interval for a piece. Both granularities are
    /// written from this single call.
    pub fn add_interval(&mut self, interval: &Interval, piece: usize) {
        for granularity in [Granularity::Simple, Granularity::Compound] {
            let parent = interval.vertical_token(false, granularity);
            let leaf = interval.vertical_token(true, granularity);
            let map = match granularity {
                Granularity::Simple => &mut self.simple_intervals,
                Granularity::Compound => &mut self.compound_intervals,
            };
            map.entry(parent)
                .or_default()
                .entry(leaf)
                .or_default()
                .bump(piece);
        }
    }

    /// Count one n-gram for a piece, at all four coordinates:
    /// {simple, compound} x {quality-insensitive parent, quality leaf}.
    pub fn add_ngram(&mut self, ngram: &NGram, piece: usize) {
        for granularity in [Granularity::Simple, Granularity::Compound] {
            let parent = ngram.token_string(false, granularity);
            let leaf = ngram.token_string(true, granularity);
            let map = match granularity {
                Granularity::Simple => &mut self.simple_ngrams,
                Granularity::Compound => &mut self.compound_ngrams,
            };
            map.entry(ngram.n())
                .or_default()
                .entry(parent)
                .or_default()
                .entry(leaf)
                .or_default()
                .bump(piece);
        }
    }

    /// Total occurrences of one interval token. A token carrying a quality
    /// letter is looked up exactly; a quality-insensitive token sums every
    /// quality variant of its generic shape.
    pub fn interval_occurrences(&self, token: &str, granularity: Granularity) -> Result<u64> {
        let interval = parse_interval_token(token)?;
        let parent = interval.vertical_token(false, granularity);
        let Some(children) = self.interval_map(granularity).get(&parent) else {
            return Ok(0);
        };
        Ok(if interval.quality.is_some() {
            children
                .get(&interval.vertical_token(true, granularity))
                .map(|occ| occ.total)
                .unwrap_or(0)
        } else {
            children.values().map(|occ| occ.total).sum()
        })
    }

    /// Total occurrences of one n-gram token string. Whether quality is
    /// heeded is sniffed from the string itself.
    pub fn ngram_occurrences(&self, token: &str, granularity: Granularity) -> Result<u64> {
        let ngram = parse_ngram(token)?;
        let Some(tokens) = self.ngram_map(granularity).get(&ngram.n()) else {
            return Ok(0);
        };
        let parent = ngram.token_string(false, granularity);
        let Some(children) = tokens.get(&parent) else {
            return Ok(0);
        };
        Ok(if ngram.heed_quality() {
            children
                .get(&ngram.token_string(true, granularity))
                .map(|occ| occ.total)
                .unwrap_or(0)
        } else {
            children.values().map(|occ| occ.total).sum()
        })
    }

    /// Ordered interval listing. The musical comparator is always the
    /// structural backbone; threshold, top-X, and the frequency re-sort are
    /// layered on top of it.
    pub fn query_intervals(&self, query: &IntervalQuery) -> Vec<IntervalRow> {
        let mut rows = Vec::new();
        for (parent, children) in self.interval_map(query.granularity) {
            if query.heed_quality {
                for (leaf, occ) in children {
                    rows.push(IntervalRow {
                        token: leaf.clone(),
                        total: occ.total,
                        by_piece: query.per_piece.then(|| occ.padded(self.pieces.len())),
                    });
                }
            } else {
                rows.push(IntervalRow {
                    token: parent.clone(),
                    total: children.values().map(|occ| occ.total).sum(),
                    by_piece: query.per_piece.then(|| {
                        children.values().fold(vec![0; self.pieces.len()], |a, occ| {
                            sum_lists(a, &occ.by_piece)
                        })
                    }),
                });
            }
        }

        rows.sort_by(|a, b| compare_intervals(&a.token, &b.token));
        if let Some(threshold) = query.threshold {
            rows.retain(|row| row.total >= threshold);
        }
        if let Some(x) = query.top_x {
            retain_top(&mut rows, x, |row| row.total);
        }
        apply_sort(&mut rows, query.sort_by, query.order, |row| row.total);
        rows
    }

    /// Ordered n-gram listing across one or more n values. Fails with
    /// `NoDataForRequestedN` when any requested n has no entries at the
    /// queried granularity.
    pub fn query_ngrams(&self, query: &NGramQuery) -> Result<Vec<NGramRow>> {
        let map = self.ngram_map(query.granularity);
        let mut rows = Vec::new();
        for &n in &query.n_values {
            let tokens = map
                .get(&n)
                .filter(|tokens| !tokens.is_empty())
                .ok_or(AnalysisError::NoDataForRequestedN(n))?;
            for (parent, children) in tokens {
                if query.heed_quality {
                    for (leaf, occ) in children {
                        rows.push(NGramRow {
                            n,
                            token: leaf.clone(),
                            ngram: parse_ngram(leaf)?,
                            total: occ.total,
                            by_piece: query.per_piece.then(|| occ.padded(self.pieces.len())),
                        });
                    }
                } else {
                    rows.push(NGramRow {
                        n,
                        token: parent.clone(),
                        ngram: parse_ngram(parent)?,
                        total: children.values().map(|occ| occ.total).sum(),
                        by_piece: query.per_piece.then(|| {
                            children.values().fold(vec![0; self.pieces.len()], |a, occ| {
                                sum_lists(a, &occ.by_piece)
                            })
                        }),
                    });
                }
            }
        }

        rows.sort_by(|a, b| compare_ngrams(&a.token, &b.token));
        if let Some(threshold) = query.threshold {
            rows.retain(|row| row.total >= threshold);
        }
        if let Some(x) = query.top_x {
            retain_top(&mut rows, x, |row| row.total);
        }
        apply_sort(&mut rows, query.sort_by, query.order, |row| row.total);
        Ok(rows)
    }

    /// Absorb another store: piece registries concatenate (duplicates
    /// allowed), and each leaf present in both stores has its per-piece
    /// list element-wise summed.
    pub fn merge_from(&mut self, other: StatisticsStore) {
        self.pieces.extend(other.pieces);
        merge_token_map(&mut self.simple_intervals, other.simple_intervals);
        merge_token_map(&mut self.compound_intervals, other.compound_intervals);
        merge_ngram_map(&mut self.simple_ngrams, other.simple_ngrams);
        merge_ngram_map(&mut self.compound_ngrams, other.compound_ngrams);
    }

    pub fn merge(mut self, other: StatisticsStore) -> StatisticsStore {
        self.merge_from(other);
        self
    }

    /// Shift every per-piece list right by `by` positions, so that this
    /// store's counts land at the correct registry positions after a merge
    /// that concatenates `by` earlier pieces in front of ours.
    pub fn shift_pieces(&mut self, by: usize) {
        if by == 0 {
            return;
        }
        let shift = |map: &mut TokenMap| {
            for children in map.values_mut() {
                for occ in children.values_mut() {
                    let mut list = vec![0; by];
                    list.append(&mut occ.by_piece);
                    occ.by_piece = list;
                }
            }
        };
        shift(&mut self.simple_intervals);
        shift(&mut self.compound_intervals);
        for tokens in self.simple_ngrams.values_mut() {
            shift(tokens);
        }
        for tokens in self.compound_ngrams.values_mut() {
            shift(tokens);
        }
    }

    /// Serialize to JSON, with every per-piece list padded to the registry
    /// length so the encoding is self-consistent on its own.
    pub fn to_json(&self) -> Result<String> {
        let mut padded = self.clone();
        let pieces = padded.pieces.len();
        padded.for_each_leaf(|occ| occ.by_piece.resize(pieces.max(occ.by_piece.len()), 0));
        serde_json::to_string_pretty(&padded).map_err(|e| {
            AnalysisError::InconsistentStatistics(format!("store failed to serialize: {e}"))
        })
    }

    /// Rebuild a store from its JSON encoding, re-validating the structural
    /// invariant before returning. A failed validation discards the
    /// partially-built store.
    pub fn from_json(text: &str) -> Result<StatisticsStore> {
        let store: StatisticsStore = serde_json::from_str(text).map_err(|e| {
            AnalysisError::InconsistentStatistics(format!("malformed store encoding: {e}"))
        })?;
        store.validate()?;
        debug!(pieces = store.pieces.len(), "store deserialized");
        Ok(store)
    }

    fn for_each_leaf(&mut self, mut f: impl FnMut(&mut Occurrences)) {
        for map in [&mut self.simple_intervals, &mut self.compound_intervals] {
            for children in map.values_mut() {
                for occ in children.values_mut() {
                    f(occ);
                }
            }
        }
        for map in [&mut self.simple_ngrams, &mut self.compound_ngrams] {
            for tokens in map.values_mut() {
                for children in tokens.values_mut() {
                    for occ in children.values_mut() {
                        f(occ);
                    }
                }
            }
        }
    }

    /// Check the structural invariant on externally-supplied data: every
    /// key must parse under the token grammar and agree with its parent,
    /// and every leaf total must equal the sum of its per-piece counts,
    /// with the list exactly as long as the piece registry.
    fn validate(&self) -> Result<()> {
        let pieces = self.pieces.len();
        for map in [&self.simple_intervals, &self.compound_intervals] {
            for (parent, children) in map {
                parse_interval_token(parent)?;
                for (leaf, occ) in children {
                    parse_interval_token(leaf)?;
                    check_parent(parent, leaf)?;
                    check_leaf(parent, leaf, occ, pieces)?;
                }
            }
        }
        for map in [&self.simple_ngrams, &self.compound_ngrams] {
            for (&n, tokens) in map {
                for (parent, children) in tokens {
                    let parsed = parse_ngram(parent)?;
                    if parsed.n() != n {
                        return Err(AnalysisError::InconsistentStatistics(format!(
                            "'{parent}' is a {}-gram filed under n = {n}",
                            parsed.n()
                        )));
                    }
                    for (leaf, occ) in children {
                        let parsed = parse_ngram(leaf)?;
                        if parsed.n() != n {
                            return Err(AnalysisError::InconsistentStatistics(format!(
                                "'{leaf}' is a {}-gram filed under n = {n}",
                                parsed.n()
                            )));
                        }
                        check_parent(parent, leaf)?;
                        check_leaf(parent, leaf, occ, pieces)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn merge_token_map(into: &mut TokenMap, from: TokenMap) {
    for (parent, children) in from {
        let dst = into.entry(parent).or_default();
        for (leaf, occ) in children {
            match dst.entry(leaf) {
                std::collections::btree_map::Entry::Occupied(mut e) => e.get_mut().absorb(occ),
                std::collections::btree_map::Entry::Vacant(e) => {
                    e.insert(occ);
                }
            }
        }
    }
}

fn merge_ngram_map(into: &mut NGramMap, from: NGramMap) {
    for (n, tokens) in from {
        merge_token_map(into.entry(n).or_default(), tokens);
    }
}

/// A quality leaf must actually carry quality (every stored leaf is
/// rendered with quality heeded, so its first field starts with a quality
/// letter) and must reduce to its parent key when the quality letters are
/// dropped.
fn check_parent(parent: &str, leaf: &str) -> Result<()> {
    let qualified = leaf
        .chars()
        .next()
        .is_some_and(|c| Quality::from_letter(c).is_some());
    if !qualified {
        return Err(AnalysisError::InconsistentStatistics(format!(
            "'{leaf}' under '{parent}' does not carry quality"
        )));
    }
    let stripped: String = leaf
        .chars()
        .filter(|&c| Quality::from_letter(c).is_none())
        .collect();
    if stripped != parent {
        return Err(AnalysisError::InconsistentStatistics(format!(
            "'{leaf}' is filed under '{parent}', which is not its generic shape"
        )));
    }
    Ok(())
}

fn check_leaf(parent: &str, leaf: &str, occ: &Occurrences, pieces: usize) -> Result<()> {
    if occ.by_piece.iter().sum::<u64>() != occ.total {
        return Err(AnalysisError::InconsistentStatistics(format!(
            "total of '{leaf}' under '{parent}' disagrees with its per-piece counts"
        )));
    }
    if occ.by_piece.len() != pieces {
        return Err(AnalysisError::InconsistentStatistics(format!(
            "'{leaf}' under '{parent}' has counts for {} pieces but the registry has {pieces}",
            occ.by_piece.len()
        )));
    }
    Ok(())
}

fn sum_lists(mut acc: Vec<u64>, list: &[u64]) -> Vec<u64> {
    if acc.len() < list.len() {
        acc.resize(list.len(), 0);
    }
    for (slot, count) in acc.iter_mut().zip(list) {
        *slot += count;
    }
    acc
}

/// Keep the `x` rows with the highest key, ties broken by the current
/// (musical) order, preserving that order among the survivors.
fn retain_top<T>(rows: &mut Vec<T>, x: usize, key: impl Fn(&T) -> u64) {
    if rows.len() <= x {
        return;
    }
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(key(&rows[i])));
    let keep: std::collections::BTreeSet<usize> = order.into_iter().take(x).collect();
    let mut index = 0;
    rows.retain(|_| {
        let kept = keep.contains(&index);
        index += 1;
        kept
    });
}

/// Rows arrive in musical order; `Frequency` is a stable re-sort by total
/// on top of that backbone, never a replacement for it.
fn apply_sort<T>(rows: &mut [T], sort_by: SortBy, order: SortOrder, key: impl Fn(&T) -> u64) {
    match (sort_by, order) {
        (SortBy::Name, SortOrder::Ascending) => {}
        (SortBy::Name, SortOrder::Descending) => rows.reverse(),
        (SortBy::Frequency, SortOrder::Ascending) => rows.sort_by_key(|row| key(row)),
        (SortBy::Frequency, SortOrder::Descending) => {
            rows.sort_by_key(|row| std::cmp::Reverse(key(row)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use organum_model::interval::Direction;
    use organum_model::pitch::Pitch;
    use pretty_assertions::assert_eq;

    fn iv(lower: &str, upper: &str) -> Interval {
        Interval::classify(&Pitch::parse(lower).unwrap(), &Pitch::parse(upper).unwrap()).unwrap()
    }

    fn ng(lowers: &[&str], uppers: &[&str], heed: bool) -> NGram {
        let verticals: Vec<(Interval, Pitch)> = lowers
            .iter()
            .zip(uppers)
            .map(|(l, u)| (iv(l, u), Pitch::parse(l).unwrap()))
            .collect();
        NGram::from_verticals(&verticals, heed).unwrap()
    }

    fn sample_store() -> StatisticsStore {
        let mut store = StatisticsStore::new();
        let a = store.add_piece("alpha");
        let b = store.add_piece("beta");
        store.add_interval(&iv("C4", "E4"), a);
        store.add_interval(&iv("C4", "E4"), b);
        store.add_interval(&iv("C4", "Eb4"), a);
        store.add_interval(&iv("C4", "G4"), b);
        store.add_interval(&iv("A3", "C5"), a); // m10
        store.add_ngram(&ng(&["C4", "D4"], &["G4", "B4"], true), a);
        store.add_ngram(&ng(&["C4", "D4"], &["G4", "B4"], true), b);
        store.add_ngram(&ng(&["C4", "D4"], &["Gb4", "B4"], true), a);
        store.add_ngram(&ng(&["C4", "D4", "E4"], &["G4", "B4", "E5"], true), b);
        store
    }

    #[test]
    fn test_interval_occurrences() {
        let store = sample_store();
        assert_eq!(
            store
                .interval_occurrences("M3", Granularity::Compound)
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .interval_occurrences("m3", Granularity::Compound)
                .unwrap(),
            1
        );
        // Quality-insensitive: every third, any quality.
        assert_eq!(
            store
                .interval_occurrences("3", Granularity::Compound)
                .unwrap(),
            3
        );
        // The m10 folds into the thirds at simple granularity.
        assert_eq!(
            store
                .interval_occurrences("3", Granularity::Simple)
                .unwrap(),
            4
        );
        assert_eq!(
            store
                .interval_occurrences("m10", Granularity::Compound)
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .interval_occurrences("P4", Granularity::Compound)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_ngram_occurrences() {
        let store = sample_store();
        assert_eq!(
            store
                .ngram_occurrences("P5 +M2 M6", Granularity::Compound)
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .ngram_occurrences("d5 +M2 M6", Granularity::Compound)
                .unwrap(),
            1
        );
        // Quality-insensitive lookup sums both quality variants.
        assert_eq!(
            store
                .ngram_occurrences("5 +2 6", Granularity::Compound)
                .unwrap(),
            3
        );
        assert_eq!(
            store
                .ngram_occurrences("5 +2 6 +2 8", Granularity::Compound)
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .ngram_occurrences("3 +2 3", Granularity::Compound)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_query_ngrams_musical_order() {
        let store = sample_store();
        let rows = store
            .query_ngrams(&NGramQuery {
                n_values: vec![2],
                heed_quality: true,
                ..NGramQuery::default()
            })
            .unwrap();
        // d5 before P5 at equal size.
        assert_eq!(
            rows.iter().map(|r| r.token.as_str()).collect::<Vec<_>>(),
            ["d5 +M2 M6", "P5 +M2 M6"]
        );
        assert_eq!(rows[1].total, 2);
        assert_eq!(rows[1].ngram.n(), 2);
    }

    #[test]
    fn test_query_ngrams_multiple_n_shorter_first() {
        let store = sample_store();
        let rows = store
            .query_ngrams(&NGramQuery {
                n_values: vec![2, 3],
                heed_quality: false,
                ..NGramQuery::default()
            })
            .unwrap();
        assert_eq!(
            rows.iter().map(|r| r.token.as_str()).collect::<Vec<_>>(),
            ["5 +2 6", "5 +2 6 +2 8"]
        );
        assert_eq!(rows[0].total, 3);
        assert_eq!(rows[1].total, 1);
    }

    #[test]
    fn test_query_ngrams_missing_n() {
        let store = sample_store();
        let err = store
            .query_ngrams(&NGramQuery {
                n_values: vec![2, 4],
                ..NGramQuery::default()
            })
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoDataForRequestedN(4)));
    }

    #[test]
    fn test_query_threshold_and_top() {
        let store = sample_store();
        let rows = store
            .query_ngrams(&NGramQuery {
                n_values: vec![2],
                heed_quality: true,
                threshold: Some(2),
                ..NGramQuery::default()
            })
            .unwrap();
        assert_eq!(
            rows.iter().map(|r| r.token.as_str()).collect::<Vec<_>>(),
            ["P5 +M2 M6"]
        );

        let rows = store
            .query_ngrams(&NGramQuery {
                n_values: vec![2],
                heed_quality: true,
                top_x: Some(1),
                ..NGramQuery::default()
            })
            .unwrap();
        // The most frequent survives, still reported in musical order.
        assert_eq!(
            rows.iter().map(|r| r.token.as_str()).collect::<Vec<_>>(),
            ["P5 +M2 M6"]
        );
    }

    #[test]
    fn test_query_frequency_is_stable_resort() {
        let store = sample_store();
        let rows = store
            .query_intervals(&IntervalQuery {
                heed_quality: true,
                sort_by: SortBy::Frequency,
                order: SortOrder::Descending,
                granularity: Granularity::Simple,
                ..IntervalQuery::default()
            });
        // m3 and M3 tie at 2 (the m10 reduces onto the m3 leaf at simple
        // granularity); ties keep the musical order, so m3 stays first.
        assert_eq!(
            rows.iter().map(|r| r.token.as_str()).collect::<Vec<_>>(),
            ["m3", "M3", "P5"]
        );
        assert_eq!(rows[0].total, 2);
        assert_eq!(rows[2].total, 1);
    }

    #[test]
    fn test_query_per_piece_lists() {
        let store = sample_store();
        let rows = store.query_intervals(&IntervalQuery {
            heed_quality: false,
            per_piece: true,
            ..IntervalQuery::default()
        });
        let thirds = rows.iter().find(|r| r.token == "3").unwrap();
        assert_eq!(thirds.total, 3);
        assert_eq!(thirds.by_piece, Some(vec![2, 1]));
    }

    #[test]
    fn test_merge_sums_leaves_and_concatenates_pieces() {
        let mut a = StatisticsStore::new();
        let pa = a.add_piece("alpha");
        a.add_interval(&iv("C4", "E4"), pa);
        a.add_interval(&iv("C4", "G4"), pa);

        let mut b = StatisticsStore::new();
        let pb = b.add_piece("beta");
        b.add_interval(&iv("C4", "E4"), pb);

        let merged = a.clone().merge(b.clone());
        assert_eq!(merged.pieces(), ["alpha", "beta"]);
        assert_eq!(
            merged
                .interval_occurrences("M3", Granularity::Compound)
                .unwrap(),
            2
        );
        assert_eq!(
            merged
                .interval_occurrences("P5", Granularity::Compound)
                .unwrap(),
            1
        );

        // Commutative and associative at every leaf count.
        let other_way = b.clone().merge(a.clone());
        for token in ["M3", "P5", "3", "5"] {
            assert_eq!(
                merged
                    .interval_occurrences(token, Granularity::Compound)
                    .unwrap(),
                other_way
                    .interval_occurrences(token, Granularity::Compound)
                    .unwrap()
            );
        }
        let mut c = StatisticsStore::new();
        let pc = c.add_piece("gamma");
        c.add_interval(&iv("C4", "G4"), pc);
        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.clone().merge(b.merge(c));
        for token in ["M3", "P5"] {
            assert_eq!(
                left.interval_occurrences(token, Granularity::Compound)
                    .unwrap(),
                right
                    .interval_occurrences(token, Granularity::Compound)
                    .unwrap()
            );
        }
    }

    #[test]
    fn test_shift_pieces_aligns_merge_attribution() {
        let mut a = StatisticsStore::new();
        let pa = a.add_piece("alpha");
        a.add_interval(&iv("C4", "E4"), pa);

        let mut b = StatisticsStore::new();
        let pb = b.add_piece("beta");
        b.add_interval(&iv("C4", "E4"), pb);
        b.shift_pieces(1);

        let merged = a.merge(b);
        let rows = merged.query_intervals(&IntervalQuery {
            heed_quality: true,
            per_piece: true,
            ..IntervalQuery::default()
        });
        assert_eq!(rows[0].token, "M3");
        assert_eq!(rows[0].by_piece, Some(vec![1, 1]));
    }

    #[test]
    fn test_json_round_trip_preserves_queries() {
        let store = sample_store();
        let text = store.to_json().unwrap();
        let back = StatisticsStore::from_json(&text).unwrap();

        for heed in [false, true] {
            for granularity in [Granularity::Simple, Granularity::Compound] {
                let query = NGramQuery {
                    n_values: vec![2, 3],
                    heed_quality: heed,
                    granularity,
                    per_piece: true,
                    ..NGramQuery::default()
                };
                assert_eq!(
                    store.query_ngrams(&query).unwrap(),
                    back.query_ngrams(&query).unwrap()
                );
                let query = IntervalQuery {
                    heed_quality: heed,
                    granularity,
                    per_piece: true,
                    ..IntervalQuery::default()
                };
                assert_eq!(store.query_intervals(&query), back.query_intervals(&query));
            }
        }
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_totals() {
        // Bump one total without touching its per-piece list.
        let mut store = sample_store();
        let leaf = store
            .compound_intervals
            .get_mut("3")
            .unwrap()
            .get_mut("M3")
            .unwrap();
        leaf.total += 3;
        assert!(matches!(
            StatisticsStore::from_json(&store.to_json().unwrap()),
            Err(AnalysisError::InconsistentStatistics(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_corrupt_keys() {
        let mut store = sample_store();
        let children = store.compound_intervals.remove("3").unwrap();
        store.compound_intervals.insert("Mx3".to_string(), children);
        assert!(StatisticsStore::from_json(&store.to_json().unwrap()).is_err());
    }

    #[test]
    fn test_deserialize_rejects_misfiled_ngram() {
        // File the 3-gram's entries under n = 2.
        let mut store = sample_store();
        let three = store.compound_ngrams.remove(&3).unwrap();
        store.compound_ngrams.get_mut(&2).unwrap().extend(three);
        assert!(matches!(
            StatisticsStore::from_json(&store.to_json().unwrap()),
            Err(AnalysisError::InconsistentStatistics(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_unqualified_leaf() {
        // A quality level keyed by the generic shape itself would leak
        // quality-insensitive tokens into quality-heeded listings.
        let mut store = sample_store();
        store.compound_ngrams.get_mut(&2).unwrap().get_mut("5 +2 6").unwrap().insert(
            "5 +2 6".to_string(),
            Occurrences {
                total: 0,
                by_piece: vec![0, 0],
            },
        );
        assert!(matches!(
            StatisticsStore::from_json(&store.to_json().unwrap()),
            Err(AnalysisError::InconsistentStatistics(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_mismatched_parent() {
        let mut store = sample_store();
        let children = store.compound_intervals.remove("5").unwrap();
        store.compound_intervals.insert("4".to_string(), children);
        assert!(matches!(
            StatisticsStore::from_json(&store.to_json().unwrap()),
            Err(AnalysisError::InconsistentStatistics(_))
        ));
    }

    #[test]
    fn test_unison_direction_survives_round_trip() {
        let mut store = StatisticsStore::new();
        let p = store.add_piece("alpha");
        store.add_interval(
            &Interval::new(1, Some(Quality::Perfect), Direction::Unison),
            p,
        );
        let back = StatisticsStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(
            back.interval_occurrences("P1", Granularity::Compound)
                .unwrap(),
            1
        );
    }
}
