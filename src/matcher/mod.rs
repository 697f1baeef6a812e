//! Cross-venue listing matching.
//!
//! Decides which listings on two venues refer to the same real-world event
//! by comparing normalized titles. Venue listing counts are in the hundreds,
//! so the full O(|A|·|B|) cross product is fine.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::venue::Listing;

/// Bonus added per high-signal term shared by both titles.
const HIGH_SIGNAL_BONUS: f64 = 0.05;

/// Cap on the total high-signal bonus.
const HIGH_SIGNAL_BONUS_CAP: f64 = 0.2;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(19|20)\d{2}$").unwrap());

/// Curated terms that strongly indicate two titles describe the same event:
/// organizations, institutions, and calendar words that rarely appear by
/// coincidence in unrelated markets.
static HIGH_SIGNAL_TERMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "fed", "fomc", "ecb", "opec", "nato", "senate", "congress", "scotus",
        "nba", "nfl", "mlb", "nhl", "ufc", "fifa", "uefa", "olympics",
        "bitcoin", "ethereum", "tesla", "nvidia", "apple", "openai", "spacex",
        "january", "february", "march", "april", "may", "june", "july",
        "august", "september", "october", "november", "december",
        "q1", "q2", "q3", "q4",
    ]
    .into_iter()
    .collect()
});

/// Two listings believed to describe the same event, with a confidence
/// score in [0, 1]. Produced fresh each matching pass.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    /// Listing from the first venue.
    pub listing_a: Listing,
    /// Listing from the second venue.
    pub listing_b: Listing,
    /// Match confidence in [0, 1].
    pub confidence: f64,
}

/// Normalize a title: lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lower, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

fn token_set(normalized: &str) -> HashSet<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}

fn is_high_signal(token: &str) -> bool {
    HIGH_SIGNAL_TERMS.contains(token)
        || YEAR.is_match(token)
        || token.chars().any(|c| c.is_ascii_digit())
}

/// Token-overlap similarity between two titles.
///
/// Jaccard similarity of the normalized word sets, plus a bounded bonus when
/// high-signal terms appear in both titles. Identical normalized titles score
/// 1.0; disjoint word sets score 0.0.
pub fn title_similarity(title_a: &str, title_b: &str) -> f64 {
    let norm_a = normalize_title(title_a);
    let norm_b = normalize_title(title_b);
    let tokens_a = token_set(&norm_a);
    let tokens_b = token_set(&norm_b);

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&&str> = tokens_a.intersection(&tokens_b).collect();
    if intersection.is_empty() {
        return 0.0;
    }

    let union = tokens_a.union(&tokens_b).count();
    let jaccard = intersection.len() as f64 / union as f64;

    let bonus = (intersection
        .iter()
        .filter(|token| is_high_signal(token))
        .count() as f64
        * HIGH_SIGNAL_BONUS)
        .min(HIGH_SIGNAL_BONUS_CAP);

    (jaccard + bonus).min(1.0)
}

/// Find cross-venue matches with confidence at or above `threshold`.
///
/// Output is ordered by descending confidence, then by venue-native ids so
/// identical inputs always produce identical output. Listings that fail
/// validation are skipped; one bad snapshot never aborts the batch.
#[instrument(skip_all, fields(a = listings_a.len(), b = listings_b.len()))]
pub fn find_matches(
    listings_a: &[Listing],
    listings_b: &[Listing],
    threshold: f64,
) -> Vec<MatchedPair> {
    let valid = |listings: &'_ [Listing]| -> Vec<Listing> {
        listings
            .iter()
            .filter(|l| match l.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(
                        venue = %l.venue,
                        market_id = %l.market_id,
                        %reason,
                        "skipping malformed listing"
                    );
                    false
                }
            })
            .cloned()
            .collect()
    };

    let valid_a = valid(listings_a);
    let valid_b = valid(listings_b);

    let mut pairs = Vec::new();
    for a in &valid_a {
        for b in &valid_b {
            let confidence = title_similarity(&a.title, &b.title);
            if confidence >= threshold && confidence > 0.0 {
                pairs.push(MatchedPair {
                    listing_a: a.clone(),
                    listing_b: b.clone(),
                    confidence,
                });
            }
        }
    }

    pairs.sort_by(|x, y| {
        y.confidence
            .partial_cmp(&x.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.listing_a.market_id.cmp(&y.listing_a.market_id))
            .then_with(|| x.listing_b.market_id.cmp(&y.listing_b.market_id))
    });

    debug!(matches = pairs.len(), "matching pass complete");
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::mock::ListingBuilder;
    use pretty_assertions::assert_eq;

    fn listing(venue: &str, id: &str, title: &str) -> Listing {
        ListingBuilder::new(venue, id, title).build()
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(
            normalize_title("  Will the FED cut rates?! (March 2026) "),
            "will the fed cut rates march 2026"
        );
    }

    #[test]
    fn identical_titles_score_one() {
        let sim = title_similarity(
            "Will the Fed cut rates in March 2026?",
            "will the fed cut rates in march 2026",
        );
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn disjoint_titles_score_zero() {
        let sim = title_similarity("Lakers win the NBA finals", "Inflation above four percent");
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn empty_title_never_matches() {
        assert_eq!(title_similarity("", "anything at all"), 0.0);
        assert_eq!(title_similarity("?!.", "anything at all"), 0.0);
    }

    #[test]
    fn shared_high_signal_terms_add_bounded_bonus() {
        let base = title_similarity("team alpha wins the title", "team alpha takes the crown");
        let boosted = title_similarity("nba team alpha wins 2026", "nba team alpha takes 2026");
        assert!(boosted > base);
        assert!(boosted <= 1.0);
    }

    #[test]
    fn find_matches_filters_by_threshold() {
        let a = vec![listing("alpha", "a1", "Will the Fed cut rates in March")];
        let b = vec![
            listing("beta", "b1", "Fed cut rates in March"),
            listing("beta", "b2", "Lakers win the finals"),
        ];

        let pairs = find_matches(&a, &b, 0.5);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].listing_b.market_id, "b1");
    }

    #[test]
    fn find_matches_orders_deterministically() {
        let a = vec![
            listing("alpha", "a2", "Bitcoin above 100k in June"),
            listing("alpha", "a1", "Bitcoin above 100k in June"),
        ];
        let b = vec![listing("beta", "b1", "Bitcoin above 100k in June")];

        let first = find_matches(&a, &b, 0.1);
        let second = find_matches(&a, &b, 0.1);

        let ids = |pairs: &[MatchedPair]| -> Vec<String> {
            pairs.iter().map(|p| p.listing_a.market_id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
        // Equal confidence: tie broken by market id.
        assert_eq!(ids(&first), vec!["a1".to_string(), "a2".to_string()]);
    }

    #[test]
    fn malformed_listings_are_skipped_not_fatal() {
        let mut bad = listing("alpha", "a1", "Bitcoin above 100k");
        bad.yes_price = rust_decimal_macros::dec!(1.5);
        let good = listing("alpha", "a2", "Bitcoin above 100k");
        let b = vec![listing("beta", "b1", "Bitcoin above 100k")];

        let pairs = find_matches(&[bad, good], &b, 0.5);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].listing_a.market_id, "a2");
    }
}
