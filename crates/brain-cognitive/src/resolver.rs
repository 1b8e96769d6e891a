//! Action Resolver (§4.2): pure fuzzy lookup over an Action Registry
//! snapshot. No side effects, no I/O — the registry has already been
//! loaded by the caller.

use brain_core::{ActionDefinition, MatchType};
use strsim::normalized_levenshtein;

/// Normalized-Levenshtein ratio threshold for a fuzzy match (B1: 0.80
/// matches, 0.79 does not).
pub const FUZZY_THRESHOLD: f64 = 0.80;

/// Resolves up to three ordered candidate names against a snapshot of
/// an instance's actions. Evaluated in order, first match wins,
/// iterating the outer candidate loop before the inner match-category
/// loop (§4.2): every candidate is tried for an exact match before any
/// candidate is tried for a fuzzy match, and so on.
pub fn resolve<'a>(
    candidates: &[String],
    actions: &'a [ActionDefinition],
) -> (Option<&'a ActionDefinition>, MatchType) {
    for candidate in candidates {
        if let Some(action) = exact_match(candidate, actions) {
            return (Some(action), MatchType::Exact);
        }
    }

    if let Some((action, _ratio)) = best_fuzzy_match(candidates, actions) {
        return (Some(action), MatchType::Fuzzy);
    }

    for candidate in candidates {
        if let Some(action) = synonym_match(candidate, actions) {
            return (Some(action), MatchType::Synonym);
        }
    }

    (None, MatchType::NotFound)
}

fn exact_match<'a>(candidate: &str, actions: &'a [ActionDefinition]) -> Option<&'a ActionDefinition> {
    let candidate = candidate.to_lowercase();
    actions
        .iter()
        .find(|a| a.canonical_name.to_lowercase() == candidate)
}

/// Ties are broken by (a) higher ratio, (b) earlier candidate index,
/// (c) registry insertion order (the `actions` slice's own order,
/// since we scan it front-to-back and only replace on strictly higher
/// ratio).
fn best_fuzzy_match<'a>(
    candidates: &[String],
    actions: &'a [ActionDefinition],
) -> Option<(&'a ActionDefinition, f64)> {
    let mut best: Option<(&ActionDefinition, f64, usize)> = None;
    for (candidate_idx, candidate) in candidates.iter().enumerate() {
        let candidate_lower = candidate.to_lowercase();
        for action in actions {
            let ratio = normalized_levenshtein(&candidate_lower, &action.canonical_name.to_lowercase());
            if ratio < FUZZY_THRESHOLD {
                continue;
            }
            let replace = match &best {
                None => true,
                Some((_, best_ratio, best_idx)) => {
                    ratio > *best_ratio || (ratio == *best_ratio && candidate_idx < *best_idx)
                }
            };
            if replace {
                best = Some((action, ratio, candidate_idx));
            }
        }
    }
    best.map(|(action, ratio, _)| (action, ratio))
}

fn synonym_match<'a>(candidate: &str, actions: &'a [ActionDefinition]) -> Option<&'a ActionDefinition> {
    let candidate = candidate.to_lowercase();
    actions
        .iter()
        .find(|a| a.synonyms.iter().any(|s| s.to_lowercase() == candidate))
}
