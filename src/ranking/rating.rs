use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::{Candidate, SwipeOutcome},
};

/// Rating every candidate starts from
pub const BASE_RATING: f64 = 1200.0;

/// Maximum movement of a single feedback event
pub const K_FACTOR: f64 = 32.0;

/// Per-candidate score held by one participant's engine
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub candidate_id: String,
    pub elo_score: f64,
}

/// A candidate paired with its current score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub elo_score: f64,
}

/// Effect of one feedback event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingChange {
    pub candidate_id: String,
    pub outcome: SwipeOutcome,
    pub predicted: f64,
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
}

#[derive(Debug, Clone)]
struct Entry {
    candidate: Candidate,
    rating: Rating,
}

/// Adaptive preference ranking for one participant
///
/// Each feedback event scores a candidate against its own predicted affinity
/// rather than against an opponent:
///
/// ```text
/// elo += K * (actual - predicted)      actual = 1 (accept) | 0 (reject)
/// ```
///
/// so a surprising reject of a highly predicted movie, or a surprising accept
/// of a poorly predicted one, moves the rating the most. Feedback compounds;
/// repeating it applies the update again.
#[derive(Debug, Clone, Default)]
pub struct PreferenceRatingEngine {
    /// Entries in load order; ties in rankings keep this order
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl PreferenceRatingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes one rating per candidate at [`BASE_RATING`]
    ///
    /// Loading an id that is already present resets its rating and replaces
    /// the stored candidate; its position in load order is kept.
    pub fn load_candidates(&mut self, candidates: &[Candidate]) {
        for candidate in candidates {
            let rating = Rating {
                candidate_id: candidate.id.clone(),
                elo_score: BASE_RATING,
            };

            match self.index.get(&candidate.id) {
                Some(&position) => {
                    tracing::debug!(candidate_id = %candidate.id, "Resetting rating on reload");
                    self.entries[position] = Entry {
                        candidate: candidate.clone(),
                        rating,
                    };
                }
                None => {
                    self.index.insert(candidate.id.clone(), self.entries.len());
                    self.entries.push(Entry {
                        candidate: candidate.clone(),
                        rating,
                    });
                }
            }
        }

        tracing::debug!(
            loaded = candidates.len(),
            total = self.entries.len(),
            "Candidates loaded into rating engine"
        );
    }

    /// Applies one accept/reject signal
    ///
    /// An id that was never loaded leaves every rating untouched and is
    /// reported as [`AppError::UnknownCandidate`].
    pub fn record_feedback(
        &mut self,
        candidate_id: &str,
        outcome: SwipeOutcome,
    ) -> AppResult<RatingChange> {
        let Some(&position) = self.index.get(candidate_id) else {
            tracing::warn!(candidate_id = %candidate_id, "Feedback for unknown candidate");
            return Err(AppError::UnknownCandidate(candidate_id.to_string()));
        };

        let entry = &mut self.entries[position];
        let predicted = entry.candidate.predicted_affinity;
        let delta = K_FACTOR * (outcome.actual_score() - predicted);
        let previous = entry.rating.elo_score;
        entry.rating.elo_score += delta;

        tracing::debug!(
            candidate_id = %candidate_id,
            outcome = %outcome,
            predicted,
            previous,
            current = entry.rating.elo_score,
            "Rating updated"
        );

        Ok(RatingChange {
            candidate_id: candidate_id.to_string(),
            outcome,
            predicted,
            previous,
            current: entry.rating.elo_score,
            delta,
        })
    }

    pub fn rating(&self, candidate_id: &str) -> Option<&Rating> {
        self.index
            .get(candidate_id)
            .map(|&position| &self.entries[position].rating)
    }

    pub fn contains(&self, candidate_id: &str) -> bool {
        self.index.contains_key(candidate_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All candidates, highest rating first; equal ratings keep load order
    pub fn get_rankings(&self) -> Vec<RankedCandidate> {
        let mut rankings: Vec<RankedCandidate> = self
            .entries
            .iter()
            .map(|entry| RankedCandidate {
                candidate: entry.candidate.clone(),
                elo_score: entry.rating.elo_score,
            })
            .collect();

        // sort_by is stable
        rankings.sort_by(|a, b| b.elo_score.total_cmp(&a.elo_score));
        rankings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, title: &str, predicted: f64) -> Candidate {
        Candidate::new(id, title, vec!["Drama".to_string()], predicted).unwrap()
    }

    fn sample_slate() -> Vec<Candidate> {
        vec![
            candidate("m1", "Dune: Part Two", 0.85),
            candidate("m2", "The Godfather", 0.60),
            candidate("m3", "Oppenheimer", 0.75),
            candidate("m4", "Little Miss Sunshine", 0.30),
        ]
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_loaded_candidates_start_at_base_rating() {
        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(&sample_slate());

        assert_eq!(engine.len(), 4);
        for ranked in engine.get_rankings() {
            assert_eq!(ranked.elo_score, BASE_RATING);
        }
    }

    #[test]
    fn test_feedback_moves_rating_by_surprise() {
        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(&sample_slate());

        let change = engine.record_feedback("m2", SwipeOutcome::Reject).unwrap();
        assert_close(change.delta, 32.0 * (0.0 - 0.60));
        assert_close(engine.rating("m2").unwrap().elo_score, 1180.8);

        let change = engine.record_feedback("m4", SwipeOutcome::Accept).unwrap();
        assert_close(change.delta, 32.0 * (1.0 - 0.30));
        assert_close(change.current, 1222.4);
    }

    #[test]
    fn test_repeated_feedback_compounds() {
        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(&sample_slate());

        engine.record_feedback("m1", SwipeOutcome::Accept).unwrap();
        engine.record_feedback("m1", SwipeOutcome::Accept).unwrap();
        assert_close(engine.rating("m1").unwrap().elo_score, 1200.0 + 2.0 * 4.8);
    }

    #[test]
    fn test_unknown_candidate_is_reported_and_ignored() {
        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(&sample_slate());
        let before = engine.get_rankings();

        let result = engine.record_feedback("m99", SwipeOutcome::Accept);
        assert!(matches!(result, Err(AppError::UnknownCandidate(id)) if id == "m99"));
        assert_eq!(engine.get_rankings(), before);
    }

    #[test]
    fn test_rankings_follow_surprise_example() {
        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(&sample_slate());

        engine.record_feedback("m1", SwipeOutcome::Accept).unwrap();
        engine.record_feedback("m2", SwipeOutcome::Reject).unwrap();
        engine.record_feedback("m3", SwipeOutcome::Accept).unwrap();
        engine.record_feedback("m4", SwipeOutcome::Accept).unwrap();

        let rankings = engine.get_rankings();
        let ids: Vec<&str> = rankings.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["m4", "m3", "m1", "m2"]);

        assert_close(rankings[0].elo_score, 1222.4);
        assert_close(rankings[1].elo_score, 1208.0);
        assert_close(rankings[2].elo_score, 1204.8);
        assert_close(rankings[3].elo_score, 1180.8);
    }

    #[test]
    fn test_ties_keep_load_order() {
        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(&[
            candidate("c", "Third", 0.5),
            candidate("a", "First", 0.5),
            candidate("b", "Second", 0.5),
        ]);

        let ids: Vec<String> = engine
            .get_rankings()
            .into_iter()
            .map(|r| r.candidate.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_rankings_do_not_modify_state() {
        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(&sample_slate());
        engine.record_feedback("m3", SwipeOutcome::Reject).unwrap();

        let first = engine.get_rankings();
        let second = engine.get_rankings();
        assert_eq!(first, second);
        assert_eq!(engine.len(), 4);
    }

    #[test]
    fn test_reload_resets_overlapping_ids() {
        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(&sample_slate());
        engine.record_feedback("m1", SwipeOutcome::Reject).unwrap();
        engine.record_feedback("m2", SwipeOutcome::Reject).unwrap();

        engine.load_candidates(&[candidate("m1", "Dune: Part Two", 0.9)]);

        assert_eq!(engine.len(), 4);
        assert_eq!(engine.rating("m1").unwrap().elo_score, BASE_RATING);
        assert!(engine.rating("m2").unwrap().elo_score < BASE_RATING);

        let change = engine.record_feedback("m1", SwipeOutcome::Accept).unwrap();
        assert_close(change.predicted, 0.9);
    }
}
