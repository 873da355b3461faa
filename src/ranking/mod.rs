mod rating;
mod swipe_buffer;

pub use rating::{
    PreferenceRatingEngine, RankedCandidate, Rating, RatingChange, BASE_RATING, K_FACTOR,
};
pub use swipe_buffer::{CapacityExceeded, OrderedPopBuffer};

use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{Candidate, SwipeOutcome},
};

/// Number of top-rated candidates presented as the final recommendation
pub const TOP_PICKS: usize = 3;

/// Result of a single swipe against a participant's deck
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeReceipt {
    pub change: RatingChange,
    pub remaining: usize,
    pub exhausted: bool,
}

/// One participant's deck and rating engine
///
/// The deck is filled once from the slate and only drains afterwards. The
/// first slate entry is served first.
#[derive(Debug, Clone)]
pub struct SwipeSession {
    buffer: OrderedPopBuffer<Candidate>,
    engine: PreferenceRatingEngine,
}

impl SwipeSession {
    pub fn from_slate(slate: &[Candidate], capacity: Option<usize>) -> AppResult<Self> {
        let mut buffer = match capacity {
            Some(capacity) => OrderedPopBuffer::bounded(capacity),
            None => OrderedPopBuffer::new(),
        };
        for candidate in slate.iter().rev() {
            buffer.push(candidate.clone())?;
        }

        let mut engine = PreferenceRatingEngine::new();
        engine.load_candidates(slate);

        Ok(Self { buffer, engine })
    }

    /// The candidate awaiting a swipe
    pub fn next(&self) -> Option<&Candidate> {
        self.buffer.peek()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.size()
    }

    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Records feedback for the candidate on top of the deck and pops it
    ///
    /// Ids the engine never loaded surface as [`AppError::UnknownCandidate`]
    /// with the deck untouched. A loaded id that is not on top means the
    /// caller is out of sync with the deck.
    pub fn swipe(&mut self, candidate_id: &str, outcome: SwipeOutcome) -> AppResult<SwipeReceipt> {
        if !self.engine.contains(candidate_id) {
            tracing::warn!(candidate_id = %candidate_id, "Swipe for candidate outside this deck");
            return Err(AppError::UnknownCandidate(candidate_id.to_string()));
        }

        match self.buffer.peek() {
            Some(top) if top.id == candidate_id => {}
            Some(top) => {
                return Err(AppError::Validation(format!(
                    "Candidate {} is not next in the deck (expected {})",
                    candidate_id, top.id
                )))
            }
            None => {
                return Err(AppError::InvalidState(
                    "No candidates left to swipe".to_string(),
                ))
            }
        }

        let change = self.engine.record_feedback(candidate_id, outcome)?;
        self.buffer.pop();

        Ok(SwipeReceipt {
            change,
            remaining: self.buffer.size(),
            exhausted: self.buffer.is_empty(),
        })
    }

    pub fn rankings(&self) -> Vec<RankedCandidate> {
        self.engine.get_rankings()
    }

    pub fn engine(&self) -> &PreferenceRatingEngine {
        &self.engine
    }
}

/// The first [`TOP_PICKS`] entries of a ranking
pub fn top_picks<T: Clone>(rankings: &[T]) -> Vec<T> {
    rankings.iter().take(TOP_PICKS).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slate() -> Vec<Candidate> {
        [
            ("m1", 0.85),
            ("m2", 0.60),
            ("m3", 0.75),
            ("m4", 0.30),
        ]
        .into_iter()
        .map(|(id, p)| Candidate::new(id, format!("Movie {id}"), vec!["Drama".to_string()], p).unwrap())
        .collect()
    }

    #[test]
    fn test_deck_serves_slate_order() {
        let mut session = SwipeSession::from_slate(&slate(), None).unwrap();
        assert_eq!(session.remaining(), 4);

        let mut served = Vec::new();
        while let Some(next) = session.next().cloned() {
            served.push(next.id.clone());
            session.swipe(&next.id, SwipeOutcome::Accept).unwrap();
        }
        assert_eq!(served, vec!["m1", "m2", "m3", "m4"]);
        assert!(session.is_exhausted());
    }

    #[test]
    fn test_full_session_produces_top_three() {
        let mut session = SwipeSession::from_slate(&slate(), None).unwrap();
        session.swipe("m1", SwipeOutcome::Accept).unwrap();
        session.swipe("m2", SwipeOutcome::Reject).unwrap();
        session.swipe("m3", SwipeOutcome::Accept).unwrap();
        let receipt = session.swipe("m4", SwipeOutcome::Accept).unwrap();
        assert!(receipt.exhausted);
        assert_eq!(receipt.remaining, 0);

        let top: Vec<String> = top_picks(&session.rankings())
            .into_iter()
            .map(|r| r.candidate.id)
            .collect();
        assert_eq!(top, vec!["m4", "m3", "m1"]);
    }

    #[test]
    fn test_unknown_candidate_leaves_deck_untouched() {
        let mut session = SwipeSession::from_slate(&slate(), None).unwrap();
        let result = session.swipe("m42", SwipeOutcome::Accept);
        assert!(matches!(result, Err(AppError::UnknownCandidate(_))));
        assert_eq!(session.remaining(), 4);
    }

    #[test]
    fn test_out_of_order_swipe_is_rejected() {
        let mut session = SwipeSession::from_slate(&slate(), None).unwrap();
        let result = session.swipe("m3", SwipeOutcome::Accept);
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(session.remaining(), 4);
        assert_eq!(session.engine().rating("m3").unwrap().elo_score, BASE_RATING);
    }

    #[test]
    fn test_capacity_smaller_than_slate_fails() {
        let result = SwipeSession::from_slate(&slate(), Some(2));
        assert!(matches!(result, Err(AppError::CapacityExceeded(_))));
    }

    #[test]
    fn test_swipe_after_exhaustion_is_invalid_state() {
        let one = vec![slate().remove(0)];
        let mut session = SwipeSession::from_slate(&one, None).unwrap();
        session.swipe("m1", SwipeOutcome::Reject).unwrap();
        let result = session.swipe("m1", SwipeOutcome::Reject);
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }
}
