use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::{AppError, AppResult};

/// A recommended movie served to the swipe interface
///
/// Immutable once created for a session. `predicted_affinity` is the prior
/// supplied by the recommendation service: the probability (0-1) that the
/// participant will like the movie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub genres: Vec<String>,
    pub predicted_affinity: f64,
}

impl Candidate {
    /// Creates a validated candidate
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        genres: Vec<String>,
        predicted_affinity: f64,
    ) -> AppResult<Self> {
        let candidate = Self {
            id: id.into(),
            title: title.into(),
            genres,
            predicted_affinity,
        };
        candidate.validate()?;
        Ok(candidate)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::Validation("Candidate id is required".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "Candidate {} has no title",
                self.id
            )));
        }
        if self.genres.is_empty() || self.genres.iter().any(|g| g.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "Candidate {} needs at least one non-empty genre",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.predicted_affinity) {
            return Err(AppError::Validation(format!(
                "Candidate {} has predicted affinity {} outside [0, 1]",
                self.id, self.predicted_affinity
            )));
        }
        Ok(())
    }
}

/// Binary swipe feedback
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SwipeOutcome {
    #[serde(alias = "right")]
    Accept,
    #[serde(alias = "left")]
    Reject,
}

impl SwipeOutcome {
    /// Observed score fed into the rating update
    pub fn actual_score(self) -> f64 {
        match self {
            SwipeOutcome::Accept => 1.0,
            SwipeOutcome::Reject => 0.0,
        }
    }
}

impl Display for SwipeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwipeOutcome::Accept => write!(f, "accept"),
            SwipeOutcome::Reject => write!(f, "reject"),
        }
    }
}
