use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{Candidate, RecommendationRequest, RecommendedMovie},
    services::providers::RecommendationProvider,
};

/// Maps provider output into a candidate slate
///
/// Candidates are numbered `m1..mN` in provider order. Entries that violate
/// the contract (blank title, no genre, score outside [0, 1]) are dropped
/// with a warning, and at most `limit` candidates are kept.
pub fn to_candidates(movies: Vec<RecommendedMovie>, limit: usize) -> AppResult<Vec<Candidate>> {
    let received = movies.len();

    let candidates: Vec<Candidate> = movies
        .into_iter()
        .filter_map(|movie| {
            let title = movie.title.trim().to_string();
            let genres: Vec<String> = movie
                .genre
                .iter()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect();

            let probe = Candidate {
                id: "probe".to_string(),
                title,
                genres,
                predicted_affinity: movie.expected_score,
            };
            match probe.validate() {
                Ok(()) => Some(probe),
                Err(e) => {
                    tracing::warn!(error = %e, title = %movie.title, "Dropping malformed recommendation");
                    None
                }
            }
        })
        .take(limit)
        .enumerate()
        .map(|(i, mut candidate)| {
            candidate.id = format!("m{}", i + 1);
            candidate
        })
        .collect();

    if candidates.is_empty() {
        return Err(AppError::RecommendationUnavailable(format!(
            "No usable movies among {} recommendations",
            received
        )));
    }

    if candidates.len() < limit {
        tracing::warn!(
            requested = limit,
            usable = candidates.len(),
            "Recommendation slate is short"
        );
    }

    Ok(candidates)
}

/// Requests a slate of `count` candidates for `request`
///
/// The provider call is bounded by `timeout`; a timeout or any provider
/// failure surfaces as [`AppError::RecommendationUnavailable`].
pub async fn generate_slate(
    provider: &dyn RecommendationProvider,
    request: &RecommendationRequest,
    count: usize,
    timeout: Duration,
) -> AppResult<Vec<Candidate>> {
    request.validate()?;

    tracing::info!(
        provider = provider.name(),
        genres = request.preferred_genres.len(),
        songs = request.songs.as_ref().map_or(0, Vec::len),
        count,
        "Requesting recommendation slate"
    );

    let movies = match tokio::time::timeout(timeout, provider.recommend(request, count)).await {
        Ok(Ok(movies)) => movies,
        Ok(Err(AppError::RecommendationUnavailable(msg))) => {
            return Err(AppError::RecommendationUnavailable(msg))
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, provider = provider.name(), "Recommendation provider failed");
            return Err(AppError::RecommendationUnavailable(e.to_string()));
        }
        Err(_) => {
            tracing::warn!(?timeout, provider = provider.name(), "Recommendation request timed out");
            return Err(AppError::RecommendationUnavailable(format!(
                "No response within {}s",
                timeout.as_secs()
            )));
        }
    };

    to_candidates(movies, count)
}
