/// External data providers
///
/// The recommendation service (an LLM asked for a scored movie slate) and the
/// track metadata service (Spotify) are reached through these traits, so the
/// party flow can run against stubs in tests and against real APIs in
/// production.
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{RecommendationRequest, RecommendedMovie, Song},
};

pub mod perplexity;
pub mod spotify;

pub use perplexity::PerplexityProvider;
pub use spotify::SpotifyProvider;

/// Source of scored movie slates
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationProvider: Send + Sync {
    /// Asks for up to `count` movies matching `request`
    ///
    /// Implementations return the raw provider output; validation and the
    /// mapping into candidates happen in
    /// [`recommendations`](crate::services::recommendations).
    async fn recommend(
        &self,
        request: &RecommendationRequest,
        count: usize,
    ) -> AppResult<Vec<RecommendedMovie>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Resolves a track reference (URL or URI) to song metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TrackMetadataProvider: Send + Sync {
    async fn lookup(&self, track_reference: &str) -> AppResult<Song>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Resolves `track_reference`, giving up after `timeout`
pub async fn lookup_track(
    provider: &dyn TrackMetadataProvider,
    track_reference: &str,
    timeout: Duration,
) -> AppResult<Song> {
    match tokio::time::timeout(timeout, provider.lookup(track_reference)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?timeout, provider = provider.name(), "Track lookup timed out");
            Err(AppError::MetadataUnavailable(format!(
                "No response within {}s",
                timeout.as_secs()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_track_passes_result_through() {
        let mut provider = MockTrackMetadataProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_lookup()
            .withf(|reference| reference == "spotify:track:abc")
            .returning(|_| {
                Ok(Song {
                    name: "Motion Sickness".to_string(),
                    artist: "Phoebe Bridgers".to_string(),
                    genre: "indie".to_string(),
                })
            });

        let song = lookup_track(&provider, "spotify:track:abc", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(song.artist, "Phoebe Bridgers");
    }

    #[tokio::test]
    async fn test_lookup_track_keeps_validation_errors() {
        let mut provider = MockTrackMetadataProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_lookup()
            .returning(|_| Err(AppError::Validation("Invalid Spotify URL format".to_string())));

        let result = lookup_track(&provider, "nope", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
