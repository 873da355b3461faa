/// Spotify track metadata provider
///
/// API Flow:
/// 1. Token: POST accounts.spotify.com/api/token (client credentials)
/// 2. Track: GET /v1/tracks/{id} → name + first artist
/// 3. Artist: GET /v1/artists/{artist_id} → first genre, "Unknown" when absent
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{Song, SpotifyArtist, SpotifyToken, SpotifyTrack},
    services::providers::TrackMetadataProvider,
};
use reqwest::{header::CONTENT_TYPE, Client as HttpClient};

const TRACK_CACHE_TTL: u64 = 3600; // 1 hour
const TOKEN_CACHE_TTL: u64 = 3000; // tokens live for an hour
const UNKNOWN: &str = "Unknown";

const ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

#[derive(Clone)]
pub struct SpotifyProvider {
    http_client: HttpClient,
    credentials: Option<(String, String)>,
    accounts_url: String,
    api_url: String,
    cache: Option<Cache>,
}

impl SpotifyProvider {
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        cache: Option<Cache>,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            credentials: client_id.zip(client_secret),
            accounts_url: ACCOUNTS_URL.to_string(),
            api_url: API_URL.to_string(),
            cache,
        }
    }

    async fn access_token(&self) -> AppResult<String> {
        let (client_id, client_secret) = self.credentials.as_ref().ok_or_else(|| {
            AppError::MetadataUnavailable(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET are not configured".to_string(),
            )
        })?;

        cached!(self.cache.as_ref(), CacheKey::SpotifyToken, TOKEN_CACHE_TTL, async {
            let response = self
                .http_client
                .post(&self.accounts_url)
                .basic_auth(client_id, Some(client_secret))
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body("grant_type=client_credentials")
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(AppError::MetadataUnavailable(format!(
                    "Spotify authentication failed with status {}",
                    response.status()
                )));
            }

            let token: SpotifyToken = response.json().await?;
            Ok::<String, AppError>(token.access_token)
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> AppResult<T> {
        let url = format!("{}/{}", self.api_url, path);
        let response = self.http_client.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::MetadataUnavailable(format!(
                "API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    async fn fetch_track(&self, track_id: &str) -> AppResult<Song> {
        let token = self.access_token().await?;
        let track: SpotifyTrack = self.get_json(&format!("tracks/{}", track_id), &token).await?;

        let first_artist = track.artists.into_iter().next();
        let artist = first_artist
            .as_ref()
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| "Unknown Artist".to_string());

        // Genre lives on the artist; a failed lookup degrades to "Unknown"
        let mut genre = UNKNOWN.to_string();
        if let Some(artist_id) = first_artist.and_then(|a| a.id) {
            match self
                .get_json::<SpotifyArtist>(&format!("artists/{}", artist_id), &token)
                .await
            {
                Ok(details) => {
                    if let Some(first) = details.genres.into_iter().next() {
                        genre = first;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, artist_id = %artist_id, "Artist genre lookup failed");
                }
            }
        }

        let song = Song {
            name: track.name.unwrap_or_else(|| "Unknown Track".to_string()),
            artist,
            genre,
        };

        tracing::info!(
            track_id = %track_id,
            provider = "spotify",
            "Track metadata fetched"
        );

        Ok(song)
    }
}

/// Extracts the track id from a Spotify URL or URI
///
/// Accepts `https://open.spotify.com/track/<id>[?si=...]` and
/// `spotify:track:<id>`.
pub fn extract_track_id(reference: &str) -> Option<String> {
    const PREFIXES: [&str; 2] = ["spotify.com/track/", "spotify:track:"];

    PREFIXES.iter().find_map(|prefix| {
        let start = reference.find(prefix)? + prefix.len();
        let id: String = reference[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        (!id.is_empty()).then_some(id)
    })
}

#[async_trait::async_trait]
impl TrackMetadataProvider for SpotifyProvider {
    async fn lookup(&self, track_reference: &str) -> AppResult<Song> {
        if track_reference.trim().is_empty() {
            return Err(AppError::Validation("Spotify URL is required".to_string()));
        }

        let track_id = extract_track_id(track_reference)
            .ok_or_else(|| AppError::Validation("Invalid Spotify URL format".to_string()))?;

        cached!(
            self.cache.as_ref(),
            CacheKey::TrackMetadata(track_id.clone()),
            TRACK_CACHE_TTL,
            self.fetch_track(&track_id)
        )
    }

    fn name(&self) -> &'static str {
        "spotify"
    }
}
