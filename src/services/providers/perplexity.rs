/// Perplexity chat-completions recommendation provider
///
/// Sends the participant's genres and songs in a prompt that demands a JSON
/// document `{"movies": [{"title", "genre", "expectedScore"}]}` and parses the
/// model's reply into [`RecommendedMovie`]s.
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{RecommendationRequest, RecommendedMovie, RecommendedMovieList},
    services::providers::RecommendationProvider,
};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Clone)]
pub struct PerplexityProvider {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    model: String,
}

impl PerplexityProvider {
    pub fn new(api_key: Option<String>, api_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            model,
        }
    }
}

/// Builds the instruction sent to the model
pub fn build_prompt(request: &RecommendationRequest, count: usize) -> String {
    let songs_section = match request.songs.as_deref() {
        Some(songs) if !songs.is_empty() => {
            let lines: Vec<String> = songs
                .iter()
                .map(|song| format!("- \"{}\" by {} ({})", song.name, song.artist, song.genre))
                .collect();
            format!("User's favorite songs:\n{}\n", lines.join("\n"))
        }
        _ => String::new(),
    };

    format!(
        "You are an expert at creating movie recommendations based on a user's preferences.\n\
         \n\
         User's preferred genres: {genres}\n\
         {songs_section}\n\
         Based on these preferences, recommend exactly {count} movies that match the user's taste in music and genres.\n\
         \n\
         For each movie, provide:\n\
         1. The movie title\n\
         2. The movie's genres (as an array of genre strings)\n\
         3. An expectedScore (a number between 0 and 1) representing the probability that the user will like this movie.\n\
         \x20  - Higher scores (0.6-1.0) mean you're confident the user will like it (popular, well-matched)\n\
         \x20  - Lower scores (0.0-0.4) mean it's a hidden gem that might surprise them\n\
         \n\
         Respond with only a JSON object of the form \
         {{\"movies\": [{{\"title\": string, \"genre\": [string], \"expectedScore\": number}}]}} and no other text.",
        genres = request.preferred_genres.join(", "),
    )
}

/// Extracts the movie list from a model reply
///
/// Models often wrap JSON in prose or code fences, so only the outermost
/// `{ ... }` span is parsed.
pub fn parse_movies(content: &str) -> AppResult<Vec<RecommendedMovie>> {
    let start = content.find('{');
    let end = content.rfind('}');

    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Err(AppError::RecommendationUnavailable(
                "Model reply contained no JSON object".to_string(),
            ))
        }
    };

    let list: RecommendedMovieList = serde_json::from_str(json).map_err(|e| {
        AppError::RecommendationUnavailable(format!("Model reply was not a movie list: {}", e))
    })?;

    Ok(list.movies)
}

#[async_trait::async_trait]
impl RecommendationProvider for PerplexityProvider {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
        count: usize,
    ) -> AppResult<Vec<RecommendedMovie>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::RecommendationUnavailable("PERPLEXITY_API_KEY is not configured".to_string())
        })?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: build_prompt(request, count),
            }],
        };

        let url = format!("{}/chat/completions", self.api_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RecommendationUnavailable(format!(
                "API returned status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::RecommendationUnavailable("Model returned no choices".to_string())
            })?;

        let movies = parse_movies(&content)?;

        tracing::info!(
            genres = request.preferred_genres.len(),
            requested = count,
            returned = movies.len(),
            provider = "perplexity",
            "Recommendations generated"
        );

        Ok(movies)
    }

    fn name(&self) -> &'static str {
        "perplexity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Song;

    fn request() -> RecommendationRequest {
        RecommendationRequest {
            preferred_genres: vec!["drama".to_string(), "romance".to_string()],
            songs: Some(vec![Song {
                name: "Why am I like this?".to_string(),
                artist: "Orla Gartland".to_string(),
                genre: "indie".to_string(),
            }]),
        }
    }

    #[test]
    fn test_prompt_lists_genres_songs_and_count() {
        let prompt = build_prompt(&request(), 10);
        assert!(prompt.contains("User's preferred genres: drama, romance"));
        assert!(prompt.contains("- \"Why am I like this?\" by Orla Gartland (indie)"));
        assert!(prompt.contains("exactly 10 movies"));
        assert!(prompt.contains("\"expectedScore\""));
    }

    #[test]
    fn test_prompt_without_songs_has_no_song_section() {
        let request = RecommendationRequest {
            preferred_genres: vec!["sci-fi".to_string()],
            songs: None,
        };
        assert!(!build_prompt(&request, 5).contains("favorite songs"));
    }

    #[test]
    fn test_parse_movies_from_fenced_reply() {
        let content = "Here you go:\n```json\n{\"movies\": [{\"title\": \"Past Lives\", \"genre\": [\"Drama\", \"Romance\"], \"expectedScore\": 0.8}]}\n```";
        let movies = parse_movies(content).unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Past Lives");
        assert_eq!(movies[0].expected_score, 0.8);
    }

    #[test]
    fn test_parse_movies_rejects_prose() {
        let result = parse_movies("I cannot help with that.");
        assert!(matches!(result, Err(AppError::RecommendationUnavailable(_))));
    }

    #[test]
    fn test_parse_movies_rejects_wrong_shape() {
        let result = parse_movies("{\"films\": []}");
        assert!(matches!(result, Err(AppError::RecommendationUnavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let provider = PerplexityProvider::new(
            None,
            "http://test.local".to_string(),
            "sonar".to_string(),
        );
        let result = provider.recommend(&request(), 10).await;
        assert!(matches!(result, Err(AppError::RecommendationUnavailable(_))));
    }
}
