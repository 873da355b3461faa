use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{
        Candidate, Member, Party, PartyStatus, PreferencePayload, RecommendationRequest, Song,
        SwipeOutcome, TrackLookupRequest,
    },
    services::{
        party::{DeckState, MemberRankings, PartyResults, SwipeResult},
        providers, recommendations,
    },
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub user_id: String,
}

/// `?userId=` on member-scoped reads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartyResponse {
    pub party: Party,
    pub member: Member,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub user_id: String,
    pub status: PartyStatus,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberAction {
    Join,
    Leave,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberActionRequest {
    pub action: MemberAction,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPreferencesRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub preferences: PreferencePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeRequest {
    pub user_id: String,
    pub candidate_id: String,
    pub outcome: SwipeOutcome,
}

// Parties

pub async fn create_party(
    State(state): State<AppState>,
    Json(request): Json<UserRequest>,
) -> AppResult<(StatusCode, Json<CreatePartyResponse>)> {
    let session = state.parties.create_party(&request.user_id).await?;
    let member = session
        .members
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("Party created without host".to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePartyResponse {
            party: session.party,
            member,
        }),
    ))
}

pub async fn get_party(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Party>> {
    Ok(Json(state.parties.get_party(&slug).await?))
}

/// Host transition request (`PUT /parties/:slug`)
pub async fn update_status(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> AppResult<Json<Party>> {
    tracing::info!(
        request_id = %request_id,
        slug = %slug,
        target = %request.status,
        "Party status change requested"
    );

    let party = state
        .parties
        .update_status(&slug, &request.user_id, request.status)
        .await?;
    Ok(Json(party))
}

pub async fn force_complete(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Json(request): Json<UserRequest>,
) -> AppResult<Json<Party>> {
    tracing::info!(request_id = %request_id, slug = %slug, "Forced completion requested");
    Ok(Json(
        state.parties.force_complete(&slug, &request.user_id).await?,
    ))
}

// Membership

pub async fn list_members(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Vec<Member>>> {
    Ok(Json(state.parties.members(&slug).await?))
}

/// Join returns the new member; leave returns the party after departure
pub async fn member_action(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<MemberActionRequest>,
) -> AppResult<Response> {
    match request.action {
        MemberAction::Join => {
            let member = state.parties.join(&slug, &request.user_id).await?;
            Ok((StatusCode::CREATED, Json(member)).into_response())
        }
        MemberAction::Leave => {
            let party = state.parties.leave(&slug, &request.user_id).await?;
            Ok(Json(party).into_response())
        }
    }
}

pub async fn my_membership(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Member>> {
    Ok(Json(state.parties.membership(&slug, &query.user_id).await?))
}

pub async fn submit_preferences(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<SubmitPreferencesRequest>,
) -> AppResult<Json<Member>> {
    let member = state
        .parties
        .submit_preferences(&slug, &request.user_id, request.preferences)
        .await?;
    Ok(Json(member))
}

// Swiping

pub async fn party_movies(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Vec<Candidate>>> {
    Ok(Json(state.parties.movies(&slug).await?))
}

pub async fn next_candidate(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<DeckState>> {
    Ok(Json(
        state.parties.next_candidate(&slug, &query.user_id).await?,
    ))
}

pub async fn swipe(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<SwipeRequest>,
) -> AppResult<Json<SwipeResult>> {
    let result = state
        .parties
        .swipe(
            &slug,
            &request.user_id,
            &request.candidate_id,
            request.outcome,
        )
        .await?;
    Ok(Json(result))
}

pub async fn complete_swiping(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<UserRequest>,
) -> AppResult<Json<Party>> {
    Ok(Json(
        state
            .parties
            .complete_swiping(&slug, &request.user_id)
            .await?,
    ))
}

pub async fn member_rankings(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<MemberRankings>> {
    Ok(Json(state.parties.rankings(&slug, &query.user_id).await?))
}

pub async fn party_results(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<PartyResults>> {
    Ok(Json(state.parties.results(&slug).await?))
}

// Standalone contracts

/// Solo slate for one set of preferences
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<Vec<Candidate>>> {
    let slate = recommendations::generate_slate(
        state.recommender.as_ref(),
        &request,
        state.settings.slate_size,
        state.settings.external_timeout,
    )
    .await?;
    Ok(Json(slate))
}

pub async fn lookup_track(
    State(state): State<AppState>,
    Json(request): Json<TrackLookupRequest>,
) -> AppResult<Json<Song>> {
    let song = providers::lookup_track(
        state.metadata.as_ref(),
        &request.track_reference,
        state.settings.external_timeout,
    )
    .await?;
    Ok(Json(song))
}
