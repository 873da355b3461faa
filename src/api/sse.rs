//! Server-Sent Events stream of party changes
//!
//! The first event (`snapshot`) carries the party and its members; every
//! later event is a full-record `partyUpdate` / `memberJoin` / `memberLeave`
//! / `memberUpdate` for the client to apply by id. The stream ends after the
//! party's completion is delivered.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    error::AppResult,
    models::{Member, Party},
};

use super::AppState;

#[derive(Serialize)]
struct Snapshot {
    party: Party,
    members: Vec<Member>,
}

fn encode<T: Serialize>(name: &str, payload: &T) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Event::default().event(name).data(json)),
        Err(e) => {
            tracing::warn!(error = %e, event = name, "Failed to serialize party event");
            None
        }
    }
}

/// GET /parties/:slug/events
pub async fn party_events(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (session, rx) = state.parties.events(&slug).await?;
    tracing::debug!(party_id = %session.party.id, "SSE client connected");

    let snapshot = encode(
        "snapshot",
        &Snapshot {
            party: session.party,
            members: session.members,
        },
    );

    let updates = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => encode(event.name(), &event).map(Ok::<_, Infallible>),
            Err(e) => {
                // Lagged: the client's next full-record events repair its view
                tracing::warn!(error = %e, "SSE subscriber fell behind");
                None
            }
        }
    });

    let stream = stream::iter(snapshot.map(Ok::<_, Infallible>)).chain(updates);

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
