use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Candidate, PartyStatus},
    ranking::top_picks,
};

use super::session::PartySession;

/// A slate entry scored across the whole party
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRanking {
    pub candidate: Candidate,
    /// Mean rating across contributing members
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartyResults {
    pub party_id: Uuid,
    pub forced_completion: bool,
    /// Members whose rankings were counted
    pub contributors: usize,
    pub rankings: Vec<GroupRanking>,
    pub top_picks: Vec<GroupRanking>,
}

/// Aggregates finished members' rankings of a completed party
pub fn aggregate(session: &PartySession) -> AppResult<PartyResults> {
    if session.party.status != PartyStatus::Completed {
        return Err(AppError::InvalidState(format!(
            "Results are available once the party completes (currently {})",
            session.party.status
        )));
    }

    let contributions: Vec<_> = session
        .members
        .iter()
        .filter(|m| m.has_completed_swiping)
        .filter_map(|m| session.rankings.get(&m.id))
        .collect();

    let mut rankings: Vec<GroupRanking> = session
        .slate
        .iter()
        .filter_map(|candidate| {
            let scores: Vec<f64> = contributions
                .iter()
                .filter_map(|ranking| {
                    ranking
                        .iter()
                        .find(|r| r.candidate.id == candidate.id)
                        .map(|r| r.elo_score)
                })
                .collect();

            if scores.is_empty() {
                return None;
            }

            Some(GroupRanking {
                candidate: candidate.clone(),
                score: scores.iter().sum::<f64>() / scores.len() as f64,
            })
        })
        .collect();

    // Stable: equal scores stay in slate order
    rankings.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(PartyResults {
        party_id: session.party.id,
        forced_completion: session.party.forced_completion,
        contributors: contributions.len(),
        top_picks: top_picks(&rankings),
        rankings,
    })
}
