use std::sync::Arc;

use crate::{
    config::SessionSettings,
    services::{
        party::{PartyService, PartyStore},
        providers::{RecommendationProvider, TrackMetadataProvider},
        sync::RealtimeSync,
    },
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub parties: Arc<PartyService>,
    pub recommender: Arc<dyn RecommendationProvider>,
    pub metadata: Arc<dyn TrackMetadataProvider>,
    pub settings: SessionSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PartyStore>,
        recommender: Arc<dyn RecommendationProvider>,
        metadata: Arc<dyn TrackMetadataProvider>,
        sync: Arc<dyn RealtimeSync>,
        settings: SessionSettings,
    ) -> Self {
        let parties = Arc::new(PartyService::new(
            store,
            recommender.clone(),
            sync,
            settings,
        ));

        Self {
            parties,
            recommender,
            metadata,
            settings,
        }
    }
}
