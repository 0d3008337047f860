use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use serde::{Deserialize, Serialize};

use curtain_core::{EngineError, StoreError};

use crate::models::{Performance, PerformanceSummary, Venue};
use crate::scoring::VenueScoring;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        EngineError::Storage(StoreError::Backend(e.to_string()))
    }
}

/// On-disk catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFile {
    #[serde(default)]
    pub venues: Vec<Venue>,
    #[serde(default)]
    pub performances: Vec<Performance>,
}

/// Read-only performance and venue data.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_performances(&self) -> Result<Vec<PerformanceSummary>, CatalogError>;

    /// Performance with its sections filled in from the venue when it has none.
    async fn get_performance(&self, performance_id: &str) -> Result<Option<Performance>, CatalogError>;

    async fn get_venue(&self, venue_id: &str) -> Result<Option<Venue>, CatalogError>;

    async fn scoring_for(&self, venue_id: &str) -> Result<VenueScoring, CatalogError>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    performances: Vec<Performance>,
    venues: HashMap<String, Venue>,
}

impl InMemoryCatalog {
    pub fn new(file: CatalogFile) -> Result<Self, CatalogError> {
        let venues: HashMap<String, Venue> = file
            .venues
            .into_iter()
            .map(|v| (v.venue_id.clone(), v))
            .collect();

        let mut performances = Vec::with_capacity(file.performances.len());
        for mut perf in file.performances {
            if perf.sections.is_empty() {
                let venue = venues.get(&perf.venue_id).ok_or_else(|| {
                    CatalogError::Invalid(format!(
                        "performance {} has no sections and venue {} is unknown",
                        perf.performance_id, perf.venue_id
                    ))
                })?;
                perf.sections = venue.sections.clone();
            }
            performances.push(perf);
        }

        info!(
            performances = performances.len(),
            venues = venues.len(),
            "catalog loaded"
        );
        Ok(Self { performances, venues })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&raw)?;
        Self::new(file)
    }

    pub fn sample() -> Self {
        // The built-in catalog always references its own venue.
        Self::new(crate::sample::sample_catalog()).unwrap_or_default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn list_performances(&self) -> Result<Vec<PerformanceSummary>, CatalogError> {
        Ok(self.performances.iter().map(PerformanceSummary::from).collect())
    }

    async fn get_performance(&self, performance_id: &str) -> Result<Option<Performance>, CatalogError> {
        Ok(self
            .performances
            .iter()
            .find(|p| p.performance_id == performance_id)
            .cloned())
    }

    async fn get_venue(&self, venue_id: &str) -> Result<Option<Venue>, CatalogError> {
        Ok(self.venues.get(venue_id).cloned())
    }

    async fn scoring_for(&self, venue_id: &str) -> Result<VenueScoring, CatalogError> {
        Ok(self
            .venues
            .get(venue_id)
            .and_then(|v| v.scoring.clone())
            .unwrap_or_default())
    }
}
