use std::sync::Arc;
use tokio::sync::broadcast;

use curtain_booking::{HoldPolicyKind, HoldRules, HoldingManager, ReservationDesk};
use curtain_catalog::CatalogRepository;
use curtain_core::{Clock, EventPublisher, FanoutPublisher, SeatLedger, TokenVerifier, TracingPublisher};
use curtain_seating::{AvailabilityProjector, SeatRecommender};
use curtain_shared::models::events::BookingEvent;

use crate::auth::JwtVerifier;
use crate::metrics::Metrics;
use crate::stream::BroadcastPublisher;

const SSE_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub holdings: Arc<HoldingManager>,
    pub desk: Arc<ReservationDesk>,
    pub recommender: Arc<SeatRecommender>,
    pub projector: AvailabilityProjector,
    pub clock: Arc<dyn Clock>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub publisher: Arc<dyn EventPublisher>,
    pub sse_tx: broadcast::Sender<BookingEvent>,
    pub metrics: Metrics,
    pub auth: AuthConfig,
}

/// Everything the engine needs from the outside world.
pub struct EngineParts {
    pub catalog: Arc<dyn CatalogRepository>,
    pub ledger: Arc<dyn SeatLedger>,
    pub clock: Arc<dyn Clock>,
    /// Extra sinks (Kafka) on top of the log, SSE and metrics.
    pub sinks: Vec<Arc<dyn EventPublisher>>,
    pub rules: HoldRules,
    pub policy: HoldPolicyKind,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn assemble(parts: EngineParts) -> Result<Self, prometheus::Error> {
        let metrics = Metrics::new()?;
        let (sse_tx, _) = broadcast::channel(SSE_CHANNEL_CAPACITY);

        let mut fanout = FanoutPublisher::new()
            .with(Arc::new(TracingPublisher))
            .with(Arc::new(BroadcastPublisher::new(sse_tx.clone())))
            .with(Arc::new(metrics.clone()));
        for sink in parts.sinks {
            fanout = fanout.with(sink);
        }
        let publisher: Arc<dyn EventPublisher> = Arc::new(fanout);

        let projector = AvailabilityProjector::new(parts.catalog.clone(), parts.ledger.clone(), parts.clock.clone());
        let holdings = HoldingManager::new(
            parts.catalog.clone(),
            parts.ledger.clone(),
            parts.policy.build(),
            publisher.clone(),
            parts.clock.clone(),
            parts.rules,
        );
        let recommender = SeatRecommender::new(parts.catalog.clone(), projector.clone(), parts.rules.max_party_size);
        let desk = ReservationDesk::new(parts.ledger, publisher.clone(), parts.clock.clone());

        Ok(Self {
            catalog: parts.catalog,
            holdings: Arc::new(holdings),
            desk: Arc::new(desk),
            recommender: Arc::new(recommender),
            projector,
            clock: parts.clock,
            verifier: Arc::new(JwtVerifier::new(&parts.auth.secret)),
            publisher,
            sse_tx,
            metrics,
            auth: parts.auth,
        })
    }
}
