use axum::body::Body;
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

/// Type alias for the IP-based governor layer used on public routes
pub type PublicGovernorLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    Body,
>;

/// Create a GovernorLayer for the unauthenticated auth routes (per IP):
/// 20 requests per minute, keeping credential brute-force slow without
/// affecting logged-in traffic.
pub fn create_public_governor() -> PublicGovernorLayer {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(3)
            .burst_size(20)
            .finish()
            .unwrap(),
    );

    GovernorLayer::new(config)
}
