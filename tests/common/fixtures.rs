use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use milegraph::events::MemoryPublisher;
use milegraph::limiter::{ManualClock, RateLimiter, RateLimiterConfig, TierConfig};
use milegraph::resilience::ResilienceConfig;
use milegraph::service::MilestoneService;
use milegraph::store::InMemoryStore;
use milegraph::workflow::TransitionTable;

#[allow(dead_code)]
pub fn due(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, day).unwrap()
}

/// A service over an in-memory store with handles kept for assertions.
#[allow(dead_code)]
pub struct Harness {
    pub service: MilestoneService<InMemoryStore, MemoryPublisher>,
    pub store: Arc<InMemoryStore>,
    pub publisher: Arc<MemoryPublisher>,
}

/// Default pipeline settings.
#[allow(dead_code)]
pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let publisher = Arc::new(MemoryPublisher::new());
    Harness {
        service: MilestoneService::new(store.clone(), publisher.clone()),
        store,
        publisher,
    }
}

/// Pipeline whose limiter ticks on the returned manual clock.
#[allow(dead_code)]
pub fn harness_with_capacity(read: u32, write: u32) -> (Harness, ManualClock) {
    let clock = ManualClock::new();
    let limiter = RateLimiter::with_clock(
        RateLimiterConfig {
            read: TierConfig::new(read, Duration::from_secs(60)),
            write: TierConfig::new(write, Duration::from_secs(60)),
        },
        Arc::new(clock.clone()),
    );
    let store = Arc::new(InMemoryStore::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let service = MilestoneService::with_limiter(
        store.clone(),
        publisher.clone(),
        limiter,
        ResilienceConfig::default(),
        TransitionTable::default(),
    );
    (
        Harness {
            service,
            store,
            publisher,
        },
        clock,
    )
}
