//! Shared state of the running daemon.

use std::sync::Arc;
use vigil_core::{
    CollectorSettings, ConcurrentCollector, Config, EventBus, MigrationStatsHandler,
    SocketStatsSource, StatsSource, VmStore,
};

/// Everything the collection loops need, built once at startup.
pub struct Collectors {
    pub config: Config,
    pub settings: CollectorSettings,
    pub events: EventBus,
    pub inventory: VmStore,
    pub source: Arc<dyn StatsSource>,
    /// Batch collector for the domain stats loop
    pub domain: ConcurrentCollector,
    pub migrations: Arc<MigrationStatsHandler>,
}

impl Collectors {
    /// Build the collectors reading stats from the configured socket directory.
    pub fn new(config: Config) -> Self {
        let settings = config.collector_settings();
        let source = Arc::new(SocketStatsSource::new(config.socket_dir(), settings.socket_timeout));
        Self::with_source(config, source)
    }

    /// Build the collectors around an arbitrary stats source.
    pub fn with_source(config: Config, source: Arc<dyn StatsSource>) -> Self {
        let settings = config.collector_settings();
        let events = EventBus::new();
        let inventory = VmStore::with_events(events.clone());
        let migrations = Arc::new(MigrationStatsHandler::new(
            Arc::new(inventory.clone()),
            Arc::clone(&source),
            settings,
        ));

        Self {
            domain: ConcurrentCollector::new(settings.max_in_flight),
            config,
            settings,
            events,
            inventory,
            source,
            migrations,
        }
    }
}
