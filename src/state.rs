use tokio::sync::broadcast;

use crate::config::Config;
use crate::models::delivery::Delivery;
use crate::models::event::DeliveryEvent;
use crate::models::rider::Rider;
use crate::observability::metrics::Metrics;
use crate::store::Repository;

pub struct AppState {
    pub config: Config,
    pub deliveries: Repository<Delivery>,
    pub riders: Repository<Rider>,
    pub events_tx: broadcast::Sender<DeliveryEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            config,
            deliveries: Repository::new(),
            riders: Repository::new(),
            events_tx,
            metrics: Metrics::new(),
        }
    }
}
