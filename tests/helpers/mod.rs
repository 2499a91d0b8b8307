#![allow(dead_code)]
//! Shared fakes for the integration tests.

pub mod mock_broker;
pub mod mock_sender;

use fanout_notify::{
    app::{App, AppBuilder},
    broker::InMemoryBroker,
    config::Config,
    observability::RecordingObserver,
};
use std::sync::Arc;

/// Configuration with every simulated latency set to zero and no metrics
/// endpoint.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.metrics.enabled = false;
    config.channels.email.simulated_latency_ms = 0;
    config.channels.sms.simulated_latency_ms = 0;
    config.channels.push.simulated_latency_ms = 0;
    config
}

/// An app wired to an inspectable broker and a recording observer.
pub struct TestApp {
    pub app: App,
    pub broker: InMemoryBroker,
    pub observer: RecordingObserver,
}

impl TestApp {
    pub async fn start(configure: impl FnOnce(AppBuilder) -> AppBuilder) -> TestApp {
        let broker = InMemoryBroker::new();
        let observer = RecordingObserver::new();
        let builder = App::builder(fast_config())
            .broker(Arc::new(broker.clone()))
            .observer(Arc::new(observer.clone()));
        let app = configure(builder)
            .build()
            .await
            .expect("app should start");
        TestApp {
            app,
            broker,
            observer,
        }
    }
}
