//! Test support utilities
//!
//! Shared helpers for hhcsrv integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use hhcsrv::{
    EngineOptions, Observer, Point, PointRegistry, PollEngine, RegisterSimulator, UpdateEvent,
};

/// Observer that records every notification
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<UpdateEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self) -> Arc<dyn Observer> {
        Arc::new(self.clone())
    }

    pub fn events(&self) -> Vec<UpdateEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn poll_events(&self) -> usize {
        self.count(|e| matches!(e, UpdateEvent::Poll { .. }))
    }

    pub fn stale_events(&self) -> usize {
        self.count(|e| matches!(e, UpdateEvent::Stale))
    }

    fn count(&self, pred: impl Fn(&UpdateEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl Observer for EventRecorder {
    fn on_update(&self, event: &UpdateEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Options with a one-second interval and a three-second staleness window
pub fn fast_options() -> EngineOptions {
    EngineOptions::with_interval(Duration::from_secs(1))
}

pub fn build_engine(sim: &RegisterSimulator, points: Vec<Point>, options: EngineOptions) -> PollEngine {
    let registry = PointRegistry::new(points).expect("valid test registry");
    PollEngine::new(registry, Box::new(sim.clone()), options)
}

/// Give spawned tasks a chance to run (advances the paused clock slightly)
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
