//! Availability and model catalog of the local inference service.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{
    api::llm::{HealthResponse, InferenceApi, ServiceInfo},
    events::{AppEvent, spawn_reported},
};

#[derive(Debug)]
pub enum MonitorEvent {
    Health {
        seq: u64,
        outcome: Result<HealthResponse, String>,
    },
    Info(Result<ServiceInfo, String>),
}

/// Model to use after a catalog update: an existing choice always wins,
/// otherwise the first catalog entry.
pub fn default_model(catalog: &[String], current: Option<&str>) -> Option<String> {
    match current {
        Some(m) if !m.is_empty() => Some(m.to_string()),
        _ => catalog.first().cloned(),
    }
}

/// Last known health of the inference service.
#[derive(Debug, Default)]
pub struct ServiceMonitor {
    pub available: bool,
    pub loading: bool,
    /// Catalog in server order. Kept when a later check fails.
    pub models: Vec<String>,
    pub selected: Option<String>,
    pub info: Option<ServiceInfo>,
    /// Sequence of the latest health check; older replies are ignored.
    seq: u64,
}

impl ServiceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check health in the background.
    pub fn refresh(&mut self, api: Arc<dyn InferenceApi>, tx: mpsc::Sender<AppEvent>) {
        self.seq += 1;
        self.loading = true;
        let seq = self.seq;
        spawn_reported(
            tx,
            async move { api.health().await.map_err(|e| e.to_string()) },
            move |outcome| AppEvent::Monitor(MonitorEvent::Health { seq, outcome }),
        );
    }

    /// Fetch the service name and version for the header.
    pub fn load_info(&self, api: Arc<dyn InferenceApi>, tx: mpsc::Sender<AppEvent>) {
        spawn_reported(
            tx,
            async move { api.service_info().await.map_err(|e| e.to_string()) },
            |outcome| AppEvent::Monitor(MonitorEvent::Info(outcome)),
        );
    }

    /// Explicit user choice; never replaced by a later health check.
    pub fn select(&mut self, model: impl Into<String>) {
        let model = model.into();
        tracing::info!("model selected: {model}");
        self.selected = Some(model);
    }

    /// Move the selection by `step` within the catalog, wrapping around.
    pub fn cycle(&mut self, step: isize) {
        if self.models.is_empty() {
            return;
        }
        let len = self.models.len() as isize;
        let cur = self
            .selected
            .as_ref()
            .and_then(|s| self.models.iter().position(|m| m == s))
            .map_or(-1, |i| i as isize);
        let next = (cur + step).rem_euclid(len) as usize;
        self.select(self.models[next].clone());
    }

    pub fn apply(&mut self, ev: MonitorEvent) {
        match ev {
            MonitorEvent::Health { seq, outcome } => {
                if seq != self.seq {
                    tracing::debug!("dropping superseded health reply ({seq})");
                    return;
                }
                // Released first so no branch below can leave it set.
                self.loading = false;
                match outcome {
                    Ok(health) => {
                        tracing::info!(
                            "health: {} available={}",
                            health.status,
                            health.service_available
                        );
                        self.available = health.service_available;
                        if let Some(models) = health.available_models
                            && !models.is_empty()
                        {
                            self.selected = default_model(&models, self.selected.as_deref());
                            self.models = models;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("health check failed: {e}");
                        self.available = false;
                    }
                }
            }
            MonitorEvent::Info(Ok(info)) => self.info = Some(info),
            MonitorEvent::Info(Err(e)) => tracing::warn!("service info unavailable: {e}"),
        }
    }
}
