#![allow(dead_code)]
//! Shared fakes for engine integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use common::api::{ActionPayload, ActionRequest, CycleReport, StatusPayload, Target};
use engine::config::EngineConfig;
use engine::endpoint::{EndpointClient, EndpointError, Session};
use engine::sink::{ReportSink, SinkError};

pub fn target(address: &str) -> Target {
    Target {
        address: address.into(),
        name: None,
        group: None,
        username: "Administrator".into(),
        secret: "secret".into(),
        auth_domain: None,
    }
}

pub fn grouped_target(address: &str, group: &str) -> Target {
    Target {
        group: Some(group.into()),
        ..target(address)
    }
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry_backoff_ms: 5,
        retry_backoff_max_ms: 10,
        target_timeout_secs: 2,
        ..EngineConfig::default()
    }
}

pub fn ok_status() -> ActionPayload {
    ActionPayload::Status(StatusPayload {
        power_state: Some("On".into()),
        health: Some("OK".into()),
        ..StatusPayload::default()
    })
}

/// Instrumented endpoint client: scripted per-address results, per-address
/// delays, and an in-flight high-water mark for concurrency assertions.
#[derive(Default)]
pub struct InstrumentedClient {
    results: Mutex<HashMap<String, VecDeque<Result<ActionPayload, EndpointError>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    connect_calls: AtomicU32,
    perform_calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct FlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InstrumentedClient {
    pub fn script_result(&self, address: &str, result: Result<ActionPayload, EndpointError>) {
        self.results
            .lock()
            .expect("lock")
            .entry(address.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn script_transient(&self, address: &str, count: usize) {
        for _ in 0..count {
            self.script_result(
                address,
                Err(EndpointError::transient(address, "connection refused")),
            );
        }
    }

    pub fn set_delay(&self, address: &str, delay: Duration) {
        self.delays
            .lock()
            .expect("lock")
            .insert(address.to_string(), delay);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn perform_calls(&self) -> u32 {
        self.perform_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointClient for InstrumentedClient {
    async fn connect(&self, target: &Target) -> Result<Session, EndpointError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Session {
            address: target.address.clone(),
            token: None,
            session_uri: None,
        })
    }

    async fn perform(
        &self,
        _target: &Target,
        session: &Session,
        _action: &ActionRequest,
    ) -> Result<ActionPayload, EndpointError> {
        self.perform_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = FlightGuard {
            counter: &self.in_flight,
        };

        let delay = self
            .delays
            .lock()
            .expect("lock")
            .get(&session.address)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .results
            .lock()
            .expect("lock")
            .get_mut(&session.address)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(ok_status()))
    }

    async fn close(&self, _session: Session) {}
}

#[derive(Default)]
pub struct MemorySink {
    reports: Mutex<Vec<CycleReport>>,
}

impl MemorySink {
    pub fn reports(&self) -> Vec<CycleReport> {
        self.reports.lock().expect("lock").clone()
    }

    pub fn count(&self) -> usize {
        self.reports.lock().expect("lock").len()
    }
}

impl ReportSink for MemorySink {
    fn write(&self, report: &CycleReport) -> Result<(), SinkError> {
        self.reports.lock().expect("lock").push(report.clone());
        Ok(())
    }
}
