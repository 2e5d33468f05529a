//! In-crate fakes for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use common::api::{ActionPayload, ActionRequest, StatusPayload, Target};

use crate::endpoint::{EndpointClient, EndpointError, Session};

pub fn sample_target(address: &str) -> Target {
    Target {
        address: address.into(),
        name: None,
        group: None,
        username: "Administrator".into(),
        secret: "secret".into(),
        auth_domain: None,
    }
}

/// Endpoint client with per-address scripted results and call instrumentation.
///
/// Unscripted performs succeed with a stock status payload. An optional
/// per-address delay simulates slow endpoints; the in-flight high-water mark
/// verifies the dispatcher's concurrency ceiling.
#[derive(Default)]
pub struct ScriptedClient {
    results: Mutex<HashMap<String, VecDeque<Result<ActionPayload, EndpointError>>>>,
    connect_failures: Mutex<HashMap<String, EndpointError>>,
    delays: Mutex<HashMap<String, Duration>>,
    connect_calls: AtomicU32,
    perform_calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct FlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> FlightGuard<'a> {
    fn enter(client: &'a ScriptedClient) -> Self {
        let current = client.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        client.max_in_flight.fetch_max(current, Ordering::SeqCst);
        Self {
            counter: &client.in_flight,
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedClient {
    pub fn ok_status() -> ActionPayload {
        ActionPayload::Status(StatusPayload {
            power_state: Some("On".into()),
            health: Some("OK".into()),
            ..StatusPayload::default()
        })
    }

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

    pub fn script_connect_auth_failure(&self, address: &str) {
        self.connect_failures.lock().expect("lock").insert(
            address.to_string(),
            EndpointError::auth(address, "login failed"),
        );
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
impl EndpointClient for ScriptedClient {
    async fn connect(&self, target: &Target) -> Result<Session, EndpointError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .connect_failures
            .lock()
            .expect("lock")
            .get(&target.address)
        {
            return Err(err.clone());
        }
        Ok(Session {
            address: target.address.clone(),
            token: Some("fake-token".into()),
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
        let _guard = FlightGuard::enter(self);

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
        scripted.unwrap_or_else(|| Ok(Self::ok_status()))
    }

    async fn close(&self, _session: Session) {}
}
