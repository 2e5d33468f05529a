//! Redfish endpoint adapter for server BMCs.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use common::api::{
    ActionKind, ActionPayload, ActionRequest, MetricsPayload, PolicyPayload, PowerPayload,
    StatusPayload, Target,
};

use crate::config::EngineConfig;
use crate::endpoint::{EndpointClient, EndpointError, Session};

const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// BIOS attribute names that carry the power regulator setting, most specific
/// first. Vendors disagree on the key; probe the known ones before falling
/// back to a substring match.
const POLICY_ATTRIBUTE_KEYS: &[&str] = &[
    "PowerProfile",
    "WorkloadProfile",
    "SysProfile",
    "HPStaticPowerRegulator",
    "PowerRegulator",
];

#[derive(Clone)]
pub struct RedfishClient {
    client: reqwest::Client,
    scheme: &'static str,
}

impl RedfishClient {
    pub fn new(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs));

        if cfg.tls_insecure_skip_verify {
            warn!("TLS certificate verification is disabled; use only for lab BMCs");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let scheme = if cfg.allow_insecure_http {
            warn!("plain HTTP endpoint scheme in use; traffic will be unencrypted");
            "http"
        } else {
            "https"
        };

        Ok(Self {
            client: builder.build()?,
            scheme,
        })
    }

    async fn get_json(&self, session: &Session, url: String) -> Result<Value, EndpointError> {
        let mut request = self.client.get(url);
        if let Some(token) = &session.token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }
        let res = request
            .send()
            .await
            .map_err(|err| transport_error(&session.address, &err))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_status(&session.address, status, &body));
        }

        res.json::<Value>()
            .await
            .map_err(|err| EndpointError::terminal(&session.address, format!("invalid JSON: {err}")))
    }

    async fn post_action(
        &self,
        session: &Session,
        url: String,
        body: Value,
    ) -> Result<(), EndpointError> {
        let mut request = self.client.post(url).json(&body);
        if let Some(token) = &session.token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }
        let res = request
            .send()
            .await
            .map_err(|err| transport_error(&session.address, &err))?;

        let status = res.status();
        // BMCs answer reset requests with 200, 202, or 204 depending on firmware.
        if matches!(status.as_u16(), 200 | 202 | 204) {
            return Ok(());
        }
        let text = res.text().await.unwrap_or_default();
        Err(classify_status(&session.address, status, &text))
    }

    async fn patch_json(
        &self,
        session: &Session,
        url: String,
        body: Value,
    ) -> Result<(), EndpointError> {
        let mut request = self.client.patch(url).json(&body);
        if let Some(token) = &session.token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }
        let res = request
            .send()
            .await
            .map_err(|err| transport_error(&session.address, &err))?;

        let status = res.status();
        if matches!(status.as_u16(), 200 | 202 | 204) {
            return Ok(());
        }
        let text = res.text().await.unwrap_or_default();
        Err(classify_status(&session.address, status, &text))
    }

    async fn fetch_status(
        &self,
        session: &Session,
        detailed: bool,
    ) -> Result<ActionPayload, EndpointError> {
        let system = self
            .get_json(session, system_url(self.scheme, &session.address))
            .await?;

        let mut payload = StatusPayload {
            model: string_field(&system, "Model"),
            serial: system_identifier(&system),
            power_state: string_field(&system, "PowerState"),
            health: system_health(&system),
            bios_version: string_field(&system, "BiosVersion"),
            watts: None,
            cpu_percent: None,
        };

        if detailed {
            payload.watts = self.fetch_watts(session).await;
            payload.cpu_percent = cpu_utilization(&system);
        }

        Ok(ActionPayload::Status(payload))
    }

    async fn fetch_metrics(&self, session: &Session) -> Result<ActionPayload, EndpointError> {
        let system = self
            .get_json(session, system_url(self.scheme, &session.address))
            .await?;

        Ok(ActionPayload::Metrics(MetricsPayload {
            watts: self.fetch_watts(session).await,
            cpu_percent: cpu_utilization(&system),
        }))
    }

    /// Power reading is best-effort: older chassis firmware omits the
    /// PowerControl resource entirely.
    async fn fetch_watts(&self, session: &Session) -> Option<f64> {
        match self
            .get_json(session, chassis_power_url(self.scheme, &session.address))
            .await
        {
            Ok(power) => power
                .get("PowerControl")
                .and_then(Value::as_array)
                .and_then(|controls| controls.first())
                .and_then(|control| control.get("PowerConsumedWatts"))
                .and_then(Value::as_f64),
            Err(err) => {
                debug!(address = %session.address, error = %err, "power reading unavailable");
                None
            }
        }
    }

    async fn transition_power(
        &self,
        session: &Session,
        reset_type: &str,
    ) -> Result<ActionPayload, EndpointError> {
        let system = self
            .get_json(session, system_url(self.scheme, &session.address))
            .await?;
        let current = string_field(&system, "PowerState");

        // Already in the requested state: report success without posting a reset.
        if current.as_deref() == Some(desired_power_state(reset_type)) {
            return Ok(ActionPayload::Power(PowerPayload {
                reset_type: reset_type.to_string(),
                state_changed: false,
            }));
        }

        self.post_action(
            session,
            reset_url(self.scheme, &session.address),
            json!({ "ResetType": reset_type }),
        )
        .await?;

        Ok(ActionPayload::Power(PowerPayload {
            reset_type: reset_type.to_string(),
            state_changed: true,
        }))
    }

    async fn fetch_policy(&self, session: &Session) -> Result<ActionPayload, EndpointError> {
        let bios = self
            .get_json(session, bios_url(self.scheme, &session.address))
            .await?;

        let Some((key, value)) = find_policy_attribute(&bios) else {
            return Ok(ActionPayload::Policy(PolicyPayload::default()));
        };

        let allowed = bios
            .get(format!("{key}@Redfish.AllowableValues"))
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ActionPayload::Policy(PolicyPayload {
            policy: Some(value),
            allowed,
        }))
    }

    async fn apply_policy(
        &self,
        session: &Session,
        policy: &str,
    ) -> Result<ActionPayload, EndpointError> {
        let bios = self
            .get_json(session, bios_url(self.scheme, &session.address))
            .await?;

        let Some((key, _)) = find_policy_attribute(&bios) else {
            return Err(EndpointError::terminal(
                &session.address,
                "endpoint exposes no power policy attribute",
            ));
        };

        self.patch_json(
            session,
            bios_settings_url(self.scheme, &session.address),
            json!({ "Attributes": { key: policy } }),
        )
        .await?;

        Ok(ActionPayload::Policy(PolicyPayload {
            policy: Some(policy.to_string()),
            allowed: Vec::new(),
        }))
    }
}

#[async_trait]
impl EndpointClient for RedfishClient {
    async fn connect(&self, target: &Target) -> Result<Session, EndpointError> {
        let res = self
            .client
            .post(sessions_url(self.scheme, &target.address))
            .json(&json!({
                "UserName": target.username,
                "Password": target.secret,
            }))
            .send()
            .await
            .map_err(|err| transport_error(&target.address, &err))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(EndpointError::auth(
                    &target.address,
                    format!("login failed: {status}"),
                ));
            }
            return Err(classify_status(&target.address, status, &body));
        }

        let token = res
            .headers()
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let session_uri = res
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if token.is_none() {
            warn!(address = %target.address, "session created without auth token");
        }

        Ok(Session {
            address: target.address.clone(),
            token,
            session_uri,
        })
    }

    async fn perform(
        &self,
        _target: &Target,
        session: &Session,
        action: &ActionRequest,
    ) -> Result<ActionPayload, EndpointError> {
        match action.kind {
            ActionKind::Status => self.fetch_status(session, action.detailed).await,
            ActionKind::Metrics => self.fetch_metrics(session).await,
            ActionKind::PowerOn => self.transition_power(session, "On").await,
            ActionKind::PowerOffGraceful => {
                self.transition_power(session, "GracefulShutdown").await
            }
            ActionKind::PowerOffForced => self.transition_power(session, "ForceOff").await,
            ActionKind::GetPowerPolicy => self.fetch_policy(session).await,
            ActionKind::SetPowerPolicy => {
                let policy = action.policy.as_deref().ok_or_else(|| {
                    EndpointError::terminal(&session.address, "set-power-policy requires a policy")
                })?;
                self.apply_policy(session, policy).await
            }
        }
    }

    async fn close(&self, session: Session) {
        let Some(uri) = session.session_uri.clone() else {
            return;
        };
        let url = absolute_session_url(self.scheme, &session.address, &uri);
        let mut request = self.client.delete(url);
        if let Some(token) = &session.token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }
        if let Err(err) = request.send().await {
            debug!(address = %session.address, error = %err, "session logout failed");
        }
    }
}

fn transport_error(address: &str, err: &reqwest::Error) -> EndpointError {
    let detail = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("transport error: {err}")
    };
    EndpointError::transient(address, detail)
}

fn classify_status(address: &str, status: StatusCode, body: &str) -> EndpointError {
    let message = if body.trim().is_empty() {
        format!("status {status}")
    } else {
        format!("status {status}: {}", truncate(body, 200))
    };

    match status.as_u16() {
        401 | 403 => EndpointError::auth(address, message),
        408 | 429 => EndpointError::transient(address, message),
        500..=599 => EndpointError::transient(address, message),
        _ => EndpointError::terminal(address, message),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// AssetTag wins over SerialNumber when both are populated.
fn system_identifier(system: &Value) -> Option<String> {
    string_field(system, "AssetTag").or_else(|| string_field(system, "SerialNumber"))
}

/// HealthRollup covers subsystems; plain Health is the fallback.
fn system_health(system: &Value) -> Option<String> {
    let status = system.get("Status")?;
    string_field(status, "HealthRollup").or_else(|| string_field(status, "Health"))
}

fn cpu_utilization(system: &Value) -> Option<f64> {
    system
        .get("Oem")
        .and_then(|oem| oem.get("Hpe"))
        .and_then(|hpe| hpe.get("SystemUsage"))
        .and_then(|usage| usage.get("CPUUtil"))
        .and_then(Value::as_f64)
}

fn desired_power_state(reset_type: &str) -> &'static str {
    match reset_type {
        "On" => "On",
        _ => "Off",
    }
}

fn find_policy_attribute(bios: &Value) -> Option<(String, String)> {
    let attrs = bios.get("Attributes").and_then(Value::as_object)?;

    for key in POLICY_ATTRIBUTE_KEYS {
        if let Some(value) = attrs.get(*key).and_then(Value::as_str) {
            return Some((key.to_string(), value.to_string()));
        }
    }

    attrs.iter().find_map(|(key, value)| {
        let lower = key.to_ascii_lowercase();
        let looks_like_policy = lower.contains("power")
            && ["profile", "regulator", "mode"]
                .iter()
                .any(|term| lower.contains(term));
        match (looks_like_policy, value.as_str()) {
            (true, Some(v)) => Some((key.clone(), v.to_string())),
            _ => None,
        }
    })
}

fn base_url(scheme: &str, address: &str) -> String {
    format!("{scheme}://{}", address.trim_end_matches('/'))
}

fn sessions_url(scheme: &str, address: &str) -> String {
    format!("{}/redfish/v1/SessionService/Sessions", base_url(scheme, address))
}

fn system_url(scheme: &str, address: &str) -> String {
    format!("{}/redfish/v1/Systems/1/", base_url(scheme, address))
}

fn chassis_power_url(scheme: &str, address: &str) -> String {
    format!("{}/redfish/v1/Chassis/1/Power", base_url(scheme, address))
}

fn reset_url(scheme: &str, address: &str) -> String {
    format!(
        "{}/redfish/v1/Systems/1/Actions/ComputerSystem.Reset",
        base_url(scheme, address)
    )
}

fn bios_url(scheme: &str, address: &str) -> String {
    format!("{}/redfish/v1/Systems/1/bios/", base_url(scheme, address))
}

fn bios_settings_url(scheme: &str, address: &str) -> String {
    format!(
        "{}/redfish/v1/Systems/1/bios/settings/",
        base_url(scheme, address)
    )
}

fn absolute_session_url(scheme: &str, address: &str, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_string()
    } else {
        format!("{}{}", base_url(scheme, address), uri)
    }
}
