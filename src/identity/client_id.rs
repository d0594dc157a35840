//! MQTT client-id composition
//!
//! A client id is derived, never configured: the broker sees
//! `<app-prefix>-<token>` where the token hashes the device fingerprint,
//! the app name and (when set) the instance id. The same machine, app and
//! instance always produce the same id across restarts; two apps (or two
//! instances of one app) on the same machine never share one.

use crate::error::ConfigError;
use crate::identity::facts::{self, DeviceFacts, LinkFact, LinkKind};
use crate::identity::token::{compact_token, SEED_SEPARATOR};
use crate::identity::validation::validate_component;

/// Longest client id emitted; 23 bytes is the portable limit brokers are
/// required to accept for MQTT 3.1.1.
pub const DEFAULT_MAX_CLIENT_ID_LEN: usize = 23;

const TOKEN_NAMESPACE: &str = "mqtt-client";

/// Build a stable device fingerprint seed from collected facts.
///
/// Priority: firmware serial, then the first stable link by kind
/// (mac before bluetooth), then hostname.
pub fn resolve_device_fingerprint(serial: Option<&str>, links: &[LinkFact]) -> String {
    if let Some(serial) = serial {
        let serial = serial.trim().to_lowercase();
        if !serial.is_empty() {
            return format!("sn:{serial}");
        }
    }

    let mut sorted: Vec<&LinkFact> = links.iter().collect();
    sorted.sort_by_key(|link| (link.kind, link.address.clone()));
    if let Some(link) = sorted.first() {
        let kind = match link.kind {
            LinkKind::Mac => "mac",
            LinkKind::Bluetooth => "bluetooth",
        };
        return format!("{kind}:{}", link.address);
    }

    match facts::hostname() {
        Some(host) => format!("host:{host}"),
        None => "host:unknown".to_string(),
    }
}

/// Derive a deterministic client id from a fingerprint and app identity.
///
/// Pure: no I/O, no clock, no randomness. Components are validated and
/// normalized, then joined with a separator that is illegal inside them,
/// so distinct `(app_name, instance_id)` pairs cannot collide.
pub fn derive_client_id(
    fingerprint: &str,
    app_name: &str,
    instance_id: Option<&str>,
) -> Result<String, ConfigError> {
    let app_name = validate_component(app_name, "app_name")?;
    let instance_id = instance_id
        .map(|id| validate_component(id, "instance_id"))
        .transpose()?;

    let mut seed = format!("{fingerprint}{SEED_SEPARATOR}{app_name}");
    if let Some(instance_id) = &instance_id {
        seed.push(SEED_SEPARATOR);
        seed.push_str(instance_id);
    }

    let token_len = DEFAULT_MAX_CLIENT_ID_LEN.saturating_sub(4).clamp(8, 12);
    let token = compact_token(&seed, token_len, Some(TOKEN_NAMESPACE));

    let prefix_budget = DEFAULT_MAX_CLIENT_ID_LEN - token.len() - 1;
    // app_name is normalized ASCII, so byte slicing is char-safe
    let prefix = &app_name[..app_name.len().min(prefix_budget)];
    if prefix.is_empty() {
        return Ok(token);
    }

    let mut client_id = format!("{prefix}-{token}");
    client_id.truncate(DEFAULT_MAX_CLIENT_ID_LEN);
    Ok(client_id)
}

/// Collect device facts and derive the client id in one step.
pub fn build_auto_client_id(
    app_name: &str,
    instance_id: Option<&str>,
) -> Result<String, ConfigError> {
    let DeviceFacts { serial, links } = facts::collect_device_facts();
    let fingerprint = resolve_device_fingerprint(serial.as_deref(), &links);
    derive_client_id(&fingerprint, app_name, instance_id)
}
