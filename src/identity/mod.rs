//! Client identity helpers grouped by concern
//!
//! - [`facts`]: best-effort collection of durable machine identity
//! - [`validation`]: validation of app/instance identity components
//! - [`token`]: deterministic compact token building
//! - [`client_id`]: MQTT client-id composition

pub mod client_id;
pub mod facts;
pub mod token;
pub mod validation;

pub use client_id::{
    build_auto_client_id, derive_client_id, resolve_device_fingerprint,
    DEFAULT_MAX_CLIENT_ID_LEN,
};
pub use facts::{collect_device_facts, DeviceFacts, LinkFact, LinkKind};
