//! Shared protocol vocabulary
//!
//! Crate-local QoS / retain-handling / protocol-version enums keep the
//! rumqttc v3/v5 type duality out of the public API; the drivers convert at
//! the boundary.

use serde::{Deserialize, Serialize};

/// MQTT delivery guarantee level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("invalid QoS level {other} (expected 0, 1 or 2)")),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> u8 {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl From<QoS> for rumqttc::v5::mqttbytes::QoS {
    fn from(qos: QoS) -> Self {
        use rumqttc::v5::mqttbytes::QoS as V5;
        match qos {
            QoS::AtMostOnce => V5::AtMostOnce,
            QoS::AtLeastOnce => V5::AtLeastOnce,
            QoS::ExactlyOnce => V5::ExactlyOnce,
        }
    }
}

impl From<rumqttc::QoS> for QoS {
    fn from(qos: rumqttc::QoS) -> Self {
        match qos {
            rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

impl From<rumqttc::v5::mqttbytes::QoS> for QoS {
    fn from(qos: rumqttc::v5::mqttbytes::QoS) -> Self {
        use rumqttc::v5::mqttbytes::QoS as V5;
        match qos {
            V5::AtMostOnce => QoS::AtMostOnce,
            V5::AtLeastOnce => QoS::AtLeastOnce,
            V5::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// How the broker forwards retained messages on a new subscription.
///
/// Only meaningful under protocol v5; the v3 driver ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RetainHandling {
    /// Send retained messages on every subscribe.
    #[default]
    SendAll,
    /// Send retained messages only if the subscription did not exist before.
    SendIfNew,
    /// Never send retained messages on subscribe.
    DontSend,
}

impl TryFrom<u8> for RetainHandling {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RetainHandling::SendAll),
            1 => Ok(RetainHandling::SendIfNew),
            2 => Ok(RetainHandling::DontSend),
            other => Err(format!("invalid retain handling {other} (expected 0, 1 or 2)")),
        }
    }
}

impl From<RetainHandling> for u8 {
    fn from(value: RetainHandling) -> u8 {
        match value {
            RetainHandling::SendAll => 0,
            RetainHandling::SendIfNew => 1,
            RetainHandling::DontSend => 2,
        }
    }
}

/// MQTT protocol revision spoken by the underlying client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[default]
    #[serde(rename = "v3")]
    V3_1_1,
    #[serde(rename = "v5")]
    V5,
}

impl ProtocolVersion {
    /// True when v5-only features (properties, subscription options,
    /// session expiry) are on the wire.
    pub fn is_v5(self) -> bool {
        matches!(self, ProtocolVersion::V5)
    }
}
