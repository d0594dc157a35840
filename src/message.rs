//! Inbound message wrapper with lazy, cached payload interpretation
//!
//! One [`MqttMessage`] is built per inbound packet and handed to every
//! matching subscription callback. Construction never fails; every
//! interpretation of the payload (text, JSON, numbers, image/audio
//! signatures) is computed on first access and surfaces a
//! [`DecodeError`] instead of panicking. Equality against plain Rust
//! values is total: a payload that cannot be decoded in the compared form
//! is simply not equal.

use std::str::FromStr;

use bytes::Bytes;
use once_cell::sync::OnceCell;

use crate::error::DecodeError;
use crate::link::MessageProperties;
use crate::types::QoS;

/// Character set accepted by [`MqttMessage::get_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Latin1 => "latin-1",
            Charset::Ascii => "ascii",
        }
    }
}

impl FromStr for Charset {
    type Err = DecodeError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Charset::Latin1),
            "ascii" | "us-ascii" => Ok(Charset::Ascii),
            other => Err(DecodeError::UnknownCharset(other.to_string())),
        }
    }
}

/// Image container recognized by signature sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Webp,
}

impl ImageFormat {
    pub fn media_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Audio container recognized by signature sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Flac,
    Ogg,
    Mp3,
}

impl AudioFormat {
    pub fn media_type(self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Mp3 => "audio/mpeg",
        }
    }
}

/// Immutable view of one inbound packet.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    topic: String,
    payload: Bytes,
    qos: QoS,
    retain: bool,
    properties: Option<MessageProperties>,
    text_cache: OnceCell<Option<String>>,
    json_cache: OnceCell<Option<serde_json::Value>>,
}

impl MqttMessage {
    /// Wrap a raw packet. Never fails; decoding is deferred to accessors.
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
        properties: Option<MessageProperties>,
    ) -> Self {
        MqttMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
            properties,
            text_cache: OnceCell::new(),
            json_cache: OnceCell::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    pub fn retain(&self) -> bool {
        self.retain
    }

    /// v5 publish properties, when the packet carried any.
    pub fn properties(&self) -> Option<&MessageProperties> {
        self.properties.as_ref()
    }

    // ---- text -------------------------------------------------------------

    /// The payload as UTF-8 text. Cached after the first call.
    pub fn text(&self) -> Result<&str, DecodeError> {
        self.utf8()
            .map(String::as_str)
            .ok_or(DecodeError::NotText { charset: "utf-8" })
    }

    /// The payload decoded with an explicit charset label
    /// (`"utf-8"`, `"latin-1"`, `"ascii"`, ...).
    pub fn get_text(&self, charset: &str) -> Result<String, DecodeError> {
        self.decode_text(Charset::from_str(charset)?)
    }

    /// The payload decoded with an explicit [`Charset`].
    pub fn decode_text(&self, charset: Charset) -> Result<String, DecodeError> {
        match charset {
            Charset::Utf8 => self.text().map(str::to_string),
            // Latin-1 maps every byte to the code point of the same value,
            // so decoding is total.
            Charset::Latin1 => Ok(self.payload.iter().map(|&b| b as char).collect()),
            Charset::Ascii => {
                if self.payload.iter().all(u8::is_ascii) {
                    Ok(self.payload.iter().map(|&b| b as char).collect())
                } else {
                    Err(DecodeError::NotText { charset: "ascii" })
                }
            }
        }
    }

    fn utf8(&self) -> Option<&String> {
        self.text_cache
            .get_or_init(|| std::str::from_utf8(&self.payload).ok().map(str::to_string))
            .as_ref()
    }

    // ---- json and coercions ----------------------------------------------

    /// The payload parsed as JSON. Cached after the first successful parse.
    pub fn json(&self) -> Result<&serde_json::Value, DecodeError> {
        let cached = self
            .json_cache
            .get_or_init(|| serde_json::from_slice(&self.payload).ok());
        match cached {
            Some(value) => Ok(value),
            None => match serde_json::from_slice::<serde_json::Value>(&self.payload) {
                Err(err) => Err(DecodeError::NotJson(err)),
                Ok(_) => unreachable!("payload parsed after a cached failure"),
            },
        }
    }

    /// Boolean coercion: a JSON boolean, or a textual truthy/falsy token
    /// (`true/false`, `1/0`, `on/off`, `yes/no`, case-insensitive).
    pub fn as_bool(&self) -> Result<bool, DecodeError> {
        if let Ok(serde_json::Value::Bool(value)) = self.json() {
            return Ok(*value);
        }
        let text = self.text().map_err(|_| DecodeError::NotBoolean)?;
        match text.trim().to_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(true),
            "false" | "0" | "off" | "no" => Ok(false),
            _ => Err(DecodeError::NotBoolean),
        }
    }

    /// Integer coercion: a JSON integer or integral text.
    pub fn as_i64(&self) -> Result<i64, DecodeError> {
        if let Ok(value) = self.json() {
            if let Some(number) = value.as_i64() {
                return Ok(number);
            }
        }
        let text = self.text().map_err(|_| DecodeError::NotNumeric)?;
        text.trim().parse().map_err(|_| DecodeError::NotNumeric)
    }

    /// Float coercion: any JSON number or numeric text.
    pub fn as_f64(&self) -> Result<f64, DecodeError> {
        if let Ok(value) = self.json() {
            if let Some(number) = value.as_f64() {
                return Ok(number);
            }
        }
        let text = self.text().map_err(|_| DecodeError::NotNumeric)?;
        text.trim().parse().map_err(|_| DecodeError::NotNumeric)
    }

    // ---- binary classification -------------------------------------------

    /// Image bytes plus the sniffed format.
    pub fn image(&self) -> Result<(&[u8], ImageFormat), DecodeError> {
        sniff_image(&self.payload)
            .map(|format| (self.payload(), format))
            .ok_or(DecodeError::NotImage)
    }

    /// Audio bytes plus the sniffed format.
    pub fn audio(&self) -> Result<(&[u8], AudioFormat), DecodeError> {
        sniff_audio(&self.payload)
            .map(|format| (self.payload(), format))
            .ok_or(DecodeError::NotAudio)
    }

    // ---- classification flags (mutually permissive) -----------------------

    pub fn is_text(&self) -> bool {
        self.utf8().is_some()
    }

    pub fn is_json(&self) -> bool {
        self.json().is_ok()
    }

    pub fn is_image(&self) -> bool {
        sniff_image(&self.payload).is_some()
    }

    pub fn is_audio(&self) -> bool {
        sniff_audio(&self.payload).is_some()
    }

    /// Anything that does not decode as text.
    pub fn is_binary(&self) -> bool {
        !self.is_text()
    }

    // ---- polymorphic equality (fail closed) -------------------------------

    pub fn matches_text(&self, other: &str) -> bool {
        self.text().map(|text| text == other).unwrap_or(false)
    }

    pub fn matches_bytes(&self, other: &[u8]) -> bool {
        self.payload() == other
    }

    pub fn matches_json(&self, other: &serde_json::Value) -> bool {
        self.json().map(|value| value == other).unwrap_or(false)
    }

    pub fn matches_bool(&self, other: bool) -> bool {
        self.as_bool().map(|value| value == other).unwrap_or(false)
    }
}

impl PartialEq<str> for MqttMessage {
    fn eq(&self, other: &str) -> bool {
        self.matches_text(other)
    }
}

impl PartialEq<&str> for MqttMessage {
    fn eq(&self, other: &&str) -> bool {
        self.matches_text(other)
    }
}

impl PartialEq<String> for MqttMessage {
    fn eq(&self, other: &String) -> bool {
        self.matches_text(other)
    }
}

impl PartialEq<[u8]> for MqttMessage {
    fn eq(&self, other: &[u8]) -> bool {
        self.matches_bytes(other)
    }
}

impl PartialEq<&[u8]> for MqttMessage {
    fn eq(&self, other: &&[u8]) -> bool {
        self.matches_bytes(other)
    }
}

impl PartialEq<Vec<u8>> for MqttMessage {
    fn eq(&self, other: &Vec<u8>) -> bool {
        self.matches_bytes(other)
    }
}

impl PartialEq<serde_json::Value> for MqttMessage {
    fn eq(&self, other: &serde_json::Value) -> bool {
        self.matches_json(other)
    }
}

impl PartialEq<bool> for MqttMessage {
    fn eq(&self, other: &bool) -> bool {
        self.matches_bool(*other)
    }
}

fn sniff_image(payload: &[u8]) -> Option<ImageFormat> {
    if payload.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageFormat::Png)
    } else if payload.starts_with(b"\xff\xd8\xff") {
        Some(ImageFormat::Jpeg)
    } else if payload.starts_with(b"GIF87a") || payload.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if payload.starts_with(b"BM") && payload.len() >= 14 {
        Some(ImageFormat::Bmp)
    } else if payload.len() >= 12 && &payload[..4] == b"RIFF" && &payload[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        None
    }
}

fn sniff_audio(payload: &[u8]) -> Option<AudioFormat> {
    if payload.len() >= 12 && &payload[..4] == b"RIFF" && &payload[8..12] == b"WAVE" {
        Some(AudioFormat::Wav)
    } else if payload.starts_with(b"fLaC") {
        Some(AudioFormat::Flac)
    } else if payload.starts_with(b"OggS") {
        Some(AudioFormat::Ogg)
    } else if payload.starts_with(b"ID3")
        || (payload.len() >= 2 && payload[0] == 0xff && payload[1] & 0xe0 == 0xe0)
    {
        Some(AudioFormat::Mp3)
    } else {
        None
    }
}
