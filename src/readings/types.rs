//! Reading types and topic classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The reading kinds the bridge persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingKind {
    Temp,
    Rain,
    Wind,
}

impl ReadingKind {
    pub const ALL: [ReadingKind; 3] = [ReadingKind::Temp, ReadingKind::Rain, ReadingKind::Wind];

    /// Classify a broker topic by substring, e.g. `device7/sensor/temp` -> `Temp`.
    ///
    /// Checked in the order temp, rain, wind; topics matching none of them
    /// return `None`.
    pub fn classify(topic: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| topic.contains(kind.topic_marker()))
    }

    /// Substring that identifies this kind within a topic
    pub fn topic_marker(&self) -> &'static str {
        match self {
            ReadingKind::Temp => "sensor/temp",
            ReadingKind::Rain => "sensor/rain",
            ReadingKind::Wind => "sensor/wind",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingKind::Temp => "temp",
            ReadingKind::Rain => "rain",
            ReadingKind::Wind => "wind",
        }
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temp" => Ok(ReadingKind::Temp),
            "rain" => Ok(ReadingKind::Rain),
            "wind" => Ok(ReadingKind::Wind),
            other => Err(format!("Unknown reading kind: {}", other)),
        }
    }
}

/// One decrypted sensor value
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Broker topic the payload arrived on
    pub source_topic: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(source_topic: impl Into<String>, value: f64) -> Self {
        Self {
            source_topic: source_topic.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> Option<ReadingKind> {
        ReadingKind::classify(&self.source_topic)
    }
}
