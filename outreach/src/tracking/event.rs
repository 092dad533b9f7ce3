//! Tracking event model.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveTime};
use serde::Serialize;

/// Kind of recipient interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Open,
    Click,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "OPEN",
            EventKind::Click => "CLICK",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(EventKind::Open),
            "CLICK" => Ok(EventKind::Click),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// One recorded open or click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingEvent {
    pub email: String,
    pub tracking_id: String,
    #[serde(rename = "event")]
    pub kind: EventKind,
    pub time: String,
}

impl TrackingEvent {
    /// Event stamped with the current local time.
    pub fn now(email: impl Into<String>, tracking_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            email: email.into(),
            tracking_id: tracking_id.into(),
            kind,
            time: timestamp_now(),
        }
    }

    /// Build an event from stored fields. Every field must be present and
    /// non-empty, the kind must be known and the time must be `HH:MM:SS.mmm`.
    pub fn from_fields(
        email: Option<&str>,
        tracking_id: Option<&str>,
        kind: Option<&str>,
        time: Option<&str>,
    ) -> Option<Self> {
        let present = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);

        Some(Self {
            email: present(email)?,
            tracking_id: present(tracking_id)?,
            kind: kind.filter(|s| !s.is_empty())?.parse().ok()?,
            time: present(time).filter(|t| is_timestamp(t))?,
        })
    }
}

const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

fn is_timestamp(value: &str) -> bool {
    NaiveTime::parse_from_str(value, TIMESTAMP_FORMAT).is_ok()
}

/// Wall-clock time of day with millisecond precision, `HH:MM:SS.mmm`.
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
