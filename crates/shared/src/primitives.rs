use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// UTC timestamp newtype used across the workspace so API types carry one
/// schema-friendly datetime representation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
    JsonSchema,
)]
#[serde(transparent)]
pub struct WrappedChronoDateTime(chrono::DateTime<chrono::Utc>);

impl WrappedChronoDateTime {
    pub fn get_inner(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }

    pub fn new(value: chrono::DateTime<chrono::Utc>) -> Self {
        Self(value)
    }

    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Build from Slack's fractional-seconds `ts` string ("1700000000.000100").
    /// Unparsable input falls back to the current time.
    pub fn from_slack_ts(ts: &str) -> Self {
        let parsed = ts
            .parse::<f64>()
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp_millis((secs * 1000.0) as i64));
        match parsed {
            Some(dt) => Self(dt),
            None => Self::now(),
        }
    }
}

impl TryFrom<&str> for WrappedChronoDateTime {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parsed = chrono::DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.into())
            .map_err(|_e| anyhow::anyhow!("invalid datetime value"))?;
        Ok(WrappedChronoDateTime::new(parsed))
    }
}

impl std::fmt::Display for WrappedChronoDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
