//! Wire schemas and request builders for the backend endpoints.
//!
//! Every response has a strict struct here; anything the server sends that
//! does not fit is coerced to an empty result at the gateway instead of
//! leaking untyped data into the stores.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use satwatch_shared::models::{
    ObserverLocation, SatelliteInfo, SatellitePosition, Tile, TileSatelliteMapping,
    VisibilityWindow,
};

/// Key for one visibility computation: who is asking, from where, for which
/// time window. All three visibility channels (trigger mutation, cached
/// query, subscription) are issued against the same key.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityKey {
    pub uid: Uuid,
    pub location: ObserverLocation,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLError {
    pub message: String,
}

// --- REST response shapes ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TilesResponse {
    #[serde(default)]
    pub tiles: Vec<Tile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileMappingsResponse {
    #[serde(default)]
    pub mappings: Vec<TileSatelliteMapping>,
    #[serde(default)]
    pub total_records: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatellitesResponse {
    #[serde(default)]
    pub satellites: Vec<SatelliteInfo>,
    #[serde(default)]
    pub total_records: u64,
}

// --- GraphQL document bodies ---

pub const ORBIT_QUERY: &str = r#"query Orbit($id: ID!, $startTime: String!, $endTime: String!) {
    orbit(id: $id, startTime: $startTime, endTime: $endTime) {
        latitude longitude altitude timestamp
    }
}"#;

pub const VISIBILITY_QUERY: &str = r#"query Visibility($input: VisibilityInput!) {
    visibilityWindows(input: $input) {
        satelliteId satelliteName aosUtc losUtc
    }
}"#;

pub const VISIBILITY_TRIGGER_MUTATION: &str =
    r#"mutation TriggerVisibility($input: VisibilityInput!) {
    triggerVisibility(input: $input)
}"#;

// --- GraphQL response shapes ---

/// One trajectory sample as the orbit endpoint returns it; converted to a
/// [`SatellitePosition`] by attaching the queried satellite id.
#[derive(Debug, Clone, Deserialize)]
pub struct OrbitSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Kilometers.
    pub altitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrbitSample {
    pub fn into_position(self, satellite_id: &str) -> SatellitePosition {
        SatellitePosition {
            satellite_id: satellite_id.to_string(),
            lat: self.latitude,
            lon: self.longitude,
            altitude_km: self.altitude,
            timestamp_utc: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrbitResponse {
    #[serde(default)]
    pub orbit: Vec<OrbitSample>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityQueryResponse {
    #[serde(default)]
    pub visibility_windows: Vec<VisibilityWindow>,
}

/// Acknowledgement only; the payload is never consumed for data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    #[serde(default)]
    pub trigger_visibility: bool,
}

// --- Variable builders ---

fn iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build the variables JSON for the orbit query.
pub fn orbit_variables(
    satellite_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "id": satellite_id,
        "startTime": iso8601(start),
        "endTime": iso8601(end),
    })
}

/// Build the shared variables JSON for all three visibility channels.
pub fn visibility_variables(key: &VisibilityKey) -> serde_json::Value {
    serde_json::json!({
        "input": {
            "uid": key.uid,
            "userLocation": {
                "latitude": key.location.latitude,
                "longitude": key.location.longitude,
                "radius": key.location.radius,
                "horizon": key.location.horizon,
            },
            "startTime": iso8601(key.start_utc),
            "endTime": iso8601(key.end_utc),
        }
    })
}
