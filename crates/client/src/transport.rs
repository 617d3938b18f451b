//! Injected I/O seams for the pipeline.
//!
//! Stores and the visibility feed never talk to the network directly; they
//! go through these traits so tests can substitute fakes. [`HttpGateway`] is
//! the production implementation: plain GETs for the tile/satellite REST
//! endpoints and the shared GraphQL envelope for orbit and visibility.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::warn;

use satwatch_shared::models::{
    BBox, SatelliteInfo, SatellitePosition, Tile, TileSatelliteMapping, VisibilityWindow,
};

use crate::api::{
    self, GraphQLRequest, GraphQLResponse, OrbitResponse, SatellitesResponse,
    TileMappingsResponse, TilesResponse, TriggerResponse, VisibilityKey,
    VisibilityQueryResponse,
};

/// One page of tile-satellite mapping rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingPage {
    pub rows: Vec<TileSatelliteMapping>,
    pub total_records: u64,
}

/// One page of satellite catalog rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SatellitePage {
    pub rows: Vec<SatelliteInfo>,
    pub total_records: u64,
}

pub trait TileApi {
    fn tiles_for_bbox(
        &self,
        bbox: &BBox,
    ) -> impl Future<Output = Result<Vec<Tile>, String>> + Send;

    fn tile_mappings(
        &self,
        page: u32,
        page_size: u32,
        search: &str,
    ) -> impl Future<Output = Result<MappingPage, String>> + Send;
}

pub trait SatelliteApi {
    fn satellites(
        &self,
        page: u32,
        page_size: u32,
        search: &str,
    ) -> impl Future<Output = Result<SatellitePage, String>> + Send;

    fn orbit(
        &self,
        satellite_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<SatellitePosition>, String>> + Send;
}

/// The three visibility channels, all keyed on the same [`VisibilityKey`].
pub trait VisibilityTransport {
    /// One-shot cached query for already-computed windows.
    fn query_windows(
        &self,
        key: &VisibilityKey,
    ) -> impl Future<Output = Result<Vec<VisibilityWindow>, String>> + Send;

    /// Fire-and-acknowledge recompute request; the response carries no data.
    fn trigger_compute(
        &self,
        key: &VisibilityKey,
    ) -> impl Future<Output = Result<(), String>> + Send;

    /// Open the live push channel for this key. Dropping or closing the
    /// returned subscription is the unsubscribe.
    fn subscribe(&self, key: &VisibilityKey) -> WindowSubscription;
}

/// Receiving end of a visibility push channel.
pub struct WindowSubscription {
    rx: mpsc::UnboundedReceiver<Result<Vec<VisibilityWindow>, String>>,
}

impl WindowSubscription {
    /// Next pushed batch, or a channel-level error, or `None` once the
    /// producer side has gone away.
    pub async fn next(&mut self) -> Option<Result<Vec<VisibilityWindow>, String>> {
        self.rx.recv().await
    }

    /// Explicit unsubscribe; the producer observes the channel as closed.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Producer end of a visibility push channel, handed to whichever layer
/// (websocket, SSE, test fixture) receives server pushes.
#[derive(Debug, Clone)]
pub struct PushHandle {
    tx: mpsc::UnboundedSender<Result<Vec<VisibilityWindow>, String>>,
}

impl PushHandle {
    /// Returns false once the subscriber has unsubscribed.
    pub fn push(&self, windows: Vec<VisibilityWindow>) -> bool {
        self.tx.send(Ok(windows)).is_ok()
    }

    /// Report a channel-level failure to the subscriber.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx.send(Err(message.into())).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub fn window_channel() -> (PushHandle, WindowSubscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PushHandle { tx }, WindowSubscription { rx })
}

// One gateway is typically shared by the stores and the feed, so the traits
// pass through `Arc`.
impl<T: VisibilityTransport> VisibilityTransport for std::sync::Arc<T> {
    fn query_windows(
        &self,
        key: &VisibilityKey,
    ) -> impl Future<Output = Result<Vec<VisibilityWindow>, String>> + Send {
        (**self).query_windows(key)
    }

    fn trigger_compute(
        &self,
        key: &VisibilityKey,
    ) -> impl Future<Output = Result<(), String>> + Send {
        (**self).trigger_compute(key)
    }

    fn subscribe(&self, key: &VisibilityKey) -> WindowSubscription {
        (**self).subscribe(key)
    }
}

impl<T: TileApi> TileApi for std::sync::Arc<T> {
    fn tiles_for_bbox(
        &self,
        bbox: &BBox,
    ) -> impl Future<Output = Result<Vec<Tile>, String>> + Send {
        (**self).tiles_for_bbox(bbox)
    }

    fn tile_mappings(
        &self,
        page: u32,
        page_size: u32,
        search: &str,
    ) -> impl Future<Output = Result<MappingPage, String>> + Send {
        (**self).tile_mappings(page, page_size, search)
    }
}

impl<T: SatelliteApi> SatelliteApi for std::sync::Arc<T> {
    fn satellites(
        &self,
        page: u32,
        page_size: u32,
        search: &str,
    ) -> impl Future<Output = Result<SatellitePage, String>> + Send {
        (**self).satellites(page, page_size, search)
    }

    fn orbit(
        &self,
        satellite_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<SatellitePosition>, String>> + Send {
        (**self).orbit(satellite_id, start, end)
    }
}

/// Hook through which the host's push layer (websocket/SSE) attaches itself
/// to a new subscription key.
pub type PushConnector = Box<dyn Fn(&VisibilityKey, PushHandle) + Send + Sync>;

/// Production transport over HTTP.
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    connector: Option<PushConnector>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpGateway { http: reqwest::Client::new(), base_url, connector: None }
    }

    /// Attach the host push layer. Without a connector, subscriptions open
    /// and immediately close, which degrades to query-only behavior.
    pub fn with_push_connector(
        mut self,
        connector: impl Fn(&VisibilityKey, PushHandle) + Send + Sync + 'static,
    ) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// GET a REST endpoint. Transport and HTTP-status failures surface as
    /// errors; a body with an unexpected shape is logged and coerced to the
    /// empty default so rendering degrades instead of crashing.
    async fn get_json<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T, String>
    where
        T: DeserializeOwned + Default,
    {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let value: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(endpoint = what, error = %e, "malformed response body, treating as empty");
                return Ok(T::default());
            }
        };
        match serde_json::from_value(value) {
            Ok(t) => Ok(t),
            Err(e) => {
                warn!(endpoint = what, error = %e, "unexpected response shape, treating as empty");
                Ok(T::default())
            }
        }
    }

    /// POST a GraphQL document and unwrap the envelope. Server-reported
    /// errors surface as the first message; a malformed `data` payload is
    /// coerced to the empty default like the REST path.
    async fn graphql<T>(
        &self,
        query_str: &str,
        variables: serde_json::Value,
        what: &str,
    ) -> Result<T, String>
    where
        T: DeserializeOwned + Default,
    {
        let req = GraphQLRequest { query: query_str.to_string(), variables: Some(variables) };
        let resp = self
            .http
            .post(format!("{}/graphql", self.base_url))
            .json(&req)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let envelope: GraphQLResponse<serde_json::Value> =
            resp.json().await.map_err(|e| e.to_string())?;

        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                return Err(errors[0].message.clone());
            }
        }
        let data = envelope.data.ok_or_else(|| "no data returned".to_string())?;
        match serde_json::from_value(data) {
            Ok(t) => Ok(t),
            Err(e) => {
                warn!(endpoint = what, error = %e, "unexpected response shape, treating as empty");
                Ok(T::default())
            }
        }
    }
}

impl TileApi for HttpGateway {
    fn tiles_for_bbox(
        &self,
        bbox: &BBox,
    ) -> impl Future<Output = Result<Vec<Tile>, String>> + Send {
        let query = vec![
            ("minLat", bbox.min_lat.to_string()),
            ("minLon", bbox.min_lon.to_string()),
            ("maxLat", bbox.max_lat.to_string()),
            ("maxLon", bbox.max_lon.to_string()),
        ];
        async move {
            let resp: TilesResponse = self.get_json("/tiles", &query, "tiles").await?;
            Ok(resp.tiles)
        }
    }

    fn tile_mappings(
        &self,
        page: u32,
        page_size: u32,
        search: &str,
    ) -> impl Future<Output = Result<MappingPage, String>> + Send {
        let query = vec![
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
            ("search", search.to_string()),
        ];
        async move {
            let resp: TileMappingsResponse =
                self.get_json("/tile-mappings", &query, "tile-mappings").await?;
            Ok(MappingPage { rows: resp.mappings, total_records: resp.total_records })
        }
    }
}

impl SatelliteApi for HttpGateway {
    fn satellites(
        &self,
        page: u32,
        page_size: u32,
        search: &str,
    ) -> impl Future<Output = Result<SatellitePage, String>> + Send {
        let query = vec![
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
            ("search", search.to_string()),
        ];
        async move {
            let resp: SatellitesResponse =
                self.get_json("/satellites", &query, "satellites").await?;
            Ok(SatellitePage { rows: resp.satellites, total_records: resp.total_records })
        }
    }

    fn orbit(
        &self,
        satellite_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<SatellitePosition>, String>> + Send {
        let id = satellite_id.to_string();
        let variables = api::orbit_variables(satellite_id, start, end);
        async move {
            let resp: OrbitResponse =
                self.graphql(api::ORBIT_QUERY, variables, "orbit").await?;
            Ok(resp.orbit.into_iter().map(|s| s.into_position(&id)).collect())
        }
    }
}

impl VisibilityTransport for HttpGateway {
    fn query_windows(
        &self,
        key: &VisibilityKey,
    ) -> impl Future<Output = Result<Vec<VisibilityWindow>, String>> + Send {
        let variables = api::visibility_variables(key);
        async move {
            let resp: VisibilityQueryResponse =
                self.graphql(api::VISIBILITY_QUERY, variables, "visibility").await?;
            Ok(resp.visibility_windows)
        }
    }

    fn trigger_compute(
        &self,
        key: &VisibilityKey,
    ) -> impl Future<Output = Result<(), String>> + Send {
        let variables = api::visibility_variables(key);
        async move {
            let _: TriggerResponse = self
                .graphql(api::VISIBILITY_TRIGGER_MUTATION, variables, "trigger-visibility")
                .await?;
            Ok(())
        }
    }

    fn subscribe(&self, key: &VisibilityKey) -> WindowSubscription {
        let (handle, sub) = window_channel();
        match &self.connector {
            Some(connect) => connect(key, handle),
            // No push layer attached: the handle drops and the channel
            // closes, so the feed sees an immediately-ended subscription.
            None => drop(handle),
        }
        sub
    }
}
