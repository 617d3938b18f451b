//! Tile and tile-satellite mapping store.
//!
//! Holds the tiles for the current viewport and one page of mapping rows.
//! Every fetch is epoch-guarded: concurrent calls never interleave their
//! commits, only the most recently issued request for an area may write its
//! result, and a stale arrival is discarded silently. Failures keep the
//! last-good data in place and record a per-area error string.

use std::sync::{Arc, Mutex};

use tracing::debug;

use satwatch_shared::models::{BBox, Tile, TileSatelliteMapping};

use crate::transport::{MappingPage, TileApi};

/// Read-only snapshot of the store state.
#[derive(Debug, Clone, Default)]
pub struct TileState {
    pub tiles: Vec<Tile>,
    pub mappings: Vec<TileSatelliteMapping>,
    pub total_mappings: u64,
    pub tiles_loading: bool,
    pub mappings_loading: bool,
    pub tiles_error: Option<String>,
    pub mappings_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    state: TileState,
    tiles_epoch: u64,
    mappings_epoch: u64,
}

pub struct TileStore<A: TileApi> {
    api: A,
    inner: Arc<Mutex<Inner>>,
}

impl<A: TileApi> TileStore<A> {
    pub fn new(api: A) -> Self {
        TileStore { api, inner: Arc::new(Mutex::new(Inner::default())) }
    }

    pub fn snapshot(&self) -> TileState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Replace the tile set with the tiles intersecting `bbox`. Returns the
    /// tiles current after this call resolves; if a newer request committed
    /// in the meantime, those newer tiles are returned and this result is
    /// dropped.
    pub async fn fetch_tiles_for_bbox(&self, bbox: BBox) -> Vec<Tile> {
        let epoch = {
            let mut g = self.inner.lock().unwrap();
            g.tiles_epoch += 1;
            g.state.tiles_loading = true;
            g.tiles_epoch
        };

        let result = self.api.tiles_for_bbox(&bbox).await;

        let mut g = self.inner.lock().unwrap();
        if g.tiles_epoch != epoch {
            debug!(epoch, current = g.tiles_epoch, "discarding stale tile fetch");
            return g.state.tiles.clone();
        }
        g.state.tiles_loading = false;
        match result {
            Ok(tiles) => {
                g.state.tiles = tiles;
                g.state.tiles_error = None;
            }
            Err(e) => {
                g.state.tiles_error = Some(e);
            }
        }
        g.state.tiles.clone()
    }

    /// Fetch one page of mapping rows. `page` is 0-based; `search` filters
    /// free-text on the server. Same last-request-wins rule as tiles.
    pub async fn fetch_tile_mappings(
        &self,
        page: u32,
        page_size: u32,
        search: &str,
    ) -> MappingPage {
        let epoch = {
            let mut g = self.inner.lock().unwrap();
            g.mappings_epoch += 1;
            g.state.mappings_loading = true;
            g.mappings_epoch
        };

        let result = self.api.tile_mappings(page, page_size, search).await;

        let mut g = self.inner.lock().unwrap();
        if g.mappings_epoch != epoch {
            debug!(epoch, current = g.mappings_epoch, "discarding stale mapping fetch");
            return MappingPage {
                rows: g.state.mappings.clone(),
                total_records: g.state.total_mappings,
            };
        }
        g.state.mappings_loading = false;
        match result {
            Ok(page) => {
                g.state.mappings = page.rows;
                g.state.total_mappings = page.total_records;
                g.state.mappings_error = None;
            }
            Err(e) => {
                g.state.mappings_error = Some(e);
            }
        }
        MappingPage { rows: g.state.mappings.clone(), total_records: g.state.total_mappings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use satwatch_shared::models::GroundPoint;

    fn tile(id: &str) -> Tile {
        Tile {
            id: id.to_string(),
            center_lat: 49.6,
            center_lon: 6.1,
            radius_meters: 5000.0,
            zoom_level: 8,
            quadkey: None,
        }
    }

    fn mapping(id: &str) -> TileSatelliteMapping {
        TileSatelliteMapping {
            mapping_id: id.to_string(),
            tile_id: "t-1".to_string(),
            satellite_id: "25544".to_string(),
            intersection: GroundPoint { lat: 49.5, lon: 6.2 },
        }
    }

    fn bbox() -> BBox {
        BBox { min_lat: 49.0, min_lon: 5.0, max_lat: 50.0, max_lon: 7.0 }
    }

    /// Scripted fake: each call pops the next delay and result.
    struct FakeTileApi {
        tiles: StdMutex<VecDeque<(u64, Result<Vec<Tile>, String>)>>,
        mappings: StdMutex<VecDeque<Result<MappingPage, String>>>,
        mapping_requests: StdMutex<Vec<(u32, u32, String)>>,
    }

    impl FakeTileApi {
        fn new() -> Self {
            FakeTileApi {
                tiles: StdMutex::new(VecDeque::new()),
                mappings: StdMutex::new(VecDeque::new()),
                mapping_requests: StdMutex::new(Vec::new()),
            }
        }

        fn push_tiles(&self, delay_ms: u64, result: Result<Vec<Tile>, String>) {
            self.tiles.lock().unwrap().push_back((delay_ms, result));
        }

        fn push_mappings(&self, result: Result<MappingPage, String>) {
            self.mappings.lock().unwrap().push_back(result);
        }
    }

    impl TileApi for FakeTileApi {
        fn tiles_for_bbox(
            &self,
            _bbox: &BBox,
        ) -> impl Future<Output = Result<Vec<Tile>, String>> + Send {
            let (delay_ms, result) = self
                .tiles
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((0, Ok(Vec::new())));
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                result
            }
        }

        fn tile_mappings(
            &self,
            page: u32,
            page_size: u32,
            search: &str,
        ) -> impl Future<Output = Result<MappingPage, String>> + Send {
            self.mapping_requests
                .lock()
                .unwrap()
                .push((page, page_size, search.to_string()));
            let result = self
                .mappings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(MappingPage::default()));
            async move { result }
        }
    }

    #[tokio::test]
    async fn test_fetch_tiles_commits_and_clears_loading() {
        let api = FakeTileApi::new();
        api.push_tiles(0, Ok(vec![tile("t-1"), tile("t-2")]));
        let store = TileStore::new(api);

        let tiles = store.fetch_tiles_for_bbox(bbox()).await;
        assert_eq!(tiles.len(), 2);

        let state = store.snapshot();
        assert_eq!(state.tiles.len(), 2);
        assert!(!state.tiles_loading);
        assert!(state.tiles_error.is_none());
    }

    #[tokio::test]
    async fn test_fetch_tiles_error_keeps_last_good_data() {
        let api = FakeTileApi::new();
        api.push_tiles(0, Ok(vec![tile("t-1")]));
        api.push_tiles(0, Err("connection refused".to_string()));
        let store = TileStore::new(api);

        store.fetch_tiles_for_bbox(bbox()).await;
        let tiles = store.fetch_tiles_for_bbox(bbox()).await;

        // Last-good tiles survive, error is surfaced separately
        assert_eq!(tiles.len(), 1);
        let state = store.snapshot();
        assert_eq!(state.tiles[0].id, "t-1");
        assert_eq!(state.tiles_error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_error_cleared_by_next_successful_fetch() {
        let api = FakeTileApi::new();
        api.push_tiles(0, Err("boom".to_string()));
        api.push_tiles(0, Ok(vec![tile("t-9")]));
        let store = TileStore::new(api);

        store.fetch_tiles_for_bbox(bbox()).await;
        assert!(store.snapshot().tiles_error.is_some());

        store.fetch_tiles_for_bbox(bbox()).await;
        let state = store.snapshot();
        assert!(state.tiles_error.is_none());
        assert_eq!(state.tiles[0].id, "t-9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stale_fetch_never_overwrites_newer_result() {
        let api = FakeTileApi::new();
        // First request resolves long after the second
        api.push_tiles(500, Ok(vec![tile("stale")]));
        api.push_tiles(10, Ok(vec![tile("fresh")]));
        let store = TileStore::new(api);

        let (first, second) =
            tokio::join!(store.fetch_tiles_for_bbox(bbox()), store.fetch_tiles_for_bbox(bbox()));

        // Both calls observe the committed (fresh) tiles
        assert_eq!(second[0].id, "fresh");
        assert_eq!(first[0].id, "fresh");
        assert_eq!(store.snapshot().tiles[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_first_mapping_page_is_requested_as_page_zero() {
        // The page index is 0-based and forwarded to the API verbatim, so a
        // caller asking for the first page must send 0, not 1.
        let api = FakeTileApi::new();
        api.push_mappings(Ok(MappingPage { rows: vec![mapping("m-1")], total_records: 1 }));
        let store = TileStore::new(api);

        let page = store.fetch_tile_mappings(0, 100, "").await;
        assert_eq!(page.rows.len(), 1);
        assert_eq!(
            *store.api.mapping_requests.lock().unwrap(),
            vec![(0, 100, String::new())]
        );
    }

    #[tokio::test]
    async fn test_mapping_pagination_repeat_is_stable() {
        let api = FakeTileApi::new();
        let page = MappingPage { rows: vec![mapping("m-1"), mapping("m-2")], total_records: 12 };
        api.push_mappings(Ok(page.clone()));
        api.push_mappings(Ok(page));
        let store = TileStore::new(api);

        let first = store.fetch_tile_mappings(0, 2, "").await;
        let second = store.fetch_tile_mappings(0, 2, "").await;
        assert_eq!(first, second);
        assert_eq!(first.total_records, 12);
    }

    #[tokio::test]
    async fn test_mapping_error_keeps_last_good_page() {
        let api = FakeTileApi::new();
        api.push_mappings(Ok(MappingPage { rows: vec![mapping("m-1")], total_records: 1 }));
        api.push_mappings(Err("500 Internal Server Error".to_string()));
        let store = TileStore::new(api);

        store.fetch_tile_mappings(0, 10, "").await;
        let page = store.fetch_tile_mappings(1, 10, "").await;

        assert_eq!(page.rows.len(), 1);
        let state = store.snapshot();
        assert_eq!(state.mappings_error.as_deref(), Some("500 Internal Server Error"));
        assert_eq!(state.mappings[0].mapping_id, "m-1");
    }
}
