//! Satellite catalog and orbit store.
//!
//! One page of catalog rows plus on-demand orbit trajectories cached by
//! satellite id. The list fetch follows the same last-request-wins epoch
//! rule as the tile store; orbit fetches are epoch-guarded per satellite so
//! rapid re-requests for one satellite cannot interleave while requests for
//! different satellites stay independent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use satwatch_shared::models::{SatelliteInfo, SatellitePosition};

use crate::transport::{SatelliteApi, SatellitePage};

/// Read-only snapshot of the store state.
#[derive(Debug, Clone, Default)]
pub struct SatelliteState {
    pub satellites: Vec<SatelliteInfo>,
    pub total_records: u64,
    pub list_loading: bool,
    pub list_error: Option<String>,
    /// Cached trajectories, time-ordered, keyed by satellite id.
    pub orbits: HashMap<String, Vec<SatellitePosition>>,
    pub orbits_loading: HashSet<String>,
    pub orbit_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    state: SatelliteState,
    list_epoch: u64,
    orbit_epochs: HashMap<String, u64>,
}

pub struct SatelliteStore<A: SatelliteApi> {
    api: A,
    inner: Arc<Mutex<Inner>>,
}

impl<A: SatelliteApi> SatelliteStore<A> {
    pub fn new(api: A) -> Self {
        SatelliteStore { api, inner: Arc::new(Mutex::new(Inner::default())) }
    }

    pub fn snapshot(&self) -> SatelliteState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Fetch one 0-based page of the satellite catalog.
    pub async fn fetch_satellites(
        &self,
        page: u32,
        page_size: u32,
        search: &str,
    ) -> SatellitePage {
        let epoch = {
            let mut g = self.inner.lock().unwrap();
            g.list_epoch += 1;
            g.state.list_loading = true;
            g.list_epoch
        };

        let result = self.api.satellites(page, page_size, search).await;

        let mut g = self.inner.lock().unwrap();
        if g.list_epoch != epoch {
            debug!(epoch, current = g.list_epoch, "discarding stale satellite page");
            return SatellitePage {
                rows: g.state.satellites.clone(),
                total_records: g.state.total_records,
            };
        }
        g.state.list_loading = false;
        match result {
            Ok(page) => {
                g.state.satellites = page.rows;
                g.state.total_records = page.total_records;
                g.state.list_error = None;
            }
            Err(e) => {
                g.state.list_error = Some(e);
            }
        }
        SatellitePage { rows: g.state.satellites.clone(), total_records: g.state.total_records }
    }

    /// Fetch the trajectory for one satellite over `[start, end]`. The store
    /// is window-agnostic; callers pick the window (the dashboard convention
    /// is now through +24h). The committed trajectory replaces any cached
    /// one for that id, is sorted by timestamp, and has non-finite samples
    /// dropped.
    pub async fn fetch_orbit(
        &self,
        satellite_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<SatellitePosition> {
        let epoch = {
            let mut g = self.inner.lock().unwrap();
            let e = g.orbit_epochs.entry(satellite_id.to_string()).or_insert(0);
            *e += 1;
            let epoch = *e;
            g.state.orbits_loading.insert(satellite_id.to_string());
            epoch
        };

        let result = self.api.orbit(satellite_id, start, end).await;

        let mut g = self.inner.lock().unwrap();
        if g.orbit_epochs.get(satellite_id).copied() != Some(epoch) {
            debug!(satellite_id, epoch, "discarding stale orbit fetch");
            return g.state.orbits.get(satellite_id).cloned().unwrap_or_default();
        }
        g.state.orbits_loading.remove(satellite_id);
        match result {
            Ok(samples) => {
                let mut trajectory: Vec<SatellitePosition> = samples
                    .into_iter()
                    .filter(|p| {
                        let ok = p.lat.is_finite() && p.lon.is_finite() && p.altitude_km.is_finite();
                        if !ok {
                            warn!(satellite_id, "dropping non-finite orbit sample");
                        }
                        ok
                    })
                    .collect();
                trajectory.sort_by_key(|p| p.timestamp_utc);
                g.state.orbits.insert(satellite_id.to_string(), trajectory);
                g.state.orbit_error = None;
            }
            Err(e) => {
                g.state.orbit_error = Some(e);
            }
        }
        g.state.orbits.get(satellite_id).cloned().unwrap_or_default()
    }

    /// Cached trajectory for a satellite, if one has been fetched.
    pub fn orbit(&self, satellite_id: &str) -> Option<Vec<SatellitePosition>> {
        self.inner.lock().unwrap().state.orbits.get(satellite_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex as StdMutex;
    use chrono::TimeZone;

    fn info(id: &str, name: &str) -> SatelliteInfo {
        SatelliteInfo { satellite_id: id.to_string(), name: name.to_string() }
    }

    fn sample(id: &str, minute: u32) -> SatellitePosition {
        SatellitePosition {
            satellite_id: id.to_string(),
            lat: 10.0,
            lon: 20.0,
            altitude_km: 420.0,
            timestamp_utc: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    struct FakeSatelliteApi {
        pages: StdMutex<VecDeque<Result<SatellitePage, String>>>,
        orbits: StdMutex<VecDeque<Result<Vec<SatellitePosition>, String>>>,
    }

    impl FakeSatelliteApi {
        fn new() -> Self {
            FakeSatelliteApi {
                pages: StdMutex::new(VecDeque::new()),
                orbits: StdMutex::new(VecDeque::new()),
            }
        }

        fn push_page(&self, result: Result<SatellitePage, String>) {
            self.pages.lock().unwrap().push_back(result);
        }

        fn push_orbit(&self, result: Result<Vec<SatellitePosition>, String>) {
            self.orbits.lock().unwrap().push_back(result);
        }
    }

    impl SatelliteApi for FakeSatelliteApi {
        fn satellites(
            &self,
            _page: u32,
            _page_size: u32,
            _search: &str,
        ) -> impl Future<Output = Result<SatellitePage, String>> + Send {
            let result = self
                .pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SatellitePage::default()));
            async move { result }
        }

        fn orbit(
            &self,
            _satellite_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> impl Future<Output = Result<Vec<SatellitePosition>, String>> + Send {
            let result = self
                .orbits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Vec::new()));
            async move { result }
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        (start, start + chrono::Duration::hours(24))
    }

    #[tokio::test]
    async fn test_fetch_satellites_commits_page() {
        let api = FakeSatelliteApi::new();
        api.push_page(Ok(SatellitePage {
            rows: vec![info("25544", "ISS (ZARYA)")],
            total_records: 4213,
        }));
        let store = SatelliteStore::new(api);

        let page = store.fetch_satellites(0, 20, "").await;
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.total_records, 4213);
        assert!(!store.snapshot().list_loading);
    }

    #[tokio::test]
    async fn test_pagination_repeat_is_stable() {
        let api = FakeSatelliteApi::new();
        let page = SatellitePage { rows: vec![info("1", "One"), info("2", "Two")], total_records: 9 };
        api.push_page(Ok(page.clone()));
        api.push_page(Ok(page));
        let store = SatelliteStore::new(api);

        let first = store.fetch_satellites(3, 2, "starlink").await;
        let second = store.fetch_satellites(3, 2, "starlink").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_list_error_keeps_last_good_rows() {
        let api = FakeSatelliteApi::new();
        api.push_page(Ok(SatellitePage { rows: vec![info("1", "One")], total_records: 1 }));
        api.push_page(Err("timeout".to_string()));
        let store = SatelliteStore::new(api);

        store.fetch_satellites(0, 20, "").await;
        let page = store.fetch_satellites(1, 20, "").await;

        assert_eq!(page.rows.len(), 1);
        assert_eq!(store.snapshot().list_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_orbit_cached_by_id_and_replaced_on_refetch() {
        let api = FakeSatelliteApi::new();
        api.push_orbit(Ok(vec![sample("25544", 0)]));
        api.push_orbit(Ok(vec![sample("25544", 5), sample("25544", 10)]));
        let store = SatelliteStore::new(api);
        let (start, end) = window();

        store.fetch_orbit("25544", start, end).await;
        assert_eq!(store.orbit("25544").unwrap().len(), 1);

        store.fetch_orbit("25544", start, end).await;
        assert_eq!(store.orbit("25544").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_orbit_commit_sorts_by_timestamp() {
        let api = FakeSatelliteApi::new();
        api.push_orbit(Ok(vec![sample("25544", 30), sample("25544", 10), sample("25544", 20)]));
        let store = SatelliteStore::new(api);
        let (start, end) = window();

        let trajectory = store.fetch_orbit("25544", start, end).await;
        let minutes: Vec<u32> =
            trajectory.iter().map(|p| p.timestamp_utc.format("%M").to_string().parse().unwrap()).collect();
        assert_eq!(minutes, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_orbit_drops_non_finite_samples() {
        let api = FakeSatelliteApi::new();
        let mut bad = sample("25544", 5);
        bad.lat = f64::NAN;
        api.push_orbit(Ok(vec![sample("25544", 0), bad]));
        let store = SatelliteStore::new(api);
        let (start, end) = window();

        let trajectory = store.fetch_orbit("25544", start, end).await;
        assert_eq!(trajectory.len(), 1);
    }

    #[tokio::test]
    async fn test_orbit_error_keeps_cached_trajectory() {
        let api = FakeSatelliteApi::new();
        api.push_orbit(Ok(vec![sample("25544", 0)]));
        api.push_orbit(Err("orbit service unavailable".to_string()));
        let store = SatelliteStore::new(api);
        let (start, end) = window();

        store.fetch_orbit("25544", start, end).await;
        let trajectory = store.fetch_orbit("25544", start, end).await;

        assert_eq!(trajectory.len(), 1);
        assert_eq!(
            store.snapshot().orbit_error.as_deref(),
            Some("orbit service unavailable")
        );
    }
}
