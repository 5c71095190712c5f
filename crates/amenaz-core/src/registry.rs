//! City and layer registry.
//!
//! `MapContext` owns the list of cities shown on the map together with the
//! cache and backend used to fill it. It is created once per session and
//! handed to whatever draws the map; nothing here is global.
//!
//! Loading happens in two steps. [`MapContext::initialize`] seeds the city
//! list, attaches a marker per city and announces `CitiesLoaded`. It then
//! runs [`MapContext::load_all_layers`], which resolves every layer through
//! the cache and announces `LayersLoaded` per city. A layer that fails to
//! load stays pending without affecting any other layer.
//!
//! Every subscriber gets its own unbounded queue, so a subscriber that only
//! reads after `initialize` still sees every event.

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::MapBackend;
use crate::cache::{city_layers_key, CacheManager, CITIES_KEY};
use crate::config::CitySource;
use crate::geo::GeoData;
use crate::models::{City, CityRecord, Layer, LayerDescriptor};
use crate::models::LatLng;
use crate::render::Marker;
use crate::search::{Geocoder, Place};
use crate::seed;

/// Notifications for components that render the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    /// Cities are known and carry their markers
    CitiesLoaded { count: usize },
    /// Every layer of a city has either loaded or failed
    LayersLoaded {
        city_id: i64,
        downloaded: usize,
        failed: usize,
    },
}

/// A layer whose geo data still has to be resolved
struct LayerJob {
    city_index: usize,
    layer_index: usize,
    schema_name: String,
    query_name: String,
}

pub struct MapContext<B> {
    backend: B,
    cache: CacheManager,
    cities: Vec<City>,
    source: CitySource,
    subscribers: Vec<mpsc::UnboundedSender<MapEvent>>,
    search_marker: Option<Marker>,
}

impl<B: MapBackend> MapContext<B> {
    pub fn new(backend: B, cache: CacheManager) -> Self {
        Self {
            backend,
            cache,
            cities: Vec::new(),
            source: CitySource::default(),
            subscribers: Vec::new(),
            search_marker: None,
        }
    }

    /// Receive every event published from now on
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MapEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn city(&self, id: i64) -> Option<&City> {
        self.cities.iter().find(|c| c.id == id)
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Downloaded layers tagged with a hazard label, across all cities
    pub fn layers_by_threat(&self, label: &str) -> Vec<(&City, &Layer)> {
        self.cities
            .iter()
            .flat_map(|city| city.layers.iter().map(move |layer| (city, layer)))
            .filter(|(_, layer)| layer.is_downloaded() && layer.has_threat(label))
            .collect()
    }

    /// Place the search marker, replacing any previous one
    pub fn set_search_marker(&mut self, location: LatLng) {
        debug!(lat = location.lat, lon = location.lon, "Search marker set");
        self.search_marker = Some(Marker::search(location));
    }

    pub fn search_marker(&self) -> Option<&Marker> {
        self.search_marker.as_ref()
    }

    pub fn is_search_marker_set(&self) -> bool {
        self.search_marker.is_some()
    }

    /// Look up places and mark the best match
    pub async fn search_place<G: Geocoder>(
        &mut self,
        geocoder: &G,
        query: &str,
    ) -> anyhow::Result<Vec<Place>> {
        let places = geocoder.search(query).await?;
        if let Some(best) = places.first() {
            self.set_search_marker(best.location);
        }
        Ok(places)
    }

    /// Queue an event for every live subscriber, dropping closed ones
    fn publish(&mut self, event: MapEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if self.subscribers.is_empty() {
            debug!(?event, "No subscribers for map event");
        }
    }

    /// Build the registry: seed cities, attach markers, announce them, then
    /// load every layer.
    pub async fn initialize(&mut self, source: CitySource) {
        info!(%source, "Initializing map registry");
        self.source = source;
        self.seed_cities().await;
        self.attach_markers();
        self.publish(MapEvent::CitiesLoaded {
            count: self.cities.len(),
        });
        self.load_all_layers().await;
    }

    async fn seed_cities(&mut self) {
        match self.source {
            CitySource::Static => {
                self.cities = seed::static_cities();
            }
            CitySource::Backend => {
                self.cities = vec![seed::overview_city()];
                let backend = &self.backend;
                let result: anyhow::Result<Vec<CityRecord>> = self
                    .cache
                    .resolve(CITIES_KEY, || backend.fetch_locations())
                    .await;
                match result {
                    Ok(records) => {
                        self.cities.extend(records.iter().map(CityRecord::to_city));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to load city list");
                    }
                }
            }
        }
        info!(count = self.cities.len(), "Cities registered");
    }

    fn attach_markers(&mut self) {
        for city in &mut self.cities {
            city.marker = Some(Marker::for_city(city));
        }
    }

    /// Resolve layers for every city.
    ///
    /// With a backend city list, cities without seeded layers first discover
    /// their layers through `cityLayers-id<id>`. Every layer still missing geo
    /// data is then resolved through its query name. All requests of a step
    /// are in flight at once.
    pub async fn load_all_layers(&mut self) {
        if self.source == CitySource::Backend {
            self.discover_layers().await;
        }

        let jobs: Vec<LayerJob> = self
            .cities
            .iter()
            .enumerate()
            .flat_map(|(city_index, city)| {
                city.layers
                    .iter()
                    .enumerate()
                    .filter(|(_, layer)| !layer.is_downloaded())
                    .map(move |(layer_index, layer)| LayerJob {
                        city_index,
                        layer_index,
                        schema_name: city.schema_name.clone(),
                        query_name: layer.query_name.clone(),
                    })
            })
            .collect();
        debug!(count = jobs.len(), "Layer downloads queued");

        let cache = &self.cache;
        let backend = &self.backend;
        let results = join_all(jobs.into_iter().map(|job| async move {
            let result: anyhow::Result<GeoData> = cache
                .resolve(&job.query_name, || {
                    backend.fetch_layer(&job.schema_name, &job.query_name)
                })
                .await;
            (job, result)
        }))
        .await;

        for (job, result) in results {
            let layer = &mut self.cities[job.city_index].layers[job.layer_index];
            match result {
                Ok(data) => {
                    if let Err(e) = layer.attach_geo_data(data) {
                        warn!(layer = %job.query_name, error = %e, "Layer geo data rejected");
                    }
                }
                Err(e) => {
                    warn!(layer = %job.query_name, error = %e, "Layer download failed");
                }
            }
        }

        let loaded: Vec<MapEvent> = self
            .cities
            .iter()
            .map(|city| {
                let downloaded = city.downloaded_count();
                let failed = city.pending_count();
                info!(city = %city.name, downloaded, failed, "City layers loaded");
                MapEvent::LayersLoaded {
                    city_id: city.id,
                    downloaded,
                    failed,
                }
            })
            .collect();
        for event in loaded {
            self.publish(event);
        }
    }

    async fn discover_layers(&mut self) {
        let city_ids: Vec<i64> = self
            .cities
            .iter()
            .filter(|c| c.layers.is_empty())
            .map(|c| c.id)
            .collect();

        let cache = &self.cache;
        let backend = &self.backend;
        let results = join_all(city_ids.into_iter().map(|city_id| async move {
            let result: anyhow::Result<Vec<Value>> = cache
                .resolve(&city_layers_key(city_id), || {
                    backend.fetch_location_layers(city_id)
                })
                .await;
            (city_id, result)
        }))
        .await;

        for (city_id, result) in results {
            let items = match result {
                Ok(items) => items,
                Err(e) => {
                    warn!(city_id, error = %e, "Layer discovery failed");
                    continue;
                }
            };
            if let Some(city) = self.cities.iter_mut().find(|c| c.id == city_id) {
                city.layers.extend(items.into_iter().filter_map(parse_descriptor));
                debug!(city = %city.name, layers = city.layers.len(), "Layers discovered");
            }
        }
    }
}

/// Validate one descriptor and attach its embedded GeoJSON, if any.
/// Malformed descriptors are dropped on their own.
fn parse_descriptor(item: Value) -> Option<Layer> {
    let descriptor: LayerDescriptor = match serde_json::from_value(item) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "Skipping malformed layer descriptor");
            return None;
        }
    };
    let (mut layer, embedded) = descriptor.into_layer();
    if let Some(data) = embedded {
        if let Err(e) = layer.attach_geo_data(data) {
            debug!(layer = %layer.query_name, error = %e, "Embedded geo data not used");
        }
    }
    Some(layer)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use anyhow::anyhow;
    use serde_json::json;

    use super::*;

    /// In-memory backend recording every call
    #[derive(Default)]
    struct FakeBackend {
        cities: Option<Vec<CityRecord>>,
        city_layers: HashMap<i64, Vec<Value>>,
        failing_layers: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn record(&self, call: String) {
            self.calls.lock().expect("lock").push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    fn point_geojson(severity: &str) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-66.85, 10.49]},
                "properties": {"Afectacion": severity}
            }]
        })
    }

    impl MapBackend for FakeBackend {
        async fn fetch_locations(&self) -> anyhow::Result<Vec<CityRecord>> {
            self.record("locations".to_string());
            self.cities.clone().ok_or_else(|| anyhow!("server unreachable"))
        }

        async fn fetch_location_layers(&self, city_id: i64) -> anyhow::Result<Vec<Value>> {
            self.record(format!("city_layers:{}", city_id));
            self.city_layers
                .get(&city_id)
                .cloned()
                .ok_or_else(|| anyhow!("no layers for city {}", city_id))
        }

        async fn fetch_layer(&self, schema_name: &str, layer_name: &str) -> anyhow::Result<GeoData> {
            self.record(format!("layer:{}:{}", schema_name, layer_name));
            if self.failing_layers.contains(layer_name) {
                return Err(anyhow!("layer {} unavailable", layer_name));
            }
            Ok(GeoData::from_value(&point_geojson("2"))?)
        }
    }

    fn context(backend: FakeBackend) -> (tempfile::TempDir, MapContext<FakeBackend>) {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache dir");
        (dir, MapContext::new(backend, cache))
    }

    fn cache_entries(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).expect("readable").count()
    }

    fn chacao_record() -> CityRecord {
        CityRecord {
            id: 3,
            name: "Chacao".to_string(),
            schema_name: "chacao".to_string(),
            latitude: 10.4961,
            longitude: -66.8533,
        }
    }

    #[tokio::test]
    async fn test_static_chacao_downloads_all_nine_layers() {
        let (dir, mut ctx) = context(FakeBackend::default());
        ctx.initialize(CitySource::Static).await;

        let chacao = ctx.cities().iter().find(|c| c.name == "Chacao").expect("seeded");
        assert_eq!(chacao.layers.len(), 9);
        assert!(chacao.layers.iter().all(|l| l.is_downloaded()));
        assert!(chacao
            .layers
            .iter()
            .all(|l| l.geo_data().is_some_and(|g| !g.is_empty())));

        assert_eq!(ctx.backend.count("layer:chacao:"), 9);
        assert_eq!(ctx.backend.count("city_layers"), 0);
        assert_eq!(cache_entries(&dir), 9);
        for layer in &chacao.layers {
            assert!(ctx.cache().contains(&layer.query_name));
        }
    }

    #[tokio::test]
    async fn test_second_session_is_served_from_cache() {
        let (dir, mut first) = context(FakeBackend::default());
        first.initialize(CitySource::Static).await;

        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache dir");
        let mut second = MapContext::new(FakeBackend::default(), cache);
        second.initialize(CitySource::Static).await;

        assert!(second.backend.calls().is_empty());
        assert_eq!(second.city(1).map(City::downloaded_count), Some(9));
    }

    #[tokio::test]
    async fn test_failed_layer_is_isolated() {
        let backend = FakeBackend {
            failing_layers: HashSet::from(["fallas_geologicas".to_string()]),
            ..Default::default()
        };
        let (dir, mut ctx) = context(backend);
        ctx.initialize(CitySource::Static).await;

        let chacao = ctx.city(1).expect("seeded");
        for layer in &chacao.layers {
            assert_eq!(layer.is_downloaded(), layer.query_name != "fallas_geologicas");
        }
        assert_eq!(chacao.downloaded_count(), 8);
        assert!(!ctx.cache().contains("fallas_geologicas"));
        assert_eq!(cache_entries(&dir), 8);
    }

    #[tokio::test]
    async fn test_events_announce_cities_then_layers() {
        let (_dir, mut ctx) = context(FakeBackend::default());
        let mut rx = ctx.subscribe();
        ctx.initialize(CitySource::Static).await;

        assert_eq!(rx.try_recv().ok(), Some(MapEvent::CitiesLoaded { count: 2 }));
        assert_eq!(
            rx.try_recv().ok(),
            Some(MapEvent::LayersLoaded { city_id: 0, downloaded: 0, failed: 0 })
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(MapEvent::LayersLoaded { city_id: 1, downloaded: 9, failed: 0 })
        );
        assert!(ctx.cities().iter().all(|c| c.marker.is_some()));
    }

    #[tokio::test]
    async fn test_backend_cities_and_discovered_layers() {
        let mut city_layers = HashMap::new();
        city_layers.insert(
            3,
            vec![
                json!({
                    "id_capa": 10,
                    "nombre": "Zonas inundables",
                    "nom_tabla": "zonas_inundables",
                    "color": "#0d47a1",
                    "amenazas": [{"nombre": "Inundación"}],
                    "geojson": point_geojson("4")
                }),
                json!({
                    "id_capa": 11,
                    "nombre": "Vialidad",
                    "nom_tabla": "vialidad",
                    "color": "#9e9e9e"
                }),
                json!({"id_capa": "not a number"}),
            ],
        );
        let backend = FakeBackend {
            cities: Some(vec![chacao_record()]),
            city_layers,
            ..Default::default()
        };
        let (_dir, mut ctx) = context(backend);
        ctx.initialize(CitySource::Backend).await;

        assert_eq!(ctx.cities().len(), 2);
        let chacao = ctx.city(3).expect("from backend");
        assert_eq!(chacao.layers.len(), 2);
        assert!(chacao.layers.iter().all(|l| l.is_downloaded()));

        // Embedded GeoJSON needs no extra request, the other layer does
        assert_eq!(ctx.backend.count("layer:"), 1);
        assert_eq!(ctx.backend.count("layer:chacao:vialidad"), 1);
        assert!(ctx.cache().contains(CITIES_KEY));
        assert!(ctx.cache().contains("cityLayers-id3"));

        let flood = ctx.layers_by_threat("inundación");
        assert_eq!(flood.len(), 1);
        assert_eq!(flood[0].1.query_name, "zonas_inundables");
        assert_eq!(ctx.layers_by_threat(crate::models::NO_THREAT_LABEL).len(), 1);
    }

    #[tokio::test]
    async fn test_city_list_failure_leaves_overview_only() {
        let (_dir, mut ctx) = context(FakeBackend::default());
        let mut rx = ctx.subscribe();
        ctx.initialize(CitySource::Backend).await;

        assert_eq!(ctx.cities().len(), 1);
        assert_eq!(ctx.cities()[0].id, seed::OVERVIEW_CITY_ID);
        assert!(!ctx.cache().contains(CITIES_KEY));
        assert_eq!(rx.try_recv().ok(), Some(MapEvent::CitiesLoaded { count: 1 }));
    }

    #[tokio::test]
    async fn test_every_event_reaches_a_late_reader() {
        let records: Vec<CityRecord> = (100..170)
            .map(|id| CityRecord {
                id,
                name: format!("Ciudad {}", id),
                schema_name: format!("ciudad_{}", id),
                latitude: 10.0,
                longitude: -66.0,
            })
            .collect();
        let (_dir, mut ctx) = context(FakeBackend::default());
        ctx.cache().save_cities(&records).expect("seeded");
        let mut rx = ctx.subscribe();
        ctx.initialize(CitySource::Backend).await;

        assert_eq!(rx.try_recv().ok(), Some(MapEvent::CitiesLoaded { count: 71 }));
        let mut layer_events = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, MapEvent::LayersLoaded { .. }));
            layer_events += 1;
        }
        assert_eq!(layer_events, 71);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_others() {
        let (_dir, mut ctx) = context(FakeBackend::default());
        drop(ctx.subscribe());
        let mut rx = ctx.subscribe();
        ctx.initialize(CitySource::Static).await;

        assert_eq!(rx.try_recv().ok(), Some(MapEvent::CitiesLoaded { count: 2 }));
        assert_eq!(ctx.subscribers.len(), 1);
    }

    struct FakeGeocoder {
        places: Vec<Place>,
    }

    impl Geocoder for FakeGeocoder {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<Place>> {
            Ok(self.places.clone())
        }
    }

    #[tokio::test]
    async fn test_search_marker() {
        let (_dir, mut ctx) = context(FakeBackend::default());
        assert!(!ctx.is_search_marker_set());

        ctx.set_search_marker(LatLng::new(10.49, -66.85));
        let marker = ctx.search_marker().expect("set");
        assert_eq!(marker.location, LatLng::new(10.49, -66.85));
        assert_eq!(marker.icon, crate::render::MarkerIcon::Search);
        assert!(ctx.is_search_marker_set());

        let geocoder = FakeGeocoder {
            places: vec![
                Place {
                    label: "Plaza Altamira".to_string(),
                    location: LatLng::new(10.496, -66.848),
                },
                Place {
                    label: "Parque del Este".to_string(),
                    location: LatLng::new(10.492, -66.828),
                },
            ],
        };
        let places = ctx.search_place(&geocoder, "altamira").await.expect("searched");
        assert_eq!(places.len(), 2);
        assert_eq!(
            ctx.search_marker().map(|m| m.location),
            Some(LatLng::new(10.496, -66.848))
        );

        let nothing = FakeGeocoder { places: Vec::new() };
        assert!(ctx.search_place(&nothing, "nowhere").await.expect("searched").is_empty());
        assert!(ctx.is_search_marker_set());
    }

    #[tokio::test]
    async fn test_cached_city_list_skips_backend() {
        let (_dir, mut ctx) = context(FakeBackend::default());
        ctx.cache().save_cities(&[chacao_record()]).expect("seeded");
        ctx.initialize(CitySource::Backend).await;

        assert_eq!(ctx.backend.count("locations"), 0);
        assert!(ctx.city(3).is_some());
    }
}
