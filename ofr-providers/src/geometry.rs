//! Circuit geometry from the community GeoJSON collection
//!
//! The whole collection is downloaded once per client and memoized. Circuits
//! are matched by free-text hints against the feature properties, since the
//! collection does not carry Ergast circuit ids.

use crate::http;
use ofr_core::FetchError;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Write;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const DEFAULT_GEOJSON_URL: &str =
    "https://raw.githubusercontent.com/bacinger/f1-circuits/master/f1-circuits.geojson";

/// Property keys that may hold a circuit's name or place
const SEARCH_KEYS: [&str; 10] = [
    "name", "Name", "location", "Location", "circuit", "Circuit", "country", "Country", "city",
    "City",
];

/// Search terms per Ergast circuit id
const CIRCUIT_NAME_HINTS: &[(&str, &[&str])] = &[
    ("monza", &["Monza", "Autodromo Nazionale Monza"]),
    ("silverstone", &["Silverstone"]),
    ("spa", &["Spa", "Spa-Francorchamps", "Circuit de Spa-Francorchamps"]),
    ("monaco", &["Monaco", "Circuit de Monaco"]),
    ("hungaroring", &["Hungaroring"]),
    ("zandvoort", &["Zandvoort"]),
    ("red_bull_ring", &["Red Bull Ring", "Spielberg"]),
    ("imola", &["Imola", "Enzo e Dino Ferrari"]),
    ("suzuka", &["Suzuka", "Suzuka International Racing Course"]),
    ("yas_marina", &["Yas Marina"]),
    ("sakhir", &["Bahrain", "Sakhir"]),
    ("jeddah", &["Jeddah"]),
    ("losail", &["Losail"]),
    ("interlagos", &["Interlagos", "São Paulo", "Sao Paulo"]),
    ("americas", &["Circuit of the Americas", "COTA"]),
    ("miami", &["Miami"]),
    ("mexico", &["Hermanos Rodríguez", "Hermanos Rodriguez", "Mexico City"]),
    ("vegas", &["Las Vegas"]),
    ("montreal", &["Gilles Villeneuve", "Montreal"]),
    ("albert_park", &["Albert Park", "Melbourne"]),
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Value,
}

impl Feature {
    /// Lower-cased concatenation of the searchable properties
    fn haystack(&self) -> String {
        let Some(props) = &self.properties else {
            return String::new();
        };
        SEARCH_KEYS
            .iter()
            .filter_map(|k| props.get(*k))
            .filter_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

impl Geometry {
    /// LineString as-is, MultiLineString as its longest part
    pub fn line(&self) -> Option<Vec<[f64; 2]>> {
        match self.kind.as_str() {
            "LineString" => Some(positions(&self.coordinates)),
            "MultiLineString" => self
                .coordinates
                .as_array()?
                .iter()
                .map(positions)
                .fold(None, |best: Option<Vec<[f64; 2]>>, seg| match best {
                    Some(b) if b.len() >= seg.len() => Some(b),
                    _ => Some(seg),
                }),
            _ => None,
        }
    }
}

/// Decode `[[lon, lat, (alt)], ...]`, skipping malformed positions
fn positions(value: &Value) -> Vec<[f64; 2]> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|p| {
                    let p = p.as_array()?;
                    Some([p.first()?.as_f64()?, p.get(1)?.as_f64()?])
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Search terms for a circuit id; unknown ids search for themselves
pub fn hints_for(circuit_id: &str) -> Vec<&str> {
    CIRCUIT_NAME_HINTS
        .iter()
        .find(|(id, _)| *id == circuit_id)
        .map(|(_, hints)| hints.to_vec())
        .unwrap_or_else(|| vec![circuit_id])
}

/// First feature matching any hint, as a polyline
pub fn find_circuit_line(collection: &FeatureCollection, circuit_id: &str) -> Option<Vec<[f64; 2]>> {
    let hints: Vec<String> = hints_for(circuit_id)
        .into_iter()
        .map(|h| h.to_lowercase())
        .collect();
    let feature = collection.features.iter().find(|f| {
        let hay = f.haystack();
        hints.iter().any(|h| hay.contains(h.as_str()))
    })?;
    feature.geometry.as_ref()?.line()
}

/// Normalized SVG path for a lon/lat polyline, north up
pub fn line_to_svg_path(coords: &[[f64; 2]], view_w: f64, view_h: f64, pad: f64) -> String {
    let Some(first) = coords.first() else {
        return String::new();
    };

    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for c in coords {
        min_x = min_x.min(c[0]);
        max_x = max_x.max(c[0]);
        min_y = min_y.min(c[1]);
        max_y = max_y.max(c[1]);
    }

    let width = (max_x - min_x).max(1e-9);
    let height = (max_y - min_y).max(1e-9);
    let s = ((view_w - pad * 2.0) / width).min((view_h - pad * 2.0) / height);
    let to_x = |lon: f64| pad + (lon - min_x) * s;
    let to_y = |lat: f64| pad + (max_y - lat) * s;

    let mut d = format!("M {:.2} {:.2}", to_x(first[0]), to_y(first[1]));
    for c in &coords[1..] {
        let _ = write!(d, " L {:.2} {:.2}", to_x(c[0]), to_y(c[1]));
    }
    d
}

pub struct GeometryClient {
    http: Client,
    url: String,
    collection: OnceCell<FeatureCollection>,
}

impl GeometryClient {
    pub fn new(url: &str) -> Self {
        Self {
            http: http::client(),
            url: url.to_string(),
            collection: OnceCell::new(),
        }
    }

    /// The full collection, downloaded on first use
    pub async fn collection(&self) -> Result<&FeatureCollection, FetchError> {
        self.collection
            .get_or_try_init(|| async {
                let resp = http::get(&self.http, &self.url).await?;
                http::ensure_success(&resp)?;
                let fc: FeatureCollection = http::json(resp).await?;
                info!("Loaded {} circuit outlines", fc.features.len());
                Ok(fc)
            })
            .await
    }

    pub async fn circuit_line(&self, circuit_id: &str) -> Result<Option<Vec<[f64; 2]>>, FetchError> {
        let fc = self.collection().await?;
        let line = find_circuit_line(fc, circuit_id);
        if line.is_none() {
            debug!("No geometry for circuit {}", circuit_id);
        }
        Ok(line)
    }
}

impl Default for GeometryClient {
    fn default() -> Self {
        Self::new(DEFAULT_GEOJSON_URL)
    }
}
