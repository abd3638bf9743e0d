use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:9000";
const DEFAULT_PORT: u16 = 4300;
const DEFAULT_DATA_DIR: &str = "./data";

/// Area new and edited stops must fall into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub const WORLD: BoundingBox = BoundingBox {
        min_lng: -180.0,
        min_lat: -90.0,
        max_lng: 180.0,
        max_lat: 90.0,
    };

    pub fn contains_lat(&self, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn contains_lng(&self, lng: f64) -> bool {
        lng >= self.min_lng && lng <= self.max_lng
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::WORLD
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = anyhow::Error;

    /// `min_lng,min_lat,max_lng,max_lat`
    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid bounding box: {}", s))?;
        let [min_lng, min_lat, max_lng, max_lat] = parts[..] else {
            return Err(anyhow!("Bounding box needs 4 numbers, got {}", parts.len()));
        };
        if min_lng > max_lng || min_lat > max_lat {
            return Err(anyhow!("Bounding box minimum exceeds maximum: {}", s));
        }
        let bbox = BoundingBox {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        };
        if !(BoundingBox::WORLD.contains_lng(min_lng)
            && BoundingBox::WORLD.contains_lng(max_lng)
            && BoundingBox::WORLD.contains_lat(min_lat)
            && BoundingBox::WORLD.contains_lat(max_lat))
        {
            return Err(anyhow!("Bounding box outside of valid coordinates: {}", s));
        }
        Ok(bbox)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub production: bool,
    pub region: BoundingBox,
    // Load only this line at start-up instead of all of them
    pub initial_line: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = get("API_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let port = match get("PORT") {
            Some(p) => p.parse().with_context(|| format!("Invalid PORT: {}", p))?,
            None => DEFAULT_PORT,
        };

        let production = get("PRODUCTION")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let region = match get("REGION_BBOX") {
            Some(b) => b.parse().context("Invalid REGION_BBOX")?,
            None => BoundingBox::WORLD,
        };

        Ok(Self {
            api_url,
            port,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            production,
            region,
            initial_line: get("INITIAL_LINE").filter(|l| !l.is_empty()),
        })
    }
}
