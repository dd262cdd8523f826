use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

use crate::alerts::MatchRadius;
use crate::geo::GeoPoint;

const DEFAULT_SEISMIC_FEED_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_hour.geojson";
const DEFAULT_WILDFIRE_FEED_URL: &str = "https://services3.arcgis.com/T4QMspbfLg3qTGWY/arcgis/rest/services/WFIGS_Incident_Locations_Current/FeatureServer/0/query";
const DEFAULT_FLOOD_API_URL: &str = "https://flood-api.open-meteo.com/v1/flood";
const DEFAULT_TSUNAMI_FEED_URLS: &str =
    "https://www.tsunami.gov/events/xml/PAAQAtom.xml,https://www.tsunami.gov/events/xml/PHEBAtom.xml";
const DEFAULT_PUSH_GATEWAY_URL: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: String,
    pub http_timeout_secs: u64,
    pub seismic_feed_url: String,
    pub wildfire_feed_url: String,
    pub flood_api_url: String,
    pub tsunami_feed_urls: Vec<String>,
    pub flood_watch_points: Vec<GeoPoint>,
    pub push_gateway_url: String,
    pub push_batch_size: usize,
    pub alert_lookback_minutes: i64,
    pub alert_match_radius_km: f64,
    pub alert_radius_mode: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_DATABASE").unwrap_or_else(|_| "siscom_hazards".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "siscom".to_string());
        let db_pwd = env::var("DB_PWD").unwrap_or_else(|_| "siscom".to_string());

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let seismic_feed_url =
            env::var("SEISMIC_FEED_URL").unwrap_or_else(|_| DEFAULT_SEISMIC_FEED_URL.to_string());
        let wildfire_feed_url =
            env::var("WILDFIRE_FEED_URL").unwrap_or_else(|_| DEFAULT_WILDFIRE_FEED_URL.to_string());
        let flood_api_url =
            env::var("FLOOD_API_URL").unwrap_or_else(|_| DEFAULT_FLOOD_API_URL.to_string());
        let tsunami_feed_urls = parse_url_list(
            &env::var("TSUNAMI_FEED_URLS").unwrap_or_else(|_| DEFAULT_TSUNAMI_FEED_URLS.to_string()),
        );
        let flood_watch_points =
            parse_watch_points(&env::var("FLOOD_WATCH_POINTS").unwrap_or_default());

        let push_gateway_url =
            env::var("PUSH_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_PUSH_GATEWAY_URL.to_string());
        let push_batch_size = env::var("PUSH_BATCH_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let alert_lookback_minutes = env::var("ALERT_LOOKBACK_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);
        let alert_match_radius_km = env::var("ALERT_MATCH_RADIUS_KM")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .unwrap_or(500.0);
        let alert_radius_mode =
            env::var("ALERT_RADIUS_MODE").unwrap_or_else(|_| "fixed".to_string());

        Ok(Self {
            database_url,
            db_max_connections,
            log_level,
            http_timeout_secs,
            seismic_feed_url,
            wildfire_feed_url,
            flood_api_url,
            tsunami_feed_urls,
            flood_watch_points,
            push_gateway_url,
            push_batch_size,
            alert_lookback_minutes,
            alert_match_radius_km,
            alert_radius_mode,
        })
    }

    /// The fixed radius is the default; `ALERT_RADIUS_MODE=scaled` opts into
    /// magnitude scaling for earthquakes.
    pub fn match_radius(&self) -> MatchRadius {
        match self.alert_radius_mode.to_lowercase().as_str() {
            "scaled" => MatchRadius::magnitude_scaled(),
            _ => MatchRadius::Fixed(self.alert_match_radius_km),
        }
    }
}

fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `lat,lon;lat,lon`. Malformed pairs are ignored.
fn parse_watch_points(raw: &str) -> Vec<GeoPoint> {
    raw.split(';')
        .filter_map(|pair| {
            let (lat, lon) = pair.split_once(',')?;
            let lat = lat.trim().parse::<f64>().ok()?;
            let lon = lon.trim().parse::<f64>().ok()?;
            Some(GeoPoint::new(lat, lon))
        })
        .collect()
}
