use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wnk_core::panel::{Direction, PanelBottom, PanelData, PanelItem, PanelNode, PanelOutput, PanelTop};
use wnk_core::plugin::{Plugin, PluginCapability, PluginError, PluginManifest};
use wnk_core::protocol::{HostContext, ResultItem};

pub const ID: &str = "weather";
const ITEM_ID: &str = "weather";
const FORECAST_DAYS: usize = 7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub timezone: String,
    pub cache_ttl_secs: u64,
    pub timeout_ms: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            latitude: 25.0330,
            longitude: 121.5654,
            city: "Taipei".to_string(),
            timezone: "Asia/Taipei".to_string(),
            cache_ttl_secs: 600,
            timeout_ms: 8_000,
        }
    }
}

impl WeatherConfig {
    pub fn forecast_url(&self) -> String {
        format!(
            "https://api.open-meteo.com/v1/forecast?latitude={}&longitude={}&current=temperature_2m,weather_code&daily=temperature_2m_max,temperature_2m_min,weather_code&timezone={}&forecast_days={FORECAST_DAYS}",
            self.latitude, self.longitude, self.timezone
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForecastDay {
    pub date: String,
    pub temp_max: i64,
    pub temp_min: i64,
    pub weather_code: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Forecast {
    pub city: String,
    pub temp: i64,
    pub weather_code: i64,
    pub days: Vec<ForecastDay>,
}

/// Blocking forecast lookup. Runs on the blocking pool.
pub trait ForecastSource: Send + Sync {
    fn fetch(&self) -> Result<Forecast>;
}

#[derive(Deserialize)]
struct OpenMeteoResponse {
    current: OpenMeteoCurrent,
    daily: OpenMeteoDaily,
}

#[derive(Deserialize)]
struct OpenMeteoCurrent {
    temperature_2m: f64,
    weather_code: i64,
}

#[derive(Deserialize)]
struct OpenMeteoDaily {
    time: Vec<String>,
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
    weather_code: Vec<i64>,
}

fn forecast_from_response(city: &str, response: OpenMeteoResponse) -> Forecast {
    let daily = response.daily;
    let days = daily
        .time
        .into_iter()
        .zip(daily.temperature_2m_max)
        .zip(daily.temperature_2m_min)
        .zip(daily.weather_code)
        .take(FORECAST_DAYS)
        .map(|(((date, max), min), code)| ForecastDay {
            date,
            temp_max: max.round() as i64,
            temp_min: min.round() as i64,
            weather_code: code,
        })
        .collect();
    Forecast {
        city: city.to_string(),
        temp: response.current.temperature_2m.round() as i64,
        weather_code: response.current.weather_code,
        days,
    }
}

#[derive(Debug)]
pub struct OpenMeteo {
    config: WeatherConfig,
}

impl OpenMeteo {
    pub fn new(config: WeatherConfig) -> Self {
        Self { config }
    }
}

impl ForecastSource for OpenMeteo {
    fn fetch(&self) -> Result<Forecast> {
        let timeout = Duration::from_millis(self.config.timeout_ms.max(1_000));
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let url = self.config.forecast_url();

        let response = match agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(anyhow!("open-meteo request failed with status {status}"));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(anyhow!("open-meteo transport error: {err}"));
            }
        };
        let body: OpenMeteoResponse = response
            .into_json()
            .context("failed to decode open-meteo response")?;
        Ok(forecast_from_response(&self.config.city, body))
    }
}

pub fn describe(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        c if c <= 3 => "Partly cloudy",
        c if c <= 48 => "Foggy",
        c if c <= 67 => "Rainy",
        c if c <= 77 => "Snowy",
        c if c <= 82 => "Rain showers",
        c if c <= 86 => "Snow showers",
        _ => "Thunderstorm",
    }
}

fn offline_panel() -> PanelData {
    PanelData {
        top: PanelTop::header("Weather", Some("Unable to load weather data".to_string())),
        main: PanelNode::empty(),
        bottom: Some(PanelBottom::Info {
            text: "Status: offline".to_string(),
        }),
    }
}

fn forecast_panel(forecast: &Forecast, ttl: Duration) -> PanelData {
    let summary = PanelNode::Flex {
        items: vec![PanelItem::new(
            format!("{}  {}\u{b0}C", forecast.city, forecast.temp),
            describe(forecast.weather_code),
        )],
    };
    let days = forecast
        .days
        .iter()
        .map(|day| {
            PanelItem::new(
                format!("{}  {}\u{b0} / {}\u{b0}", day.date, day.temp_max, day.temp_min),
                describe(day.weather_code),
            )
        })
        .collect();

    PanelData {
        top: PanelTop::header("Weather", Some(format!("{}-day forecast", forecast.days.len()))),
        main: PanelNode::Box {
            dir: Some(Direction::Vertical),
            gap: Some(12.0),
            children: vec![
                summary,
                PanelNode::Grid {
                    columns: Some(2.0),
                    gap: Some(12.0),
                    items: days,
                },
            ],
        },
        bottom: Some(PanelBottom::Info {
            text: format!("Data: Open-Meteo \u{b7} Cache: {}m", ttl.as_secs() / 60),
        }),
    }
}

/// Current conditions and a short forecast, cached for `cache_ttl_secs`.
pub struct Weather {
    manifest: PluginManifest,
    source: Arc<dyn ForecastSource>,
    ttl: Duration,
    cache: RefCell<Option<(Instant, Forecast)>>,
}

impl Weather {
    pub fn new(config: WeatherConfig) -> Self {
        Self::with_manifest(PluginManifest::new(ID, "Weather").with_icon("W"), config)
    }

    pub fn with_manifest(manifest: PluginManifest, config: WeatherConfig) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Self::with_source(manifest, Arc::new(OpenMeteo::new(config)), ttl)
    }

    pub fn with_source(manifest: PluginManifest, source: Arc<dyn ForecastSource>, ttl: Duration) -> Self {
        Self {
            manifest,
            source,
            ttl,
            cache: RefCell::new(None),
        }
    }

    fn cached(&self) -> Option<Forecast> {
        self.cache
            .borrow()
            .as_ref()
            .filter(|(fetched_at, _)| fetched_at.elapsed() < self.ttl)
            .map(|(_, forecast)| forecast.clone())
    }

    async fn forecast(&self) -> Option<Forecast> {
        if let Some(forecast) = self.cached() {
            return Some(forecast);
        }
        let source = Arc::clone(&self.source);
        let fetched = tokio::task::spawn_blocking(move || source.fetch())
            .await
            .map_err(|err| anyhow!("forecast task failed: {err}"))
            .and_then(|result| result);
        match fetched {
            Ok(forecast) => {
                debug!(days = forecast.days.len(), "weather refreshed");
                *self.cache.borrow_mut() = Some((Instant::now(), forecast.clone()));
                Some(forecast)
            }
            Err(err) => {
                warn!(error = %err, "weather fetch failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for Weather {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Weather")
            .field("manifest", &self.manifest)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait(?Send)]
impl Plugin for Weather {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn capabilities(&self) -> &[PluginCapability] {
        &[PluginCapability::Results, PluginCapability::Panel]
    }

    async fn get_results(&self, _query: &str, _context: &HostContext) -> Result<Vec<ResultItem>, PluginError> {
        Ok(vec![ResultItem::new("Weather")
            .id(ITEM_ID)
            .subtitle("View current weather and forecast")
            .icon("W")])
    }

    async fn get_panel(&self, item_id: &str) -> Result<Option<PanelOutput>, PluginError> {
        if item_id != ITEM_ID {
            return Ok(None);
        }
        let panel = match self.forecast().await {
            Some(forecast) => forecast_panel(&forecast, self.ttl),
            None => offline_panel(),
        };
        Ok(Some(panel.into()))
    }
}
