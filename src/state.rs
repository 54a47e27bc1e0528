//! Per-request workflow state.
//!
//! [`WorkflowState`] is the single artifact threaded through the pipeline.
//! Identity fields are fixed at creation. Every optional field is write-once:
//! a setter called on an already-populated field returns
//! [`Error::FieldAlreadySet`] and leaves the state untouched. The trace and the
//! error counter only ever grow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result, StepFailure};
use crate::query::ParsedQuery;
use crate::trace::{StepStatus, TraceRecord};

/// Where a [`Location`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// Resolved by the geolocation provider.
    Resolved,
    /// The configured default, used when resolution failed.
    Default,
}

/// A point on the map with a display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Human-readable name, e.g. "New York, New York".
    pub display_name: String,
    /// Provenance of the coordinates.
    pub source: LocationSource,
}

impl Location {
    /// Create a provider-resolved location.
    pub fn new(latitude: f64, longitude: f64, display_name: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            display_name: display_name.into(),
            source: LocationSource::Resolved,
        }
    }

    /// New York City, used when nothing better is known.
    pub fn new_york() -> Self {
        Self {
            latitude: 40.7128,
            longitude: -74.0060,
            display_name: "New York, New York".to_string(),
            source: LocationSource::Default,
        }
    }
}

/// Current conditions at the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Short description, e.g. "light rain".
    pub condition: String,
    /// Temperature in degrees Celsius.
    pub temp_c: f64,
    /// Visibility in kilometres.
    pub visibility_km: f64,
}

/// One leg of an itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    /// Travel mode of the leg, e.g. "subway" or "walk".
    pub mode: String,
    /// What to do on this leg.
    pub instruction: String,
    /// Expected leg duration in seconds.
    pub duration_s: u32,
}

/// A complete itinerary from origin to destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    /// Provider summary, e.g. "Q train via Broadway".
    pub summary: String,
    /// Ordered legs.
    pub legs: Vec<RouteLeg>,
    /// Total expected duration in seconds, delays included.
    pub duration_s: u32,
    /// Total distance in metres, when known.
    #[serde(default)]
    pub distance_m: Option<u32>,
    /// Fare in local currency units, when known.
    #[serde(default)]
    pub cost: Option<f64>,
    /// Extra time caused by current disruptions, in seconds.
    #[serde(default)]
    pub delay_s: u32,
    /// Service notices affecting the route.
    #[serde(default)]
    pub delay_notes: Vec<String>,
}

impl RouteSummary {
    /// Distinct leg modes in travel order.
    pub fn modes(&self) -> Vec<&str> {
        let mut modes: Vec<&str> = Vec::new();
        for leg in &self.legs {
            if !modes.contains(&leg.mode.as_str()) {
                modes.push(&leg.mode);
            }
        }
        modes
    }

    /// Total duration in whole minutes, rounded up.
    pub fn duration_minutes(&self) -> u32 {
        self.duration_s.div_ceil(60)
    }
}

/// Named pieces of state that steps require or produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// The destination parsed from the query (fixed at creation).
    Destination,
    /// The traveller's resolved starting point.
    Origin,
    /// Current weather at the origin.
    Weather,
    /// The primary itinerary.
    Route,
    /// Other itineraries.
    Alternatives,
    /// The rendered answer.
    FinalAnswer,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Destination => "destination",
            Field::Origin => "origin",
            Field::Weather => "weather",
            Field::Route => "route",
            Field::Alternatives => "alternatives",
            Field::FinalAnswer => "final_answer",
        };
        f.write_str(name)
    }
}

/// The per-request record each step reads from and writes into.
///
/// # Example
///
/// ```rust
/// use wayfinder::{Field, Location, WorkflowState};
///
/// let mut state = WorkflowState::new("bus to airport");
/// assert_eq!(state.parsed().destination.as_deref(), Some("airport"));
///
/// state.set_origin(Location::new_york()).unwrap();
/// assert!(state.has(Field::Origin));
///
/// // Write-once: a second write is rejected and the first value kept.
/// let err = state.set_origin(Location::new(51.5, -0.12, "London")).unwrap_err();
/// assert!(matches!(err, wayfinder::Error::FieldAlreadySet(Field::Origin)));
/// assert_eq!(state.origin().unwrap().display_name, "New York, New York");
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    request_id: Uuid,
    query: String,
    parsed: ParsedQuery,
    origin: Option<Location>,
    weather: Option<WeatherSnapshot>,
    route: Option<RouteSummary>,
    alternatives: Option<Vec<RouteSummary>>,
    final_answer: Option<String>,
    trace: Vec<TraceRecord>,
    errors_encountered: u32,
}

impl WorkflowState {
    /// Create a state for `query` with a fresh request id.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), query)
    }

    /// Create a state with a caller-chosen request id.
    #[must_use]
    pub fn with_id(request_id: Uuid, query: impl Into<String>) -> Self {
        let query = query.into();
        let parsed = ParsedQuery::parse(&query);
        Self {
            request_id,
            query,
            parsed,
            origin: None,
            weather: None,
            route: None,
            alternatives: None,
            final_answer: None,
            trace: Vec::new(),
            errors_encountered: 0,
        }
    }

    /// Append a trace record; a `Failed` status also bumps the error count.
    pub fn record(
        &mut self,
        step_name: &str,
        status: StepStatus,
        attempts: u32,
        duration: Duration,
        error: Option<StepFailure>,
    ) {
        if status.is_failure() {
            self.errors_encountered += 1;
        }
        self.trace
            .push(TraceRecord::new(step_name, status, attempts, duration, error));
    }

    /// Whether the given field is populated.
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Destination => self.parsed.destination.is_some(),
            Field::Origin => self.origin.is_some(),
            Field::Weather => self.weather.is_some(),
            Field::Route => self.route.is_some(),
            Field::Alternatives => self.alternatives.is_some(),
            Field::FinalAnswer => self.final_answer.is_some(),
        }
    }

    /// Set the origin once.
    pub fn set_origin(&mut self, origin: Location) -> Result<()> {
        write_once(&mut self.origin, origin, Field::Origin)
    }

    /// Set the weather once.
    pub fn set_weather(&mut self, weather: WeatherSnapshot) -> Result<()> {
        write_once(&mut self.weather, weather, Field::Weather)
    }

    /// Set the primary route once.
    pub fn set_route(&mut self, route: RouteSummary) -> Result<()> {
        write_once(&mut self.route, route, Field::Route)
    }

    /// Set the alternative routes once.
    pub fn set_alternatives(&mut self, alternatives: Vec<RouteSummary>) -> Result<()> {
        write_once(&mut self.alternatives, alternatives, Field::Alternatives)
    }

    /// Set the final answer once.
    pub fn set_final_answer(&mut self, answer: impl Into<String>) -> Result<()> {
        write_once(&mut self.final_answer, answer.into(), Field::FinalAnswer)
    }

    /// Unique id of this request.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The request text as received.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The parsed request.
    pub fn parsed(&self) -> &ParsedQuery {
        &self.parsed
    }

    /// Resolved starting point.
    pub fn origin(&self) -> Option<&Location> {
        self.origin.as_ref()
    }

    /// Weather at the origin.
    pub fn weather(&self) -> Option<&WeatherSnapshot> {
        self.weather.as_ref()
    }

    /// Primary itinerary.
    pub fn route(&self) -> Option<&RouteSummary> {
        self.route.as_ref()
    }

    /// Other itineraries.
    pub fn alternatives(&self) -> Option<&[RouteSummary]> {
        self.alternatives.as_deref()
    }

    /// Rendered answer.
    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    /// Step records in execution order.
    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    /// Number of failed steps so far.
    pub fn errors_encountered(&self) -> u32 {
        self.errors_encountered
    }
}

fn write_once<T>(slot: &mut Option<T>, value: T, field: Field) -> Result<()> {
    if slot.is_some() {
        return Err(Error::FieldAlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}
