//! External service boundaries.
//!
//! Each provider the pipeline talks to is an async trait with a single
//! request/response method (two for routing). Implementations wrap a concrete
//! provider and report failures as [`ServiceError`]; they never classify or
//! retry themselves. That happens at the step boundary
//! ([`step::invoke`](crate::step::invoke)).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::query::TravelMode;
use crate::render::PromptContext;
use crate::state::{Location, RouteSummary, WeatherSnapshot};

pub mod fixed;

/// Resolves a network address to a location.
#[async_trait]
pub trait LocationClient: Send + Sync {
    /// Resolve `ip` to coordinates and a display name.
    async fn resolve(&self, ip: &str) -> Result<Location, ServiceError>;
}

/// Reports current weather.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    /// Current conditions at the given coordinates.
    async fn current(&self, latitude: f64, longitude: f64) -> Result<WeatherSnapshot, ServiceError>;
}

/// Plans itineraries.
#[async_trait]
pub trait RouteClient: Send + Sync {
    /// The best itinerary from `origin` to `destination`.
    async fn route(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
    ) -> Result<RouteSummary, ServiceError>;

    /// Up to `limit` other itineraries for the same trip.
    async fn alternatives(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
        limit: usize,
    ) -> Result<Vec<RouteSummary>, ServiceError>;
}

/// Text produced by a language-generation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// The generated answer.
    pub text: String,
    /// Prompt tokens billed.
    pub prompt_tokens: u64,
    /// Completion tokens billed.
    pub completion_tokens: u64,
}

/// Turns collected state into a friendly answer.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Generate an answer from `context`.
    async fn generate(&self, context: &PromptContext) -> Result<Generation, ServiceError>;
}

/// The full set of collaborators a supervisor needs.
#[derive(Clone)]
pub struct Clients {
    /// Geolocation provider.
    pub location: Arc<dyn LocationClient>,
    /// Weather provider.
    pub weather: Arc<dyn WeatherClient>,
    /// Routing provider.
    pub route: Arc<dyn RouteClient>,
    /// Language-generation provider.
    pub synthesis: Arc<dyn SynthesisClient>,
}

impl Clients {
    /// Bundle four collaborators.
    pub fn new(
        location: Arc<dyn LocationClient>,
        weather: Arc<dyn WeatherClient>,
        route: Arc<dyn RouteClient>,
        synthesis: Arc<dyn SynthesisClient>,
    ) -> Self {
        Self {
            location,
            weather,
            route,
            synthesis,
        }
    }

    /// Canned, in-process collaborators that always succeed.
    pub fn fixed() -> Self {
        Self::new(
            Arc::new(fixed::FixedLocation::default()),
            Arc::new(fixed::FixedWeather::default()),
            Arc::new(fixed::FixedRoute),
            Arc::new(fixed::TemplateSynthesis),
        )
    }

    /// Replace the geolocation provider.
    pub fn with_location(mut self, client: Arc<dyn LocationClient>) -> Self {
        self.location = client;
        self
    }

    /// Replace the weather provider.
    pub fn with_weather(mut self, client: Arc<dyn WeatherClient>) -> Self {
        self.weather = client;
        self
    }

    /// Replace the routing provider.
    pub fn with_route(mut self, client: Arc<dyn RouteClient>) -> Self {
        self.route = client;
        self
    }

    /// Replace the language-generation provider.
    pub fn with_synthesis(mut self, client: Arc<dyn SynthesisClient>) -> Self {
        self.synthesis = client;
        self
    }
}
