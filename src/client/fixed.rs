//! Canned, in-process collaborators.
//!
//! These never touch the network and always succeed. They back offline runs,
//! demos and doctests; swap in real clients with the `Clients::with_*`
//! builders.

use async_trait::async_trait;
use std::fmt::Write as _;

use super::{Generation, LocationClient, RouteClient, SynthesisClient, WeatherClient};
use crate::error::ServiceError;
use crate::query::TravelMode;
use crate::render::PromptContext;
use crate::state::{Location, RouteLeg, RouteSummary, WeatherSnapshot};

/// Always resolves to the same location.
#[derive(Debug, Clone)]
pub struct FixedLocation(pub Location);

impl Default for FixedLocation {
    fn default() -> Self {
        Self(Location::new(40.7411, -73.9897, "Flatiron District, New York"))
    }
}

#[async_trait]
impl LocationClient for FixedLocation {
    async fn resolve(&self, _ip: &str) -> Result<Location, ServiceError> {
        Ok(self.0.clone())
    }
}

/// Always reports the same weather.
#[derive(Debug, Clone)]
pub struct FixedWeather(pub WeatherSnapshot);

impl Default for FixedWeather {
    fn default() -> Self {
        Self(WeatherSnapshot {
            condition: "scattered clouds".to_string(),
            temp_c: 18.0,
            visibility_km: 10.0,
        })
    }
}

#[async_trait]
impl WeatherClient for FixedWeather {
    async fn current(&self, _latitude: f64, _longitude: f64) -> Result<WeatherSnapshot, ServiceError> {
        Ok(self.0.clone())
    }
}

/// Plans a plausible three-leg itinerary to any destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRoute;

impl FixedRoute {
    fn plan(destination: &str, mode: TravelMode, variant: u32) -> RouteSummary {
        let (main_mode, line) = match (mode, variant) {
            (TravelMode::Transit, 0) => ("subway", "the N train"),
            (TravelMode::Transit, 1) => ("bus", "the M5 bus"),
            (TravelMode::Transit, _) => ("subway", "the 6 train"),
            (TravelMode::Driving, _) => ("drive", "the avenue"),
            (TravelMode::Walking, _) => ("walk", "the avenue"),
            (TravelMode::Bicycling, _) => ("bike", "the bike lane"),
        };
        let ride = 900 + variant * 240;
        let legs = vec![
            RouteLeg {
                mode: "walk".to_string(),
                instruction: "Walk to the nearest stop".to_string(),
                duration_s: 240,
            },
            RouteLeg {
                mode: main_mode.to_string(),
                instruction: format!("Take {line} toward {destination}"),
                duration_s: ride,
            },
            RouteLeg {
                mode: "walk".to_string(),
                instruction: format!("Walk to {destination}"),
                duration_s: 180,
            },
        ];
        RouteSummary {
            summary: format!("via {line}"),
            duration_s: legs.iter().map(|l| l.duration_s).sum(),
            legs,
            distance_m: Some(4_800 + variant * 600),
            cost: (mode == TravelMode::Transit).then_some(2.9),
            delay_s: 0,
            delay_notes: Vec::new(),
        }
    }
}

#[async_trait]
impl RouteClient for FixedRoute {
    async fn route(
        &self,
        _origin: &str,
        destination: &str,
        mode: TravelMode,
    ) -> Result<RouteSummary, ServiceError> {
        if destination.trim().is_empty() {
            return Err(ServiceError::InvalidInput("destination is empty".to_string()));
        }
        Ok(Self::plan(destination, mode, 0))
    }

    async fn alternatives(
        &self,
        _origin: &str,
        destination: &str,
        mode: TravelMode,
        limit: usize,
    ) -> Result<Vec<RouteSummary>, ServiceError> {
        Ok((1..=2u32)
            .take(limit)
            .map(|variant| Self::plan(destination, mode, variant))
            .collect())
    }
}

/// Writes a friendly answer from the prompt context without a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSynthesis;

#[async_trait]
impl SynthesisClient for TemplateSynthesis {
    async fn generate(&self, context: &PromptContext) -> Result<Generation, ServiceError> {
        let route = &context.route;
        let mut text = format!(
            "To get from {} to {}, go {}. It should take about {} minutes.",
            context.origin,
            context.destination,
            route.summary,
            route.duration_minutes()
        );
        if let Some(weather) = &context.weather {
            let _ = write!(
                text,
                " It's {} and {:.0}°C right now, so dress for it.",
                weather.condition, weather.temp_c
            );
        }
        if let Some(alt) = context.alternatives.first() {
            let _ = write!(
                text,
                " If that doesn't suit you, {} takes about {} minutes.",
                alt.summary,
                alt.duration_minutes()
            );
        }
        text.push_str(" Have a safe trip!");

        let prompt_tokens = context.to_prompt().split_whitespace().count() as u64;
        let completion_tokens = text.split_whitespace().count() as u64;
        Ok(Generation {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }
}
