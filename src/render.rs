//! Answer rendering.
//!
//! Everything the user reads is produced here: the [`PromptContext`] handed to
//! the language-generation provider, the plain-text summary used when that
//! provider fails, and the apologies returned when the pipeline halts. None of
//! these ever include provider error text.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::query::TravelMode;
use crate::state::{RouteSummary, WeatherSnapshot, WorkflowState};

const INSTRUCTIONS: &str = "You are a helpful navigation assistant. Using only the trip data below, \
write clear, friendly directions: summarize the journey, give the expected time and distance, \
mention current conditions that could affect travel, and add one or two practical tips. \
If no weather is given, do not mention the weather.";

/// The data a synthesis provider may use, built solely from workflow state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptContext {
    /// The request text.
    pub query: String,
    /// Where the trip starts.
    pub origin: String,
    /// Where the trip ends.
    pub destination: String,
    /// Requested travel mode.
    pub mode: TravelMode,
    /// Current weather, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherSnapshot>,
    /// The primary itinerary.
    pub route: RouteSummary,
    /// Other itineraries, when known.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<RouteSummary>,
}

impl PromptContext {
    /// Build the context; `None` when the state has no route yet.
    pub fn from_state(state: &WorkflowState) -> Option<Self> {
        let route = state.route()?.clone();
        Some(Self {
            query: state.query().to_string(),
            origin: origin_label(state),
            destination: destination_label(state),
            mode: state.parsed().mode,
            weather: state.weather().cloned(),
            route,
            alternatives: state.alternatives().map(<[_]>::to_vec).unwrap_or_default(),
        })
    }

    /// Render the full prompt: instructions followed by the trip data as JSON.
    pub fn to_prompt(&self) -> String {
        let data = serde_json::to_string_pretty(self).unwrap_or_else(|_| self.query.clone());
        format!("{INSTRUCTIONS}\n\nTrip data:\n{data}\n")
    }
}

/// Why the pipeline fell back to an apology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// A critical step failed.
    Halted,
    /// The per-request budget ran out.
    BudgetExceeded,
    /// The request deadline passed.
    TimedOut,
}

/// Plain-text directions built directly from the route, without a provider.
///
/// Returns `None` when the state has no route.
pub fn templated_summary(state: &WorkflowState) -> Option<String> {
    let route = state.route()?;
    let mut out = String::new();

    let _ = writeln!(out, "Directions for: {}", state.query().trim());
    let _ = writeln!(out);
    let _ = writeln!(out, "From: {}", origin_label(state));
    let _ = writeln!(out, "To: {}", destination_label(state));

    let modes = route.modes();
    if modes.is_empty() {
        let _ = writeln!(out, "Route: {}", route.summary);
    } else {
        let _ = writeln!(out, "Route: {} ({})", route.summary, modes.join(" > "));
    }

    let mut eta = format!("Estimated time: {} min", route.duration_minutes());
    if let Some(distance) = route.distance_m {
        let _ = write!(eta, ", {:.1} km", f64::from(distance) / 1000.0);
    }
    if let Some(cost) = route.cost {
        let _ = write!(eta, ", fare {cost:.2}");
    }
    let _ = writeln!(out, "{eta}");

    if route.delay_s > 0 {
        let _ = writeln!(out, "Delay: about {} min longer than usual", route.delay_s.div_ceil(60));
    }
    for note in &route.delay_notes {
        let _ = writeln!(out, "Notice: {note}");
    }

    if !route.legs.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Steps:");
        for (i, leg) in route.legs.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} ({} min)",
                i + 1,
                leg.instruction,
                leg.duration_s.div_ceil(60)
            );
        }
    }

    if let Some(alternatives) = state.alternatives().filter(|a| !a.is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "Other options:");
        for alt in alternatives {
            let _ = writeln!(out, "  - {} ({} min)", alt.summary, alt.duration_minutes());
        }
    }

    let _ = writeln!(out);
    out.push_str("Have a safe trip!");
    Some(out)
}

/// Generic apology plus whatever partial state was gathered.
pub fn fallback_answer(state: &WorkflowState, reason: FallbackReason) -> String {
    let mut out = match reason {
        FallbackReason::Halted => {
            "I'm sorry, I couldn't put together directions for that request right now. \
             Please try again in a moment."
        }
        FallbackReason::BudgetExceeded => {
            "I'm sorry, this request ran out of its processing budget before directions were ready. \
             Please try again in a moment."
        }
        FallbackReason::TimedOut => {
            "I'm sorry, gathering directions took too long. Please try again in a moment."
        }
    }
    .to_string();

    let origin = state.origin();
    let weather = state.weather();
    if origin.is_some() || weather.is_some() {
        out.push_str("\n\nWhat I did find:");
        if let Some(origin) = origin {
            let _ = write!(out, "\n- Your location: {}", origin.display_name);
        }
        if let Some(weather) = weather {
            let _ = write!(
                out,
                "\n- Weather: {}, {:.0}°C",
                weather.condition, weather.temp_c
            );
        }
    }
    out
}

fn origin_label(state: &WorkflowState) -> String {
    state
        .parsed()
        .origin_hint
        .clone()
        .or_else(|| state.origin().map(|o| o.display_name.clone()))
        .unwrap_or_else(|| "your location".to_string())
}

fn destination_label(state: &WorkflowState) -> String {
    state
        .parsed()
        .destination
        .clone()
        .unwrap_or_else(|| "your destination".to_string())
}
