use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wayfinder::client::fixed::FixedRoute;
use wayfinder::client::{Generation, LocationClient, RouteClient, SynthesisClient, WeatherClient};
use wayfinder::render::PromptContext;
use wayfinder::{
    BudgetCeiling, Clients, FailureKind, FallbackReason, Field, Location, Outcome, PipelineConfig,
    RetryPolicy, RouteSummary, RunStatus, ServiceError, StepStatus, Supervisor, TravelMode,
    WeatherSnapshot,
};

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
        call_timeout_ms: 1_000,
        request_timeout_ms: 5_000,
        ..PipelineConfig::default()
    }
}

fn supervisor(clients: Clients) -> Supervisor {
    Supervisor::new(clients, fast_config())
}

fn status_of(run: &wayfinder::PipelineRun, step: &str) -> StepStatus {
    run.state
        .trace()
        .iter()
        .find(|r| r.step == step)
        .map(|r| r.status)
        .unwrap_or_else(|| panic!("no trace record for {step}"))
}

fn calls_for(run: &wayfinder::PipelineRun, step: &str) -> usize {
    run.calls.iter().filter(|c| c.step == step).count()
}

struct DownLocation;

#[async_trait]
impl LocationClient for DownLocation {
    async fn resolve(&self, _ip: &str) -> Result<Location, ServiceError> {
        Err(ServiceError::Unavailable("geolocation offline".to_string()))
    }
}

struct DownWeather;

#[async_trait]
impl WeatherClient for DownWeather {
    async fn current(&self, _lat: f64, _lon: f64) -> Result<WeatherSnapshot, ServiceError> {
        Err(ServiceError::Status {
            code: 503,
            message: "weather backend overloaded".to_string(),
        })
    }
}

struct PanickingWeather;

#[async_trait]
impl WeatherClient for PanickingWeather {
    async fn current(&self, lat: f64, _lon: f64) -> Result<WeatherSnapshot, ServiceError> {
        if lat.is_nan() {
            return Err(ServiceError::InvalidInput("nan".to_string()));
        }
        panic!("weather client bug");
    }
}

/// Fails with `error` for the first `failures` calls, then plans normally.
struct ScriptedRoute {
    failures: u32,
    error: ServiceError,
    calls: AtomicU32,
}

impl ScriptedRoute {
    fn failing(failures: u32, error: ServiceError) -> Self {
        Self {
            failures,
            error,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RouteClient for ScriptedRoute {
    async fn route(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
    ) -> Result<RouteSummary, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(self.error.clone());
        }
        FixedRoute.route(origin, destination, mode).await
    }

    async fn alternatives(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
        limit: usize,
    ) -> Result<Vec<RouteSummary>, ServiceError> {
        FixedRoute.alternatives(origin, destination, mode, limit).await
    }
}

struct SlowRoute(Duration);

#[async_trait]
impl RouteClient for SlowRoute {
    async fn route(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
    ) -> Result<RouteSummary, ServiceError> {
        tokio::time::sleep(self.0).await;
        FixedRoute.route(origin, destination, mode).await
    }

    async fn alternatives(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
        limit: usize,
    ) -> Result<Vec<RouteSummary>, ServiceError> {
        FixedRoute.alternatives(origin, destination, mode, limit).await
    }
}

struct DownSynthesis;

#[async_trait]
impl SynthesisClient for DownSynthesis {
    async fn generate(&self, _context: &PromptContext) -> Result<Generation, ServiceError> {
        Err(ServiceError::RateLimited)
    }
}

#[tokio::test]
async fn test_happy_path() {
    let run = supervisor(Clients::fixed())
        .run("public transport to Times Square")
        .await;

    assert_eq!(run.outcome, Outcome::Synthesized);
    assert_eq!(run.status, RunStatus::Completed);
    assert!(!run.degraded());
    assert_eq!(run.state.errors_encountered(), 0);
    assert_eq!(run.budget.api_calls, 5);

    let steps: Vec<&str> = run.state.trace().iter().map(|r| r.step.as_str()).collect();
    assert_eq!(steps, ["location", "weather", "route", "alternatives", "synthesis"]);
    assert!(run.state.trace().iter().all(|r| r.attempts == 1));

    assert!(run.final_answer.contains("Times Square"));
    assert!(run.final_answer.contains("scattered clouds"));
    assert_eq!(run.state.final_answer(), Some(run.final_answer.as_str()));
    assert!(run.budget.total_tokens() > 0);
}

#[tokio::test]
async fn test_handle_request_reports_calls_as_messages() {
    let response = supervisor(Clients::fixed())
        .handle_request("take me to the Brooklyn Bridge")
        .await;

    assert_eq!(response.outcome, Outcome::Synthesized);
    assert_eq!(response.messages_exchanged, 5);
    assert_eq!(response.errors_encountered, 0);
    assert!(response.processing_time_s >= 0.0);
    assert!(!response.request_id.is_nil());
}

#[tokio::test]
async fn test_empty_query_halts_without_route_calls() {
    let run = supervisor(Clients::fixed()).run("").await;

    assert_eq!(run.outcome, Outcome::Fallback(FallbackReason::Halted));
    assert_eq!(run.status, RunStatus::Halted);
    assert!(run.state.errors_encountered() >= 1);
    assert!(run.final_answer.starts_with("I'm sorry"));
    assert_eq!(calls_for(&run, "route"), 0);

    let route = run.state.trace().iter().find(|r| r.step == "route").unwrap();
    assert_eq!(route.status, StepStatus::Failed);
    assert_eq!(route.attempts, 0);
    assert_eq!(
        route.error.as_ref().map(|e| e.kind),
        Some(FailureKind::CriticalStepFailure)
    );
}

#[tokio::test]
async fn test_route_timeouts_are_retried_then_halt() {
    let clients = Clients::fixed().with_route(Arc::new(ScriptedRoute::failing(
        u32::MAX,
        ServiceError::Timeout(Duration::from_secs(10)),
    )));
    let run = supervisor(clients).run("directions to Times Square").await;

    assert_eq!(run.outcome, Outcome::Fallback(FallbackReason::Halted));
    assert_eq!(calls_for(&run, "route"), 3);

    let route = run.state.trace().iter().find(|r| r.step == "route").unwrap();
    assert_eq!(route.status, StepStatus::Failed);
    assert_eq!(route.attempts, 3);
    assert_eq!(run.state.trace().iter().filter(|r| r.step == "route").count(), 1);

    // Nothing runs after a critical failure.
    assert_eq!(calls_for(&run, "synthesis"), 0);
    assert!(run.state.trace().iter().all(|r| r.step != "synthesis"));
    assert!(!run.state.has(Field::FinalAnswer));

    // The apology carries partial state but no provider error text.
    assert!(run.final_answer.starts_with("I'm sorry"));
    assert!(run.final_answer.contains("What I did find:"));
    assert!(!run.final_answer.contains("timed out"));
}

#[tokio::test]
async fn test_route_recovers_on_retry() {
    let clients = Clients::fixed().with_route(Arc::new(ScriptedRoute::failing(
        1,
        ServiceError::RateLimited,
    )));
    let run = supervisor(clients).run("directions to Times Square").await;

    assert_eq!(run.outcome, Outcome::Synthesized);
    assert_eq!(status_of(&run, "route"), StepStatus::Succeeded);
    let route = run.state.trace().iter().find(|r| r.step == "route").unwrap();
    assert_eq!(route.attempts, 2);
    assert_eq!(run.state.errors_encountered(), 0);
}

#[tokio::test]
async fn test_client_input_error_is_not_retried() {
    let clients = Clients::fixed().with_route(Arc::new(ScriptedRoute::failing(
        u32::MAX,
        ServiceError::Status {
            code: 404,
            message: "no such place".to_string(),
        },
    )));
    let run = supervisor(clients).run("directions to Atlantis").await;

    assert_eq!(calls_for(&run, "route"), 1);
    let route = run.state.trace().iter().find(|r| r.step == "route").unwrap();
    assert_eq!(route.error.as_ref().map(|e| e.kind), Some(FailureKind::ClientInput));
    assert_eq!(run.outcome, Outcome::Fallback(FallbackReason::Halted));
}

#[tokio::test]
async fn test_weather_failure_degrades() {
    let clients = Clients::fixed().with_weather(Arc::new(DownWeather));
    let run = supervisor(clients).run("public transport to Times Square").await;

    assert_eq!(run.outcome, Outcome::Synthesized);
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.degraded());
    assert_eq!(status_of(&run, "weather"), StepStatus::Failed);
    assert_eq!(status_of(&run, "route"), StepStatus::Succeeded);
    assert_eq!(run.state.errors_encountered(), 1);
    assert!(run.state.weather().is_none());

    assert!(run.final_answer.contains("via the N train"));
    assert!(!run.final_answer.contains("°C"));
    assert!(!run.final_answer.contains("overloaded"));
}

#[tokio::test]
async fn test_panicking_collaborator_is_contained() {
    let clients = Clients::fixed().with_weather(Arc::new(PanickingWeather));
    let run = supervisor(clients).run("directions to Times Square").await;

    assert_eq!(status_of(&run, "weather"), StepStatus::Failed);
    assert_eq!(calls_for(&run, "weather"), 3);
    assert_eq!(run.outcome, Outcome::Synthesized);
}

#[tokio::test]
async fn test_location_failure_uses_default() {
    let clients = Clients::fixed().with_location(Arc::new(DownLocation));
    let run = supervisor(clients).run("directions to Times Square").await;

    assert_eq!(status_of(&run, "location"), StepStatus::Degraded);
    assert_eq!(run.state.errors_encountered(), 0);
    assert!(run.degraded());
    assert_eq!(run.outcome, Outcome::Synthesized);
    assert_eq!(run.state.origin().unwrap().display_name, "New York, New York");
    assert!(run.final_answer.contains("New York, New York"));
}

#[tokio::test]
async fn test_location_failure_without_default_halts() {
    let config = PipelineConfig {
        default_location: None,
        ..fast_config()
    };
    let clients = Clients::fixed().with_location(Arc::new(DownLocation));
    let run = Supervisor::new(clients, config)
        .run("directions to Times Square")
        .await;

    assert_eq!(run.outcome, Outcome::Fallback(FallbackReason::Halted));
    assert_eq!(run.state.trace().len(), 1);
    assert_eq!(status_of(&run, "location"), StepStatus::Failed);
    assert_eq!(calls_for(&run, "location"), 3);
    assert_eq!(calls_for(&run, "weather"), 0);
}

#[tokio::test]
async fn test_synthesis_failure_falls_back_to_template() {
    let clients = Clients::fixed().with_synthesis(Arc::new(DownSynthesis));
    let run = supervisor(clients).run("directions to Times Square").await;

    assert_eq!(run.outcome, Outcome::Templated);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(status_of(&run, "synthesis"), StepStatus::Failed);
    assert_eq!(run.state.errors_encountered(), 1);
    assert!(run.final_answer.contains("via the N train"));
    assert!(run.final_answer.ends_with("Have a safe trip!"));
    assert_eq!(run.state.final_answer(), Some(run.final_answer.as_str()));
}

#[tokio::test]
async fn test_budget_ceiling_skips_remaining_steps() {
    let config = PipelineConfig {
        budget: BudgetCeiling {
            max_api_calls: 2,
            ..BudgetCeiling::unlimited()
        },
        ..fast_config()
    };
    let run = Supervisor::new(Clients::fixed(), config)
        .run("directions to Times Square")
        .await;

    assert_eq!(run.outcome, Outcome::Fallback(FallbackReason::BudgetExceeded));
    assert_eq!(run.budget.api_calls, 2);
    for step in ["route", "alternatives", "synthesis"] {
        assert_eq!(calls_for(&run, step), 0);
        assert_eq!(status_of(&run, step), StepStatus::Skipped);
    }
    let skipped = run.state.trace().iter().find(|r| r.step == "route").unwrap();
    assert_eq!(
        skipped.error.as_ref().map(|e| e.kind),
        Some(FailureKind::BudgetExceeded)
    );
    assert_eq!(run.state.errors_encountered(), 0);
    assert!(run.final_answer.starts_with("I'm sorry"));
}

#[tokio::test]
async fn test_budget_exhausted_between_retries() {
    let config = PipelineConfig {
        budget: BudgetCeiling {
            max_api_calls: 3,
            ..BudgetCeiling::unlimited()
        },
        ..fast_config()
    };
    let clients = Clients::fixed().with_route(Arc::new(ScriptedRoute::failing(
        u32::MAX,
        ServiceError::Timeout(Duration::from_secs(1)),
    )));
    let run = Supervisor::new(clients, config)
        .run("directions to Times Square")
        .await;

    assert_eq!(run.outcome, Outcome::Fallback(FallbackReason::BudgetExceeded));
    assert_eq!(run.budget.api_calls, 3);
    assert_eq!(calls_for(&run, "route"), 1);

    let route = run.state.trace().iter().find(|r| r.step == "route").unwrap();
    assert_eq!(route.status, StepStatus::Failed);
    assert_eq!(route.attempts, 1);
    assert_eq!(route.error.as_ref().map(|e| e.kind), Some(FailureKind::BudgetExceeded));

    for step in ["alternatives", "synthesis"] {
        assert_eq!(status_of(&run, step), StepStatus::Skipped);
        assert_eq!(calls_for(&run, step), 0);
    }
    assert_eq!(run.state.trace().len(), 5);
    assert!(run.final_answer.contains("processing budget"));
}

#[tokio::test]
async fn test_request_deadline_abandons_slow_step() {
    let config = PipelineConfig {
        request_timeout_ms: 50,
        ..fast_config()
    };
    let clients = Clients::fixed().with_route(Arc::new(SlowRoute(Duration::from_millis(500))));
    let run = Supervisor::new(clients, config)
        .run("directions to Times Square")
        .await;

    assert_eq!(run.outcome, Outcome::Fallback(FallbackReason::TimedOut));
    assert_eq!(status_of(&run, "route"), StepStatus::Failed);
    assert!(run.state.route().is_none());
    assert!(run.state.trace().iter().all(|r| r.step != "synthesis"));
}

#[tokio::test]
async fn test_disabled_alternatives_make_no_call() {
    let config = PipelineConfig {
        max_alternatives: 0,
        ..fast_config()
    };
    let run = Supervisor::new(Clients::fixed(), config)
        .run("directions to Times Square")
        .await;

    assert_eq!(calls_for(&run, "alternatives"), 0);
    assert_eq!(run.state.alternatives(), Some(&[][..]));
    assert_eq!(run.budget.api_calls, 4);
}

#[tokio::test]
async fn test_batch_shares_aggregates() {
    let supervisor = supervisor(Clients::fixed());
    let responses = supervisor
        .handle_batch([
            "directions to Times Square",
            "",
            "walk to the pier",
            "take me to Central Park",
        ])
        .await;

    assert_eq!(responses.len(), 4);
    assert_eq!(responses[1].outcome, Outcome::Fallback(FallbackReason::Halted));
    assert!(responses.iter().all(|r| !r.final_answer.is_empty()));

    let metrics = supervisor.metrics();
    assert_eq!(metrics.total_requests, 4);
    assert_eq!(metrics.successful_requests, 3);
    assert!(metrics.total_errors >= 1);
    assert_eq!(
        metrics.total_api_calls,
        responses.iter().map(|r| u64::from(r.messages_exchanged)).sum::<u64>()
    );
}

#[tokio::test]
async fn test_concurrent_requests_do_not_share_state() {
    let supervisor = Arc::new(supervisor(Clients::fixed()));
    let handles: Vec<_> = ["directions to Times Square", "navigate to Battery Park"]
        .into_iter()
        .map(|query| {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.run(query).await })
        })
        .collect();

    let mut runs = Vec::new();
    for handle in handles {
        runs.push(handle.await.unwrap());
    }

    assert_ne!(runs[0].state.request_id(), runs[1].state.request_id());
    assert!(runs[0].final_answer.contains("Times Square"));
    assert!(runs[1].final_answer.contains("Battery Park"));
    assert!(runs.iter().all(|r| r.budget.api_calls == 5));
}
