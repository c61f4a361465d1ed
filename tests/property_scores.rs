//! Property-based tests for scoring bounds and the iteration limit.

use chrono::Utc;
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use taskpilot::adapters::handlers::MockStepHandler;
use taskpilot::application::{ExecuteOptions, TaskOrchestrator};
use taskpilot::domain::errors::ExecutionError;
use taskpilot::domain::models::{
    Metrics, OrchestratorConfig, ScoringConfig, Session, StepRecord,
};
use taskpilot::infrastructure::MemoryDiagnosticLog;
use taskpilot::services::scoring::{health_score, overall_score, session_score, SessionScoreTerms};
use taskpilot::services::DiagnosticsRecorder;

fn record(session_id: Uuid, step_index: Option<usize>, ok: bool, retry_count: u32) -> StepRecord {
    StepRecord {
        timestamp: Utc::now(),
        session_id,
        step_index,
        action: "execute".to_string(),
        command: None,
        result: None,
        exit_code: None,
        duration_ms: 1,
        error: (!ok).then(|| "failed".to_string()),
        retry_count,
    }
}

fn session_from(
    outcomes: &[(Option<usize>, bool)],
    iterations: u32,
    autonomous: u32,
    manual: u32,
    errors: usize,
    fixes: usize,
) -> Session {
    let mut session = Session::new("property");
    let id = session.id;
    session.steps = outcomes
        .iter()
        .map(|(index, ok)| record(id, *index, *ok, 0))
        .collect();
    session.iterations = iterations;
    session.autonomous_actions = autonomous;
    session.manual_actions = manual;
    session.errors = vec!["error".to_string(); errors];
    session.fixes = vec!["fix".to_string(); fixes];
    session
}

fn step_outcome() -> impl Strategy<Value = (Option<usize>, bool)> {
    (proptest::option::of(0usize..6), any::<bool>())
}

proptest! {
    /// Session scores stay in [0, 1] for any mix of telemetry.
    #[test]
    fn prop_session_score_in_unit_range(
        outcomes in proptest::collection::vec(step_outcome(), 0..30),
        iterations in 0u32..50,
        autonomous in 0u32..100,
        manual in 0u32..100,
        errors in 0usize..20,
        fixes in 0usize..40,
    ) {
        let session = session_from(&outcomes, iterations, autonomous, manual, errors, fixes);
        let score = session_score(&session, &ScoringConfig::default());
        prop_assert!((0.0..=1.0).contains(&score), "score {} out of range", score);

        let terms = SessionScoreTerms::of(&session, 10.0);
        for term in [terms.autonomy, terms.iteration_factor, terms.success_rate, terms.self_correction] {
            prop_assert!((0.0..=1.0).contains(&term));
        }
    }

    /// Retries of a plan step never count the step twice.
    #[test]
    fn prop_success_rate_counts_distinct_steps(
        attempts in proptest::collection::vec((0usize..5, any::<bool>()), 1..25),
    ) {
        let outcomes: Vec<(Option<usize>, bool)> =
            attempts.iter().map(|(i, ok)| (Some(*i), *ok)).collect();
        let session = session_from(&outcomes, 0, 0, 0, 0, 0);

        let distinct: std::collections::BTreeSet<usize> = attempts.iter().map(|(i, _)| *i).collect();
        let (succeeded, total) = session.step_outcomes();
        prop_assert_eq!(total, distinct.len());
        prop_assert!(succeeded <= total);
        prop_assert!((0.0..=1.0).contains(&session.success_rate()));
    }

    /// Overall score and health stay bounded for arbitrary counters.
    #[test]
    fn prop_overall_and_health_bounded(
        successful in 0u64..1000,
        failed in 0u64..1000,
        autonomous in 0u64..1000,
        manual in 0u64..1000,
        predicted in 0u64..100,
        prevented in 0u64..200,
        mean_session in 0.0f64..=1.0,
    ) {
        let total = successful + failed;
        let metrics = Metrics {
            total_tasks: total,
            successful_tasks: successful,
            failed_tasks: failed,
            autonomous_executions: autonomous,
            manual_interventions: manual,
            predicted_failures: predicted,
            prevented_failures: prevented,
            cumulative_session_score: mean_session * total as f64,
            ..Metrics::default()
        };

        let overall = overall_score(&metrics, &ScoringConfig::default());
        prop_assert!((0.0..=1.0).contains(&overall), "overall {} out of range", overall);

        let health = health_score(&metrics);
        prop_assert!((0.0..=100.0).contains(&health), "health {} out of range", health);
    }
}

/// A session with no steps has a zero success rate whatever else happened.
#[test_strategy::proptest]
fn prop_zero_steps_zero_success(
    #[strategy(0u32..20)] iterations: u32,
    #[strategy(0u32..20)] autonomous: u32,
    #[strategy(0usize..5)] errors: usize,
) {
    let session = session_from(&[], iterations, autonomous, 0, errors, 0);
    prop_assert_eq!(session.success_rate(), 0.0);
    prop_assert_eq!(SessionScoreTerms::of(&session, 10.0).success_rate, 0.0);
}

/// A step that never recovers runs exactly `limit + 1` times.
#[test_strategy::proptest(ProptestConfig { cases: 8, ..ProptestConfig::default() })]
fn prop_iteration_count_never_exceeds_limit(#[strategy(0u32..5)] limit: u32) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let (err, iterations, calls) = runtime.block_on(async {
        let handler = MockStepHandler::new().always_fail_step(0);
        let calls = handler.calls();
        let recorder = Arc::new(
            DiagnosticsRecorder::open(
                Arc::new(MemoryDiagnosticLog::new()),
                ScoringConfig::default(),
                10,
                64,
            )
            .await,
        );
        let orchestrator =
            TaskOrchestrator::new(Arc::new(handler), recorder, OrchestratorConfig::default());

        let err = orchestrator
            .execute(
                "build it",
                ExecuteOptions {
                    iteration_limit: Some(limit),
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap_err();
        let iterations = orchestrator.list_tasks().await[0].iteration_count;
        let calls = calls.lock().unwrap().len();
        (err, iterations, calls)
    });

    let is_limit_error = matches!(err, ExecutionError::IterationLimitExceeded { .. });
    prop_assert!(is_limit_error);
    prop_assert_eq!(iterations, limit);
    prop_assert_eq!(calls, limit as usize + 1);
}
