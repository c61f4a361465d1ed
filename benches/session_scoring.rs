//! Session and process-wide scoring cost.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use taskpilot::domain::models::{Metrics, ScoringConfig, Session, StepRecord};
use taskpilot::services::scoring::{health_score, overall_score, session_score};

fn session_with_steps(count: usize) -> Session {
    let mut session = Session::new("bench");
    let id = session.id;
    session.steps = (0..count)
        .map(|i| StepRecord {
            timestamp: Utc::now(),
            session_id: id,
            step_index: Some(i % 8),
            action: "execute".to_string(),
            command: None,
            result: None,
            exit_code: Some(0),
            duration_ms: 5,
            error: (i % 5 == 0).then(|| "failed".to_string()),
            retry_count: u32::try_from(i / 8).unwrap_or(u32::MAX),
        })
        .collect();
    session.autonomous_actions = 12;
    session.manual_actions = 1;
    session.iterations = 3;
    session.errors = vec!["failed".to_string(); count / 5];
    session.fixes = vec!["retried".to_string(); count / 10];
    session
}

fn bench_session_score(c: &mut Criterion) {
    let config = ScoringConfig::default();
    let mut group = c.benchmark_group("session_score");
    for steps in [4, 64, 1024] {
        let session = session_with_steps(steps);
        group.bench_with_input(BenchmarkId::from_parameter(steps), &session, |b, s| {
            b.iter(|| session_score(black_box(s), &config));
        });
    }
    group.finish();
}

fn bench_overall(c: &mut Criterion) {
    let config = ScoringConfig::default();
    let metrics = Metrics {
        total_tasks: 500,
        successful_tasks: 420,
        failed_tasks: 80,
        autonomous_executions: 3000,
        manual_interventions: 40,
        predicted_failures: 60,
        prevented_failures: 45,
        cumulative_session_score: 350.0,
        ..Metrics::default()
    };
    c.bench_function("overall_and_health", |b| {
        b.iter(|| {
            (
                overall_score(black_box(&metrics), &config),
                health_score(black_box(&metrics)),
            )
        });
    });
}

criterion_group!(benches, bench_session_score, bench_overall);
criterion_main!(benches);
