//! Agenticality and health scoring.
//!
//! Every score is recomputed from scratch from its inputs. Weights are
//! policy and come from [`ScoringConfig`].

use serde::{Deserialize, Serialize};

use crate::domain::models::{Metrics, ScoringConfig, Session};

/// The four weighted terms of a session score, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionScoreTerms {
    pub autonomy: f64,
    pub iteration_factor: f64,
    pub success_rate: f64,
    pub self_correction: f64,
}

impl SessionScoreTerms {
    pub fn of(session: &Session, iteration_saturation: f64) -> Self {
        let decided = session.autonomous_actions + session.manual_actions;
        let autonomy = if decided > 0 {
            f64::from(session.autonomous_actions) / f64::from(decided)
        } else {
            0.0
        };

        let iteration_factor = if session.iterations > 0 && iteration_saturation > 0.0 {
            (f64::from(session.iterations) / iteration_saturation).min(1.0)
        } else {
            0.0
        };

        let self_correction = if session.errors.is_empty() {
            1.0
        } else {
            (session.fixes.len() as f64 / session.errors.len() as f64).min(1.0)
        };

        Self {
            autonomy,
            iteration_factor,
            success_rate: session.success_rate(),
            self_correction,
        }
    }
}

/// Session agenticality score in [0, 1].
pub fn session_score(session: &Session, config: &ScoringConfig) -> f64 {
    let terms = SessionScoreTerms::of(session, config.iteration_saturation);
    let w = &config.session;
    clamp_unit(
        w.autonomy * terms.autonomy
            + w.iteration * terms.iteration_factor
            + w.success * terms.success_rate
            + w.self_correction * terms.self_correction,
    )
}

/// Process-wide agenticality score in [0, 1].
pub fn overall_score(metrics: &Metrics, config: &ScoringConfig) -> f64 {
    let w = &config.overall;
    clamp_unit(
        w.session * metrics.average_session_score().unwrap_or(0.0)
            + w.success * metrics.task_success_rate().unwrap_or(0.0)
            + w.autonomy * metrics.autonomy_rate().unwrap_or(0.0)
            + w.healing * metrics.healing_effectiveness().unwrap_or(0.0),
    )
}

/// Health in [0, 100]: mean of the rates that have data, 100 with no data.
pub fn health_score(metrics: &Metrics) -> f64 {
    let factors: Vec<f64> = [
        metrics.task_success_rate(),
        metrics.autonomy_rate(),
        metrics.healing_effectiveness(),
    ]
    .into_iter()
    .flatten()
    .collect();

    if factors.is_empty() {
        return 100.0;
    }
    clamp_unit(factors.iter().sum::<f64>() / factors.len() as f64) * 100.0
}

/// Rating for an agenticality score in [0, 1].
pub fn rating(score: f64) -> &'static str {
    let percent = score * 100.0;
    if percent >= 81.0 {
        "Fully Agentic"
    } else if percent >= 61.0 {
        "Highly Agentic"
    } else if percent >= 41.0 {
        "Moderately Agentic"
    } else if percent >= 21.0 {
        "Semi-Agentic"
    } else {
        "Non-Agentic"
    }
}

/// Label for a health score in [0, 100].
pub fn health_label(health: f64) -> &'static str {
    if health >= 90.0 {
        "Excellent"
    } else if health >= 75.0 {
        "Good"
    } else if health >= 50.0 {
        "Fair"
    } else if health >= 25.0 {
        "Poor"
    } else {
        "Critical"
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
