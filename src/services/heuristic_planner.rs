//! Keyword-driven planner.
//!
//! Classifies a prompt's complexity by weighted keyword families and the
//! number of conjoined parts, then derives the step list from trigger
//! words. Weights and thresholds come from [`PlannerConfig`].

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::domain::errors::PlanningError;
use crate::domain::models::{Complexity, Plan, PlannerConfig, Step, StepAction};
use crate::domain::ports::{validate_plan, Planner};

fn keyword(pattern: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{pattern})")).expect("keyword pattern is valid")
}

static BUILD_WORDS: LazyLock<Regex> = LazyLock::new(|| keyword("create|build|implement|develop"));
static REFINE_WORDS: LazyLock<Regex> = LazyLock::new(|| keyword("refactor|optimi[sz]e|improve"));
static REPAIR_WORDS: LazyLock<Regex> = LazyLock::new(|| keyword("debug|fix|solve"));
static CHECK_WORDS: LazyLock<Regex> = LazyLock::new(|| keyword("test|verify|validate"));
static CONJUNCTIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:and|then|also|plus)\b").expect("conjunction pattern is valid"));

static ANALYZE_TRIGGER: LazyLock<Regex> = LazyLock::new(|| keyword("read|analy[sz]e|understand"));
static CREATE_TRIGGER: LazyLock<Regex> = LazyLock::new(|| keyword("create|write|implement|build"));
static TEST_TRIGGER: LazyLock<Regex> = LazyLock::new(|| keyword("test|verify"));
static EXECUTE_TRIGGER: LazyLock<Regex> = LazyLock::new(|| keyword("deploy|run|execute"));

/// Rule-based planner used when no reasoning backend is configured.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPlanner {
    config: PlannerConfig,
}

impl HeuristicPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Raw complexity score of a prompt.
    pub fn complexity_score(&self, prompt: &str) -> u32 {
        let c = &self.config;
        let mut score = 0;
        if BUILD_WORDS.is_match(prompt) {
            score += c.build_weight;
        }
        if REFINE_WORDS.is_match(prompt) {
            score += c.refine_weight;
        }
        if REPAIR_WORDS.is_match(prompt) {
            score += c.repair_weight;
        }
        if CHECK_WORDS.is_match(prompt) {
            score += c.check_weight;
        }
        let extra_parts = u32::try_from(CONJUNCTIONS.find_iter(prompt).count()).unwrap_or(u32::MAX);
        score.saturating_add(extra_parts.saturating_mul(c.conjunct_weight))
    }

    pub fn step_time_estimate_ms(&self) -> u64 {
        self.config.step_time_estimate_ms
    }

    pub fn classify(&self, prompt: &str) -> Complexity {
        let score = self.complexity_score(prompt);
        if score <= self.config.simple_max {
            Complexity::Simple
        } else if score <= self.config.moderate_max {
            Complexity::Moderate
        } else if score <= self.config.complex_max {
            Complexity::Complex
        } else {
            Complexity::VeryComplex
        }
    }

    /// Ordered steps triggered by the prompt, always ending in verify.
    pub fn steps_for(&self, prompt: &str) -> Vec<Step> {
        let triggers: [(&LazyLock<Regex>, StepAction); 4] = [
            (&ANALYZE_TRIGGER, StepAction::Analyze),
            (&CREATE_TRIGGER, StepAction::Create),
            (&TEST_TRIGGER, StepAction::Test),
            (&EXECUTE_TRIGGER, StepAction::Execute),
        ];

        let mut steps: Vec<Step> = triggers
            .iter()
            .filter(|(pattern, _)| pattern.is_match(prompt))
            .map(|(_, action)| Step::of(*action))
            .collect();
        steps.push(Step::of(StepAction::Verify));
        steps
    }

    pub fn build_plan(&self, prompt: &str) -> Plan {
        let steps = self.steps_for(prompt);
        let estimated_time_ms = self.config.step_time_estimate_ms * steps.len() as u64;
        Plan {
            complexity: self.classify(prompt),
            steps,
            estimated_time_ms,
        }
    }
}

#[async_trait]
impl Planner for HeuristicPlanner {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn plan(&self, prompt: &str) -> Result<Plan, PlanningError> {
        let plan = self.build_plan(prompt);
        validate_plan(&plan)?;
        Ok(plan)
    }
}
