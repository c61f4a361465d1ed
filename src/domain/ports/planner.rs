//! Planner port - turns a prompt into an ordered step list.

use async_trait::async_trait;

use crate::domain::errors::PlanningError;
use crate::domain::models::{Plan, StepAction};

/// Produces an ordered, non-empty plan ending in a verify step.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Planner name for logs.
    fn name(&self) -> &'static str;

    async fn plan(&self, prompt: &str) -> Result<Plan, PlanningError>;
}

/// Check the contract every planner output must satisfy.
pub fn validate_plan(plan: &Plan) -> Result<(), PlanningError> {
    match plan.steps.last() {
        None => Err(PlanningError::EmptyPlan),
        Some(step) if step.action != StepAction::Verify => {
            Err(PlanningError::MissingVerify(step.action.to_string()))
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Complexity, Step};

    fn plan(actions: &[StepAction]) -> Plan {
        Plan {
            steps: actions.iter().map(|a| Step::of(*a)).collect(),
            complexity: Complexity::Simple,
            estimated_time_ms: 0,
        }
    }

    #[test]
    fn test_validate_plan() {
        assert_eq!(validate_plan(&plan(&[])), Err(PlanningError::EmptyPlan));
        assert!(matches!(
            validate_plan(&plan(&[StepAction::Verify, StepAction::Create])),
            Err(PlanningError::MissingVerify(_))
        ));
        assert!(validate_plan(&plan(&[StepAction::Create, StepAction::Verify])).is_ok());
    }
}
