//! External collaborators: speech synthesis and step planning.

mod http;

use std::path::Path;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::foundation::error::{ReelError, ReelResult};
use crate::step::{Step, steps_from_json};

pub use http::{HttpPlanner, HttpSynthesizer};

/// Why a synthesis request produced no audio.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// The service signalled a rate limit or exhausted quota.
    #[error("rate limited")]
    RateLimited,
    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// Turns narration text into audio bytes (WAV or raw PCM).
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Synthesizer used when no speech service is configured; every request fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SynthesisError> {
        Err(SynthesisError::Failed(
            "no synthesis service configured".to_owned(),
        ))
    }
}

/// Why the planner produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanningError {
    #[error("planner returned no steps")]
    Empty,
    #[error("{0}")]
    Failed(String),
}

impl From<PlanningError> for ReelError {
    fn from(err: PlanningError) -> Self {
        ReelError::planning(err.to_string())
    }
}

/// Produces drawing steps for a query.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn generate_steps(&self, query: &str) -> Result<Vec<Step>, PlanningError>;

    /// Fresh drawing code for one step, keeping its title and description.
    async fn regenerate_step_code(
        &self,
        title: &str,
        description: &str,
    ) -> Result<String, PlanningError>;
}

/// Planner serving a fixed list of steps, typically loaded from a JSON file.
#[derive(Clone, Debug)]
pub struct StaticPlanner {
    steps: Vec<Step>,
}

impl StaticPlanner {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Load a JSON array of `{title, description, code}` objects.
    pub fn from_file(path: &Path) -> ReelResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read steps '{}'", path.display()))?;
        Ok(Self::new(steps_from_json(&text)?))
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn generate_steps(&self, query: &str) -> Result<Vec<Step>, PlanningError> {
        tracing::debug!(query, steps = self.steps.len(), "serving static plan");
        if self.steps.is_empty() {
            return Err(PlanningError::Empty);
        }
        Ok(self.steps.clone())
    }

    async fn regenerate_step_code(
        &self,
        title: &str,
        description: &str,
    ) -> Result<String, PlanningError> {
        self.steps
            .iter()
            .find(|s| s.title.trim() == title.trim() && s.description.trim() == description.trim())
            .map(|s| s.code.clone())
            .ok_or_else(|| PlanningError::Failed(format!("no step titled '{title}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_planner_serves_and_regenerates() {
        let planner = StaticPlanner::new(vec![Step::new("A", "first", "line(0,0,1,1)")]);
        let steps = planner.generate_steps("anything").await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(
            planner.regenerate_step_code(" A", "first").await.unwrap(),
            "line(0,0,1,1)"
        );
        assert!(planner.regenerate_step_code("B", "x").await.is_err());
    }

    #[tokio::test]
    async fn empty_static_plan_is_a_planning_failure() {
        let err: ReelError = StaticPlanner::new(Vec::new())
            .generate_steps("q")
            .await
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("planning failed:"));
    }

    #[tokio::test]
    async fn disabled_synthesizer_fails_without_rate_limit() {
        let err = DisabledSynthesizer.synthesize("hi").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Failed(_)));
    }
}
