//! Request pipeline framework (spec §4.1): an ordered sequence of typed
//! steps executed serially against a single request context. Controllers
//! compose the standard step library (`steps`) with resource-specific
//! steps into one `Pipeline` per RPC.
//!
//! Grounded on the teacher's `#[async_trait::async_trait]` pattern
//! (`src/engine/storage.rs`); the ordered-step composition itself has no
//! direct teacher analogue and is built from spec §4.1 directly.

pub mod slug;
pub mod steps;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Result, StigmerError};

/// Per-request transient state threaded through every step.
///
/// `New` is the in-progress output resource; `Existing` is whatever the
/// pipeline loaded for update/delete/apply flows (`None` until a
/// `LoadExisting*` step runs, or permanently `None` for a pure create).
///
/// §9 "Pipeline state leakage": `new_state` is required at construction
/// time rather than left to a later `SetNewState` call, so there is no
/// window where a step can observe an absent new-state by forgetting to
/// call a setter.
pub struct RequestContext<New, Existing> {
    new_state: New,
    existing_state: Option<Existing>,
    /// Arbitrary-key scratch map for inter-step communication (e.g.
    /// `CreateDefaultInstance` stashing `default_instance_id` for
    /// `UpdateAgentStatusWithDefaultInstance` to read back, §4.2).
    scratch: HashMap<String, String>,
    /// `true` once `LoadForApply` determined no existing resource was
    /// found and the controller should delegate to `Create`.
    pub should_create: bool,
}

impl<New, Existing> RequestContext<New, Existing> {
    /// Construct a context with `input` as the initial new-state (spec
    /// §4.2's `NewRequestContext` contract — the only way to build a
    /// context, so "new state" is never absent).
    pub fn new(input: New) -> Self {
        RequestContext {
            new_state: input,
            existing_state: None,
            scratch: HashMap::new(),
            should_create: false,
        }
    }

    pub fn new_state(&self) -> &New {
        &self.new_state
    }

    pub fn new_state_mut(&mut self) -> &mut New {
        &mut self.new_state
    }

    pub fn set_new_state(&mut self, state: New) {
        self.new_state = state;
    }

    pub fn existing_state(&self) -> Option<&Existing> {
        self.existing_state.as_ref()
    }

    pub fn set_existing_state(&mut self, state: Existing) {
        self.existing_state = Some(state);
    }

    pub fn take_existing_state(&mut self) -> Option<Existing> {
        self.existing_state.take()
    }

    pub fn scratch_get(&self, key: &str) -> Option<&str> {
        self.scratch.get(key).map(String::as_str)
    }

    pub fn scratch_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scratch.insert(key.into(), value.into());
    }

    /// Consume the context, returning the final new-state to the caller
    /// (spec §4.1 "successful completion delivers the final new-state to
    /// the caller").
    pub fn into_new_state(self) -> New {
        self.new_state
    }
}

/// One pipeline step. `execute` gets a mutable reference to the shared
/// context; a failure is wrapped with the step's name before propagating
/// (spec §4.1 "Errors carry the step name for diagnosability").
#[async_trait]
pub trait Step<New, Existing>: Send + Sync
where
    New: Send,
    Existing: Send,
{
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut RequestContext<New, Existing>) -> Result<()>;
}

/// Ordered composition of steps, run serially, returning on first failure
/// (spec §4.1 "The pipeline returns on first failure").
pub struct Pipeline<New, Existing> {
    steps: Vec<Box<dyn Step<New, Existing>>>,
}

impl<New, Existing> Pipeline<New, Existing>
where
    New: Send,
    Existing: Send,
{
    pub fn new(steps: Vec<Box<dyn Step<New, Existing>>>) -> Self {
        Pipeline { steps }
    }

    /// Run every step against `ctx`, returning the final new-state on
    /// success or the first step failure, annotated with that step's name.
    pub async fn run(&self, mut ctx: RequestContext<New, Existing>) -> Result<New> {
        for step in &self.steps {
            step.execute(&mut ctx)
                .await
                .map_err(|err| annotate_step(err, step.name()))?;
        }
        Ok(ctx.into_new_state())
    }

    /// Run every step, returning the context itself rather than just the
    /// new-state — used by controllers that need `should_create` or
    /// scratch values after the pipeline finishes (e.g. `Apply`).
    pub async fn run_with_context(
        &self,
        mut ctx: RequestContext<New, Existing>,
    ) -> Result<RequestContext<New, Existing>> {
        for step in &self.steps {
            step.execute(&mut ctx)
                .await
                .map_err(|err| annotate_step(err, step.name()))?;
        }
        Ok(ctx)
    }
}

fn annotate_step(err: StigmerError, step: &'static str) -> StigmerError {
    err.with_step(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AppendStep(&'static str, &'static str);

    #[async_trait]
    impl Step<String, ()> for AppendStep {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn execute(&self, ctx: &mut RequestContext<String, ()>) -> Result<()> {
            let mut s = ctx.new_state().clone();
            s.push_str(self.1);
            ctx.set_new_state(s);
            Ok(())
        }
    }

    struct FailingStep;

    #[async_trait]
    impl Step<String, ()> for FailingStep {
        fn name(&self) -> &'static str {
            "FailingStep"
        }

        async fn execute(&self, _ctx: &mut RequestContext<String, ()>) -> Result<()> {
            Err(StigmerError::invalid_argument("boom"))
        }
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let pipeline: Pipeline<String, ()> = Pipeline::new(vec![
            Box::new(AppendStep("a", "a")),
            Box::new(AppendStep("b", "b")),
        ]);
        let result = pipeline.run(RequestContext::new(String::new())).await.unwrap();
        assert_eq!(result, "ab");
    }

    #[tokio::test]
    async fn failure_stops_the_pipeline_and_carries_step_name() {
        let pipeline: Pipeline<String, ()> = Pipeline::new(vec![
            Box::new(AppendStep("a", "a")),
            Box::new(FailingStep),
            Box::new(AppendStep("c", "c")),
        ]);
        let err = pipeline
            .run(RequestContext::new(String::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("FailingStep"));
    }
}
