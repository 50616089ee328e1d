use crate::telemetry::{emit, noop_sink, EventSink, GatewayEvent};
use crate::{Error, ErrorContext, Result};
use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;

pub type StepFuture<'a> = BoxFuture<'a, Result<()>>;

/// One forward action and the compensation that undoes it.
pub trait SagaStep<C>: Send + Sync {
    fn name(&self) -> &str;
    fn action<'a>(&'a self, ctx: &'a mut C) -> StepFuture<'a>;
    fn compensate<'a>(&'a self, ctx: &'a mut C) -> StepFuture<'a>;
}

/// A step assembled from two closures.
pub struct FnStep<C, A, R> {
    name: String,
    action: A,
    compensation: R,
    _ctx: PhantomData<fn(&mut C)>,
}

impl<C, A, R> FnStep<C, A, R>
where
    A: for<'c> Fn(&'c mut C) -> StepFuture<'c> + Send + Sync,
    R: for<'c> Fn(&'c mut C) -> StepFuture<'c> + Send + Sync,
{
    pub fn new(name: impl Into<String>, action: A, compensation: R) -> Self {
        Self {
            name: name.into(),
            action,
            compensation,
            _ctx: PhantomData,
        }
    }
}

impl<C, A, R> SagaStep<C> for FnStep<C, A, R>
where
    A: for<'c> Fn(&'c mut C) -> StepFuture<'c> + Send + Sync,
    R: for<'c> Fn(&'c mut C) -> StepFuture<'c> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn action<'a>(&'a self, ctx: &'a mut C) -> StepFuture<'a> {
        (self.action)(ctx)
    }

    fn compensate<'a>(&'a self, ctx: &'a mut C) -> StepFuture<'a> {
        (self.compensation)(ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Pending,
    Running,
    Completed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationFailure {
    pub step: String,
    pub error: String,
}

/// A saga step failed; compensations for the completed steps have run.
#[derive(Debug, thiserror::Error)]
#[error("Saga '{saga}' failed at step '{step}': {source}")]
pub struct SagaError {
    pub saga: String,
    pub step: String,
    pub source: Box<Error>,
    /// Compensations that themselves failed during rollback.
    pub compensation_failures: Vec<CompensationFailure>,
}

impl SagaError {
    /// The error of the step that triggered rollback.
    pub fn original(&self) -> &Error {
        &self.source
    }
}

pub struct Saga<C> {
    name: String,
    steps: Vec<Box<dyn SagaStep<C>>>,
    /// Indices of completed steps; popped during rollback.
    completed: Vec<usize>,
    state: SagaState,
    events: Arc<dyn EventSink>,
}

impl<C: Send> Saga<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            completed: Vec::new(),
            state: SagaState::Pending,
            events: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push_step(&mut self, step: impl SagaStep<C> + 'static) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn add_step<A, R>(&mut self, name: impl Into<String>, action: A, compensation: R) -> &mut Self
    where
        C: 'static,
        A: for<'c> Fn(&'c mut C) -> StepFuture<'c> + Send + Sync + 'static,
        R: for<'c> Fn(&'c mut C) -> StepFuture<'c> + Send + Sync + 'static,
    {
        self.push_step(FnStep::new(name, action, compensation))
    }

    /// Runs every step in order. A saga executes at most once.
    pub async fn execute(&mut self, ctx: &mut C) -> Result<()> {
        if self.state != SagaState::Pending {
            return Err(Error::runtime_with_context(
                format!("saga '{}' already executed", self.name),
                ErrorContext::new()
                    .with_details(format!("state: {:?}", self.state))
                    .with_source("saga"),
            ));
        }
        self.state = SagaState::Running;

        for index in 0..self.steps.len() {
            let outcome = self.steps[index].action(ctx).await;
            let step = self.steps[index].name().to_string();
            match outcome {
                Ok(()) => {
                    self.completed.push(index);
                    emit(
                        &self.events,
                        GatewayEvent::SagaStepCompleted {
                            saga: self.name.clone(),
                            step,
                        },
                    )
                    .await;
                }
                Err(e) => {
                    emit(
                        &self.events,
                        GatewayEvent::SagaStepFailed {
                            saga: self.name.clone(),
                            step: step.clone(),
                            error: e.to_string(),
                        },
                    )
                    .await;
                    let compensation_failures = self.rollback(ctx).await;
                    self.state = SagaState::RolledBack;
                    emit(
                        &self.events,
                        GatewayEvent::SagaRolledBack {
                            saga: self.name.clone(),
                            failed_step: step.clone(),
                        },
                    )
                    .await;
                    return Err(Error::Saga(SagaError {
                        saga: self.name.clone(),
                        step,
                        source: Box::new(e),
                        compensation_failures,
                    }));
                }
            }
        }

        self.state = SagaState::Completed;
        emit(
            &self.events,
            GatewayEvent::SagaCompleted {
                saga: self.name.clone(),
            },
        )
        .await;
        Ok(())
    }

    async fn rollback(&mut self, ctx: &mut C) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();
        while let Some(index) = self.completed.pop() {
            let step = &self.steps[index];
            let name = step.name().to_string();
            match step.compensate(ctx).await {
                Ok(()) => {
                    emit(
                        &self.events,
                        GatewayEvent::CompensationRan {
                            saga: self.name.clone(),
                            step: name,
                        },
                    )
                    .await;
                }
                Err(e) => {
                    emit(
                        &self.events,
                        GatewayEvent::CompensationFailed {
                            saga: self.name.clone(),
                            step: name.clone(),
                            error: e.to_string(),
                        },
                    )
                    .await;
                    failures.push(CompensationFailure {
                        step: name,
                        error: e.to_string(),
                    });
                }
            }
        }
        failures
    }
}
