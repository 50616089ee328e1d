//! Saga coordination for multi-service operations.
//!
//! A [`Saga`] runs its steps strictly in order against a caller-owned context
//! value. Every completed step is pushed onto a stack; when a later step
//! fails, the stack is popped and each completed step's compensation runs, so
//! compensations execute in exact reverse order of completion. A failing
//! compensation is recorded and the sweep carries on. The caller always gets
//! the error of the step that failed, never a compensation error.
//!
//! ```text
//! Pending ──execute──▶ Running ──all ok──▶ Completed
//!                         │
//!                         └──step fails──▶ rollback ──▶ RolledBack
//! ```
//!
//! Sagas are built per request and never persisted.
//!
//! ## Example
//!
//! ```rust
//! use service_gateway::saga::{Saga, SagaState};
//! use service_gateway::Error;
//!
//! # tokio_test::block_on(async {
//! let mut saga: Saga<Vec<&'static str>> = Saga::new("example");
//! saga.add_step(
//!     "reserve",
//!     |log: &mut Vec<&'static str>| Box::pin(async move { log.push("reserve"); Ok::<(), Error>(()) }),
//!     |log: &mut Vec<&'static str>| Box::pin(async move { log.push("release"); Ok::<(), Error>(()) }),
//! );
//!
//! let mut log = Vec::new();
//! saga.execute(&mut log).await.unwrap();
//! assert_eq!(saga.state(), SagaState::Completed);
//! assert_eq!(log, vec!["reserve"]);
//! # });
//! ```

mod coordinator;
pub mod user_game;

pub use coordinator::{CompensationFailure, FnStep, Saga, SagaError, SagaState, SagaStep, StepFuture};
pub use user_game::{create_user_with_game, UserGameContext};
