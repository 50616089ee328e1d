//! Composite operation: create a user and start a game session for them.
//!
//! Steps, each routed through a [`Dispatch`]:
//!
//! | Step | Action | Compensation |
//! |------|--------|--------------|
//! | `create_user` | `POST /users/user/register` | `DELETE /users/{user_id}` |
//! | `create_game` | `POST /game/start-game` | `DELETE /game/{game_id}` |

use super::{Saga, SagaStep, StepFuture};
use crate::dispatch::{Dispatch, ServiceRequest};
use crate::telemetry::EventSink;
use crate::transport::UpstreamResponse;
use crate::{Error, ErrorContext, Result};
use serde_json::{json, Value};
use std::sync::Arc;

pub const USER_SERVICE: &str = "user_management_service";
pub const GAME_SERVICE: &str = "game_engine_service";

#[derive(Debug, Clone, Default)]
pub struct UserGameContext {
    pub user: Value,
    pub user_id: Option<String>,
    pub game_id: Option<String>,
}

impl UserGameContext {
    pub fn new(user: Value) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }
}

/// Saga steps require a 2xx answer.
fn require_success(response: UpstreamResponse) -> Result<UpstreamResponse> {
    if (200..300).contains(&response.status) {
        Ok(response)
    } else {
        Err(Error::UpstreamRejected {
            status: response.status,
            body: response.text(),
        })
    }
}

/// Reads `<entity>._id`, accepting string or numeric ids.
fn extract_id(response: &UpstreamResponse, entity: &str) -> Result<String> {
    let body: Value = response.json()?;
    match body.get(entity).and_then(|e| e.get("_id")) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(Error::runtime_with_context(
            format!("response has no {}._id", entity),
            ErrorContext::new()
                .with_field_path(format!("{}._id", entity))
                .with_source("user_game_saga"),
        )),
    }
}

pub struct CreateUser {
    dispatcher: Arc<dyn Dispatch>,
}

impl CreateUser {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        Self { dispatcher }
    }

    async fn create(&self, ctx: &mut UserGameContext) -> Result<()> {
        let request = ServiceRequest::post_json(USER_SERVICE, "/users/user/register", &ctx.user)?;
        let response = require_success(self.dispatcher.dispatch(&request).await?)?;
        ctx.user_id = Some(extract_id(&response, "user")?);
        Ok(())
    }

    async fn delete(&self, ctx: &mut UserGameContext) -> Result<()> {
        let Some(id) = ctx.user_id.as_deref() else {
            return Ok(());
        };
        let request = ServiceRequest::delete(USER_SERVICE, format!("/users/{}", id));
        require_success(self.dispatcher.dispatch(&request).await?)?;
        Ok(())
    }
}

impl SagaStep<UserGameContext> for CreateUser {
    fn name(&self) -> &str {
        "create_user"
    }

    fn action<'a>(&'a self, ctx: &'a mut UserGameContext) -> StepFuture<'a> {
        Box::pin(self.create(ctx))
    }

    fn compensate<'a>(&'a self, ctx: &'a mut UserGameContext) -> StepFuture<'a> {
        Box::pin(self.delete(ctx))
    }
}

pub struct CreateGame {
    dispatcher: Arc<dyn Dispatch>,
}

impl CreateGame {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        Self { dispatcher }
    }

    async fn create(&self, ctx: &mut UserGameContext) -> Result<()> {
        let body = json!({ "user_id": ctx.user_id });
        let request = ServiceRequest::post_json(GAME_SERVICE, "/game/start-game", &body)?;
        let response = require_success(self.dispatcher.dispatch(&request).await?)?;
        ctx.game_id = Some(extract_id(&response, "game")?);
        Ok(())
    }

    async fn delete(&self, ctx: &mut UserGameContext) -> Result<()> {
        let Some(id) = ctx.game_id.as_deref() else {
            return Ok(());
        };
        let request = ServiceRequest::delete(GAME_SERVICE, format!("/game/{}", id));
        require_success(self.dispatcher.dispatch(&request).await?)?;
        Ok(())
    }
}

impl SagaStep<UserGameContext> for CreateGame {
    fn name(&self) -> &str {
        "create_game"
    }

    fn action<'a>(&'a self, ctx: &'a mut UserGameContext) -> StepFuture<'a> {
        Box::pin(self.create(ctx))
    }

    fn compensate<'a>(&'a self, ctx: &'a mut UserGameContext) -> StepFuture<'a> {
        Box::pin(self.delete(ctx))
    }
}

pub fn user_game_saga(dispatcher: Arc<dyn Dispatch>, events: Arc<dyn EventSink>) -> Saga<UserGameContext> {
    let mut saga = Saga::new("create_user_with_game").with_event_sink(events);
    saga.push_step(CreateUser::new(dispatcher.clone()))
        .push_step(CreateGame::new(dispatcher));
    saga
}

/// Creates the user, then the game session. Returns `(user_id, game_id)`.
///
/// On failure the completed steps have been compensated and the error is an
/// [`Error::Saga`] carrying the failing step's error.
pub async fn create_user_with_game(
    dispatcher: Arc<dyn Dispatch>,
    events: Arc<dyn EventSink>,
    user: Value,
) -> Result<(String, String)> {
    let mut saga = user_game_saga(dispatcher, events);
    let mut ctx = UserGameContext::new(user);
    saga.execute(&mut ctx).await?;
    match (ctx.user_id, ctx.game_id) {
        (Some(user_id), Some(game_id)) => Ok((user_id, game_id)),
        _ => Err(Error::runtime_with_context(
            "saga completed without both ids",
            ErrorContext::new().with_source("user_game_saga"),
        )),
    }
}
