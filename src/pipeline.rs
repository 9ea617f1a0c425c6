//! The per-request pipeline of a registered service.
//!
//! ```text
//!   Middlewares ──▶ Handler ──▶ PostProcesses ──▶ Done ──▶ next
//!        │             │              │
//!        └─────────────┴──────────────┴──▶ Failed ──▶ catcher ──▶ Done
//!                                              └──(no catcher)──▶ error to substrate
//! ```
//!
//! Stages run strictly in order, and callables within a stage in declared
//! order. The first failure skips everything after it. The only state shared
//! between requests is the immutable [`ServiceSettings`].

use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::descriptor::ServiceSettings;
use crate::error::{BoxError, ServiceError, ValidationError};
use crate::handler::{Catcher, run_chain};
use crate::router::Next;
use crate::strategy::Strategy;

/// One phase of the pipeline.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Stage {
    Middlewares,
    Handler,
    PostProcesses,
}

impl Stage {
    pub const ORDER: [Self; 3] = [Self::Middlewares, Self::Handler, Self::PostProcesses];

    /// Name reported as the error sub type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Middlewares   => "service custom middlewares",
            Self::Handler       => "service handler",
            Self::PostProcesses => "service custom post processes",
        }
    }
}

pub(crate) struct Pipeline {
    settings: Arc<ServiceSettings>,
    strategy: Strategy,
    catcher: Option<Catcher>,
}

impl Pipeline {
    /// Selects the response strategy once, for every request to come.
    pub(crate) fn new(
        settings: Arc<ServiceSettings>,
        catcher: Option<Catcher>,
    ) -> Result<Self, ValidationError> {
        let strategy = Strategy::select(&settings)?;
        Ok(Self { settings, strategy, catcher })
    }

    /// Runs one request. `next` runs exactly once unless the failure was not
    /// handled, in which case the error goes back to the substrate instead.
    pub(crate) async fn run(&self, ctx: Context, next: Next) -> Result<(), ServiceError> {
        if let Err(err) = self.run_stages(&ctx).await {
            debug!(
                service = %self.settings.summary,
                stage = err.sub_type(),
                "error when executing stage: {err}"
            );
            match &self.catcher {
                Some(catcher) => catcher.call(err, ctx.clone()).await,
                None => return Err(err),
            }
        }
        next.run(ctx).await.map_err(ServiceError::server_wide)
    }

    async fn run_stages(&self, ctx: &Context) -> Result<(), ServiceError> {
        for stage in Stage::ORDER {
            self.run_stage(stage, ctx)
                .await
                .map_err(|e| ServiceError::in_stage(stage, &self.settings.summary, e))?;
        }
        Ok(())
    }

    async fn run_stage(&self, stage: Stage, ctx: &Context) -> Result<(), BoxError> {
        match stage {
            Stage::Middlewares => run_chain(&self.settings.middlewares, ctx).await,
            Stage::Handler => self.strategy.run(ctx).await,
            Stage::PostProcesses => run_chain(&self.settings.post_processes, ctx).await,
        }
    }
}
