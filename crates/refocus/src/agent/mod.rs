//! Agent runtime: the [`RunLoop`] and its supporting modules.
//!
//! - [`run_loop::RunLoop`]: the step loop. Start here.
//! - [`config::RunConfig`]: model, step budget, strategy, deadline.
//! - [`strategy`]: [`ContextStrategy`] with the [`Baseline`] and [`Focus`]
//!   implementations.
//! - [`events`]: [`EventHandler`] trait and [`RunEvent`] enum for
//!   observing a run. Includes [`LoggingHandler`], [`CompositeEventHandler`]
//!   and [`FnEventHandler`].
//! - [`prompt`]: default system prompts and the injected user turns.
//! - [`pool`]: [`run_pool`] for many independent runs.

pub mod config;
pub mod events;
pub mod pool;
pub mod prompt;
pub mod run_loop;
pub mod strategy;

pub use config::{PoolConfig, RunConfig, StrategyKind};
pub use events::{
    CompositeEventHandler, EventHandler, EventObserver, FnEventHandler, LoggingHandler,
    NoopHandler, RunEvent,
};
pub use pool::run_pool;
pub use prompt::SystemPromptBuilder;
pub use run_loop::RunLoop;
pub use strategy::{Baseline, ContextStrategy, Focus, FocusSignal, SignalReaction};
