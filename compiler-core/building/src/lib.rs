//! The incremental compilation pipeline.
//!
//! [`QueryEngine`] tracks documents as inputs and derives everything else
//! from them, [`Memo`] shares block-level results between compilations, and
//! [`Workspace`] and [`Session`] drive both.

mod engine;
mod memo;
mod pipeline;
mod plot;
mod promise;
mod workspace;

pub use engine::{CacheStats, EngineConfig, QueryEngine};
pub use memo::{DependencyCycle, Memo, Pin, Pins};
pub use pipeline::{Compiled, EvaluatedFile, IncludeTarget, ParsedSource};
pub use plot::{Artifacts, PlotArtifact, PlotEntry, Plotter, SummaryPlotter};
pub use workspace::{CompileError, Failure, Session, SourceResolver, Workspace, include_name};
