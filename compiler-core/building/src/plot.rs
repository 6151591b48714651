//! Rendering of plot specifications into artifacts.

use std::fmt::Write;
use std::sync::Arc;

use building_types::Fingerprint;
use evaluating::{NodeRef, PlotSpec};
use smol_str::SmolStr;

/// The external plotting collaborator.
///
/// Rendering is expensive, so the engine calls it at most once per distinct
/// [`PlotSpec::fingerprint`].
pub trait Plotter: Send + Sync {
    fn render(&self, spec: &PlotSpec) -> PlotArtifact;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlotArtifact {
    pub fingerprint: Fingerprint,
    pub kind: SmolStr,
    pub data: SmolStr,
    /// A textual rendering of the plot.
    pub summary: String,
}

/// Describes plots instead of drawing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryPlotter;

impl Plotter for SummaryPlotter {
    fn render(&self, spec: &PlotSpec) -> PlotArtifact {
        let mut summary = format!("{} plot of {}", spec.kind, spec.data);
        for (key, value) in &spec.options {
            let _ = write!(summary, ", {key}={value}");
        }
        if let (Some(width), Some(height)) = (spec.width, spec.height) {
            let _ = write!(summary, " ({width:?} x {height:?})");
        }
        PlotArtifact {
            fingerprint: spec.fingerprint(),
            kind: spec.kind.clone(),
            data: spec.data.clone(),
            summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotEntry {
    pub node: NodeRef,
    pub artifact: Arc<PlotArtifact>,
}

/// Plot artifacts of a document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub plots: Vec<PlotEntry>,
}

impl Artifacts {
    pub fn get(&self, node: NodeRef) -> Option<&Arc<PlotArtifact>> {
        self.plots.iter().find(|entry| entry.node == node).map(|entry| &entry.artifact)
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }
}
