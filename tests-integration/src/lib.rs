use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use building::{Compiled, EngineConfig, PlotArtifact, Plotter, SummaryPlotter, Workspace};
use evaluating::{NodeKind, PlotSpec};
use files::FileId;
use glob::glob;
use itertools::Itertools;
use smol_str::SmolStr;

/// Counts renders, optionally taking its time about each one.
#[derive(Debug, Default)]
pub struct CountingPlotter {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingPlotter {
    pub fn slow(delay: Duration) -> CountingPlotter {
        CountingPlotter { calls: AtomicUsize::new(0), delay }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Plotter for CountingPlotter {
    fn render(&self, spec: &PlotSpec) -> PlotArtifact {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        SummaryPlotter.render(spec)
    }
}

pub fn counting_workspace(plotter: &Arc<CountingPlotter>) -> Workspace {
    let plotter = Arc::clone(plotter) as Arc<dyn Plotter>;
    Workspace::new(EngineConfig { plotter, ..EngineConfig::default() })
}

/// Opens every `.fol` file under `fixtures/{folder}`, named by its file name.
pub fn load_workspace(folder: &str) -> Workspace {
    let mut workspace = Workspace::default();
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let pattern = format!("{}/fixtures/{folder}/*.fol", manifest.display());
    let paths = glob(&pattern).unwrap().filter_map(Result::ok).sorted();
    for path in paths {
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        let text = std::fs::read_to_string(&path).unwrap();
        workspace.open(&name, text);
    }
    workspace
}

pub fn file(workspace: &Workspace, path: &str) -> FileId {
    workspace.files().id(path).unwrap_or_else(|| panic!("'{path}' is not open"))
}

pub fn compile_latest(workspace: &mut Workspace, file: FileId) -> Compiled {
    let version = workspace.files().latest(file).version;
    workspace.compile(file, version).unwrap()
}

/// `count` one-line paragraphs.
pub fn paragraphs(count: usize) -> String {
    (0..count).map(|index| format!("Paragraph {index}.")).join("\n\n")
}

pub fn placeholders(compiled: &Compiled) -> Vec<SmolStr> {
    compiled
        .document
        .segments()
        .iter()
        .flat_map(|segment| segment.block.arena.iter())
        .filter_map(|(_, node)| match &node.kind {
            NodeKind::Placeholder(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

pub fn report(compiled: &Compiled) -> String {
    diagnostics::format_text(&compiled.diagnostics)
}
