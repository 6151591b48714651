//! Batch compilation of the documents named on the command line.

use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use building::{Compiled, SourceResolver, Workspace};
use diagnostics::Severity;
use files::SourceStore;

use crate::cli::Config;
use crate::error::CliError;

/// Loads `\include{name}` targets from `name.fol` next to the inputs.
#[derive(Debug, Default)]
pub struct DirectoryResolver {
    directories: Vec<PathBuf>,
}

impl DirectoryResolver {
    pub fn new(directories: impl IntoIterator<Item = PathBuf>) -> DirectoryResolver {
        let mut resolver = DirectoryResolver::default();
        for directory in directories {
            if !resolver.directories.contains(&directory) {
                resolver.directories.push(directory);
            }
        }
        resolver
    }
}

impl SourceResolver for DirectoryResolver {
    fn resolve(&self, name: &str) -> Option<(String, Arc<str>)> {
        self.directories.iter().find_map(|directory| {
            let path = directory.join(format!("{name}.fol"));
            let text = fs::read_to_string(&path).ok()?;
            tracing::debug!(name, ?path, "resolved include");
            Some((path.to_string_lossy().into_owned(), Arc::from(text)))
        })
    }
}

#[derive(Debug, Default)]
pub struct Report {
    pub errors: usize,
    pub warnings: usize,
    pub output: String,
}

impl Report {
    pub fn add(&mut self, files: &SourceStore, compiled: &Compiled, pages: bool) {
        let mut errors = 0;
        let mut warnings = 0;
        for diagnostic in compiled.diagnostics.iter() {
            match diagnostic.severity {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
            }
            let path = files.path(diagnostic.file);
            let content = files.content(diagnostic.file);
            self.output.push_str(&diagnostics::format_annotated(diagnostic, &path, &content));
        }

        let path = files.path(compiled.file);
        let _ = writeln!(
            self.output,
            "{path}: {} pages, {} plots, {errors} errors, {warnings} warnings",
            compiled.pages.pages.len(),
            compiled.artifacts.len(),
        );

        if pages {
            for (index, page) in compiled.pages.pages.iter().enumerate() {
                let _ = writeln!(self.output, "  page {}: {} boxes", index + 1, page.boxes.len());
            }
            for entry in &compiled.artifacts.plots {
                let _ = writeln!(self.output, "  plot: {}", entry.artifact.summary);
            }
        }

        self.errors += errors;
        self.warnings += warnings;
    }
}

fn parent(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn run(config: &Config) -> Result<Report, CliError> {
    let resolver = DirectoryResolver::new(config.files.iter().map(|path| parent(path)));
    let mut workspace = Workspace::new(config.engine_config()).with_resolver(resolver);
    workspace.set_config(config.layout_config());

    let mut documents = Vec::with_capacity(config.files.len());
    for path in &config.files {
        let text = fs::read_to_string(path)
            .map_err(|source| CliError::Read { path: path.clone(), source })?;
        documents.push(workspace.open(&path.to_string_lossy(), text));
    }

    let results = {
        let _span = tracing::info_span!("compile", documents = documents.len()).entered();
        workspace.compile_all(&documents)
    };

    let mut report = Report::default();
    for result in results {
        let compiled = result?;
        report.add(workspace.files(), &compiled, config.pages);
    }

    print!("{}", report.output);
    tracing::info!(errors = report.errors, warnings = report.warnings, "finished");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use building::{SourceResolver, Workspace};

    use super::{DirectoryResolver, Report, parent};

    #[test]
    fn test_parent() {
        assert_eq!(parent(Path::new("main.fol")), PathBuf::from("."));
        assert_eq!(parent(Path::new("book/main.fol")), PathBuf::from("book"));
    }

    #[test]
    fn test_resolver_missing() {
        let resolver = DirectoryResolver::new([PathBuf::from("does-not-exist")]);
        assert!(resolver.resolve("chapter").is_none());
    }

    #[test]
    fn test_report_counts_errors() {
        let mut workspace = Workspace::default();
        let id = workspace.open("main.fol", "A {B} C");
        let version = workspace.files().latest(id).version;
        let compiled = workspace.compile(id, version).unwrap();

        let mut report = Report::default();
        report.add(workspace.files(), &compiled, true);

        assert_eq!(report.errors, 1);
        assert_eq!(report.warnings, 0);
        assert!(report.output.contains("error[NotInScope]"));
        assert!(report.output.contains("main.fol:1:3"));
        assert!(report.output.contains("main.fol: 1 pages, 0 plots, 1 errors, 0 warnings"));
        assert!(report.output.contains("  page 1: "));
    }
}
