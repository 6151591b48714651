use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use building::{CompileError, Failure, Session, Workspace};
use tests_integration::{CountingPlotter, counting_workspace, paragraphs};

#[test]
fn test_shared_plot_is_rendered_once_across_documents() {
    let plotter = Arc::new(CountingPlotter::slow(Duration::from_millis(50)));
    let mut workspace = counting_workspace(&plotter);
    let documents: Vec<_> = (0..4)
        .map(|index| {
            let text = format!("Document {index}.\n\n\\plot[kind=line]{{growth.csv}}");
            workspace.open(&format!("doc{index}.fol"), text)
        })
        .collect();

    let results = workspace.compile_all(&documents);
    for result in &results {
        let compiled = result.as_ref().unwrap();
        assert_eq!(compiled.artifacts.len(), 1);
    }
    assert_eq!(plotter.calls(), 1);

    let first = &results[0].as_ref().unwrap().artifacts.plots[0].artifact;
    for result in &results[1..] {
        let artifact = &result.as_ref().unwrap().artifacts.plots[0].artifact;
        assert!(Arc::ptr_eq(first, artifact));
    }
}

#[test]
fn test_compile_all_matches_sequential() {
    let mut parallel = Workspace::default();
    let mut sequential = Workspace::default();
    let mut documents = vec![];
    for index in 0..6 {
        let path = format!("doc{index}.fol");
        let text = paragraphs(10 + index * 7);
        documents.push(parallel.open(&path, text.as_str()));
        sequential.open(&path, text.as_str());
    }

    let results = parallel.compile_all(&documents);
    for (&document, result) in documents.iter().zip(results) {
        let compiled = result.unwrap();
        let version = sequential.files().latest(document).version;
        let expected = sequential.compile(document, version).unwrap();
        assert_eq!(compiled.pages, expected.pages);
        assert_eq!(compiled.diagnostics, expected.diagnostics);
    }
}

#[test]
fn test_session_delivers_latest_version() {
    let mut workspace = Workspace::default();
    let id = workspace.open("main.fol", paragraphs(200));
    let mut session = Session::new(workspace);

    let first = session.request(id).unwrap();
    session.edit(id, 0..0, "Opening words.\n\n").unwrap();
    let second = session.request(id).unwrap();
    assert_eq!(second, first + 1);

    session.wait();
    let delivered = session.deliveries();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].version, second);
    assert!(!delivered[0].has_errors());

    session.edit(id, 0..0, "More.\n\n").unwrap();
    let third = session.request(id).unwrap();
    session.wait();
    let delivered = session.deliveries();
    assert_eq!(delivered.iter().map(|compiled| compiled.version).collect::<Vec<_>>(), [third]);
}

#[test]
fn test_edit_cancels_running_compilation() {
    let plotter = Arc::new(CountingPlotter::slow(Duration::from_millis(200)));
    let workspace = counting_workspace(&plotter);
    let mut session = Session::new(workspace);
    let text = "Intro.\n\n\\plot{first.csv}\n\n\\plot{second.csv}\n\n\\plot{third.csv}";
    let id = session.workspace_mut().open("main.fol", text);

    let first = session.request(id).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while plotter.calls() == 0 {
        assert!(Instant::now() < deadline, "the first plot never started rendering");
        thread::sleep(Duration::from_millis(1));
    }

    // The first plot is still rendering; the edit waits for the worker to stop.
    session.edit(id, 0..6, "Opening.").unwrap();
    let second = session.request(id).unwrap();
    session.wait();

    let failures = session.failures();
    assert_eq!(failures, [Failure { file: id, version: first, error: CompileError::Cancelled }]);

    let delivered = session.deliveries();
    assert_eq!(delivered.iter().map(|compiled| compiled.version).collect::<Vec<_>>(), [second]);
    assert_eq!(delivered[0].artifacts.len(), 3);
    assert_eq!(plotter.calls(), 3);
}

#[test]
fn test_dropping_session_cancels_workers() {
    let plotter = Arc::new(CountingPlotter::slow(Duration::from_millis(200)));
    let workspace = counting_workspace(&plotter);
    let mut session = Session::new(workspace);
    let plots = (0..20).map(|index| format!("\\plot{{series{index}.csv}}")).collect::<Vec<_>>();
    let id = session.workspace_mut().open("main.fol", plots.join("\n\n"));

    session.request(id).unwrap();
    let started = Instant::now();
    while plotter.calls() == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    drop(session);

    assert!(plotter.calls() < 20);
    assert!(started.elapsed() < Duration::from_secs(3));
}
