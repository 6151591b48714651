use std::sync::Arc;

use building::Workspace;
use tests_integration::{CountingPlotter, compile_latest, counting_workspace, paragraphs, report};

/// Compiles the same text in a fresh workspace.
fn from_scratch(text: &str) -> building::Compiled {
    let mut workspace = Workspace::default();
    let id = workspace.open("main.fol", text);
    compile_latest(&mut workspace, id)
}

#[test]
fn test_split_on_later_page_reuses_earlier_pages() {
    let mut workspace = Workspace::default();
    let text = paragraphs(120);
    let id = workspace.open("main.fol", text.as_str());
    let before = compile_latest(&mut workspace, id);
    assert!(before.pages.pages.len() >= 3);

    let offset = text.find("Paragraph 110.").unwrap() + "Paragraph".len();
    workspace.apply_edit(id, offset..offset + 1, "\n\n").unwrap();
    let after = compile_latest(&mut workspace, id);

    assert!(Arc::ptr_eq(&before.pages.pages[0], &after.pages.pages[0]));
    assert!(Arc::ptr_eq(&before.pages.pages[1], &after.pages.pages[1]));

    let fresh = from_scratch(&workspace.files().content(id));
    assert_eq!(after.pages, fresh.pages);
}

#[test]
fn test_unrelated_edit_keeps_plot_artifact() {
    let plotter = Arc::new(CountingPlotter::default());
    let mut workspace = counting_workspace(&plotter);
    let text = "Intro.\n\n\\plot[kind=bar]{sales.csv}\n\nOutro.";
    let id = workspace.open("main.fol", text);

    let before = compile_latest(&mut workspace, id);
    assert_eq!(plotter.calls(), 1);

    let offset = text.find("Outro").unwrap() + "Outro".len();
    workspace.apply_edit(id, offset..offset, " text").unwrap();
    let after = compile_latest(&mut workspace, id);

    assert_eq!(plotter.calls(), 1);
    assert!(Arc::ptr_eq(&before.artifacts.plots[0].artifact, &after.artifacts.plots[0].artifact));
}

#[test]
fn test_identical_plots_render_once() {
    let plotter = Arc::new(CountingPlotter::default());
    let mut workspace = counting_workspace(&plotter);
    let text = "\\plot{growth.csv}\n\nBetween.\n\n\\plot{growth.csv}";
    let id = workspace.open("main.fol", text);

    let compiled = compile_latest(&mut workspace, id);
    assert_eq!(compiled.artifacts.len(), 2);
    assert_eq!(plotter.calls(), 1);
}

#[test]
fn test_edits_match_full_compile() {
    let mut workspace = Workspace::default();
    let id = workspace.open("main.fol", "\\def{x}{one}\n\nUses {x}.\n\nPlain text.");
    compile_latest(&mut workspace, id);

    let edits: [(&str, &str); 4] = [
        ("one", "two"),
        ("Plain", "\\emph{Plain}"),
        ("Uses", "Still uses {y} and"),
        ("{x}{two}", "{y}{three}"),
    ];
    for (needle, replacement) in edits {
        let text = workspace.files().content(id);
        let start = text.find(needle).unwrap();
        workspace.apply_edit(id, start..start + needle.len(), replacement).unwrap();

        let incremental = compile_latest(&mut workspace, id);
        let fresh = from_scratch(&workspace.files().content(id));
        assert_eq!(incremental.document, fresh.document);
        assert_eq!(incremental.pages, fresh.pages);
        assert_eq!(incremental.diagnostics, fresh.diagnostics, "{}", report(&incremental));
    }
}

#[test]
fn test_config_change_relays_out() {
    let mut workspace = Workspace::default();
    let id = workspace.open("main.fol", paragraphs(60));
    let before = compile_latest(&mut workspace, id);

    let config = layout::LayoutConfig { breaking: layout::Breaking::Greedy, ..Default::default() };
    workspace.set_config(config);
    let after = compile_latest(&mut workspace, id);

    assert!(Arc::ptr_eq(&before.document, &after.document));
    assert_ne!(before.pages.config, after.pages.config);
}
