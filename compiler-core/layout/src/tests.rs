use std::sync::Arc;

use evaluating::{DocumentTree, Includes, assemble, evaluate_document};
use files::SourceStore;
use geometry::{Abs, Margins, PageGeometry, Size};
use itertools::Itertools;

use crate::{BoxContent, LayoutConfig, LayoutWarning, MonoMetrics, Pages, Style, layout};

fn document(source: &str) -> DocumentTree {
    let mut store = SourceStore::default();
    let file = store.insert("main.fol", source);
    let (parsed, _) = parsing::parse_text(source);
    let document = evaluate_document(file, &parsed.syntax_node(), &Includes::default());
    assemble(&document)
}

/// A 180pt x 80pt content area; four one-line paragraphs fill a page.
fn small() -> LayoutConfig {
    let size = Size::new(Abs::pt(200), Abs::pt(100));
    let geometry = PageGeometry::new(size, Margins::uniform(Abs::pt(10)));
    LayoutConfig { geometry, ..LayoutConfig::default() }
}

fn paragraphs(count: usize, changed: Option<usize>) -> String {
    let paragraph = |index| match changed {
        Some(changed) if changed == index => "changed".to_string(),
        _ => format!("p{index}"),
    };
    (0..count).map(paragraph).join("\n\n")
}

fn texts(pages: &Pages) -> Vec<Vec<String>> {
    let text = |page: &Arc<crate::Page>| {
        page.boxes
            .iter()
            .filter_map(|b| match &b.content {
                BoxContent::Text { text, .. } => Some(text.to_string()),
                _ => None,
            })
            .collect_vec()
    };
    pages.pages.iter().map(text).collect()
}

#[test]
fn test_paragraphs_fill_pages() {
    let tree = document(&paragraphs(10, None));
    let pages = layout(&tree, &small(), &MonoMetrics, None);
    insta::assert_debug_snapshot!(texts(&pages), @r#"
    [
        [
            "p0",
            "p1",
            "p2",
            "p3",
        ],
        [
            "p4",
            "p5",
            "p6",
            "p7",
        ],
        [
            "p8",
            "p9",
        ],
    ]
    "#);

    let first = &pages.pages[0].boxes[0];
    assert_eq!(first.rect.origin.x, Abs::pt(10));
    assert_eq!(first.rect.origin.y, Abs::pt(10));
    let second = &pages.pages[0].boxes[1];
    assert_eq!(second.rect.origin.y, Abs::pt(28));
}

#[test]
fn test_layout_is_deterministic() {
    let source = "\\section{Intro}\n\nSome \\emph{text} with $x^2$ and more words.\n\n$$a + b$$";
    let first = layout(&document(source), &LayoutConfig::default(), &MonoMetrics, None);
    let second = layout(&document(source), &LayoutConfig::default(), &MonoMetrics, None);
    assert_eq!(first, second);
}

#[test]
fn test_edit_on_last_page_reuses_earlier_pages() {
    let config = small();
    let before = layout(&document(&paragraphs(12, None)), &config, &MonoMetrics, None);
    assert_eq!(before.pages.len(), 3);

    let after = layout(&document(&paragraphs(12, Some(9))), &config, &MonoMetrics, Some(&before));
    assert_eq!(after.pages.len(), 3);
    assert!(Arc::ptr_eq(&before.pages[0], &after.pages[0]));
    assert!(Arc::ptr_eq(&before.pages[1], &after.pages[1]));
    assert!(!Arc::ptr_eq(&before.pages[2], &after.pages[2]));
    assert_eq!(texts(&after)[2], ["p8", "changed", "p10", "p11"]);

    let fresh = layout(&document(&paragraphs(12, Some(9))), &config, &MonoMetrics, None);
    assert_eq!(texts(&after), texts(&fresh));
    assert_eq!(after.spans, fresh.spans);
}

#[test]
fn test_definition_turned_into_content_after_page_break() {
    let config = small();
    let before = layout(
        &document("First.\\pagebreak\n\n\\def{q}{v}\n\nLast."),
        &config,
        &MonoMetrics,
        None,
    );
    assert_eq!(before.pages.len(), 2);

    let source = "First.\\pagebreak\n\nMiddle.\n\nLast.";
    let after = layout(&document(source), &config, &MonoMetrics, Some(&before));
    let fresh = layout(&document(source), &config, &MonoMetrics, None);
    assert_eq!(texts(&after), texts(&fresh));
    assert_eq!(after.spans, fresh.spans);
    assert!(texts(&after).concat().iter().any(|text| text.contains("Middle")));
}

#[test]
fn test_edit_in_middle_resumes_old_pages() {
    let config = small();
    let before = layout(&document(&paragraphs(12, None)), &config, &MonoMetrics, None);
    let after = layout(&document(&paragraphs(12, Some(5))), &config, &MonoMetrics, Some(&before));

    assert!(Arc::ptr_eq(&before.pages[0], &after.pages[0]));
    assert!(!Arc::ptr_eq(&before.pages[1], &after.pages[1]));
    assert!(Arc::ptr_eq(&before.pages[2], &after.pages[2]));

    let fresh = layout(&document(&paragraphs(12, Some(5))), &config, &MonoMetrics, None);
    assert_eq!(after.spans, fresh.spans);
}

#[test]
fn test_inserted_block_shifts_reused_pages() {
    let config = small();
    let before = layout(&document(&paragraphs(12, None)), &config, &MonoMetrics, None);
    let source = format!("extra\n\n{}", paragraphs(12, None));
    let after = layout(&document(&source), &config, &MonoMetrics, Some(&before));

    let fresh = layout(&document(&source), &config, &MonoMetrics, None);
    assert_eq!(texts(&after), texts(&fresh));
    assert_eq!(after.spans, fresh.spans);
}

#[test]
fn test_config_change_discards_pages() {
    let tree = document(&paragraphs(4, None));
    let before = layout(&tree, &small(), &MonoMetrics, None);
    let config = LayoutConfig { paragraph_spacing: Abs::pt(2), ..small() };
    let after = layout(&tree, &config, &MonoMetrics, Some(&before));
    assert!(!Arc::ptr_eq(&before.pages[0], &after.pages[0]));
}

#[test]
fn test_heading_is_kept_with_next() {
    let source = "a\n\nb\n\nc\n\n\\section{Title}\n\nd";
    let pages = layout(&document(source), &small(), &MonoMetrics, None);
    assert_eq!(pages.pages.len(), 2);

    let strong = |page: &crate::Page| {
        page.boxes.iter().any(|b| matches!(b.content, BoxContent::Text { style: Style::Strong, .. }))
    };
    assert!(!strong(&pages.pages[0]));
    assert!(strong(&pages.pages[1]));
    assert_eq!(texts(&pages)[1], ["1", "Title", "d"]);
}

#[test]
fn test_page_break() {
    let source = "a\n\n\\pagebreak\n\nb";
    let pages = layout(&document(source), &LayoutConfig::default(), &MonoMetrics, None);
    insta::assert_debug_snapshot!(texts(&pages), @r#"
    [
        [
            "a",
        ],
        [
            "b",
        ],
    ]
    "#);
}

#[test]
fn test_tall_plot_overflows_its_page() {
    let source = "before\n\n\\plot[height=300pt]{data.csv}\n\nafter";
    let pages = layout(&document(source), &small(), &MonoMetrics, None);
    assert_eq!(pages.pages.len(), 3);
    assert!(matches!(pages.pages[1].boxes[..], [crate::LayoutBox { content: BoxContent::Plot(_), .. }]));

    let warnings = pages.warnings().collect_vec();
    let [LayoutWarning::PageOverflow { height, .. }] = warnings[..] else {
        panic!("expected a page overflow, got {warnings:?}");
    };
    assert_eq!(*height, Abs::pt(306));
}

#[test]
fn test_overfull_line() {
    let source = "x".repeat(50);
    let pages = layout(&document(&source), &small(), &MonoMetrics, None);
    let warnings = pages.warnings().collect_vec();
    let [LayoutWarning::OverfullLine { overflow, .. }] = warnings[..] else {
        panic!("expected an overfull line, got {warnings:?}");
    };
    assert_eq!(*overflow, Abs::pt(70));
}

#[test]
fn test_empty_document_has_a_page() {
    let pages = layout(&document(""), &LayoutConfig::default(), &MonoMetrics, None);
    assert_eq!(pages.pages.len(), 1);
    assert!(pages.pages[0].boxes.is_empty());
}

#[test]
fn test_page_of_node() {
    let tree = document(&paragraphs(6, None));
    let pages = layout(&tree, &small(), &MonoMetrics, None);
    let last = pages.pages[1].boxes[1].node;
    assert_eq!(pages.page_of(last), Some(1));
}
