use std::sync::Arc;

use files::SourceStore;
use itertools::Itertools;
use rowan::TextRange;

use crate::{
    DocNodeId, EvaluatedBlock, EvaluatedDocument, EvaluationError, Include, Includes, NodeKind,
    evaluate_document,
};

fn evaluate_with(source: &str, includes: &Includes) -> EvaluatedDocument {
    let mut store = SourceStore::default();
    let file = store.insert("main.fol", source);
    let (parsed, _) = parsing::parse_text(source);
    evaluate_document(file, &parsed.syntax_node(), includes)
}

fn evaluate(source: &str) -> EvaluatedDocument {
    evaluate_with(source, &Includes::default())
}

fn render(block: &EvaluatedBlock, id: DocNodeId) -> String {
    let node = &block.arena[id];
    let head = match &node.kind {
        NodeKind::Text(text) => return format!("{text:?}"),
        NodeKind::Space => return "_".to_string(),
        NodeKind::LineBreak => return "\\\\".to_string(),
        NodeKind::InlineMath(math) => return format!("${math}$"),
        NodeKind::DisplayMath(math) => return format!("$${math}$$"),
        NodeKind::Reference(key) => return format!("Ref({key})"),
        NodeKind::Label(key) => return format!("Label({key})"),
        NodeKind::Placeholder(text) => return format!("<{text}>"),
        NodeKind::Plot(spec) => return format!("Plot({})", spec.data),
        NodeKind::Image(image) => return format!("Image({})", image.path),
        NodeKind::PageBreak => return "PageBreak".to_string(),
        NodeKind::Include { name, .. } => return format!("Include({name})"),
        NodeKind::Emphasis(_) => "Emphasis".to_string(),
        NodeKind::Strong(_) => "Strong".to_string(),
        NodeKind::Paragraph(_) => "Paragraph".to_string(),
        NodeKind::Heading { level, .. } => format!("Heading{level}"),
        NodeKind::Figure { .. } => "Figure".to_string(),
        NodeKind::Table { .. } => "Table".to_string(),
        NodeKind::Row(_) => "Row".to_string(),
        NodeKind::Cell(_) => "Cell".to_string(),
        NodeKind::List { ordered: true, .. } => "Enumerate".to_string(),
        NodeKind::List { ordered: false, .. } => "Itemize".to_string(),
        NodeKind::Item(_) => "Item".to_string(),
    };
    let children = node.kind.children().map(|child| render(block, child)).join(" ");
    format!("{head}[{children}]")
}

fn dump(document: &EvaluatedDocument) -> String {
    let mut blocks = document.blocks.iter().flat_map(|entry| {
        let block = &entry.block;
        block.roots.iter().map(|&root| render(block, root))
    });
    blocks.join("\n")
}

fn errors(document: &EvaluatedDocument) -> Vec<EvaluationError> {
    document.blocks.iter().flat_map(|entry| entry.block.errors.iter().cloned()).collect()
}

fn range(start: u32, end: u32) -> TextRange {
    TextRange::new(start.into(), end.into())
}

#[test]
fn test_unresolved_symbol_placeholder() {
    let document = evaluate("A {B} C");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph["A" _ <{B}> _ "C"]"#);
    assert_eq!(
        errors(&document),
        [EvaluationError::NotInScope { name: "B".into(), span: range(2, 5) }]
    );
}

#[test]
fn test_symbol_expansion() {
    let document = evaluate("\\def{name}{World}\n\nHello {name}!");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph["Hello" _ "World" "!"]"#);
    assert!(errors(&document).is_empty());

    let reads = &document.blocks[1].block.reads;
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].name, "name");
    let origin = reads[0].origin.unwrap();
    assert_eq!(origin.identity, document.blocks[0].block.identity);
    assert_eq!(origin.span, range(0, 17));
}

#[test]
fn test_parameters_and_spans() {
    let document = evaluate("\\def{greet}[1]{Hello #1.}\n\n\\greet{\\emph{you}}");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph["Hello" _ Emphasis["you"] "."]"#);

    let block = &document.blocks[1].block;
    let spans: Vec<_> = block.arena.iter().map(|(_, node)| node.span).collect();
    assert!(spans.contains(&range(0, 18)));
    assert!(spans.contains(&range(7, 17)));
}

#[test]
fn test_recursive_expansion() {
    let document = evaluate("\\def{loop}{x \\loop}\n\n\\loop");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph["x" _ <\loop>]"#);
    assert_eq!(
        errors(&document),
        [EvaluationError::RecursiveExpansion { name: "loop".into(), span: range(0, 5) }]
    );
}

#[test]
fn test_mutual_recursion_terminates() {
    let document = evaluate("\\def{a}{\\b}\\def{b}{\\a}\n\n\\a");
    let errors = errors(&document);
    assert!(matches!(errors.as_slice(), [EvaluationError::RecursiveExpansion { .. }]));
}

#[test]
fn test_arity_mismatch() {
    let document = evaluate("\\def{pair}[2]{#1 and #2}\n\n\\pair{a}");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph["a" _ "and"]"#);
    assert_eq!(
        errors(&document),
        [EvaluationError::ArityMismatch {
            name: "pair".into(),
            expected: 2,
            actual: 1,
            span: range(0, 8)
        }]
    );
}

#[test]
fn test_invalid_parameter() {
    let document = evaluate("\\def{one}[1]{#1 #2}\n\n\\one{x} #1");
    let errors = errors(&document);
    assert!(matches!(
        errors.as_slice(),
        [
            EvaluationError::InvalidParameter { index: 2, .. },
            EvaluationError::InvalidParameter { index: 1, .. }
        ]
    ));
}

#[test]
fn test_invalid_arity() {
    let document = evaluate("\\def{many}[12]{x}");
    let errors = errors(&document);
    assert!(matches!(errors.as_slice(), [EvaluationError::InvalidArity { .. }]));
}

#[test]
fn test_definitions_export_in_order() {
    let document = evaluate("\\def{a}{1}\\def{b}{2}\n\n\\def{a}{3}");
    let exports: Vec<_> = document.exports.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(exports, ["a", "b"]);
    assert_eq!(document.exports[0].origin.unwrap().identity, document.blocks[1].block.identity);
}

#[test]
fn test_group_scope_is_local() {
    let document = evaluate("{\\def{x}{inner}{x}} {x}");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph["inner" _ <{x}>]"#);
    assert!(document.exports.is_empty());
}

#[test]
fn test_block_results_split_paragraph() {
    let document = evaluate("Text \\section{Intro} more \\pagebreak end");
    insta::assert_snapshot!(dump(&document), @r#"
    Paragraph["Text"]
    Heading1["Intro"]
    Paragraph["more"]
    PageBreak
    Paragraph["end"]
    "#);
}

#[test]
fn test_inline_formatting() {
    let document = evaluate("\\emph{a \\strong{b}} $x^2$ \\ref{eq} a\\\\b \\%");
    insta::assert_snapshot!(
        dump(&document),
        @r#"Paragraph[Emphasis["a" _ Strong["b"]] _ $x^2$ _ Ref(eq) _ "a" \\ "b" _ "%"]"#
    );
}

#[test]
fn test_display_math() {
    let document = evaluate("$$ E = mc^2 $$");
    insta::assert_snapshot!(dump(&document), @"$$E = mc^2$$");
}

#[test]
fn test_figure_caption_and_label() {
    let source = "\\begin{figure}\n\\plot[kind=bar, height=2cm]{data.csv}\n\\caption{Results}\\label{fig:r}\n\\end{figure}";
    let document = evaluate(source);
    insta::assert_snapshot!(
        dump(&document),
        @r#"Figure[Plot(data.csv) Paragraph[Label(fig:r)] "Results"]"#
    );

    let block = &document.blocks[0].block;
    let figure = block.roots[0];
    assert_eq!(block.labels.len(), 1);
    assert_eq!(block.labels[0].figure, Some(figure));

    let NodeKind::Plot(spec) = &block.arena[block.plots[0]].kind else {
        panic!("expected a plot");
    };
    assert_eq!(spec.kind, "bar");
    assert_eq!(spec.height, Some(geometry::parse_length("2cm", geometry::Abs::ZERO).unwrap()));
    assert_eq!(spec.width, None);
}

#[test]
fn test_invalid_plot_length() {
    let document = evaluate("\\plot[width=wide]{data.csv}");
    let errors = errors(&document);
    assert!(matches!(errors.as_slice(), [EvaluationError::InvalidLength { .. }]));
}

#[test]
fn test_non_positive_lengths_fall_back_to_defaults() {
    let document = evaluate("\\plot[width=-1cm, height=0pt]{data.csv}\n\n\\image[width=-2pt]{a.png}");
    let errors = errors(&document);
    let rejected = errors
        .iter()
        .filter_map(|error| match error {
            EvaluationError::InvalidLength { option, error, .. } => Some((option.as_str(), error)),
            _ => None,
        })
        .collect_vec();
    assert_eq!(
        rejected,
        [
            ("width", &geometry::LengthError::NotPositive("-1cm".to_string())),
            ("height", &geometry::LengthError::NotPositive("0pt".to_string())),
            ("width", &geometry::LengthError::NotPositive("-2pt".to_string())),
        ]
    );

    let block = &document.blocks[0].block;
    let NodeKind::Plot(spec) = &block.arena[block.plots[0]].kind else {
        panic!("expected a plot");
    };
    assert_eq!(spec.width, None);
    assert_eq!(spec.height, None);

    let block = &document.blocks[1].block;
    let image = block.arena.iter().find_map(|(_, node)| match &node.kind {
        NodeKind::Image(image) => Some(image),
        _ => None,
    });
    let Some(image) = image else {
        panic!("expected an image");
    };
    assert_eq!(image.width, None);
}

#[test]
fn test_table_cells_and_rows() {
    let document = evaluate("\\begin{table}\na & b \\\\ c & d \\\\\n\\caption{T}\n\\end{table}");
    insta::assert_snapshot!(
        dump(&document),
        @r#"Table[Row[Cell["a"] Cell["b"]] Row[Cell["c"] Cell["d"]] "T"]"#
    );
}

#[test]
fn test_lists() {
    let document = evaluate("\\begin{enumerate}\n\\item one\n\\item two \\emph{x}\n\\end{enumerate}");
    insta::assert_snapshot!(
        dump(&document),
        @r#"Enumerate[Item[Paragraph["one"]] Item[Paragraph["two" _ Emphasis["x"]]]]"#
    );
}

#[test]
fn test_list_preamble_is_misplaced() {
    let document = evaluate("\\begin{itemize}\nearly\n\\item one\n\\end{itemize}");
    insta::assert_snapshot!(
        dump(&document),
        @r#"Itemize[Item[Paragraph["early"]] Item[Paragraph["one"]]]"#
    );
    let errors = errors(&document);
    assert!(matches!(errors.as_slice(), [EvaluationError::Misplaced { .. }]));
}

#[test]
fn test_misplaced_builtins() {
    let document = evaluate("\\caption{Loose} \\item");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph["Loose"]"#);
    let errors = errors(&document);
    assert!(matches!(
        errors.as_slice(),
        [EvaluationError::Misplaced { .. }, EvaluationError::Misplaced { .. }]
    ));
}

#[test]
fn test_environment_errors() {
    let document = evaluate("\\begin{aside}\ntext\n\\end{other}");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph["text"]"#);
    let errors = errors(&document);
    assert!(matches!(
        errors.as_slice(),
        [EvaluationError::MismatchedEnvironment { .. }, EvaluationError::UnknownEnvironment { .. }]
    ));
}

#[test]
fn test_include_not_found() {
    let document = evaluate("\\include{missing}");
    insta::assert_snapshot!(dump(&document), @r#"Paragraph[<\include{missing}>]"#);
    assert_eq!(
        errors(&document),
        [EvaluationError::IncludeNotFound { name: "missing".into(), span: range(0, 17) }]
    );
}

#[test]
fn test_include_cycle() {
    let mut includes = Includes::default();
    includes.insert("self".into(), Include::Cycle);
    let document = evaluate_with("\\include{self}", &includes);
    let errors = errors(&document);
    assert!(matches!(errors.as_slice(), [EvaluationError::IncludeCycle { .. }]));
}

#[test]
fn test_include_exports_bindings() {
    let included = evaluate("\\def{greeting}{Hi}\n\nIncluded.");
    let mut includes = Includes::default();
    includes.insert("other".into(), Include::Resolved(Arc::new(included)));

    let document = evaluate_with("\\include{other}\n\n{greeting}", &includes);
    insta::assert_snapshot!(dump(&document), @r#"
    Include(other)
    Paragraph["Hi"]
    "#);
    assert_eq!(document.blocks[0].block.includes.len(), 1);
    assert_eq!(document.exports.len(), 1);
}

#[test]
fn test_deterministic() {
    let source = "\\def{x}[1]{#1 #1}\n\n\\x{\\emph{a}} \\section{S}";
    assert_eq!(evaluate(source), evaluate(source));
}
