mod commands;
mod environments;

use std::mem;
use std::sync::Arc;

use building_types::NodeIdentity;
use rowan::ast::AstNode;
use rowan::{NodeOrToken, TextRange, TextSize};
use smol_str::SmolStr;
use syntax::{SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken, cst};

use crate::{
    BlockContext, DocNodeId, DocumentArena, DocumentNode, Environment, EvaluatedBlock,
    EvaluatedDocument, EvaluationError, Includes, Label, Macro, NodeKind, Origin, Read, Value,
};

const MAXIMUM_DEPTH: usize = 64;
const MAXIMUM_EXPANSIONS: usize = 10_000;

pub(crate) fn evaluate_block(
    context: &BlockContext,
    block: &SyntaxNode,
    module: &Environment<'_>,
    includes: &Includes,
) -> EvaluatedBlock {
    let mut state = State::default();
    let ctx = Context { identity: context.identity, offset: block.text_range().start(), includes };

    let mut scope = Environment::module(module);
    let mut sink = Sink::flow();
    state.node(&ctx, block.clone(), &mut scope, None, &mut sink);
    let roots = sink.finish(&mut state);
    let exports = scope.macros().cloned().collect();

    EvaluatedBlock {
        identity: context.identity,
        fingerprint: context.key,
        arena: state.arena,
        roots,
        errors: state.errors,
        exports,
        reads: state.reads,
        labels: state.labels,
        references: state.references,
        includes: state.includes,
        plots: state.plots,
    }
}

#[derive(Default)]
struct State {
    arena: DocumentArena,
    errors: Vec<EvaluationError>,
    reads: Vec<Read>,
    labels: Vec<Label>,
    references: Vec<DocNodeId>,
    includes: Vec<Arc<EvaluatedDocument>>,
    plots: Vec<DocNodeId>,
    /// Caption slots of the enclosing figures and tables.
    captions: Vec<Option<Vec<DocNodeId>>>,
    depth: usize,
    expansions: usize,
    limit_reported: bool,
}

struct Context<'c> {
    identity: NodeIdentity,
    /// Start of the block within its file.
    offset: TextSize,
    includes: &'c Includes,
}

/// An active macro expansion.
struct Frame<'f> {
    name: SmolStr,
    /// The span of the invocation; nodes produced by the body point here.
    span: TextRange,
    arguments: Vec<cst::Argument>,
    parameters: u8,
    caller: &'f Environment<'f>,
    parent: Option<&'f Frame<'f>>,
}

impl Frame<'_> {
    fn is_expanding(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(frame) = current {
            if frame.name == name {
                return true;
            }
            current = frame.parent;
        }
        false
    }
}

/// A command or symbol reference about to be applied.
struct Invocation {
    name: SmolStr,
    span: TextRange,
    text: SmolStr,
    options: Option<cst::OptionList>,
    arguments: Vec<cst::Argument>,
}

/// Collects evaluated nodes into a sequence of roots.
///
/// In flow mode, runs of inline nodes are wrapped into paragraphs and block
/// nodes become roots of their own. In inline mode the inline run is kept
/// as is and block nodes are collected on the side, to be hoisted out by
/// the caller.
struct Sink {
    flow: bool,
    roots: Vec<DocNodeId>,
    run: Vec<DocNodeId>,
}

impl Sink {
    fn flow() -> Sink {
        Sink { flow: true, roots: vec![], run: vec![] }
    }

    fn inline() -> Sink {
        Sink { flow: false, roots: vec![], run: vec![] }
    }

    fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.run.is_empty()
    }

    fn accepts_space(&self, state: &State) -> bool {
        self.run.last().is_some_and(|&last| !matches!(state.arena[last].kind, NodeKind::Space))
    }

    fn push(&mut self, state: &mut State, id: DocNodeId) {
        if state.arena[id].kind.is_block() {
            self.flush(state);
            self.roots.push(id);
        } else {
            self.run.push(id);
        }
    }

    fn extend(&mut self, state: &mut State, ids: impl IntoIterator<Item = DocNodeId>) {
        for id in ids {
            self.push(state, id);
        }
    }

    fn trim(&mut self, state: &State) {
        while let Some(&last) = self.run.last() {
            if !matches!(state.arena[last].kind, NodeKind::Space) {
                break;
            }
            self.run.pop();
        }
    }

    fn flush(&mut self, state: &mut State) {
        if !self.flow {
            return;
        }
        self.trim(state);
        let content = mem::take(&mut self.run);
        let Some(span) = state.cover(&content) else { return };
        let id = state.alloc(NodeKind::Paragraph(content), span);
        self.roots.push(id);
    }

    fn finish(mut self, state: &mut State) -> Vec<DocNodeId> {
        self.flush(state);
        self.roots
    }

    /// Returns the inline run and the hoisted block nodes.
    fn into_parts(mut self, state: &State) -> (Vec<DocNodeId>, Vec<DocNodeId>) {
        self.trim(state);
        (self.run, self.roots)
    }
}

impl State {
    fn alloc(&mut self, kind: NodeKind, span: TextRange) -> DocNodeId {
        self.arena.alloc(DocumentNode { kind, span })
    }

    fn cover(&self, ids: &[DocNodeId]) -> Option<TextRange> {
        ids.iter().map(|&id| self.arena[id].span).reduce(TextRange::cover)
    }

    fn span(&self, ctx: &Context, frame: Option<&Frame<'_>>, range: TextRange) -> TextRange {
        match frame {
            Some(frame) => frame.span,
            None => range - ctx.offset,
        }
    }

    fn placeholder(&mut self, text: SmolStr, span: TextRange, sink: &mut Sink) {
        let id = self.alloc(NodeKind::Placeholder(text), span);
        sink.push(self, id);
    }

    fn element(
        &mut self,
        ctx: &Context,
        element: SyntaxElement,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        match element {
            NodeOrToken::Node(node) => self.node(ctx, node, scope, frame, sink),
            NodeOrToken::Token(token) => self.token(ctx, token, frame, sink),
        }
    }

    fn node(
        &mut self,
        ctx: &Context,
        node: SyntaxNode,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        match node.kind() {
            SyntaxKind::Paragraph => {
                for element in node.children_with_tokens() {
                    self.element(ctx, element, scope, frame, sink);
                }
                sink.flush(self);
            }
            SyntaxKind::DisplayMath => {
                let Some(math) = cst::DisplayMath::cast(node) else { return };
                let span = self.span(ctx, frame, math.syntax().text_range());
                let id = self.alloc(NodeKind::DisplayMath(math_text(math.contents())), span);
                sink.push(self, id);
            }
            SyntaxKind::InlineMath => {
                let Some(math) = cst::InlineMath::cast(node) else { return };
                let span = self.span(ctx, frame, math.syntax().text_range());
                let id = self.alloc(NodeKind::InlineMath(math_text(math.contents())), span);
                sink.push(self, id);
            }
            SyntaxKind::Environment => {
                let Some(environment) = cst::Environment::cast(node) else { return };
                self.environment(ctx, environment, scope, frame, sink);
            }
            SyntaxKind::Group => {
                let Some(group) = cst::Group::cast(node) else { return };
                self.group(ctx, group, scope, frame, sink);
            }
            SyntaxKind::Command => {
                let Some(command) = cst::Command::cast(node) else { return };
                self.command(ctx, command, scope, frame, sink);
            }
            SyntaxKind::Definition => {
                let Some(definition) = cst::Definition::cast(node) else { return };
                self.definition(ctx, definition, scope, frame);
            }
            SyntaxKind::ERROR => {
                let span = self.span(ctx, frame, node.text_range());
                self.placeholder(node.text().to_string().into(), span, sink);
            }
            _ => (),
        }
    }

    fn token(&mut self, ctx: &Context, token: SyntaxToken, frame: Option<&Frame<'_>>, sink: &mut Sink) {
        let span = self.span(ctx, frame, token.text_range());
        let kind = match token.kind() {
            SyntaxKind::WHITESPACE | SyntaxKind::NEWLINE => {
                if !sink.accepts_space(self) {
                    return;
                }
                NodeKind::Space
            }
            SyntaxKind::COMMENT | SyntaxKind::END_OF_FILE => return,
            SyntaxKind::BREAK => {
                sink.flush(self);
                return;
            }
            SyntaxKind::LINE_BREAK => NodeKind::LineBreak,
            SyntaxKind::ESCAPE => NodeKind::Text(token.text().trim_start_matches('\\').into()),
            SyntaxKind::PARAMETER => {
                self.parameter(ctx, token, frame, sink);
                return;
            }
            SyntaxKind::ERROR => NodeKind::Placeholder(token.text().into()),
            _ => NodeKind::Text(token.text().into()),
        };
        let id = self.alloc(kind, span);
        sink.push(self, id);
    }

    fn group(
        &mut self,
        ctx: &Context,
        group: cst::Group,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        if let Some(name) = crate::symbol(&group) {
            let syntax = group.syntax();
            let span = self.span(ctx, frame, syntax.text_range());
            let text = syntax.text().to_string().into();
            let invocation = Invocation { name, span, text, options: None, arguments: vec![] };
            return self.invoke(ctx, invocation, scope, frame, sink);
        }

        let mut local = Environment::local(scope);
        for element in group.contents() {
            self.element(ctx, element, &mut local, frame, sink);
        }
    }

    fn command(
        &mut self,
        ctx: &Context,
        command: cst::Command,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        let Some(name) = command.name() else { return };
        let syntax = command.syntax();
        let invocation = Invocation {
            name,
            span: self.span(ctx, frame, syntax.text_range()),
            text: syntax.text().to_string().into(),
            options: command.options(),
            arguments: command.arguments().collect(),
        };
        self.invoke(ctx, invocation, scope, frame, sink);
    }

    fn invoke(
        &mut self,
        ctx: &Context,
        invocation: Invocation,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        match scope.lookup(&invocation.name).cloned() {
            Some(Value::Builtin(builtin)) => {
                self.builtin(ctx, builtin, &invocation, scope, frame, sink);
            }
            Some(Value::Macro(definition)) => {
                self.expand(ctx, definition, invocation, scope, frame, sink);
            }
            None => {
                let Invocation { name, span, text, .. } = invocation;
                self.errors.push(EvaluationError::NotInScope { name, span });
                self.placeholder(text, span, sink);
            }
        }
    }

    fn expand(
        &mut self,
        ctx: &Context,
        definition: Arc<Macro>,
        invocation: Invocation,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        let Invocation { name, span, text, mut arguments, .. } = invocation;
        self.reads.push(Read {
            name: name.clone(),
            span,
            origin: definition.origin,
            fingerprint: definition.fingerprint,
        });

        if frame.is_some_and(|frame| frame.is_expanding(&name)) {
            self.errors.push(EvaluationError::RecursiveExpansion { name, span });
            return self.placeholder(text, span, sink);
        }

        if self.depth >= MAXIMUM_DEPTH || self.expansions >= MAXIMUM_EXPANSIONS {
            if !self.limit_reported {
                self.limit_reported = true;
                self.errors.push(EvaluationError::ExpansionLimit { name, span });
            }
            return self.placeholder(text, span, sink);
        }
        self.expansions += 1;

        let parameters = usize::from(definition.parameters);
        if arguments.len() < parameters {
            let expected = definition.parameters;
            let actual = arguments.len();
            let name = name.clone();
            self.errors.push(EvaluationError::ArityMismatch { name, expected, actual, span });
        }
        let extra = arguments.split_off(parameters.min(arguments.len()));

        if let Some(body) = cst::Argument::cast(SyntaxNode::new_root(definition.body.clone())) {
            let frame = Frame {
                name,
                span,
                arguments,
                parameters: definition.parameters,
                caller: scope,
                parent: frame,
            };
            let mut local = Environment::local(frame.caller);
            self.depth += 1;
            for element in body.contents() {
                self.element(ctx, element, &mut local, Some(&frame), sink);
            }
            self.depth -= 1;
        }

        for argument in extra {
            self.argument(ctx, &argument, scope, frame, sink);
        }
    }

    fn parameter(
        &mut self,
        ctx: &Context,
        token: SyntaxToken,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        let span = self.span(ctx, frame, token.text_range());
        let index = token.text().trim_start_matches('#').parse::<u8>().unwrap_or(0);

        let Some(frame) = frame.filter(|frame| index > 0 && index <= frame.parameters) else {
            self.errors.push(EvaluationError::InvalidParameter { index, span });
            return self.placeholder(token.text().into(), span, sink);
        };

        // Missing arguments were reported at the invocation.
        let Some(argument) = frame.arguments.get(usize::from(index) - 1) else { return };

        let mut local = Environment::local(frame.caller);
        for element in argument.contents() {
            self.element(ctx, element, &mut local, frame.parent, sink);
        }
    }

    /// Evaluates an argument in place, as if it were a group.
    fn argument(
        &mut self,
        ctx: &Context,
        argument: &cst::Argument,
        scope: &Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        let mut local = Environment::local(scope);
        for element in argument.contents() {
            self.element(ctx, element, &mut local, frame, sink);
        }
    }

    /// Evaluates an argument into inline content and hoisted blocks.
    fn inline_argument(
        &mut self,
        ctx: &Context,
        argument: &cst::Argument,
        scope: &Environment<'_>,
        frame: Option<&Frame<'_>>,
    ) -> (Vec<DocNodeId>, Vec<DocNodeId>) {
        let mut sink = Sink::inline();
        self.argument(ctx, argument, scope, frame, &mut sink);
        sink.into_parts(self)
    }

    fn definition(
        &mut self,
        ctx: &Context,
        definition: cst::Definition,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
    ) {
        let Some(name) = definition.name() else { return };
        let name = name.plain_text();
        let name = name.trim_start_matches('\\');
        if name.is_empty() {
            return;
        }
        let Some(body) = definition.body() else { return };

        let span = self.span(ctx, frame, definition.syntax().text_range());
        let parameters = match definition.options() {
            Some(options) => self.arity(&options, span),
            None => 0,
        };

        let origin = Origin { identity: ctx.identity, span };
        let body = body.syntax().green().into_owned();
        scope.define(Arc::new(Macro::new(name.into(), parameters, body, Some(origin))));
    }

    fn arity(&mut self, options: &cst::OptionList, span: TextRange) -> u8 {
        let text = options.items().next().and_then(|item| item.key());
        let text = text.map(|key| SmolStr::from(key.text())).unwrap_or_default();
        match text.parse::<u8>() {
            Ok(arity) if arity <= 9 => arity,
            _ => {
                self.errors.push(EvaluationError::InvalidArity { text, span });
                0
            }
        }
    }
}

fn math_text(contents: impl Iterator<Item = SyntaxElement>) -> SmolStr {
    let text: String = contents.map(|element| element.to_string()).collect();
    text.trim().into()
}

#[cfg(test)]
mod tests;
