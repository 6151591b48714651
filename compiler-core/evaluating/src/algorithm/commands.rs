use std::sync::Arc;

use geometry::{Abs, LengthError, parse_length};
use rowan::TextRange;
use smol_str::SmolStr;
use syntax::cst;

use super::{Context, Frame, Invocation, Sink, State};
use crate::{
    Builtin, Environment, EvaluationError, Image, Include, Label, NodeKind, PlotSpec,
};

/// Font size that `em` lengths in options are relative to.
const OPTION_EM: Abs = Abs::pt(10);

impl State {
    pub(super) fn builtin(
        &mut self,
        ctx: &Context,
        builtin: Builtin,
        invocation: &Invocation,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        let arity = usize::from(builtin.arity());
        let Invocation { name, span, text, arguments, .. } = invocation;
        let span = *span;

        let (consumed, extra) = arguments.split_at(arity.min(arguments.len()));
        let argument = match consumed.first() {
            Some(argument) => Some(argument),
            None if arity == 0 => None,
            None => {
                let expected = builtin.arity();
                let actual = arguments.len();
                let name = name.clone();
                self.errors.push(EvaluationError::ArityMismatch { name, expected, actual, span });
                return self.placeholder(text.clone(), span, sink);
            }
        };

        match (builtin, argument) {
            (Builtin::Section | Builtin::Subsection | Builtin::Subsubsection, Some(argument)) => {
                let level = match builtin {
                    Builtin::Section => 1,
                    Builtin::Subsection => 2,
                    _ => 3,
                };
                let (content, hoisted) = self.inline_argument(ctx, argument, scope, frame);
                let id = self.alloc(NodeKind::Heading { level, content }, span);
                sink.push(self, id);
                sink.extend(self, hoisted);
            }
            (Builtin::Emph | Builtin::Strong, Some(argument)) => {
                let (content, hoisted) = self.inline_argument(ctx, argument, scope, frame);
                let kind = if builtin == Builtin::Emph {
                    NodeKind::Emphasis(content)
                } else {
                    NodeKind::Strong(content)
                };
                let id = self.alloc(kind, span);
                sink.push(self, id);
                sink.extend(self, hoisted);
            }
            (Builtin::Label, Some(argument)) => {
                let key = SmolStr::from(argument.plain_text());
                let node = self.alloc(NodeKind::Label(key.clone()), span);
                self.labels.push(Label { key, node, figure: None });
                sink.push(self, node);
            }
            (Builtin::Ref, Some(argument)) => {
                let key = SmolStr::from(argument.plain_text());
                let node = self.alloc(NodeKind::Reference(key), span);
                self.references.push(node);
                sink.push(self, node);
            }
            (Builtin::Include, Some(argument)) => {
                self.include(ctx, argument, invocation, span, scope, sink);
            }
            (Builtin::Plot, Some(argument)) => {
                let options = options(invocation.options.as_ref());
                let kind = option(&options, "kind").unwrap_or_else(|| SmolStr::new_static("line"));
                let width = self.length(&options, "width", span);
                let height = self.length(&options, "height", span);
                let data = SmolStr::from(argument.plain_text());
                let spec = PlotSpec { kind, data, options, width, height };
                let node = self.alloc(NodeKind::Plot(Arc::new(spec)), span);
                self.plots.push(node);
                sink.push(self, node);
            }
            (Builtin::Image, Some(argument)) => {
                let options = options(invocation.options.as_ref());
                let width = self.length(&options, "width", span);
                let height = self.length(&options, "height", span);
                let path = SmolStr::from(argument.plain_text());
                let node = self.alloc(NodeKind::Image(Image { path, width, height }), span);
                sink.push(self, node);
            }
            (Builtin::Caption, Some(argument)) => {
                let (content, hoisted) = self.inline_argument(ctx, argument, scope, frame);
                if let Some(slot) = self.captions.last_mut() {
                    *slot = Some(content);
                } else {
                    self.errors.push(EvaluationError::Misplaced {
                        name: SmolStr::new_static("\\caption"),
                        context: "is only allowed inside a figure or table",
                        span,
                    });
                    sink.extend(self, content);
                }
                sink.extend(self, hoisted);
            }
            (Builtin::Item, _) => {
                self.errors.push(EvaluationError::Misplaced {
                    name: SmolStr::new_static("\\item"),
                    context: "is only allowed inside a list",
                    span,
                });
            }
            (Builtin::PageBreak, _) => {
                let node = self.alloc(NodeKind::PageBreak, span);
                sink.push(self, node);
            }
            (_, None) => unreachable!("invariant violated: missing argument for {builtin:?}"),
        }

        for argument in extra {
            self.argument(ctx, argument, scope, frame, sink);
        }
    }

    fn include(
        &mut self,
        ctx: &Context,
        argument: &cst::Argument,
        invocation: &Invocation,
        span: TextRange,
        scope: &mut Environment<'_>,
        sink: &mut Sink,
    ) {
        let name = SmolStr::from(argument.plain_text());
        match ctx.includes.get(&name) {
            Some(Include::Resolved(document)) => {
                let index = self.includes.len();
                self.includes.push(Arc::clone(document));
                scope.extend(document.exports.iter().cloned());
                let node = self.alloc(NodeKind::Include { name, index }, span);
                sink.push(self, node);
            }
            Some(Include::Cycle) => {
                self.errors.push(EvaluationError::IncludeCycle { name, span });
                self.placeholder(invocation.text.clone(), span, sink);
            }
            Some(Include::Missing) | None => {
                self.errors.push(EvaluationError::IncludeNotFound { name, span });
                self.placeholder(invocation.text.clone(), span, sink);
            }
        }
    }

    fn length(&mut self, options: &[(SmolStr, SmolStr)], key: &str, span: TextRange) -> Option<Abs> {
        let value = option(options, key)?;
        let parsed = parse_length(&value, OPTION_EM).and_then(|length| {
            if length > Abs::ZERO {
                Ok(length)
            } else {
                Err(LengthError::NotPositive(value.to_string()))
            }
        });
        match parsed {
            Ok(length) => Some(length),
            Err(error) => {
                let option = SmolStr::new(key);
                self.errors.push(EvaluationError::InvalidLength { option, error, span });
                None
            }
        }
    }
}

fn options(list: Option<&cst::OptionList>) -> Vec<(SmolStr, SmolStr)> {
    let items = list.into_iter().flat_map(|list| list.items());
    items
        .filter_map(|item| {
            let key = SmolStr::from(item.key()?.text());
            let value = item.value().map(|value| value.plain_text()).unwrap_or_default();
            Some((key, SmolStr::from(value)))
        })
        .collect()
}

/// The last value given for a key.
fn option(options: &[(SmolStr, SmolStr)], key: &str) -> Option<SmolStr> {
    options.iter().rev().find(|(name, _)| name == key).map(|(_, value)| value.clone())
}
