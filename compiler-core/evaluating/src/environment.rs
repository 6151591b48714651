//! Binding environments.
//!
//! Environments form a chain from the global scope, which holds the
//! builtins, through a module scope per document to local scopes for groups
//! and macro bodies. A child only borrows its parent; lookups walk the chain
//! and definitions always go into the innermost scope.

use std::sync::Arc;

use building_types::{Fingerprint, NodeIdentity};
use indexmap::IndexMap;
use rowan::{GreenNode, TextRange};
use rustc_hash::FxBuildHasher;
use smol_str::SmolStr;

use crate::Builtin;

/// Where a binding was defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Origin {
    pub identity: NodeIdentity,
    pub span: TextRange,
}

/// A user-defined macro from `\def{name}[parameters]{body}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Macro {
    pub name: SmolStr,
    pub parameters: u8,
    /// The green node of the body argument, braces included.
    pub body: GreenNode,
    pub origin: Option<Origin>,
    pub fingerprint: Fingerprint,
}

impl Macro {
    pub fn new(name: SmolStr, parameters: u8, body: GreenNode, origin: Option<Origin>) -> Macro {
        let fingerprint = Fingerprint::of(&(&name, parameters, &body, origin));
        Macro { name, parameters, body, origin, fingerprint }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Builtin(Builtin),
    Macro(Arc<Macro>),
}

impl Value {
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Value::Builtin(builtin) => Fingerprint::of(builtin.name()),
            Value::Macro(definition) => definition.fingerprint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Module,
    Local,
}

pub type Bindings = IndexMap<SmolStr, Value, FxBuildHasher>;

#[derive(Debug)]
pub struct Environment<'p> {
    kind: ScopeKind,
    parent: Option<&'p Environment<'p>>,
    bindings: Bindings,
}

impl Environment<'static> {
    pub fn global() -> Environment<'static> {
        let mut bindings = Bindings::default();
        for builtin in Builtin::ALL {
            bindings.insert(SmolStr::new_static(builtin.name()), Value::Builtin(builtin));
        }
        Environment { kind: ScopeKind::Global, parent: None, bindings }
    }
}

impl<'p> Environment<'p> {
    pub fn module(parent: &'p Environment<'p>) -> Environment<'p> {
        let bindings = Bindings::default();
        Environment { kind: ScopeKind::Module, parent: Some(parent), bindings }
    }

    pub fn local(parent: &'p Environment<'p>) -> Environment<'p> {
        let bindings = Bindings::default();
        Environment { kind: ScopeKind::Local, parent: Some(parent), bindings }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn define(&mut self, definition: Arc<Macro>) {
        let name = definition.name.clone();
        self.bindings.insert(name, Value::Macro(definition));
    }

    pub fn extend(&mut self, definitions: impl IntoIterator<Item = Arc<Macro>>) {
        for definition in definitions {
            self.define(definition);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut current = Some(self);
        while let Some(environment) = current {
            if let Some(value) = environment.bindings.get(name) {
                return Some(value);
            }
            current = environment.parent;
        }
        None
    }

    /// Macros defined directly in this scope, in definition order.
    pub fn macros(&self) -> impl Iterator<Item = &Arc<Macro>> {
        self.bindings.values().filter_map(|value| match value {
            Value::Macro(definition) => Some(definition),
            Value::Builtin(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rowan::GreenNode;
    use syntax::SyntaxKind;

    use super::{Environment, Macro, ScopeKind, Value};
    use crate::Builtin;

    fn empty_body() -> GreenNode {
        GreenNode::new(SyntaxKind::Argument.into(), [])
    }

    #[test]
    fn test_lookup_walks_parents() {
        let global = Environment::global();
        let mut module = Environment::module(&global);
        module.define(Arc::new(Macro::new("name".into(), 0, empty_body(), None)));

        let local = Environment::local(&module);
        assert_eq!(local.kind(), ScopeKind::Local);
        assert!(matches!(local.lookup("name"), Some(Value::Macro(_))));
        assert_eq!(local.lookup("emph"), Some(&Value::Builtin(Builtin::Emph)));
        assert_eq!(local.lookup("missing"), None);
    }

    #[test]
    fn test_local_shadows() {
        let global = Environment::global();
        let mut module = Environment::module(&global);
        module.define(Arc::new(Macro::new("emph".into(), 1, empty_body(), None)));

        let Some(Value::Macro(definition)) = module.lookup("emph") else {
            panic!("expected a macro");
        };
        assert_eq!(definition.parameters, 1);
        assert_eq!(global.lookup("emph"), Some(&Value::Builtin(Builtin::Emph)));
    }

    #[test]
    fn test_macros_in_definition_order() {
        let global = Environment::global();
        let mut module = Environment::module(&global);
        module.define(Arc::new(Macro::new("b".into(), 0, empty_body(), None)));
        module.define(Arc::new(Macro::new("a".into(), 0, empty_body(), None)));

        let names: Vec<_> = module.macros().map(|definition| definition.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
