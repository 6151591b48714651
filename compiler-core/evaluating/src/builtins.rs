//! Dispatch tables for builtin commands and environments.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Section,
    Subsection,
    Subsubsection,
    Emph,
    Strong,
    Label,
    Ref,
    Include,
    Plot,
    Image,
    Caption,
    Item,
    PageBreak,
}

impl Builtin {
    pub const ALL: [Builtin; 13] = [
        Builtin::Section,
        Builtin::Subsection,
        Builtin::Subsubsection,
        Builtin::Emph,
        Builtin::Strong,
        Builtin::Label,
        Builtin::Ref,
        Builtin::Include,
        Builtin::Plot,
        Builtin::Image,
        Builtin::Caption,
        Builtin::Item,
        Builtin::PageBreak,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Section => "section",
            Builtin::Subsection => "subsection",
            Builtin::Subsubsection => "subsubsection",
            Builtin::Emph => "emph",
            Builtin::Strong => "strong",
            Builtin::Label => "label",
            Builtin::Ref => "ref",
            Builtin::Include => "include",
            Builtin::Plot => "plot",
            Builtin::Image => "image",
            Builtin::Caption => "caption",
            Builtin::Item => "item",
            Builtin::PageBreak => "pagebreak",
        }
    }

    /// The number of arguments the builtin consumes.
    pub fn arity(self) -> u8 {
        match self {
            Builtin::Item | Builtin::PageBreak => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentKind {
    Figure,
    Table,
    Itemize,
    Enumerate,
    Plot,
}

impl EnvironmentKind {
    pub fn from_name(name: &str) -> Option<EnvironmentKind> {
        match name {
            "figure" => Some(EnvironmentKind::Figure),
            "table" => Some(EnvironmentKind::Table),
            "itemize" => Some(EnvironmentKind::Itemize),
            "enumerate" => Some(EnvironmentKind::Enumerate),
            "plot" => Some(EnvironmentKind::Plot),
            _ => None,
        }
    }
}
