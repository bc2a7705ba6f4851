use crate::document::{Attribute, Block, SourcePos};
use crate::pointer::PointerPath;
use crate::terraform::{ResourceAddress, ResourceKind};
use serde::Serialize;
use std::fmt;

/// Addressing scheme used by operation paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSyntax {
    #[default]
    JsonPointer,
}

impl PathSyntax {
    pub const KEYWORDS: &'static [&'static str] = &["json_pointer"];

    pub fn keyword(self) -> &'static str {
        match self {
            PathSyntax::JsonPointer => "json_pointer",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "json_pointer" => Some(PathSyntax::JsonPointer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Add,
    Replace,
    Remove,
    Set,
}

impl Mode {
    pub const KEYWORDS: &'static [&'static str] = &["add", "replace", "remove", "set"];

    pub fn keyword(self) -> &'static str {
        match self {
            Mode::Add => "add",
            Mode::Replace => "replace",
            Mode::Remove => "remove",
            Mode::Set => "set",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "add" => Some(Mode::Add),
            "replace" => Some(Mode::Replace),
            "remove" => Some(Mode::Remove),
            "set" => Some(Mode::Set),
            _ => None,
        }
    }

    pub fn requires_value(self) -> bool {
        self != Mode::Remove
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// What an operation writes: a single expression, or a block body.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The `value = ...` attribute; its name is replaced by the path's last segment.
    Attribute(Attribute),
    /// The `value { ... }` block; its type is replaced by the path's last segment.
    Block(Block),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Attribute,
    Block,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Attribute => f.write_str("attribute"),
            ValueKind::Block => f.write_str("block"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub mode: Mode,
    pub path: PointerPath,
    /// Always present unless `mode` is [`Mode::Remove`].
    pub value: Option<Value>,
    pub pos: SourcePos,
}

/// One `resource "type" { ... }` or `data "type" { ... }` selector block.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub kind: ResourceKind,
    /// Declared type first, then its aliases.
    pub types: Vec<String>,
    /// Resource names to match; empty matches every name.
    pub names: Vec<String>,
    pub continue_on_error: bool,
    pub operations: Vec<Operation>,
    pub pos: SourcePos,
}

impl Patch {
    pub fn primary_type(&self) -> &str {
        self.types.first().map(String::as_str).unwrap_or_default()
    }

    pub fn selects(&self, address: &ResourceAddress) -> bool {
        address.kind == self.kind
            && self.types.iter().any(|ty| *ty == address.type_name)
            && (self.names.is_empty() || self.names.iter().any(|name| *name == address.name))
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.kind, self.primary_type())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatchSpec {
    pub path_syntax: PathSyntax,
    pub patches: Vec<Patch>,
}

impl PatchSpec {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.patches.iter().map(|patch| patch.operations.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(kind: ResourceKind, types: &[&str], names: &[&str]) -> Patch {
        Patch {
            kind,
            types: types.iter().map(|s| s.to_string()).collect(),
            names: names.iter().map(|s| s.to_string()).collect(),
            continue_on_error: false,
            operations: Vec::new(),
            pos: SourcePos::new("tap.hcl", 1),
        }
    }

    #[test]
    fn selects_by_kind_type_and_name() {
        let any_name = patch(ResourceKind::Managed, &["aws_instance", "aws_spot_instance"], &[]);
        assert!(any_name.selects(&ResourceAddress::new(ResourceKind::Managed, "aws_instance", "a")));
        assert!(any_name.selects(&ResourceAddress::new(
            ResourceKind::Managed,
            "aws_spot_instance",
            "b"
        )));
        assert!(!any_name.selects(&ResourceAddress::new(ResourceKind::Data, "aws_instance", "a")));

        let named = patch(ResourceKind::Managed, &["aws_instance"], &["web"]);
        assert!(named.selects(&ResourceAddress::new(ResourceKind::Managed, "aws_instance", "web")));
        assert!(!named.selects(&ResourceAddress::new(ResourceKind::Managed, "aws_instance", "db")));
    }

    #[test]
    fn modes_round_trip_keywords() {
        for keyword in Mode::KEYWORDS {
            let mode = Mode::from_keyword(keyword).unwrap();
            assert_eq!(mode.keyword(), *keyword);
        }
        assert!(!Mode::Remove.requires_value());
        assert_eq!(PathSyntax::from_keyword("json_pointer"), Some(PathSyntax::JsonPointer));
        assert_eq!(PathSyntax::from_keyword("jsonpath"), None);
    }

    #[test]
    fn patch_display_names_selector() {
        let p = patch(ResourceKind::Data, &["aws_ami"], &[]);
        assert_eq!(p.to_string(), "data \"aws_ami\"");
    }
}
