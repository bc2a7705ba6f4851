//! Terraform module: the top-level declarations of one configuration
//! directory.
//!
//! A module is generic over its body representation. The loader produces
//! `Module<MergeBody>` where overridden declarations still hold their
//! override chain; [`crate::terraform::merge`] collapses that into a
//! plain `Module<Body>`, which is all the patch engine and writer see.

use crate::document::{Body, SourcePos};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    #[serde(rename = "resource")]
    Managed,
    #[serde(rename = "data")]
    Data,
}

impl ResourceKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ResourceKind::Managed => "resource",
            ResourceKind::Data => "data",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    /// The `terraform` block.
    Settings,
    Provider,
    Variable,
    Locals,
    Resource(ResourceKind),
    Module,
    Output,
    /// Any other top-level block (`moved`, `import`, `check`, ...), kept as is.
    Other(String),
}

impl DeclarationKind {
    pub fn from_block_type(ident: &str) -> Self {
        match ident {
            "terraform" => DeclarationKind::Settings,
            "provider" => DeclarationKind::Provider,
            "variable" => DeclarationKind::Variable,
            "locals" => DeclarationKind::Locals,
            "resource" => DeclarationKind::Resource(ResourceKind::Managed),
            "data" => DeclarationKind::Resource(ResourceKind::Data),
            "module" => DeclarationKind::Module,
            "output" => DeclarationKind::Output,
            other => DeclarationKind::Other(other.to_string()),
        }
    }

    pub fn keyword(&self) -> &str {
        match self {
            DeclarationKind::Settings => "terraform",
            DeclarationKind::Provider => "provider",
            DeclarationKind::Variable => "variable",
            DeclarationKind::Locals => "locals",
            DeclarationKind::Resource(kind) => kind.keyword(),
            DeclarationKind::Module => "module",
            DeclarationKind::Output => "output",
            DeclarationKind::Other(ident) => ident,
        }
    }

    /// Required number of block labels, if fixed.
    pub fn label_count(&self) -> Option<usize> {
        match self {
            DeclarationKind::Settings | DeclarationKind::Locals => Some(0),
            DeclarationKind::Provider
            | DeclarationKind::Variable
            | DeclarationKind::Module
            | DeclarationKind::Output => Some(1),
            DeclarationKind::Resource(_) => Some(2),
            DeclarationKind::Other(_) => None,
        }
    }
}

/// `aws_instance.web` or `data.aws_ami.ubuntu`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceAddress {
    pub kind: ResourceKind,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
}

impl ResourceAddress {
    pub fn new(kind: ResourceKind, type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceKind::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration<B = Body> {
    pub kind: DeclarationKind,
    pub labels: Vec<String>,
    pub body: B,
    pub pos: SourcePos,
}

impl<B> Declaration<B> {
    pub fn resource_address(&self) -> Option<ResourceAddress> {
        match (&self.kind, self.labels.as_slice()) {
            (DeclarationKind::Resource(kind), [type_name, name]) => {
                Some(ResourceAddress::new(*kind, type_name, name))
            }
            _ => None,
        }
    }

    pub fn map_body<C>(self, f: impl FnOnce(B) -> C) -> Declaration<C> {
        Declaration {
            kind: self.kind,
            labels: self.labels,
            body: f(self.body),
            pos: self.pos,
        }
    }
}

/// A declaration body that may still carry override files on top of it.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeBody {
    Merged(Body),
    Unmerged {
        base: Box<MergeBody>,
        overrides: Box<MergeBody>,
    },
}

impl Default for MergeBody {
    fn default() -> Self {
        MergeBody::Merged(Body::default())
    }
}

impl MergeBody {
    /// Layer another override on top; later overrides win.
    pub fn push_override(&mut self, overrides: Body) {
        let base = std::mem::take(self);
        *self = MergeBody::Unmerged {
            base: Box::new(base),
            overrides: Box::new(MergeBody::Merged(overrides)),
        };
    }

    /// The body as declared in a primary file, ignoring overrides.
    pub fn base_body(&self) -> &Body {
        match self {
            MergeBody::Merged(body) => body,
            MergeBody::Unmerged { base, .. } => base.base_body(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module<B = Body> {
    pub declarations: Vec<Declaration<B>>,
}

impl<B> Default for Module<B> {
    fn default() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }
}

impl<B> Module<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn resource_addresses(&self) -> impl Iterator<Item = ResourceAddress> + '_ {
        self.declarations
            .iter()
            .filter_map(Declaration::resource_address)
    }
}

impl Module<Body> {
    pub fn resource(&self, address: &ResourceAddress) -> Option<&Body> {
        self.declarations
            .iter()
            .find(|decl| decl.resource_address().as_ref() == Some(address))
            .map(|decl| &decl.body)
    }

    pub fn resource_mut(&mut self, address: &ResourceAddress) -> Option<&mut Body> {
        self.declarations
            .iter_mut()
            .find(|decl| decl.resource_address().as_ref() == Some(address))
            .map(|decl| &mut decl.body)
    }
}
