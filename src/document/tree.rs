//! Owned view of an HCL body.
//!
//! Attribute values stay [`hcl::Expression`]s; this layer only adds what
//! patching and merging need on top of them: a name-keyed attribute map,
//! the dynamic block rules, and the position each structure was declared
//! at so the writer can order them deterministically.

use hcl::Expression;
use indexmap::IndexMap;
use std::fmt;

/// Block type that stands in for another block type, see [`Block::is_dynamic`].
pub const DYNAMIC_BLOCK: &str = "dynamic";

/// Nested block of a dynamic block that holds the generated content.
pub const DYNAMIC_CONTENT_BLOCK: &str = "content";

/// Declaration site of an attribute or block.
///
/// Ordering is by file name first, then line, which is the order the writer
/// uses when it regenerates text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePos {
    pub file: String,
    pub line: usize,
}

impl SourcePos {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Ordered attributes plus ordered nested blocks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub attributes: IndexMap<String, Attribute>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.blocks.is_empty()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Insert or overwrite an attribute, keeping the map position of an
    /// existing entry.
    pub fn set_attribute(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute.name.clone(), attribute);
    }

    /// Positions in [`Body::blocks`] of the blocks matching `block_type`.
    pub fn block_indices(&self, block_type: &str) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.matches_type(block_type))
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: Expression,
    pub pos: SourcePos,
}

impl Attribute {
    pub fn new(name: impl Into<String>, expr: Expression, pos: SourcePos) -> Self {
        Self {
            name: name.into(),
            expr,
            pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub ident: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub pos: SourcePos,
}

impl Block {
    pub fn new(ident: impl Into<String>, labels: Vec<String>, body: Body, pos: SourcePos) -> Self {
        Self {
            ident: ident.into(),
            labels,
            body,
            pos,
        }
    }

    /// A `dynamic "x" { content { ... } }` block generates `x` blocks.
    pub fn is_dynamic(&self) -> bool {
        self.ident == DYNAMIC_BLOCK
    }

    /// The block type this block counts as: the label of a dynamic block,
    /// the literal type otherwise.
    pub fn type_identity(&self) -> &str {
        if self.is_dynamic() {
            if let Some(label) = self.labels.first() {
                return label;
            }
        }
        &self.ident
    }

    /// Whether the block is addressed by the path segment `block_type`.
    ///
    /// Dynamic blocks only match through their label and only when they
    /// carry a `content` block.
    pub fn matches_type(&self, block_type: &str) -> bool {
        if self.is_dynamic() {
            self.labels.first().map(String::as_str) == Some(block_type)
                && self.content_body().is_some()
        } else {
            self.ident == block_type
        }
    }

    /// The body patches operate on: the `content` body of a dynamic block,
    /// the block's own body otherwise.
    pub fn content_body(&self) -> Option<&Body> {
        if self.is_dynamic() {
            self.body
                .blocks
                .iter()
                .find(|block| block.ident == DYNAMIC_CONTENT_BLOCK)
                .map(|block| &block.body)
        } else {
            Some(&self.body)
        }
    }

    pub fn content_body_mut(&mut self) -> Option<&mut Body> {
        if self.is_dynamic() {
            self.body
                .blocks
                .iter_mut()
                .find(|block| block.ident == DYNAMIC_CONTENT_BLOCK)
                .map(|block| &mut block.body)
        } else {
            Some(&mut self.body)
        }
    }
}
