//! Parsing HCL text into a [`Body`].
//!
//! The tree comes from [`hcl::parse`]. Declaration lines come from the same
//! text parsed with [`hcl_edit`], whose structures keep their byte spans;
//! both parsers see identical input, so their structures pair up in order.

use super::errors::ParseError;
use super::tree::{Attribute, Block, Body, SourcePos};
use hcl::{BlockLabel, Structure};
use hcl_edit::Span;
use hcl_edit::structure as edit;

const BOM: char = '\u{feff}';

/// Parse `src`, recording `file` as the declaration site of every
/// attribute and block.
pub fn parse_body(src: &str, file: &str) -> Result<Body, ParseError> {
    let src = src.strip_prefix(BOM).unwrap_or(src);
    let spans = hcl_edit::parser::parse_body(src).map_err(|err| ParseError::syntax(file, err))?;
    let tree = hcl::parse(src).map_err(|err| ParseError::syntax(file, err))?;
    let lines = LineIndex::new(src);
    convert_body(tree, &spans, &Origin { file, lines: &lines })
}

struct Origin<'a> {
    file: &'a str,
    lines: &'a LineIndex,
}

impl Origin<'_> {
    fn pos(&self, structure: Option<&edit::Structure>) -> SourcePos {
        let offset = structure
            .and_then(|structure| match structure {
                edit::Structure::Attribute(attr) => attr.span(),
                edit::Structure::Block(block) => block.span(),
            })
            .map_or(0, |span| span.start);
        SourcePos::new(self.file, self.lines.line(offset))
    }
}

fn convert_body(tree: hcl::Body, spans: &edit::Body, origin: &Origin<'_>) -> Result<Body, ParseError> {
    let mut body = Body::new();
    let mut located = spans.iter();
    for structure in tree.into_iter() {
        let twin = located.next();
        let pos = origin.pos(twin);
        match structure {
            Structure::Attribute(attr) => {
                let name = attr.key.as_str().to_string();
                if let Some(first) = body.attributes.get(&name) {
                    return Err(ParseError::DuplicateAttribute {
                        file: origin.file.to_string(),
                        line: pos.line,
                        first_line: first.pos.line,
                        name,
                    });
                }
                body.set_attribute(Attribute::new(name, attr.expr, pos));
            }
            Structure::Block(block) => {
                let nested = match twin {
                    Some(edit::Structure::Block(twin)) => {
                        convert_body(block.body, &twin.body, origin)?
                    }
                    _ => convert_body(block.body, &edit::Body::default(), origin)?,
                };
                let labels = block.labels.into_iter().map(label_text).collect();
                body.blocks.push(Block::new(
                    block.identifier.as_str(),
                    labels,
                    nested,
                    pos,
                ));
            }
        }
    }
    Ok(body)
}

fn label_text(label: BlockLabel) -> String {
    match label {
        BlockLabel::Identifier(ident) => ident.as_str().to_string(),
        BlockLabel::String(text) => text,
    }
}

/// Byte offsets of line starts, for turning spans into line numbers.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(src: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self { starts }
    }

    /// 1-based line containing `offset`.
    fn line(&self, offset: usize) -> usize {
        self.starts.partition_point(|start| *start <= offset).max(1)
    }
}
