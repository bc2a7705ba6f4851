//! HCL documents as the patch engine sees them.
//!
//! Parsing and formatting are done by `hcl-rs` (with `hcl-edit` supplying
//! source spans); this module wraps the parsed structures in a tree keyed
//! by attribute name that remembers where each structure was declared.

pub mod errors;
pub mod expr;
pub mod read;
pub mod render;
pub mod tree;

pub use errors::{ParseError, RenderError};
pub use expr::{key_for_name, key_matches, kind_name, ObjectItems};
pub use read::parse_body;
pub use render::{render_body, render_expression, to_hcl_block, to_hcl_body};
pub use tree::{Attribute, Block, Body, SourcePos, DYNAMIC_BLOCK, DYNAMIC_CONTENT_BLOCK};
