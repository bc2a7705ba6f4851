//! Override merging.
//!
//! An override body wins attribute by attribute. Nested blocks are replaced
//! by type: when the override has any block of a given type, every base
//! block of that type is dropped and the override's blocks are appended.
//! A dynamic block counts as the type named by its label.

use super::module::{MergeBody, Module};
use crate::document::Body;
use std::collections::HashSet;
use tracing::trace;

pub fn merge_bodies(mut base: Body, overrides: Body) -> Body {
    for (name, attribute) in overrides.attributes {
        trace!(attribute = %name, "override replaces attribute");
        base.attributes.insert(name, attribute);
    }

    let replaced: HashSet<String> = overrides
        .blocks
        .iter()
        .map(|block| block.type_identity().to_string())
        .collect();
    base.blocks
        .retain(|block| !replaced.contains(block.type_identity()));
    base.blocks.extend(overrides.blocks);
    base
}

/// Collapse an override chain into a single body.
pub fn merge_body(body: MergeBody) -> Body {
    match body {
        MergeBody::Merged(body) => body,
        MergeBody::Unmerged { base, overrides } => {
            merge_bodies(merge_body(*base), merge_body(*overrides))
        }
    }
}

pub fn merge_module(module: Module<MergeBody>) -> Module<Body> {
    Module {
        declarations: module
            .declarations
            .into_iter()
            .map(|decl| decl.map_body(merge_body))
            .collect(),
    }
}
