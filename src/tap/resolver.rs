//! Walking a resource body along a pointer path.
//!
//! Resolution consumes every segment but the last and hands back the node
//! the last segment is applied to. Each step dispatches on the kind of node
//! reached so far:
//!
//! - a body descends into an attribute's expression, or gathers every block
//!   of the named type (dynamic blocks through their `content`) into a
//!   [`BlockGroup`];
//! - an object descends into the value of the first item whose key matches;
//! - a tuple or block group descends by integer index, `-1` being the last.

use super::errors::PatchError;
use crate::document::{key_matches, kind_name, Body, ObjectItems};
use crate::pointer::PointerPath;
use hcl::Expression;

/// Node an operation's last segment applies to.
#[derive(Debug)]
pub enum Target<'a> {
    Body(&'a mut Body),
    Object(&'a mut ObjectItems),
    Tuple(&'a mut Vec<Expression>),
    BlockGroup(BlockGroup<'a>),
}

impl<'a> Target<'a> {
    fn from_expression(expr: &'a mut Expression, at: &str) -> Result<Self, PatchError> {
        match expr {
            Expression::Object(items) => Ok(Target::Object(items)),
            Expression::Array(elements) => Ok(Target::Tuple(elements)),
            other => Err(PatchError::InvalidTarget {
                path: at.to_string(),
                found: kind_name(other),
            }),
        }
    }
}

/// All blocks of one type inside `owner`, addressed by index.
#[derive(Debug)]
pub struct BlockGroup<'a> {
    pub owner: &'a mut Body,
    pub block_type: String,
    /// Positions in `owner.blocks`, in order.
    pub members: Vec<usize>,
}

impl<'a> BlockGroup<'a> {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Position in `owner.blocks` of the member at `index`.
    pub fn position(&self, index: usize) -> Option<usize> {
        self.members.get(index).copied()
    }

    /// The patchable body of the member at `index`.
    pub fn into_member(self, index: usize) -> Option<&'a mut Body> {
        let BlockGroup { owner, members, .. } = self;
        let position = *members.get(index)?;
        owner.blocks.get_mut(position)?.content_body_mut()
    }
}

pub fn resolve<'a>(root: &'a mut Body, path: &PointerPath) -> Result<Target<'a>, PatchError> {
    let Some((_, parents)) = path.split_last() else {
        return Err(PatchError::InvalidPath {
            path: path.to_string(),
            reason: "no segments".to_string(),
        });
    };
    let mut current = Target::Body(root);
    for (depth, token) in parents.iter().enumerate() {
        current = step(current, token.decoded(), &path.prefix(depth + 1))?;
    }
    Ok(current)
}

fn step<'a>(target: Target<'a>, segment: &str, at: &str) -> Result<Target<'a>, PatchError> {
    match target {
        Target::Body(body) => {
            if body.attributes.contains_key(segment) {
                return match body.attributes.get_mut(segment) {
                    Some(attr) => Target::from_expression(&mut attr.expr, at),
                    None => Err(not_found(at)),
                };
            }
            let members = body.block_indices(segment);
            if members.is_empty() {
                return Err(not_found(at));
            }
            Ok(Target::BlockGroup(BlockGroup {
                owner: body,
                block_type: segment.to_string(),
                members,
            }))
        }
        Target::Object(items) => {
            let (_, value) = items
                .iter_mut()
                .find(|(key, _)| key_matches(key, segment))
                .ok_or_else(|| not_found(at))?;
            Target::from_expression(value, at)
        }
        Target::Tuple(elements) => {
            let index = existing_index(segment, elements.len(), at)?;
            Target::from_expression(&mut elements[index], at)
        }
        Target::BlockGroup(group) => {
            let index = existing_index(segment, group.len(), at)?;
            group
                .into_member(index)
                .map(Target::Body)
                .ok_or_else(|| not_found(at))
        }
    }
}

pub(crate) fn not_found(at: &str) -> PatchError {
    PatchError::PathNotFound {
        path: at.to_string(),
    }
}

pub(crate) fn parse_index(segment: &str, at: &str) -> Result<i64, PatchError> {
    segment.parse().map_err(|_| PatchError::InvalidPath {
        path: at.to_string(),
        reason: format!("'{segment}' is not an index"),
    })
}

/// In-range position for `index` in a list of `len` elements.
pub(crate) fn index_position(index: i64, len: usize) -> Option<usize> {
    match index {
        -1 => len.checked_sub(1),
        index => usize::try_from(index).ok().filter(|index| *index < len),
    }
}

pub(crate) fn existing_index(segment: &str, len: usize, at: &str) -> Result<usize, PatchError> {
    let index = parse_index(segment, at)?;
    index_position(index, len).ok_or_else(|| not_found(at))
}
