//! The four patch operations.
//!
//! Each resolves its path, then applies the last segment to the node it
//! reached. Every check runs before the first mutation, so a failed
//! operation leaves the body untouched.

use super::errors::PatchError;
use super::resolver::{existing_index, index_position, not_found, parse_index, resolve, Target};
use super::schema::{Mode, Operation, Value, ValueKind};
use crate::document::{key_for_name, key_matches, Attribute, Block, Body, ObjectItems};
use crate::pointer::{escape_segment, PointerPath};
use hcl::Expression;
use tracing::debug;

pub fn apply_operation(root: &mut Body, operation: &Operation) -> Result<(), PatchError> {
    let path = &operation.path;
    match operation.mode {
        Mode::Add => add(root, path, required_value(operation)?),
        Mode::Replace => replace(root, path, required_value(operation)?),
        Mode::Remove => remove(root, path),
        Mode::Set => set(root, path, required_value(operation)?),
    }
}

fn required_value(operation: &Operation) -> Result<&Value, PatchError> {
    operation
        .value
        .as_ref()
        .ok_or_else(|| PatchError::MissingValue {
            mode: operation.mode,
            path: operation.path.to_string(),
        })
}

/// Insert a value that must not exist yet.
pub fn add(root: &mut Body, path: &PointerPath, value: &Value) -> Result<(), PatchError> {
    let segment = last_segment(path)?;
    let at = path.to_string();
    match resolve(root, path)? {
        Target::Body(body) => match value {
            Value::Attribute(attr) => {
                if body.attributes.contains_key(segment) {
                    return Err(PatchError::AlreadyExists { path: at });
                }
                body.set_attribute(renamed_attribute(attr, segment));
            }
            Value::Block(block) => {
                if body.blocks.iter().any(|b| b.type_identity() == segment) {
                    return Err(PatchError::AlreadyExists { path: at });
                }
                body.blocks.push(renamed_block(block, segment));
            }
        },
        Target::Object(items) => {
            let expr = expect_expression(value, &at)?;
            if items.keys().any(|key| key_matches(key, segment)) {
                return Err(PatchError::AlreadyExists { path: at });
            }
            items.insert(key_for_name(segment), expr.clone());
        }
        Target::Tuple(elements) => {
            let expr = expect_expression(value, &at)?;
            if parse_index(segment, &at)? != -1 {
                return Err(PatchError::IllegalIndex { path: at });
            }
            elements.push(expr.clone());
        }
        Target::BlockGroup(group) => {
            let block = expect_block(value, &at)?;
            let index = existing_index(segment, group.len(), &at)?;
            let member = group.into_member(index).ok_or_else(|| not_found(&at))?;
            if let Some(name) = block
                .body
                .attributes
                .keys()
                .find(|name| member.attributes.contains_key(*name))
            {
                return Err(PatchError::AlreadyExists {
                    path: format!("{at}/{}", escape_segment(name)),
                });
            }
            for attr in block.body.attributes.values() {
                member.set_attribute(attr.clone());
            }
            member.blocks.extend(block.body.blocks.iter().cloned());
        }
    }
    Ok(())
}

/// Overwrite a value that must already exist.
pub fn replace(root: &mut Body, path: &PointerPath, value: &Value) -> Result<(), PatchError> {
    let segment = last_segment(path)?;
    let at = path.to_string();
    match resolve(root, path)? {
        Target::Body(body) => match value {
            Value::Attribute(attr) => match body.attributes.get_mut(segment) {
                Some(existing) => existing.expr = attr.expr.clone(),
                None => return Err(not_found(&at)),
            },
            Value::Block(block) => {
                if !replace_block_bodies(body, segment, &block.body) {
                    return Err(not_found(&at));
                }
            }
        },
        Target::Object(items) => {
            let expr = expect_expression(value, &at)?;
            let slot = last_match(items, segment).ok_or_else(|| not_found(&at))?;
            *slot = expr.clone();
        }
        Target::Tuple(elements) => {
            let expr = expect_expression(value, &at)?;
            let index = existing_index(segment, elements.len(), &at)?;
            elements[index] = expr.clone();
        }
        Target::BlockGroup(group) => {
            let block = expect_block(value, &at)?;
            let index = existing_index(segment, group.len(), &at)?;
            let member = group.into_member(index).ok_or_else(|| not_found(&at))?;
            *member = block.body.clone();
        }
    }
    Ok(())
}

/// Delete a value.
///
/// On a body, an attribute of that name is removed if there is one;
/// otherwise every block of that type goes, and finding none is not an
/// error.
pub fn remove(root: &mut Body, path: &PointerPath) -> Result<(), PatchError> {
    let segment = last_segment(path)?;
    let at = path.to_string();
    match resolve(root, path)? {
        Target::Body(body) => {
            if body.attributes.shift_remove(segment).is_some() {
                return Ok(());
            }
            let before = body.blocks.len();
            body.blocks.retain(|block| block.type_identity() != segment);
            if body.blocks.len() == before {
                debug!(path = %at, "nothing to remove");
            }
        }
        Target::Object(items) => {
            let key = items
                .keys()
                .find(|key| key_matches(key, segment))
                .cloned()
                .ok_or_else(|| not_found(&at))?;
            items.remove(&key);
        }
        Target::Tuple(elements) => {
            let index = existing_index(segment, elements.len(), &at)?;
            elements.remove(index);
        }
        Target::BlockGroup(group) => {
            let index = existing_index(segment, group.len(), &at)?;
            let position = group.position(index).ok_or_else(|| not_found(&at))?;
            group.owner.blocks.remove(position);
        }
    }
    Ok(())
}

/// Insert or overwrite, whichever applies.
pub fn set(root: &mut Body, path: &PointerPath, value: &Value) -> Result<(), PatchError> {
    let segment = last_segment(path)?;
    let at = path.to_string();
    match resolve(root, path)? {
        Target::Body(body) => match value {
            Value::Attribute(attr) => match body.attributes.get_mut(segment) {
                Some(existing) => existing.expr = attr.expr.clone(),
                None => body.set_attribute(renamed_attribute(attr, segment)),
            },
            Value::Block(block) => {
                if !replace_block_bodies(body, segment, &block.body) {
                    body.blocks.push(renamed_block(block, segment));
                }
            }
        },
        Target::Object(items) => {
            let expr = expect_expression(value, &at)?;
            match last_match(items, segment) {
                Some(slot) => *slot = expr.clone(),
                None => {
                    items.insert(key_for_name(segment), expr.clone());
                }
            }
        }
        Target::Tuple(elements) => {
            let expr = expect_expression(value, &at)?;
            let index = parse_index(segment, &at)?;
            match index_position(index, elements.len()) {
                Some(position) => elements[position] = expr.clone(),
                None => elements.push(expr.clone()),
            }
        }
        Target::BlockGroup(group) => {
            let block = expect_block(value, &at)?;
            let index = parse_index(segment, &at)?;
            match index_position(index, group.len()) {
                Some(index) => {
                    let member = group.into_member(index).ok_or_else(|| not_found(&at))?;
                    *member = block.body.clone();
                }
                None => {
                    let after = group.members.last().map_or(group.owner.blocks.len(), |p| p + 1);
                    let new_block = renamed_block(block, &group.block_type);
                    group.owner.blocks.insert(after, new_block);
                }
            }
        }
    }
    Ok(())
}

fn last_segment(path: &PointerPath) -> Result<&str, PatchError> {
    path.last()
        .map(|token| token.decoded())
        .ok_or_else(|| PatchError::InvalidPath {
            path: path.to_string(),
            reason: "no segments".to_string(),
        })
}

/// Value of the last item whose key matches `segment`. Replace and set
/// write there; remove and path resolution take the first match.
fn last_match<'o>(items: &'o mut ObjectItems, segment: &str) -> Option<&'o mut Expression> {
    items
        .iter_mut()
        .filter(|(key, _)| key_matches(key, segment))
        .map(|(_, value)| value)
        .last()
}

/// Overwrite the patchable body of every block of type `block_type`.
/// Returns whether any block matched.
fn replace_block_bodies(body: &mut Body, block_type: &str, replacement: &Body) -> bool {
    let mut matched = false;
    for block in body.blocks.iter_mut().filter(|b| b.matches_type(block_type)) {
        if let Some(content) = block.content_body_mut() {
            *content = replacement.clone();
            matched = true;
        }
    }
    matched
}

fn renamed_attribute(attr: &Attribute, name: &str) -> Attribute {
    Attribute::new(name, attr.expr.clone(), attr.pos.clone())
}

fn renamed_block(block: &Block, block_type: &str) -> Block {
    Block::new(
        block_type,
        block.labels.clone(),
        block.body.clone(),
        block.pos.clone(),
    )
}

fn expect_expression<'v>(value: &'v Value, at: &str) -> Result<&'v Expression, PatchError> {
    match value {
        Value::Attribute(attr) => Ok(&attr.expr),
        Value::Block(_) => Err(PatchError::ValueKindMismatch {
            path: at.to_string(),
            expected: ValueKind::Attribute,
            found: ValueKind::Block,
        }),
    }
}

fn expect_block<'v>(value: &'v Value, at: &str) -> Result<&'v Block, PatchError> {
    match value {
        Value::Block(block) => Ok(block),
        Value::Attribute(_) => Err(PatchError::ValueKindMismatch {
            path: at.to_string(),
            expected: ValueKind::Block,
            found: ValueKind::Attribute,
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_body, render_body, SourcePos};
    use proptest::prelude::*;

    fn body(src: &str) -> Body {
        parse_body(src, "main.tf").unwrap()
    }

    fn path(raw: &str) -> PointerPath {
        PointerPath::parse(raw).unwrap()
    }

    fn attr_value(src: &str) -> Value {
        let parsed = parse_body(&format!("value = {src}\n"), "tap.hcl").unwrap();
        Value::Attribute(parsed.attributes["value"].clone())
    }

    fn block_value(src: &str) -> Value {
        let parsed = parse_body(&format!("value {{\n{src}\n}}\n"), "tap.hcl").unwrap();
        Value::Block(parsed.blocks[0].clone())
    }

    /// Render both sides through the same formatter so only structure counts.
    fn assert_renders(root: &Body, expected: &str) {
        assert_eq!(render_body(root).unwrap(), render_body(&body(expected)).unwrap());
    }

    #[test]
    fn add_inserts_into_objects() {
        let mut root = body("tags = {\n  Name = \"web\"\n}\n");
        add(&mut root, &path("/tags/env"), &attr_value("\"prod\"")).unwrap();
        assert_renders(&root, "tags = {\n  Name = \"web\"\n  env  = \"prod\"\n}\n");

        let err = add(&mut root, &path("/tags/env"), &attr_value("\"dev\"")).unwrap_err();
        assert_eq!(
            err,
            PatchError::AlreadyExists {
                path: "/tags/env".to_string()
            }
        );
    }

    #[test]
    fn add_quotes_keys_that_are_not_identifiers() {
        let mut root = body("labels = {}\n");
        add(
            &mut root,
            &path("/labels/kubernetes.io~1name"),
            &attr_value("\"web\""),
        )
        .unwrap();
        assert_renders(&root, "labels = {\n  \"kubernetes.io/name\" = \"web\"\n}\n");
    }

    #[test]
    fn add_to_tuple_only_appends() {
        let mut root = body("ports = [80]\n");
        add(&mut root, &path("/ports/-1"), &attr_value("443")).unwrap();
        assert_renders(&root, "ports = [80, 443]\n");

        let err = add(&mut root, &path("/ports/0"), &attr_value("22")).unwrap_err();
        assert!(matches!(err, PatchError::IllegalIndex { .. }));
        let err = add(&mut root, &path("/ports/x"), &attr_value("22")).unwrap_err();
        assert!(matches!(err, PatchError::InvalidPath { .. }));
    }

    #[test]
    fn add_blocks_and_attributes_to_bodies() {
        let mut root = body("ami = \"a\"\n");
        add(
            &mut root,
            &path("/lifecycle"),
            &block_value("create_before_destroy = true"),
        )
        .unwrap();
        add(&mut root, &path("/count"), &attr_value("2")).unwrap();
        assert!(root.attribute("count").is_some());
        assert_eq!(root.blocks[0].ident, "lifecycle");

        let err = add(&mut root, &path("/lifecycle"), &block_value("")).unwrap_err();
        assert!(matches!(err, PatchError::AlreadyExists { .. }));
        let err = add(&mut root, &path("/ami"), &attr_value("\"b\"")).unwrap_err();
        assert!(matches!(err, PatchError::AlreadyExists { .. }));
    }

    #[test]
    fn add_merges_into_block_group_member() {
        let mut root = body("ebs {\n  size = 1\n}\nebs {\n  size = 2\n}\n");
        add(&mut root, &path("/ebs/1"), &block_value("encrypted = true")).unwrap();
        assert!(root.blocks[1].body.attribute("encrypted").is_some());
        assert!(root.blocks[0].body.attribute("encrypted").is_none());

        let err = add(&mut root, &path("/ebs/0"), &block_value("size = 5")).unwrap_err();
        assert_eq!(
            err,
            PatchError::AlreadyExists {
                path: "/ebs/0/size".to_string()
            }
        );
        let err = add(&mut root, &path("/ebs/2"), &block_value("x = 1")).unwrap_err();
        assert!(matches!(err, PatchError::PathNotFound { .. }));
    }

    #[test]
    fn value_kind_must_match_target() {
        let mut root = body("tags = {}\nebs {\n  size = 1\n}\n");
        let err = add(&mut root, &path("/tags/x"), &block_value("a = 1")).unwrap_err();
        assert_eq!(
            err,
            PatchError::ValueKindMismatch {
                path: "/tags/x".to_string(),
                expected: ValueKind::Attribute,
                found: ValueKind::Block,
            }
        );
        let err = set(&mut root, &path("/ebs/0"), &attr_value("1")).unwrap_err();
        assert!(matches!(err, PatchError::ValueKindMismatch { .. }));
    }

    #[test]
    fn replace_requires_existing_targets() {
        let mut root = body("ami = \"a\"\ntags = {\n  Name = \"web\"\n}\nports = [1, 2, 3]\nebs {\n  size = 1\n}\n");
        for (raw, value) in [
            ("/missing", attr_value("1")),
            ("/tags/missing", attr_value("1")),
            ("/ports/3", attr_value("1")),
            ("/ebs/1", block_value("size = 2")),
            ("/network", block_value("id = 1")),
        ] {
            let err = replace(&mut root, &path(raw), &value).unwrap_err();
            assert!(matches!(err, PatchError::PathNotFound { .. }), "{raw}: {err}");
        }

        replace(&mut root, &path("/ami"), &attr_value("\"b\"")).unwrap();
        replace(&mut root, &path("/tags/Name"), &attr_value("\"api\"")).unwrap();
        replace(&mut root, &path("/ports/-1"), &attr_value("30")).unwrap();
        replace(&mut root, &path("/ebs/0"), &block_value("size = 9")).unwrap();
        assert_renders(
            &root,
            "ami = \"b\"\ntags = {\n  Name = \"api\"\n}\nports = [1, 2, 30]\nebs {\n  size = 9\n}\n",
        );
    }

    #[test]
    fn replace_keeps_attribute_position() {
        let mut root = body("a = 1\nb = 2\n");
        replace(&mut root, &path("/a"), &attr_value("3")).unwrap();
        assert_renders(&root, "a = 3\nb = 2\n");
        assert_eq!(root.attributes["a"].pos, SourcePos::new("main.tf", 1));
    }

    #[test]
    fn replace_rewrites_every_block_of_a_type() {
        let mut root = body(
            "ingress {\n  port = 1\n}\ndynamic \"ingress\" {\n  for_each = var.x\n  content {\n    port = 2\n  }\n}\n",
        );
        replace(&mut root, &path("/ingress"), &block_value("port = 9")).unwrap();
        assert_eq!(root.blocks[0].body.attributes.len(), 1);
        let dynamic = &root.blocks[1];
        assert!(dynamic.body.attribute("for_each").is_some());
        assert_renders(dynamic.content_body().unwrap(), "port = 9\n");
    }

    #[test]
    fn duplicate_object_keys_write_last_and_delete_first() {
        let mut root = body("tags = {\n  env   = \"a\"\n  \"env\" = \"b\"\n}\n");
        replace(&mut root, &path("/tags/env"), &attr_value("\"c\"")).unwrap();
        assert_renders(&root, "tags = {\n  env   = \"a\"\n  \"env\" = \"c\"\n}\n");

        set(&mut root, &path("/tags/env"), &attr_value("\"d\"")).unwrap();
        assert_renders(&root, "tags = {\n  env   = \"a\"\n  \"env\" = \"d\"\n}\n");

        remove(&mut root, &path("/tags/env")).unwrap();
        assert_renders(&root, "tags = {\n  \"env\" = \"d\"\n}\n");
    }

    #[test]
    fn duplicate_object_keys_resolve_through_first() {
        let mut root = body("tags = {\n  env   = { tier = 1 }\n  \"env\" = { tier = 2 }\n}\n");
        replace(&mut root, &path("/tags/env/tier"), &attr_value("9")).unwrap();
        assert_renders(
            &root,
            "tags = {\n  env   = { tier = 9 }\n  \"env\" = { tier = 2 }\n}\n",
        );
    }

    #[test]
    fn remove_from_body_tolerates_missing_blocks() {
        let mut root = body("ami = \"a\"\nebs {\n  size = 1\n}\nebs {\n  size = 2\n}\n");
        remove(&mut root, &path("/nothing")).unwrap();
        remove(&mut root, &path("/ebs")).unwrap();
        remove(&mut root, &path("/ami")).unwrap();
        assert!(root.is_empty());
    }

    #[test]
    fn remove_drops_dynamic_stand_ins() {
        let mut root = body(
            "dynamic \"ingress\" {\n  for_each = var.x\n  content {\n    port = 2\n  }\n}\negress {}\n",
        );
        remove(&mut root, &path("/ingress")).unwrap();
        assert_eq!(root.blocks.len(), 1);
        assert_eq!(root.blocks[0].ident, "egress");
    }

    #[test]
    fn remove_from_collections_requires_presence() {
        let mut root = body("tags = {\n  a = 1\n}\nports = [1, 2]\n");
        let err = remove(&mut root, &path("/tags/b")).unwrap_err();
        assert!(matches!(err, PatchError::PathNotFound { .. }));
        let err = remove(&mut root, &path("/ports/2")).unwrap_err();
        assert!(matches!(err, PatchError::PathNotFound { .. }));

        remove(&mut root, &path("/tags/a")).unwrap();
        remove(&mut root, &path("/ports/0")).unwrap();
        assert_renders(&root, "tags  = {}\nports = [2]\n");
    }

    #[test]
    fn remove_one_block_group_member() {
        let mut root = body(
            "ebs {\n  size = 1\n}\nnetwork {}\ndynamic \"ebs\" {\n  for_each = var.x\n  content {\n    size = 2\n  }\n}\n",
        );
        remove(&mut root, &path("/ebs/-1")).unwrap();
        let types: Vec<&str> = root.blocks.iter().map(|b| b.ident.as_str()).collect();
        assert_eq!(types, vec!["ebs", "network"]);

        let err = remove(&mut root, &path("/ebs/1")).unwrap_err();
        assert!(matches!(err, PatchError::PathNotFound { .. }));
    }

    #[test]
    fn set_inserts_or_overwrites() {
        let mut root = body("tags = {\n  Name = \"web\"\n}\nports = [1]\n");
        set(&mut root, &path("/tags/Name"), &attr_value("\"api\"")).unwrap();
        set(&mut root, &path("/tags/env"), &attr_value("\"prod\"")).unwrap();
        set(&mut root, &path("/ports/0"), &attr_value("2")).unwrap();
        set(&mut root, &path("/ports/5"), &attr_value("3")).unwrap();
        set(&mut root, &path("/count"), &attr_value("1")).unwrap();
        assert_renders(
            &root,
            "tags = {\n  Name = \"api\"\n  env  = \"prod\"\n}\nports = [2, 3]\ncount = 1\n",
        );
    }

    #[test]
    fn set_appends_to_empty_tuple() {
        let mut root = body("ports = []\n");
        set(&mut root, &path("/ports/-1"), &attr_value("80")).unwrap();
        assert_renders(&root, "ports = [80]\n");
    }

    #[test]
    fn set_on_block_group_inserts_after_last_member() {
        let mut root = body("ebs {\n  size = 1\n}\nnetwork {}\n");
        set(&mut root, &path("/ebs/3"), &block_value("size = 2")).unwrap();
        let types: Vec<&str> = root.blocks.iter().map(|b| b.ident.as_str()).collect();
        assert_eq!(types, vec!["ebs", "ebs", "network"]);
        assert!(root.blocks[1].body.attribute("size").is_some());

        set(&mut root, &path("/ebs/0"), &block_value("size = 7")).unwrap();
        assert_renders(&root.blocks[0].body, "size = 7\n");
    }

    #[test]
    fn set_adds_missing_block_type() {
        let mut root = body("ami = \"a\"\n");
        set(
            &mut root,
            &path("/lifecycle"),
            &block_value("prevent_destroy = true"),
        )
        .unwrap();
        assert_eq!(root.blocks.len(), 1);
        assert_eq!(root.blocks[0].ident, "lifecycle");
    }

    #[test]
    fn intermediate_scalars_are_invalid_targets() {
        let mut root = body("ami = \"a\"\n");
        let err = set(&mut root, &path("/ami/x"), &attr_value("1")).unwrap_err();
        assert!(matches!(err, PatchError::InvalidTarget { found: "string", .. }));
    }

    #[test]
    fn missing_value_is_reported() {
        let mut root = body("a = 1\n");
        let op = Operation {
            mode: Mode::Set,
            path: path("/a"),
            value: None,
            pos: SourcePos::new("tap.hcl", 1),
        };
        assert!(matches!(
            apply_operation(&mut root, &op),
            Err(PatchError::MissingValue { mode: Mode::Set, .. })
        ));
    }

    proptest! {
        #[test]
        fn add_then_remove_restores_body(name in "[a-z][a-z0-9_]{0,8}", number in 0u32..1000) {
            let original = body("tags = {\n  Name = \"web\"\n}\nami = \"a\"\n");
            prop_assume!(name != "ami" && name != "tags");
            let mut root = original.clone();
            add(&mut root, &path(&format!("/{name}")), &attr_value(&number.to_string())).unwrap();
            remove(&mut root, &path(&format!("/{name}"))).unwrap();
            prop_assert_eq!(&root, &original);

            let mut root = original.clone();
            add(&mut root, &path(&format!("/tags/{name}")), &attr_value(&number.to_string())).unwrap();
            remove(&mut root, &path(&format!("/tags/{name}"))).unwrap();
            prop_assert_eq!(&root, &original);
        }

        #[test]
        fn set_is_idempotent(name in "[a-z][a-z0-9_]{0,8}", number in 0u32..1000) {
            let original = body("tags = {\n  Name = \"web\"\n}\nports = [1, 2]\nebs {\n  size = 1\n}\n");
            let value = attr_value(&number.to_string());
            for raw in [format!("/{name}"), format!("/tags/{name}"), "/ports/1".to_string()] {
                let mut once = original.clone();
                set(&mut once, &path(&raw), &value).unwrap();
                let mut twice = once.clone();
                set(&mut twice, &path(&raw), &value).unwrap();
                prop_assert_eq!(&once, &twice);
            }
            let block = block_value(&format!("size = {number}"));
            let mut once = original.clone();
            set(&mut once, &path("/ebs/0"), &block).unwrap();
            let mut twice = once.clone();
            set(&mut twice, &path("/ebs/0"), &block).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
