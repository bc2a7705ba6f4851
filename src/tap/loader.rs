//! Finding and decoding tap configuration files.
//!
//! A directory is configured by `tap.hcl` and any number of `*_tap.hcl`
//! files. Their top-level blocks are concatenated (suffixed files in name
//! order, then `tap.hcl`) and decoded as one document:
//!
//! ```hcl
//! tap {
//!   continue_on_error = false
//! }
//!
//! resource "aws_instance" {
//!   name_match = ["web"]
//!
//!   set {
//!     path  = "/tags/Team"
//!     value = "platform"
//!   }
//! }
//! ```

use super::errors::{SpecLoadError, SpecParseError, Suggestion};
use super::schema::{Mode, Operation, PathSyntax, Patch, PatchSpec, Value};
use crate::document::expr::{static_bool, static_str, static_string_list};
use crate::document::{parse_body, Attribute, Block, Body, SourcePos};
use crate::pointer::PointerPath;
use crate::terraform::ResourceKind;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const SPEC_FILE: &str = "tap.hcl";
pub const SPEC_FILE_SUFFIX: &str = "_tap.hcl";

const TOP_LEVEL_BLOCKS: &[&str] = &["tap", "resource", "data"];
const TAP_ATTRIBUTES: &[&str] = &["continue_on_error", "path_syntax"];
const SELECTOR_ATTRIBUTES: &[&str] = &["continue_on_error", "type_alias", "name_match"];
const OPERATION_ATTRIBUTES: &[&str] = &["path", "value"];

pub fn is_spec_file(name: &str) -> bool {
    name == SPEC_FILE || name.ends_with(SPEC_FILE_SUFFIX)
}

/// Spec files in `dir`, in the order their blocks are combined.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, SpecLoadError> {
    let mut files = Vec::new();
    let mut main_file = None;
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| SpecLoadError::Io {
            path: dir.to_path_buf(),
            source: err.into(),
        })?;
        let name = entry.file_name().to_string_lossy();
        if !is_spec_file(&name) || !entry.path().is_file() {
            continue;
        }
        if name == SPEC_FILE {
            main_file = Some(entry.path().to_path_buf());
        } else {
            files.push(entry.path().to_path_buf());
        }
    }
    files.extend(main_file);
    Ok(files)
}

pub fn has_config(dir: &Path) -> Result<bool, SpecLoadError> {
    Ok(!discover(dir)?.is_empty())
}

/// Load every spec file in `dir`. `Ok(None)` when there are no spec files
/// or none of them has a `tap` block.
pub fn load_from_dir(dir: &Path) -> Result<Option<PatchSpec>, SpecLoadError> {
    let files = discover(dir)?;
    if files.is_empty() {
        return Ok(None);
    }

    let mut combined = Body::new();
    for path in &files {
        let contents = fs::read_to_string(path).map_err(|source| SpecLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!(file = %name, "reading tap config");
        let body = parse_body(&contents, &name)
            .map_err(|err| SpecLoadError::from(err).with_path(path))?;
        reject_attributes(&body)?;
        combined.blocks.extend(body.blocks);
    }

    Ok(build_spec(combined)?)
}

pub fn load_from_str(input: &str) -> Result<Option<PatchSpec>, SpecLoadError> {
    load_named(input, SPEC_FILE)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Option<PatchSpec>, SpecLoadError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| SpecLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| SPEC_FILE.to_string());
    load_named(&contents, &name).map_err(|error| error.with_path(path))
}

fn load_named(input: &str, file: &str) -> Result<Option<PatchSpec>, SpecLoadError> {
    let body = parse_body(input, file)?;
    reject_attributes(&body)?;
    Ok(build_spec(body)?)
}

fn reject_attributes(body: &Body) -> Result<(), SpecParseError> {
    match body.attributes.values().next() {
        Some(attr) => Err(unexpected_attribute(attr, "a tap config file", &[])),
        None => Ok(()),
    }
}

/// Decode the combined top-level blocks of all spec files.
pub fn build_spec(body: Body) -> Result<Option<PatchSpec>, SpecParseError> {
    let mut tap: Option<Block> = None;
    let mut selectors = Vec::new();
    for block in body.blocks {
        match block.ident.as_str() {
            "tap" => {
                if let Some(first) = &tap {
                    warn!(at = %block.pos, first = %first.pos, "ignoring additional tap block");
                    continue;
                }
                expect_labels(&block, 0)?;
                tap = Some(block);
            }
            "resource" | "data" => selectors.push(block),
            _ => {
                return Err(SpecParseError::UnexpectedBlock {
                    hint: Suggestion::closest(&block.ident, TOP_LEVEL_BLOCKS),
                    pos: block.pos,
                    name: block.ident,
                    context: "a tap config file".to_string(),
                })
            }
        }
    }

    let Some(tap) = tap else {
        if !selectors.is_empty() {
            warn!(
                selectors = selectors.len(),
                "tap config has no tap block, nothing will be applied"
            );
        }
        return Ok(None);
    };

    let mut continue_on_error = false;
    let mut path_syntax = PathSyntax::default();
    for attr in tap.body.attributes.values() {
        match attr.name.as_str() {
            "continue_on_error" => continue_on_error = bool_attribute(attr)?,
            "path_syntax" => path_syntax = path_syntax_attribute(attr)?,
            _ => return Err(unexpected_attribute(attr, "tap block", TAP_ATTRIBUTES)),
        }
    }
    if let Some(block) = tap.body.blocks.first() {
        return Err(SpecParseError::UnexpectedBlock {
            pos: block.pos.clone(),
            name: block.ident.clone(),
            context: "tap block".to_string(),
            hint: Suggestion::default(),
        });
    }

    let patches = selectors
        .into_iter()
        .map(|block| build_patch(block, continue_on_error))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(patches = patches.len(), "decoded tap config");
    Ok(Some(PatchSpec {
        path_syntax,
        patches,
    }))
}

fn build_patch(block: Block, default_continue: bool) -> Result<Patch, SpecParseError> {
    expect_labels(&block, 1)?;
    let kind = if block.ident == "data" {
        ResourceKind::Data
    } else {
        ResourceKind::Managed
    };
    let selector = format!("{} \"{}\"", block.ident, block.labels[0]);

    let mut continue_on_error = default_continue;
    let mut types = vec![block.labels[0].clone()];
    let mut names = Vec::new();
    for attr in block.body.attributes.values() {
        match attr.name.as_str() {
            "continue_on_error" => continue_on_error = bool_attribute(attr)?,
            "type_alias" => types.extend(string_list_attribute(attr)?),
            "name_match" => names = string_list_attribute(attr)?,
            _ => {
                return Err(unexpected_attribute(
                    attr,
                    &format!("{selector} block"),
                    SELECTOR_ATTRIBUTES,
                ))
            }
        }
    }

    let mut operations = Vec::with_capacity(block.body.blocks.len());
    for op in block.body.blocks {
        let Some(mode) = Mode::from_keyword(&op.ident) else {
            return Err(SpecParseError::UnknownMode {
                hint: Suggestion::closest(&op.ident, Mode::KEYWORDS),
                pos: op.pos,
                name: op.ident,
            });
        };
        operations.push(build_operation(op, mode)?);
    }
    if operations.is_empty() {
        return Err(SpecParseError::EmptySelector {
            pos: block.pos,
            selector,
        });
    }

    Ok(Patch {
        kind,
        types,
        names,
        continue_on_error,
        operations,
        pos: block.pos,
    })
}

fn build_operation(block: Block, mode: Mode) -> Result<Operation, SpecParseError> {
    expect_labels(&block, 0)?;
    let context = format!("{mode} block");
    let Block {
        body: Body {
            mut attributes,
            blocks,
        },
        pos,
        ..
    } = block;

    let Some(path_attr) = attributes.shift_remove("path") else {
        return Err(SpecParseError::MissingAttribute {
            pos,
            context,
            name: "path",
        });
    };
    let raw_path = static_str(&path_attr.expr).ok_or_else(|| SpecParseError::InvalidAttributeType {
            pos: path_attr.pos.clone(),
            name: "path".to_string(),
            expected: "a string",
        })?;
    let path = PointerPath::parse(raw_path).map_err(|source| SpecParseError::InvalidPath {
        pos: path_attr.pos.clone(),
        source,
    })?;

    let value_attr = attributes.shift_remove("value");
    if let Some(attr) = attributes.values().next() {
        return Err(unexpected_attribute(attr, &context, OPERATION_ATTRIBUTES));
    }
    let mut value_blocks = Vec::new();
    for block in blocks {
        if block.ident != "value" {
            return Err(SpecParseError::UnexpectedBlock {
                hint: Suggestion::closest(&block.ident, &["value"]),
                pos: block.pos,
                name: block.ident,
                context,
            });
        }
        value_blocks.push(block);
    }

    let value = if mode.requires_value() {
        Some(single_value(mode, &pos, value_attr, value_blocks)?)
    } else {
        if value_attr.is_some() || !value_blocks.is_empty() {
            warn!(at = %pos, "ignoring value of remove operation");
        }
        None
    };

    Ok(Operation {
        mode,
        path,
        value,
        pos,
    })
}

fn single_value(
    mode: Mode,
    pos: &SourcePos,
    attr: Option<Attribute>,
    mut blocks: Vec<Block>,
) -> Result<Value, SpecParseError> {
    let found = usize::from(attr.is_some()) + blocks.len();
    if found > 1 {
        return Err(SpecParseError::AmbiguousValue {
            pos: pos.clone(),
            mode,
            found,
        });
    }
    match (attr, blocks.pop()) {
        (Some(attr), None) => Ok(Value::Attribute(attr)),
        (None, Some(block)) => Ok(Value::Block(block)),
        _ => Err(SpecParseError::MissingValue {
            pos: pos.clone(),
            mode,
        }),
    }
}

fn expect_labels(block: &Block, expected: usize) -> Result<(), SpecParseError> {
    if block.labels.len() == expected {
        return Ok(());
    }
    Err(SpecParseError::WrongLabelCount {
        pos: block.pos.clone(),
        keyword: block.ident.clone(),
        expected,
        found: block.labels.len(),
    })
}

fn unexpected_attribute(attr: &Attribute, context: &str, known: &[&str]) -> SpecParseError {
    SpecParseError::UnexpectedAttribute {
        pos: attr.pos.clone(),
        name: attr.name.clone(),
        context: context.to_string(),
        hint: Suggestion::closest(&attr.name, known),
    }
}

fn bool_attribute(attr: &Attribute) -> Result<bool, SpecParseError> {
    static_bool(&attr.expr).ok_or_else(|| SpecParseError::InvalidAttributeType {
        pos: attr.pos.clone(),
        name: attr.name.clone(),
        expected: "true or false",
    })
}

fn string_list_attribute(attr: &Attribute) -> Result<Vec<String>, SpecParseError> {
    static_string_list(&attr.expr).ok_or_else(|| SpecParseError::InvalidAttributeType {
        pos: attr.pos.clone(),
        name: attr.name.clone(),
        expected: "a list of strings",
    })
}

fn path_syntax_attribute(attr: &Attribute) -> Result<PathSyntax, SpecParseError> {
    let value = static_str(&attr.expr).ok_or_else(|| SpecParseError::InvalidAttributeType {
        pos: attr.pos.clone(),
        name: attr.name.clone(),
        expected: "a string",
    })?;
    PathSyntax::from_keyword(value).ok_or_else(|| SpecParseError::UnknownPathSyntax {
        pos: attr.pos.clone(),
        hint: Suggestion::closest(value, PathSyntax::KEYWORDS),
        value: value.to_string(),
    })
}
