//! Reading a configuration directory into a [`Module`].
//!
//! Root-level `*.tf` files are parsed in file name order. Files named
//! `override.tf` or `*_override.tf` are applied afterwards: each of their
//! declarations is layered on top of the matching primary declaration.

use super::module::{Declaration, DeclarationKind, MergeBody, Module, ResourceKind};
use crate::document::expr::static_str;
use crate::document::{parse_body, Body, ParseError, SourcePos};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{pos}: unexpected attribute '{name}' at the top level of a configuration file")]
    UnexpectedAttribute { pos: SourcePos, name: String },

    #[error("{pos}: {keyword} block expects {expected} label(s), found {found}")]
    WrongLabelCount {
        pos: SourcePos,
        keyword: String,
        expected: usize,
        found: usize,
    },

    #[error("{pos}: duplicate {what} {name}, first declared at {first}")]
    Duplicate {
        pos: SourcePos,
        what: &'static str,
        name: String,
        first: SourcePos,
    },

    #[error("{pos}: override for {what} {name} has no base declaration")]
    MissingBase {
        pos: SourcePos,
        what: &'static str,
        name: String,
    },

    #[error("{pos}: {keyword} blocks cannot appear in override files")]
    UnsupportedOverride { pos: SourcePos, keyword: String },
}

/// Source of the configuration a run operates on.
pub trait DocumentProvider {
    /// `Ok(None)` when the directory holds no configuration files.
    fn load_module(&self, dir: &Path) -> Result<Option<Module<MergeBody>>, LoadError>;
}

/// Reads `*.tf` files from the root of a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryLoader;

impl DocumentProvider for DirectoryLoader {
    fn load_module(&self, dir: &Path) -> Result<Option<Module<MergeBody>>, LoadError> {
        let files = read_config_files(dir)?;
        build_module(&files)
    }
}

/// One configuration file, named relative to its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub contents: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

pub fn is_config_file(name: &str) -> bool {
    name.ends_with(".tf")
}

pub fn is_override_file(name: &str) -> bool {
    name.strip_suffix(".tf")
        .is_some_and(|stem| stem == "override" || stem.ends_with("_override"))
}

pub fn read_config_files(dir: &Path) -> Result<Vec<SourceFile>, LoadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| LoadError::Io {
            path: dir.to_path_buf(),
            source: err.into(),
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type().is_file() || !is_config_file(&name) {
            continue;
        }
        let contents = fs::read_to_string(entry.path()).map_err(|source| LoadError::Io {
            path: entry.path().to_path_buf(),
            source,
        })?;
        files.push(SourceFile { name, contents });
    }
    Ok(files)
}

/// Identity used for duplicate detection and override matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DeclarationKey {
    Resource(ResourceKind, String, String),
    Provider(String, Option<String>),
    Variable(String),
    Module(String),
    Output(String),
}

impl DeclarationKey {
    fn of(kind: &DeclarationKind, labels: &[String], body: &Body) -> Option<Self> {
        let first = labels.first().cloned().unwrap_or_default();
        match kind {
            DeclarationKind::Resource(resource) => Some(DeclarationKey::Resource(
                *resource,
                first,
                labels.get(1).cloned().unwrap_or_default(),
            )),
            DeclarationKind::Provider => {
                let alias = body
                    .attribute("alias")
                    .and_then(|attr| static_str(&attr.expr))
                    .map(str::to_string);
                Some(DeclarationKey::Provider(first, alias))
            }
            DeclarationKind::Variable => Some(DeclarationKey::Variable(first)),
            DeclarationKind::Module => Some(DeclarationKey::Module(first)),
            DeclarationKind::Output => Some(DeclarationKey::Output(first)),
            DeclarationKind::Settings | DeclarationKind::Locals | DeclarationKind::Other(_) => {
                None
            }
        }
    }

    fn describe(&self) -> (&'static str, String) {
        match self {
            DeclarationKey::Resource(ResourceKind::Managed, type_name, name) => {
                ("resource", format!("{type_name}.{name}"))
            }
            DeclarationKey::Resource(ResourceKind::Data, type_name, name) => {
                ("data source", format!("data.{type_name}.{name}"))
            }
            DeclarationKey::Provider(name, Some(alias)) => ("provider", format!("{name}.{alias}")),
            DeclarationKey::Provider(name, None) => ("provider", name.clone()),
            DeclarationKey::Variable(name) => ("variable", name.clone()),
            DeclarationKey::Module(name) => ("module", name.clone()),
            DeclarationKey::Output(name) => ("output", name.clone()),
        }
    }
}

/// Assemble a module from already-read files. `Ok(None)` when there are no
/// files at all.
pub fn build_module(files: &[SourceFile]) -> Result<Option<Module<MergeBody>>, LoadError> {
    if files.is_empty() {
        return Ok(None);
    }
    let (overrides, primaries): (Vec<&SourceFile>, Vec<&SourceFile>) =
        files.iter().partition(|file| is_override_file(&file.name));

    let mut module = Module::new();
    let mut index: HashMap<DeclarationKey, usize> = HashMap::new();
    let mut locals: HashMap<String, (usize, SourcePos)> = HashMap::new();

    for file in primaries {
        for decl in declarations(parse_body(&file.contents, &file.name)?)? {
            let position = module.declarations.len();
            if let Some(key) = DeclarationKey::of(&decl.kind, &decl.labels, &decl.body) {
                if let Some(&existing) = index.get(&key) {
                    let (what, name) = key.describe();
                    return Err(LoadError::Duplicate {
                        pos: decl.pos,
                        what,
                        name,
                        first: module.declarations[existing].pos.clone(),
                    });
                }
                index.insert(key, position);
            }
            if decl.kind == DeclarationKind::Locals {
                for (name, attr) in &decl.body.attributes {
                    if let Some((_, first)) =
                        locals.insert(name.clone(), (position, attr.pos.clone()))
                    {
                        return Err(LoadError::Duplicate {
                            pos: attr.pos.clone(),
                            what: "local value",
                            name: name.clone(),
                            first,
                        });
                    }
                }
            }
            module.declarations.push(decl.map_body(MergeBody::Merged));
        }
    }

    for file in overrides {
        debug!(file = %file.name, "applying override file");
        for decl in declarations(parse_body(&file.contents, &file.name)?)? {
            match &decl.kind {
                DeclarationKind::Locals => {
                    for (name, attr) in decl.body.attributes {
                        let Some((position, _)) = locals.get(&name) else {
                            return Err(LoadError::MissingBase {
                                pos: attr.pos,
                                what: "local value",
                                name,
                            });
                        };
                        if let MergeBody::Merged(body) = &mut module.declarations[*position].body {
                            body.set_attribute(attr);
                        }
                    }
                }
                DeclarationKind::Settings => {
                    match module
                        .declarations
                        .iter_mut()
                        .find(|existing| existing.kind == DeclarationKind::Settings)
                    {
                        Some(existing) => existing.body.push_override(decl.body),
                        None => module.declarations.push(decl.map_body(MergeBody::Merged)),
                    }
                }
                DeclarationKind::Other(keyword) => {
                    return Err(LoadError::UnsupportedOverride {
                        pos: decl.pos.clone(),
                        keyword: keyword.clone(),
                    });
                }
                kind => {
                    let Some(key) = DeclarationKey::of(kind, &decl.labels, &decl.body) else {
                        continue;
                    };
                    let Some(&position) = index.get(&key) else {
                        let (what, name) = key.describe();
                        return Err(LoadError::MissingBase {
                            pos: decl.pos,
                            what,
                            name,
                        });
                    };
                    module.declarations[position]
                        .body
                        .push_override(decl.body);
                }
            }
        }
    }

    Ok(Some(module))
}

fn declarations(body: Body) -> Result<Vec<Declaration>, LoadError> {
    if let Some((name, attr)) = body.attributes.first() {
        return Err(LoadError::UnexpectedAttribute {
            pos: attr.pos.clone(),
            name: name.clone(),
        });
    }
    body.blocks
        .into_iter()
        .map(|block| {
            let kind = DeclarationKind::from_block_type(&block.ident);
            if let Some(expected) = kind.label_count() {
                if block.labels.len() != expected {
                    return Err(LoadError::WrongLabelCount {
                        pos: block.pos,
                        keyword: block.ident,
                        expected,
                        found: block.labels.len(),
                    });
                }
            }
            Ok(Declaration {
                kind,
                labels: block.labels,
                body: block.body,
                pos: block.pos,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::module::ResourceAddress;

    fn module(files: &[(&str, &str)]) -> Result<Option<Module<MergeBody>>, LoadError> {
        let files: Vec<SourceFile> = files
            .iter()
            .map(|(name, contents)| SourceFile::new(*name, *contents))
            .collect();
        build_module(&files)
    }

    #[test]
    fn override_file_names() {
        assert!(is_override_file("override.tf"));
        assert!(is_override_file("dev_override.tf"));
        assert!(!is_override_file("overrides.tf"));
        assert!(!is_override_file("main.tf"));
        assert!(!is_override_file("override.tf.json"));
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let module = module(&[("main.tf", "\u{feff}resource \"x\" \"y\" {\n  a = 1\n}\n")])
            .unwrap()
            .unwrap();
        assert_eq!(module.declarations.len(), 1);
        assert_eq!(module.declarations[0].pos.line, 1);
    }

    #[test]
    fn empty_directory_has_no_module() {
        assert!(module(&[]).unwrap().is_none());
    }

    #[test]
    fn categorizes_declarations() {
        let module = module(&[(
            "main.tf",
            r#"
terraform {
  required_version = ">= 1.0"
}
provider "aws" {}
variable "size" {}
locals {
  name = "x"
}
resource "aws_instance" "web" {}
data "aws_ami" "ubuntu" {}
module "vpc" {}
output "id" {}
moved {
  from = a.b
  to   = a.c
}
"#,
        )])
        .unwrap()
        .unwrap();
        let kinds: Vec<&str> = module
            .declarations
            .iter()
            .map(|decl| decl.kind.keyword())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "terraform", "provider", "variable", "locals", "resource", "data", "module",
                "output", "moved"
            ]
        );
        let addresses: Vec<ResourceAddress> = module.resource_addresses().collect();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[1].to_string(), "data.aws_ami.ubuntu");
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let err = module(&[
            ("a.tf", "resource \"x\" \"y\" {}\n"),
            ("b.tf", "resource \"x\" \"y\" {}\n"),
        ])
        .unwrap_err();
        assert!(matches!(err, LoadError::Duplicate { what: "resource", .. }), "{err}");
    }

    #[test]
    fn providers_with_distinct_aliases_are_not_duplicates() {
        let loaded = module(&[(
            "main.tf",
            "provider \"aws\" {}\nprovider \"aws\" {\n  alias = \"west\"\n}\n",
        )]);
        assert!(loaded.is_ok());
    }

    #[test]
    fn top_level_attributes_are_rejected() {
        let err = module(&[("main.tf", "a = 1\n")]).unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedAttribute { .. }));
    }

    #[test]
    fn wrong_label_count_is_rejected() {
        let err = module(&[("main.tf", "resource \"only_type\" {}\n")]).unwrap_err();
        assert!(matches!(
            err,
            LoadError::WrongLabelCount { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn overrides_wrap_matching_declarations() {
        let module = module(&[
            ("main.tf", "resource \"x\" \"y\" {\n  a = 1\n}\n"),
            ("override.tf", "resource \"x\" \"y\" {\n  a = 2\n}\n"),
            ("z_override.tf", "resource \"x\" \"y\" {\n  b = 3\n}\n"),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(module.declarations.len(), 1);
        let MergeBody::Unmerged { base, overrides } = &module.declarations[0].body else {
            panic!("expected override chain");
        };
        assert!(matches!(**base, MergeBody::Unmerged { .. }));
        assert!(overrides.base_body().attribute("b").is_some());
    }

    #[test]
    fn override_without_base_is_rejected() {
        let err = module(&[
            ("main.tf", "resource \"x\" \"y\" {}\n"),
            ("override.tf", "resource \"x\" \"z\" {}\n"),
        ])
        .unwrap_err();
        assert!(matches!(err, LoadError::MissingBase { what: "resource", .. }), "{err}");
    }

    #[test]
    fn local_overrides_replace_by_name() {
        let module = module(&[
            ("main.tf", "locals {\n  a = 1\n  b = 2\n}\n"),
            ("override.tf", "locals {\n  b = 3\n}\n"),
        ])
        .unwrap()
        .unwrap();
        let body = module.declarations[0].body.base_body();
        assert_eq!(body.attributes.len(), 2);
        assert_eq!(
            body.attribute("b").map(|attr| attr.pos.file.as_str()),
            Some("override.tf")
        );
    }
}
