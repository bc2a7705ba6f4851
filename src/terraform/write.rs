//! Regenerating configuration text from a [`Module`], and publishing it.
//!
//! Declarations are written by category: settings, providers, variables,
//! locals, resources, data sources, modules, outputs, then anything else.
//! Within a category they follow their source order (file name, then
//! line). All `terraform` blocks fold into one, as do all `locals` blocks.

use super::module::{Declaration, DeclarationKind, Module, ResourceKind};
use crate::document::{to_hcl_block, Body, RenderError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write output: {0}")]
    Stream(#[source] io::Error),

    #[error("failed to render configuration: {0}")]
    Render(#[from] RenderError),
}

/// Canonical text of `module`: one block per declaration, separated by a
/// blank line.
pub fn render_module(module: &Module) -> Result<String, WriteError> {
    let mut out = String::new();
    for block in module_blocks(module)? {
        let body = hcl::Body::builder().add_block(block).build();
        let text = hcl::format::to_string(&body).map_err(RenderError::from)?;
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(text.trim_end());
        out.push('\n');
    }
    Ok(out)
}

/// Top-level blocks in writing order.
pub fn module_blocks(module: &Module) -> Result<Vec<hcl::Block>, RenderError> {
    let mut blocks = Vec::new();

    let settings = sorted(module, |kind| *kind == DeclarationKind::Settings);
    if !settings.is_empty() {
        blocks.push(to_hcl_block("terraform", &[], &fold_bodies(&settings))?);
    }
    for kind in [DeclarationKind::Provider, DeclarationKind::Variable] {
        push_declarations(&mut blocks, &sorted(module, |k| *k == kind))?;
    }
    let locals = sorted(module, |kind| *kind == DeclarationKind::Locals);
    if !locals.is_empty() {
        blocks.push(to_hcl_block("locals", &[], &fold_bodies(&locals))?);
    }
    for kind in [
        DeclarationKind::Resource(ResourceKind::Managed),
        DeclarationKind::Resource(ResourceKind::Data),
        DeclarationKind::Module,
        DeclarationKind::Output,
    ] {
        push_declarations(&mut blocks, &sorted(module, |k| *k == kind))?;
    }
    push_declarations(
        &mut blocks,
        &sorted(module, |kind| matches!(kind, DeclarationKind::Other(_))),
    )?;
    Ok(blocks)
}

fn sorted<'a>(module: &'a Module, select: impl Fn(&DeclarationKind) -> bool) -> Vec<&'a Declaration> {
    let mut decls: Vec<&Declaration> = module
        .declarations
        .iter()
        .filter(|decl| select(&decl.kind))
        .collect();
    decls.sort_by(|a, b| a.pos.cmp(&b.pos));
    decls
}

fn push_declarations(blocks: &mut Vec<hcl::Block>, decls: &[&Declaration]) -> Result<(), RenderError> {
    for decl in decls {
        blocks.push(to_hcl_block(decl.kind.keyword(), &decl.labels, &decl.body)?);
    }
    Ok(())
}

fn fold_bodies(decls: &[&Declaration]) -> Body {
    let mut folded = Body::new();
    for decl in decls {
        for attribute in decl.body.attributes.values() {
            folded.set_attribute(attribute.clone());
        }
        folded.blocks.extend(decl.body.blocks.iter().cloned());
    }
    folded
}

/// Result of handing rendered text to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PublishOutcome reports whether anything was written"]
pub enum PublishOutcome {
    Written { path: PathBuf, bytes: usize },
    /// The destination already held identical content.
    Unchanged { path: PathBuf },
    Streamed { bytes: usize },
}

/// Destination for a rendered configuration.
pub trait OutputSink {
    fn publish(&mut self, contents: &str) -> Result<PublishOutcome, WriteError>;
}

pub fn write_module(module: &Module, sink: &mut dyn OutputSink) -> Result<PublishOutcome, WriteError> {
    sink.publish(&render_module(module)?)
}

/// Writes a file atomically, skipping the write when the content is unchanged.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for FileSink {
    fn publish(&mut self, contents: &str) -> Result<PublishOutcome, WriteError> {
        if let Ok(existing) = fs::read(&self.path) {
            if xxh3_64(&existing) == xxh3_64(contents.as_bytes()) {
                debug!(path = %self.path.display(), "output unchanged");
                return Ok(PublishOutcome::Unchanged {
                    path: self.path.clone(),
                });
            }
        }
        atomic_write(&self.path, contents.as_bytes()).map_err(|source| WriteError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(PublishOutcome::Written {
            path: self.path.clone(),
            bytes: contents.len(),
        })
    }
}

/// Writes to any stream, typically stdout.
#[derive(Debug)]
pub struct StreamSink<W> {
    writer: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for StreamSink<W> {
    fn publish(&mut self, contents: &str) -> Result<PublishOutcome, WriteError> {
        self.writer
            .write_all(contents.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(WriteError::Stream)?;
        Ok(PublishOutcome::Streamed {
            bytes: contents.len(),
        })
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
