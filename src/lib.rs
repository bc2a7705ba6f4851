//! tf-tap: declarative patching of Terraform configurations
//!
//! A tap configuration (`tap.hcl` and `*_tap.hcl` files next to the root
//! module) selects resources by type and name and edits their bodies with
//! JSON-Pointer addressed operations. The patched module is rendered in
//! canonical form and handed to `terraform` (or `tofu`) from a scratch
//! directory, leaving the original files untouched.
//!
//! # Architecture
//!
//! - [`document`] wraps bodies parsed by `hcl-rs` in an owned tree keyed by
//!   attribute name, and formats it back to text.
//! - [`terraform`] loads the root module, collapses override files, and
//!   writes the result.
//! - [`tap`] loads the patch spec and applies it, one operation at a time,
//!   through a single resolver.
//! - [`workdir`] and [`delegate`] stage the output and run the downstream
//!   tool.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use tf_tap::terraform::{render_module, DirectoryLoader};
//!
//! let dir = Path::new("infra");
//! let mut module = tf_tap::workdir::load_module(dir, &DirectoryLoader)?;
//! if let Some(spec) = tf_tap::tap::load_from_dir(dir)? {
//!     for report in tf_tap::apply_patches(&mut module, &spec)? {
//!         println!("{report}");
//!     }
//! }
//! print!("{}", render_module(&module)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod delegate;
pub mod document;
pub mod pointer;
pub mod tap;
pub mod terraform;
pub mod workdir;

// Re-exports
pub use delegate::DelegateError;
pub use document::{parse_body, render_body, Body, ParseError, RenderError};
pub use pointer::{PointerError, PointerPath, PointerToken};
pub use tap::{
    apply_operation, apply_patches, load_from_dir, ApplyError, Mode, Operation, OperationReport,
    Outcome, PatchError, PatchSpec, SpecLoadError,
};
pub use terraform::{
    merge_module, render_module, DirectoryLoader, DocumentProvider, LoadError, Module,
    ResourceAddress, WriteError,
};
pub use workdir::{setup, Staged, WorkdirError};
