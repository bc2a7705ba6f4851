//! Declarative patches for resource bodies.
//!
//! A [`PatchSpec`] is loaded from `tap.hcl` / `*_tap.hcl` files, then
//! [`apply_patches`] runs it against a merged [`crate::terraform::Module`].

pub mod applicator;
pub mod errors;
pub mod loader;
pub mod operations;
pub mod resolver;
pub mod schema;

pub use applicator::{apply_patches, ApplyError, OperationReport, Outcome};
pub use errors::{PatchError, SpecLoadError, SpecParseError, Suggestion};
pub use loader::{discover, has_config, load_from_dir, load_from_path, load_from_str};
pub use operations::{add, apply_operation, remove, replace, set};
pub use resolver::{resolve, BlockGroup, Target};
pub use schema::{Mode, Operation, PathSyntax, Patch, PatchSpec, Value, ValueKind};
