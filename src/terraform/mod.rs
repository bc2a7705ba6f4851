//! Terraform root module: loading, override merging, and writing.

pub mod load;
pub mod merge;
pub mod module;
pub mod write;

pub use load::{build_module, DirectoryLoader, DocumentProvider, LoadError, SourceFile};
pub use merge::{merge_bodies, merge_module};
pub use module::{
    Declaration, DeclarationKind, MergeBody, Module, ResourceAddress, ResourceKind,
};
pub use write::{
    render_module, write_module, FileSink, OutputSink, PublishOutcome, StreamSink, WriteError,
};
