//! Modsmith build pipeline
//!
//! Turns mod source folders into packaged mod archives:
//! - Dependency resolution and build ordering with strong and weak references
//! - Lazy, memoized reference tables per backend variant
//! - Compilation for both variants, or reuse of precompiled binaries
//! - Binary identity verification
//! - Debug symbol reconciliation
//! - Resource packaging
//! - A shared references folder for IDE builds and a cross-process build lock
//!
//! The compiler and binary metadata tooling are external capabilities behind
//! the [`ModCompiler`] and [`MetadataInspector`] traits.

pub mod build_order;
pub mod builder;
pub mod building;
pub mod compiler;
pub mod error;
pub mod host;
pub mod inspect;
pub mod lock;
pub mod memo;
pub mod packager;
pub mod reference_folder;
pub mod references;
pub mod registry;
pub mod status;
pub mod symbols;
pub mod verify;

// Re-export main types
pub use build_order::{BuildGraph, DependencyResolver, ModNode, ResolvedBuild};
pub use builder::{BuildReport, ModBuilder, ModReport};
pub use building::BuildingMod;
pub use compiler::{
    CompileRequest, CompiledBinary, CompilerDriver, Diagnostic, ModCompiler, ProcessCompiler,
    Severity,
};
pub use error::{BuildError, BuildResult, ErrorKind, ModContext, VerifyRule};
pub use host::{Environment, HostLayout, Readiness, ToolchainEnvironment};
pub use inspect::{
    AssemblyResolver, MetadataInspector, ModuleInfo, ProcessInspector, SymbolFormat, TypeInfo,
    WrittenModule,
};
pub use lock::BuildLock;
pub use memo::LazyPath;
pub use packager::{ConverterRegistry, Packager, ResourceConverter};
pub use references::{BuildDirResolver, ReferenceResolver, ReferenceTable};
pub use registry::{DirectoryRegistry, EnabledList, InstalledMod, ModLifecycle, ModRegistry};
pub use status::{BuildStatus, ConsoleStatus, LogLevel, NullStatus};
pub use symbols::{BuildArtifact, SymbolReconciler};
pub use verify::verify_module;

// Re-export package types for convenience
pub use modsmith_package::{ModArchive, ModDescriptor, Variant};
