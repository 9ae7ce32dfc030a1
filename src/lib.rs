//! Namespace identity and component resolution for XSD binding generation.
//!
//! http://www.w3.org/TR/2006/REC-xml-names-20060816/index.html
//!
//! Given one or more schema documents, this crate establishes a single
//! [`Namespace`] per URI, collects the named and anonymous components each
//! namespace contributes, converges forward and circular references to a
//! fully-resolved state, and produces a dependency-safe emission order for a
//! code generator. Previously compiled namespaces can be saved to and
//! restored from binary archives, discovered through a search-path index.
//!
//! The grammar that maps schema documents onto components, the concrete
//! component kinds and the code generator all live elsewhere; they interact
//! with this crate through the [`SchemaComponent`] capability contract and
//! the [`ComponentDecoder`] factory.
//!
//! One logical compilation pass runs at a time: component handles are
//! `Rc`-based and not `Send`, and a host wanting to compile several schema
//! sets concurrently gives each its own [`NamespaceRegistry`].

pub mod archive;
pub mod category;
pub mod component;
pub mod context;
pub mod error;
pub mod namespace;
pub mod ordering;
pub mod registry;
pub mod resolution;

#[cfg(test)]
pub(crate) mod test_util;

pub use archive::{
    ArchiveContext, ArchiveIndex, ComponentDecoder, ComponentRecord, ARCHIVE_FORMAT_VERSION,
};
pub use category::{CategoryMap, CategoryStore};
pub use component::{
    ComponentHandle, ComponentId, ComponentKind, ComponentSet, Resolution, SchemaComponent,
    Scoping,
};
pub use context::{NamespaceContext, QNameUsage};
pub use error::NamespaceError;
pub use namespace::{Namespace, NamespaceOptions, NamespaceRef};
pub use ordering::{ordered_components, sort_by_dependency};
pub use registry::NamespaceRegistry;
pub use resolution::{resolve_definitions, ResolveContext};
