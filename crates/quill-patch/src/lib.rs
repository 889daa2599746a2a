//! # quill-patch — concurrent-edit machinery for the quill sync service
//!
//! Pure, in-memory components with no shared state:
//!
//! - [`pointer`] — JSON Pointer (RFC 6901) parsing, reconstruction, and
//!   array-index arithmetic
//! - [`transform`] — operational transformation of concurrent JSON
//!   Patch streams so two replicas converge
//! - [`apply`] — normalization and RFC 6902 application of wire
//!   patches, plus inverse-patch computation

pub mod apply;
pub mod pointer;
pub mod transform;

pub use apply::{PatchError, apply_patch, inverse_patch, normalize_patch};
pub use pointer::{ParsedPath, PathError, PathRelation, PathSegment};
pub use transform::{EditOp, OpKind, TransformError, transform_lists, transform_pair};
