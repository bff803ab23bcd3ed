//! classforge: a Java class-file emitter with a deduplicating constant pool.
//!
//! The crate generates class files in wire form. A [`ClassWriter`] is
//! described once (version, access flags, names), populated with fields,
//! methods and class-level attributes, and then emitted with
//! [`ClassWriter::to_bytes`] using a two-pass protocol that allocates the
//! output buffer at its exact final size.
//!
//! All constant-pool entries are interned structurally: adding an equal value
//! twice returns the same index and appends nothing. A writer can also be
//! seeded from an existing class image ([`ClassWriter::from_source`]), which
//! adopts the source constant pool verbatim so untransformed methods can be
//! copied through by byte range.

pub mod attributes;
pub mod class_writer;
pub mod constpool;
pub mod defs;
pub mod error;
pub mod field;
pub mod hierarchy;
pub mod method;
pub mod vec;

pub use class_writer::{ClassInfo, ClassWriter, FieldId, MethodId};
pub use constpool::{ConstantPool, ConstantValue, MethodHandle, SourcePool};
pub use error::{Error, Result};
pub use hierarchy::{ClassHierarchy, HierarchyRegistry};
pub use vec::ByteVector;
