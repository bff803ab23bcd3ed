//! Constant pool interning and verbatim reuse of source pools

pub mod item;
pub mod pool;
pub mod source;

pub use item::{ConstantValue, ItemKey, MethodHandle};
pub use pool::ConstantPool;
pub use source::{SourceEntry, SourcePool};
