//! Constant pool items: structural keys, hashing and bucket links

use crate::defs::constant_tags::*;

/// A method handle constant: reference kind plus the referenced member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandle {
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl MethodHandle {
    pub fn new(
        kind: u8,
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Self { kind, owner: owner.into(), name: name.into(), desc: desc.into() }
    }
}

/// A loadable constant value, as accepted by the catch-all
/// [`ConstantPool::add_constant`](super::ConstantPool::add_constant) entry point.
#[derive(Debug, Clone)]
pub enum ConstantValue {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(String),
    MethodType(String),
    MethodHandle(MethodHandle),
    Dynamic { name: String, desc: String, bsm_index: u16 },
}

impl ConstantValue {
    /// Short name of this constant kind, used in error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ConstantValue::Integer(_) => "integer",
            ConstantValue::Long(_) => "long",
            ConstantValue::Float(_) => "float",
            ConstantValue::Double(_) => "double",
            ConstantValue::String(_) => "string",
            ConstantValue::Class(_) => "class",
            ConstantValue::MethodType(_) => "method type",
            ConstantValue::MethodHandle(_) => "method handle",
            ConstantValue::Dynamic { .. } => "dynamic",
        }
    }
}

/// Owned structural key of an interned item.
///
/// `Str` covers every entry that is a tagged reference to a single UTF8 value
/// (Utf8 itself, Class, String, MethodType); `Member` covers the three
/// class-member reference kinds. Floating-point keys store raw bits so that
/// equality and hashing are exact. The `*Type` variants belong to the
/// auxiliary type table and are never written to the persisted pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKey {
    Str { tag: u8, value: String },
    Member { tag: u8, owner: String, name: String, desc: String },
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    NameAndType { name: String, desc: String },
    MethodHandle { kind: u8, owner: String, name: String, desc: String },
    Dynamic { tag: u8, name: String, desc: String, bsm_index: u16 },
    NormalType { name: String },
    UninitializedType { name: String, offset: u32 },
    MergedType { type1: u16, type2: u16 },
}

/// Borrowed counterpart of [`ItemKey`], used as the lookup key on the intern
/// hot path. Hashing and comparison against stored items run on borrowed
/// data; an owned key is only built on a genuine miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKeyRef<'a> {
    Str { tag: u8, value: &'a str },
    Member { tag: u8, owner: &'a str, name: &'a str, desc: &'a str },
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    NameAndType { name: &'a str, desc: &'a str },
    MethodHandle { kind: u8, owner: &'a str, name: &'a str, desc: &'a str },
    Dynamic { tag: u8, name: &'a str, desc: &'a str, bsm_index: u16 },
    NormalType { name: &'a str },
    UninitializedType { name: &'a str, offset: u32 },
    MergedType { type1: u16, type2: u16 },
}

impl ItemKey {
    pub fn as_key_ref(&self) -> ItemKeyRef<'_> {
        match self {
            ItemKey::Str { tag, value } => ItemKeyRef::Str { tag: *tag, value },
            ItemKey::Member { tag, owner, name, desc } => {
                ItemKeyRef::Member { tag: *tag, owner, name, desc }
            }
            ItemKey::Integer(v) => ItemKeyRef::Integer(*v),
            ItemKey::Float(v) => ItemKeyRef::Float(*v),
            ItemKey::Long(v) => ItemKeyRef::Long(*v),
            ItemKey::Double(v) => ItemKeyRef::Double(*v),
            ItemKey::NameAndType { name, desc } => ItemKeyRef::NameAndType { name, desc },
            ItemKey::MethodHandle { kind, owner, name, desc } => {
                ItemKeyRef::MethodHandle { kind: *kind, owner, name, desc }
            }
            ItemKey::Dynamic { tag, name, desc, bsm_index } => {
                ItemKeyRef::Dynamic { tag: *tag, name, desc, bsm_index: *bsm_index }
            }
            ItemKey::NormalType { name } => ItemKeyRef::NormalType { name },
            ItemKey::UninitializedType { name, offset } => {
                ItemKeyRef::UninitializedType { name, offset: *offset }
            }
            ItemKey::MergedType { type1, type2 } => {
                ItemKeyRef::MergedType { type1: *type1, type2: *type2 }
            }
        }
    }

    /// True for the 8-byte kinds that occupy two consecutive pool indices.
    pub fn is_wide(&self) -> bool {
        matches!(self, ItemKey::Long(_) | ItemKey::Double(_))
    }

    pub fn hash_code(&self) -> u32 {
        self.as_key_ref().hash_code()
    }
}

impl<'a> ItemKeyRef<'a> {
    /// The entry tag, pool or pseudo.
    pub fn tag(&self) -> u8 {
        match self {
            ItemKeyRef::Str { tag, .. } => *tag,
            ItemKeyRef::Member { tag, .. } => *tag,
            ItemKeyRef::Integer(_) => CONSTANT_INTEGER,
            ItemKeyRef::Float(_) => CONSTANT_FLOAT,
            ItemKeyRef::Long(_) => CONSTANT_LONG,
            ItemKeyRef::Double(_) => CONSTANT_DOUBLE,
            ItemKeyRef::NameAndType { .. } => CONSTANT_NAMEANDTYPE,
            ItemKeyRef::MethodHandle { .. } => CONSTANT_METHODHANDLE,
            ItemKeyRef::Dynamic { tag, .. } => *tag,
            ItemKeyRef::NormalType { .. } => TYPE_NORMAL,
            ItemKeyRef::UninitializedType { .. } => TYPE_UNINITIALIZED,
            ItemKeyRef::MergedType { .. } => TYPE_MERGED,
        }
    }

    /// Structural hash, stable across bucket-array growth.
    pub fn hash_code(&self) -> u32 {
        let tag = self.tag() as i32;
        let h = match self {
            ItemKeyRef::Str { value, .. } => tag.wrapping_add(str_hash(value)),
            ItemKeyRef::NormalType { name } => tag.wrapping_add(str_hash(name)),
            ItemKeyRef::Member { owner, name, desc, .. } => tag.wrapping_add(
                str_hash(owner)
                    .wrapping_mul(str_hash(name))
                    .wrapping_mul(str_hash(desc)),
            ),
            ItemKeyRef::Integer(v) => tag.wrapping_add(*v),
            ItemKeyRef::Float(bits) => tag.wrapping_add(*bits as i32),
            ItemKeyRef::Long(v) => tag.wrapping_add(*v as i32),
            ItemKeyRef::Double(bits) => tag.wrapping_add(*bits as i32),
            ItemKeyRef::NameAndType { name, desc } => {
                tag.wrapping_add(str_hash(name).wrapping_mul(str_hash(desc)))
            }
            ItemKeyRef::MethodHandle { kind, owner, name, desc } => tag
                .wrapping_add(*kind as i32)
                .wrapping_mul(str_hash(owner))
                .wrapping_mul(str_hash(name))
                .wrapping_mul(str_hash(desc)),
            ItemKeyRef::Dynamic { name, desc, bsm_index, .. } => tag.wrapping_add(
                str_hash(name)
                    .wrapping_mul(str_hash(desc))
                    .wrapping_mul(*bsm_index as i32 + 1),
            ),
            ItemKeyRef::UninitializedType { name, offset } => {
                tag.wrapping_add(str_hash(name)).wrapping_add(*offset as i32)
            }
            ItemKeyRef::MergedType { type1, type2 } => {
                tag.wrapping_add(*type1 as i32).wrapping_add((*type2 as i32) << 16)
            }
        };
        (h & 0x7FFF_FFFF) as u32
    }

    /// Structural equality against a stored key.
    pub fn matches(&self, stored: &ItemKey) -> bool {
        *self == stored.as_key_ref()
    }

    /// Builds the owned key stored in the arena on an intern miss.
    pub fn to_key(&self) -> ItemKey {
        match self {
            ItemKeyRef::Str { tag, value } => {
                ItemKey::Str { tag: *tag, value: (*value).to_owned() }
            }
            ItemKeyRef::Member { tag, owner, name, desc } => ItemKey::Member {
                tag: *tag,
                owner: (*owner).to_owned(),
                name: (*name).to_owned(),
                desc: (*desc).to_owned(),
            },
            ItemKeyRef::Integer(v) => ItemKey::Integer(*v),
            ItemKeyRef::Float(v) => ItemKey::Float(*v),
            ItemKeyRef::Long(v) => ItemKey::Long(*v),
            ItemKeyRef::Double(v) => ItemKey::Double(*v),
            ItemKeyRef::NameAndType { name, desc } => ItemKey::NameAndType {
                name: (*name).to_owned(),
                desc: (*desc).to_owned(),
            },
            ItemKeyRef::MethodHandle { kind, owner, name, desc } => ItemKey::MethodHandle {
                kind: *kind,
                owner: (*owner).to_owned(),
                name: (*name).to_owned(),
                desc: (*desc).to_owned(),
            },
            ItemKeyRef::Dynamic { tag, name, desc, bsm_index } => ItemKey::Dynamic {
                tag: *tag,
                name: (*name).to_owned(),
                desc: (*desc).to_owned(),
                bsm_index: *bsm_index,
            },
            ItemKeyRef::NormalType { name } => {
                ItemKey::NormalType { name: (*name).to_owned() }
            }
            ItemKeyRef::UninitializedType { name, offset } => ItemKey::UninitializedType {
                name: (*name).to_owned(),
                offset: *offset,
            },
            ItemKeyRef::MergedType { type1, type2 } => {
                ItemKey::MergedType { type1: *type1, type2: *type2 }
            }
        }
    }
}

fn str_hash(s: &str) -> i32 {
    let mut h: i32 = 0;
    for c in s.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as i32);
    }
    h
}

/// One interned item in the pool's arena.
///
/// `index` is the stable pool or type-table index, except for `MergedType`
/// cache items where it holds the resolved common-ancestor type index. `next`
/// links bucket chains through arena slots rather than references, so the
/// arena stays the sole owner of every item.
#[derive(Debug)]
pub struct Item {
    pub index: u16,
    pub hash: u32,
    pub key: ItemKey,
    pub next: Option<u32>,
}
