//! Scanning the constant pool of an existing class image for verbatim reuse

use std::collections::HashMap;

use super::item::ItemKey;
use crate::defs::constant_tags::*;
use crate::error::{Error, Result};
use crate::vec::decode_utf8;

/// One parsed entry of a source pool: its original index and structural key.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub index: u16,
    pub key: ItemKey,
}

/// The constant pool of an existing class image, parsed just far enough to be
/// adopted wholesale: raw byte bounds plus a structural entry table.
///
/// This is the upstream reader feeding
/// [`ConstantPool::copy`](super::ConstantPool::copy); tolerating arbitrary
/// malformed input is out of scope, so any truncation or unknown tag fails
/// the scan.
#[derive(Debug)]
pub struct SourcePool {
    /// Combined minor/major version of the source image.
    pub version: u32,
    /// Byte offset where the raw pool entries start.
    pub pool_start: usize,
    /// Byte offset just past the last pool entry.
    pub pool_end: usize,
    /// Pool count from the header, i.e. the next index to assign.
    pub next_index: u16,
    pub entries: Vec<SourceEntry>,
}

enum RawEntry {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    StringLike { tag: u8, utf8_index: u16 },
    NameAndType { name_index: u16, desc_index: u16 },
    Member { tag: u8, class_index: u16, nat_index: u16 },
    MethodHandle { kind: u8, member_index: u16 },
    Dynamic { tag: u8, bsm_index: u16, nat_index: u16 },
}

impl SourcePool {
    /// Scans the pool block of `class_bytes` (a complete class image starting
    /// with the magic number).
    pub fn parse(class_bytes: &[u8]) -> Result<Self> {
        let version = read_u32(class_bytes, 4)?;
        let count = read_u16(class_bytes, 8)?;
        let pool_start = 10;

        let mut raw: HashMap<u16, RawEntry> = HashMap::new();
        let mut offset = pool_start;
        let mut index: u16 = 1;

        while index < count {
            let tag = *class_bytes.get(offset).ok_or(Error::Truncated { offset })?;
            let entry_start = offset;
            offset += 1;
            let mut width = 1;

            let entry = match tag {
                CONSTANT_UTF8 => {
                    let len = read_u16(class_bytes, offset)? as usize;
                    let value = decode_utf8(class_bytes, offset + 2, len)
                        .ok_or(Error::Truncated { offset })?;
                    offset += 2 + len;
                    RawEntry::Utf8(value)
                }
                CONSTANT_INTEGER => {
                    let v = read_u32(class_bytes, offset)?;
                    offset += 4;
                    RawEntry::Integer(v as i32)
                }
                CONSTANT_FLOAT => {
                    let v = read_u32(class_bytes, offset)?;
                    offset += 4;
                    RawEntry::Float(v)
                }
                CONSTANT_LONG => {
                    let v = read_u64(class_bytes, offset)?;
                    offset += 8;
                    width = 2;
                    RawEntry::Long(v as i64)
                }
                CONSTANT_DOUBLE => {
                    let v = read_u64(class_bytes, offset)?;
                    offset += 8;
                    width = 2;
                    RawEntry::Double(v)
                }
                CONSTANT_CLASS | CONSTANT_STRING | CONSTANT_METHODTYPE => {
                    let utf8_index = read_u16(class_bytes, offset)?;
                    offset += 2;
                    RawEntry::StringLike { tag, utf8_index }
                }
                CONSTANT_NAMEANDTYPE => {
                    let name_index = read_u16(class_bytes, offset)?;
                    let desc_index = read_u16(class_bytes, offset + 2)?;
                    offset += 4;
                    RawEntry::NameAndType { name_index, desc_index }
                }
                CONSTANT_FIELDREF | CONSTANT_METHODREF | CONSTANT_INTERFACEMETHODREF => {
                    let class_index = read_u16(class_bytes, offset)?;
                    let nat_index = read_u16(class_bytes, offset + 2)?;
                    offset += 4;
                    RawEntry::Member { tag, class_index, nat_index }
                }
                CONSTANT_METHODHANDLE => {
                    let kind = *class_bytes.get(offset).ok_or(Error::Truncated { offset })?;
                    let member_index = read_u16(class_bytes, offset + 1)?;
                    offset += 3;
                    RawEntry::MethodHandle { kind, member_index }
                }
                CONSTANT_DYNAMIC | CONSTANT_INVOKEDYNAMIC => {
                    let bsm_index = read_u16(class_bytes, offset)?;
                    let nat_index = read_u16(class_bytes, offset + 2)?;
                    offset += 4;
                    RawEntry::Dynamic { tag, bsm_index, nat_index }
                }
                _ => return Err(Error::Truncated { offset: entry_start }),
            };

            raw.insert(index, entry);
            index += width;
        }

        let pool_end = offset;
        let resolver = Resolver { raw: &raw, pool_start };
        let mut entries = Vec::with_capacity(raw.len());
        for (&entry_index, entry) in &raw {
            entries.push(SourceEntry { index: entry_index, key: resolver.key_of(entry)? });
        }
        // Deterministic adoption order.
        entries.sort_by_key(|e| e.index);

        Ok(Self { version, pool_start, pool_end, next_index: count, entries })
    }
}

struct Resolver<'a> {
    raw: &'a HashMap<u16, RawEntry>,
    pool_start: usize,
}

impl Resolver<'_> {
    fn key_of(&self, entry: &RawEntry) -> Result<ItemKey> {
        Ok(match entry {
            RawEntry::Utf8(value) => {
                ItemKey::Str { tag: CONSTANT_UTF8, value: value.clone() }
            }
            RawEntry::Integer(v) => ItemKey::Integer(*v),
            RawEntry::Float(v) => ItemKey::Float(*v),
            RawEntry::Long(v) => ItemKey::Long(*v),
            RawEntry::Double(v) => ItemKey::Double(*v),
            RawEntry::StringLike { tag, utf8_index } => {
                ItemKey::Str { tag: *tag, value: self.utf8(*utf8_index)?.to_owned() }
            }
            RawEntry::NameAndType { name_index, desc_index } => ItemKey::NameAndType {
                name: self.utf8(*name_index)?.to_owned(),
                desc: self.utf8(*desc_index)?.to_owned(),
            },
            RawEntry::Member { tag, class_index, nat_index } => {
                let (name, desc) = self.name_and_type(*nat_index)?;
                ItemKey::Member {
                    tag: *tag,
                    owner: self.class_name(*class_index)?.to_owned(),
                    name: name.to_owned(),
                    desc: desc.to_owned(),
                }
            }
            RawEntry::MethodHandle { kind, member_index } => {
                let (owner, nat_index) = match self.raw.get(member_index) {
                    Some(RawEntry::Member { class_index, nat_index, .. }) => {
                        (self.class_name(*class_index)?, *nat_index)
                    }
                    _ => return Err(self.malformed()),
                };
                let (name, desc) = self.name_and_type(nat_index)?;
                ItemKey::MethodHandle {
                    kind: *kind,
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                    desc: desc.to_owned(),
                }
            }
            RawEntry::Dynamic { tag, bsm_index, nat_index } => {
                let (name, desc) = self.name_and_type(*nat_index)?;
                ItemKey::Dynamic {
                    tag: *tag,
                    name: name.to_owned(),
                    desc: desc.to_owned(),
                    bsm_index: *bsm_index,
                }
            }
        })
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.raw.get(&index) {
            Some(RawEntry::Utf8(value)) => Ok(value),
            _ => Err(self.malformed()),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str> {
        match self.raw.get(&index) {
            Some(RawEntry::StringLike { tag: CONSTANT_CLASS, utf8_index }) => {
                self.utf8(*utf8_index)
            }
            _ => Err(self.malformed()),
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.raw.get(&index) {
            Some(RawEntry::NameAndType { name_index, desc_index }) => {
                Ok((self.utf8(*name_index)?, self.utf8(*desc_index)?))
            }
            _ => Err(self.malformed()),
        }
    }

    fn malformed(&self) -> Error {
        Error::Truncated { offset: self.pool_start }
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    match bytes.get(offset..offset + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(Error::Truncated { offset }),
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    match bytes.get(offset..offset + 4) {
        Some(b) => Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(Error::Truncated { offset }),
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64> {
    match bytes.get(offset..offset + 8) {
        Some(b) => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(b);
            Ok(u64::from_be_bytes(buf))
        }
        None => Err(Error::Truncated { offset }),
    }
}
