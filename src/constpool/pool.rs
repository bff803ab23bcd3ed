//! The deduplicating constant pool and auxiliary type table

use log::debug;

use super::item::{ConstantValue, Item, ItemKey, ItemKeyRef, MethodHandle};
use super::source::SourcePool;
use crate::defs::constant_tags::*;
use crate::defs::handle_kinds::REF_INVOKE_INTERFACE;
use crate::error::{Error, Result};
use crate::hierarchy::{common_super_class, ClassHierarchy};
use crate::vec::ByteVector;

const INITIAL_BUCKETS: usize = 256;

/// The constant pool of the class file being generated or modified.
///
/// Every `add_*` operation is intern-or-reuse: an equal existing entry is
/// found by structural hash and returned with no side effect; a genuinely new
/// value is encoded once into the append-only byte buffer, assigned the next
/// index and threaded into the hash index. Composite entries intern their
/// sub-components first.
///
/// The same arena and hash index also hold the auxiliary type table used by
/// stack-map frame computation: internal type names, uninitialized-value
/// markers and the memoized common-ancestor cache. Type items have their own
/// index space and are never written to the persisted pool bytes.
#[derive(Debug)]
pub struct ConstantPool {
    /// Encoded pool bytes, first-assigned-index order, append-only.
    pool: ByteVector,
    /// All items by value; bucket chains link arena slots.
    arena: Vec<Item>,
    /// Bucket heads of the open hash index.
    buckets: Vec<Option<u32>>,
    /// Grow the bucket array when pool + type item count passes this.
    threshold: usize,
    /// Index of the next item to be added to the pool.
    index: u32,
    /// Arena slot of each type-table item, position = type index - 1.
    type_table: Vec<u32>,
    type_count: u16,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            pool: ByteVector::new(),
            arena: Vec::new(),
            buckets: vec![None; INITIAL_BUCKETS],
            threshold: INITIAL_BUCKETS * 3 / 4,
            index: 1,
            type_table: Vec::new(),
            type_count: 0,
        }
    }

    /// Adds an UTF8 string entry. Returns the existing index if the pool
    /// already contains the value.
    pub fn add_utf8(&mut self, value: &str) -> u16 {
        let key = ItemKeyRef::Str { tag: CONSTANT_UTF8, value };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        self.pool.put_u8(CONSTANT_UTF8).put_utf8(value);
        let index = self.claim_index(1);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds a class reference for the given internal name.
    pub fn add_class(&mut self, internal_name: &str) -> u16 {
        self.add_string_item(CONSTANT_CLASS, internal_name)
    }

    /// Adds a string constant.
    pub fn add_string(&mut self, value: &str) -> u16 {
        self.add_string_item(CONSTANT_STRING, value)
    }

    /// Adds a method type entry for the given method descriptor.
    pub fn add_method_type(&mut self, desc: &str) -> u16 {
        self.add_string_item(CONSTANT_METHODTYPE, desc)
    }

    /// Entries tagged with a single UTF8 reference share one code path:
    /// Utf8 holders String, Class and MethodType.
    fn add_string_item(&mut self, tag: u8, value: &str) -> u16 {
        let key = ItemKeyRef::Str { tag, value };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        let utf8_index = self.add_utf8(value);
        self.pool.put_u12(tag, utf8_index);
        let index = self.claim_index(1);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds a name-and-type entry.
    pub fn add_name_and_type(&mut self, name: &str, desc: &str) -> u16 {
        let key = ItemKeyRef::NameAndType { name, desc };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        let name_index = self.add_utf8(name);
        let desc_index = self.add_utf8(desc);
        self.pool.put_u122(CONSTANT_NAMEANDTYPE, name_index, desc_index);
        let index = self.claim_index(1);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds a field reference.
    pub fn add_field_ref(&mut self, owner: &str, name: &str, desc: &str) -> u16 {
        self.add_member(CONSTANT_FIELDREF, owner, name, desc)
    }

    /// Adds a method reference; `is_interface` selects the interface-method
    /// entry kind.
    pub fn add_method_ref(&mut self, owner: &str, name: &str, desc: &str, is_interface: bool) -> u16 {
        let tag = if is_interface { CONSTANT_INTERFACEMETHODREF } else { CONSTANT_METHODREF };
        self.add_member(tag, owner, name, desc)
    }

    fn add_member(&mut self, tag: u8, owner: &str, name: &str, desc: &str) -> u16 {
        let key = ItemKeyRef::Member { tag, owner, name, desc };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        let owner_index = self.add_class(owner);
        let name_and_type_index = self.add_name_and_type(name, desc);
        self.pool.put_u122(tag, owner_index, name_and_type_index);
        let index = self.claim_index(1);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds an integer constant.
    pub fn add_integer(&mut self, value: i32) -> u16 {
        let key = ItemKeyRef::Integer(value);
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        self.pool.put_u8(CONSTANT_INTEGER).put_u32(value as u32);
        let index = self.claim_index(1);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds a float constant. Deduplication is bit-exact.
    pub fn add_float(&mut self, value: f32) -> u16 {
        let bits = value.to_bits();
        let key = ItemKeyRef::Float(bits);
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        self.pool.put_u8(CONSTANT_FLOAT).put_u32(bits);
        let index = self.claim_index(1);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds a long constant, which occupies two pool index slots.
    pub fn add_long(&mut self, value: i64) -> u16 {
        let key = ItemKeyRef::Long(value);
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        self.pool.put_u8(CONSTANT_LONG).put_u64(value as u64);
        let index = self.claim_index(2);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds a double constant, which occupies two pool index slots.
    /// Deduplication is bit-exact.
    pub fn add_double(&mut self, value: f64) -> u16 {
        let bits = value.to_bits();
        let key = ItemKeyRef::Double(bits);
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        self.pool.put_u8(CONSTANT_DOUBLE).put_u64(bits);
        let index = self.claim_index(2);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds a method handle entry, interning the referenced member first.
    pub fn add_method_handle(&mut self, handle: &MethodHandle) -> u16 {
        let key = ItemKeyRef::MethodHandle {
            kind: handle.kind,
            owner: &handle.owner,
            name: &handle.name,
            desc: &handle.desc,
        };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        let member_index = self.add_method_ref(
            &handle.owner,
            &handle.name,
            &handle.desc,
            handle.kind == REF_INVOKE_INTERFACE,
        );
        self.pool.put_u11(CONSTANT_METHODHANDLE, handle.kind).put_u16(member_index);
        let index = self.claim_index(1);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds a dynamic or invoke-dynamic entry referencing a bootstrap method
    /// slot; `tag` must be one of the two dynamic entry tags.
    pub fn add_dynamic(&mut self, tag: u8, name: &str, desc: &str, bsm_index: u16) -> u16 {
        let key = ItemKeyRef::Dynamic { tag, name, desc, bsm_index };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        let name_and_type_index = self.add_name_and_type(name, desc);
        self.pool.put_u122(tag, bsm_index, name_and_type_index);
        let index = self.claim_index(1);
        self.store(index, hash, key.to_key());
        index
    }

    /// Adds any loadable constant, dispatching on its kind.
    pub fn add_constant(&mut self, value: &ConstantValue) -> u16 {
        match value {
            ConstantValue::Integer(v) => self.add_integer(*v),
            ConstantValue::Long(v) => self.add_long(*v),
            ConstantValue::Float(v) => self.add_float(*v),
            ConstantValue::Double(v) => self.add_double(*v),
            ConstantValue::String(s) => self.add_string(s),
            ConstantValue::Class(name) => self.add_class(name),
            ConstantValue::MethodType(desc) => self.add_method_type(desc),
            ConstantValue::MethodHandle(handle) => self.add_method_handle(handle),
            ConstantValue::Dynamic { name, desc, bsm_index } => {
                self.add_dynamic(CONSTANT_DYNAMIC, name, desc, *bsm_index)
            }
        }
    }

    /// Adds the given internal name to the type table and returns its index
    /// in the table's own numbering space.
    pub fn add_normal_type(&mut self, internal_name: &str) -> u16 {
        let key = ItemKeyRef::NormalType { name: internal_name };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        self.type_count += 1;
        let index = self.type_count;
        let slot = self.store(index, hash, key.to_key());
        self.type_table.push(slot);
        index
    }

    /// Adds an uninitialized-value marker: an internal name plus the bytecode
    /// offset of the instruction that created the value.
    pub fn add_uninitialized_type(&mut self, internal_name: &str, offset: u32) -> u16 {
        let key = ItemKeyRef::UninitializedType { name: internal_name, offset };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        self.type_count += 1;
        let index = self.type_count;
        let slot = self.store(index, hash, key.to_key());
        self.type_table.push(slot);
        index
    }

    /// Resolves a type-table index back to its internal name.
    pub fn internal_name(&self, type_index: u16) -> &str {
        let slot = self.type_table[type_index as usize - 1];
        match &self.arena[slot as usize].key {
            ItemKey::NormalType { name } | ItemKey::UninitializedType { name, .. } => name,
            other => unreachable!("type table slot holds a pool item: {other:?}"),
        }
    }

    /// Creation-site offset of an uninitialized-value marker.
    pub fn uninitialized_offset(&self, type_index: u16) -> u32 {
        let slot = self.type_table[type_index as usize - 1];
        match &self.arena[slot as usize].key {
            ItemKey::UninitializedType { offset, .. } => *offset,
            other => unreachable!("not an uninitialized type: {other:?}"),
        }
    }

    /// Returns the type-table index of the nearest common ancestor of the two
    /// given types, resolved through `hierarchy` and memoized per ordered
    /// pair. Equal inputs short-circuit to themselves.
    pub fn merged_type(
        &mut self,
        hierarchy: &dyn ClassHierarchy,
        type1: u16,
        type2: u16,
    ) -> u16 {
        let key = ItemKeyRef::MergedType { type1, type2 };
        let hash = key.hash_code();
        if let Some(slot) = self.get(hash, &key) {
            return self.arena[slot as usize].index;
        }

        let name1 = self.internal_name(type1).to_owned();
        let name2 = self.internal_name(type2).to_owned();
        let common = common_super_class(hierarchy, &name1, &name2);
        let merged = self.add_normal_type(&common);

        // Cache item: its index field carries the resolved ancestor index.
        self.store(merged, hash, key.to_key());
        merged
    }

    /// Index the next pool entry would receive.
    pub fn next_index(&self) -> u32 {
        self.index
    }

    /// Encoded byte length of the pool, excluding the 2-byte count prefix.
    pub fn size(&self) -> usize {
        self.pool.len()
    }

    /// Fails when the entry count has outgrown the 16-bit index space. Must
    /// run before the size-prefixed header is written.
    pub fn check_capacity(&self) -> Result<()> {
        if self.index > 0xFFFF {
            return Err(Error::PoolOverflow { count: self.index });
        }
        Ok(())
    }

    /// Writes the pool block: the u16 count followed by the raw entry bytes.
    pub fn put(&self, out: &mut ByteVector) {
        out.put_u16(self.index as u16);
        out.put_byte_array(self.pool.as_slice());
    }

    /// Bulk-adopts the constant pool of an existing class image: the raw pool
    /// bytes are copied verbatim and the parsed entry table is threaded into
    /// the hash index without structural lookups, since the source entries
    /// are trusted pre-deduplicated. The next-index counter and the growth
    /// threshold are reset so subsequent interning continues the sequence.
    ///
    /// Must be called on a freshly created pool, before any interning.
    pub fn copy(&mut self, code: &[u8], source: &SourcePool) {
        debug_assert!(self.arena.is_empty() && self.index == 1, "pool copy requires an empty pool");

        self.pool.put_byte_array(&code[source.pool_start..source.pool_end]);

        // Size the bucket array for the adopted table up front.
        let needed = source.next_index as usize + self.type_count as usize;
        while needed > self.threshold {
            let new_len = self.buckets.len() * 2 + 1;
            self.buckets = vec![None; new_len];
            self.threshold = new_len * 3 / 4;
        }

        for entry in &source.entries {
            let hash = entry.key.hash_code();
            let slot = self.arena.len() as u32;
            let bucket = hash as usize % self.buckets.len();
            self.arena.push(Item {
                index: entry.index,
                hash,
                key: entry.key.clone(),
                next: self.buckets[bucket],
            });
            self.buckets[bucket] = Some(slot);
        }

        self.index = source.next_index as u32;
        debug!(
            "adopted source pool: {} entries, {} bytes, next index {}",
            source.entries.len(),
            source.pool_end - source.pool_start,
            self.index
        );
    }

    fn get(&self, hash: u32, key: &ItemKeyRef<'_>) -> Option<u32> {
        let bucket = hash as usize % self.buckets.len();
        let mut cursor = self.buckets[bucket];
        while let Some(slot) = cursor {
            let item = &self.arena[slot as usize];
            if item.hash == hash && key.matches(&item.key) {
                return Some(slot);
            }
            cursor = item.next;
        }
        None
    }

    /// Past the 16-bit index space the returned value is pinned at the
    /// ceiling rather than wrapped back into the live range; no such index
    /// can reach an emitted image, since `check_capacity` rejects the pool
    /// before the header is written.
    fn claim_index(&mut self, width: u32) -> u16 {
        let index = self.index;
        self.index += width;
        index.min(0xFFFF) as u16
    }

    /// Stores a new item in the arena and threads it into its bucket chain.
    /// The caller must have established that no equal item exists.
    fn store(&mut self, index: u16, hash: u32, key: ItemKey) -> u32 {
        self.grow_if_needed();
        let slot = self.arena.len() as u32;
        let bucket = hash as usize % self.buckets.len();
        self.arena.push(Item { index, hash, key, next: self.buckets[bucket] });
        self.buckets[bucket] = Some(slot);
        slot
    }

    fn grow_if_needed(&mut self) {
        if self.index as usize + self.type_count as usize <= self.threshold {
            return;
        }

        let new_len = self.buckets.len() * 2 + 1;
        let mut buckets = vec![None; new_len];

        // Re-thread every item against the new bucket array; items are not
        // recreated and hashes are not recomputed.
        for slot in 0..self.arena.len() {
            let bucket = self.arena[slot].hash as usize % new_len;
            self.arena[slot].next = buckets[bucket];
            buckets[bucket] = Some(slot as u32);
        }

        self.buckets = buckets;
        self.threshold = new_len * 3 / 4;
        debug!("constant pool hash index grown to {new_len} buckets");
    }
}
