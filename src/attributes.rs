//! Class-level attribute writers composed by the class writer

use crate::constpool::{ConstantPool, ConstantValue, MethodHandle};
use crate::defs::access_flags::{ACC_DEPRECATED, ACC_SYNTHETIC};
use crate::defs::constant_tags::CONSTANT_INVOKEDYNAMIC;
use crate::defs::{major_version, major_versions};
use crate::vec::ByteVector;

/// An independent encoder contributing one named, length-prefixed record to
/// the emitted class. `put` must produce exactly `size()` bytes; the
/// assembler's two-pass protocol depends on that.
pub trait AttributeWriter {
    /// Number of attribute records this writer contributes.
    fn attribute_count(&self) -> u16 {
        1
    }

    /// Exact number of bytes `put` will write.
    fn size(&self) -> usize;

    /// Writes the attribute record(s) into the output buffer.
    fn put(&self, out: &mut ByteVector);
}

/// Writes a `Signature` attribute: a single UTF8 reference.
pub struct SignatureWriter {
    attribute_name_index: u16,
    signature_index: u16,
}

impl SignatureWriter {
    pub fn new(cp: &mut ConstantPool, signature: &str) -> Self {
        Self {
            attribute_name_index: cp.add_utf8("Signature"),
            signature_index: cp.add_utf8(signature),
        }
    }
}

impl AttributeWriter for SignatureWriter {
    fn size(&self) -> usize {
        8
    }

    fn put(&self, out: &mut ByteVector) {
        out.put_u16(self.attribute_name_index).put_u32(2).put_u16(self.signature_index);
    }
}

/// Writes a `SourceFile` attribute.
pub struct SourceFileWriter {
    attribute_name_index: u16,
    source_file_index: u16,
}

impl SourceFileWriter {
    pub fn new(cp: &mut ConstantPool, source_file_name: &str) -> Self {
        Self {
            attribute_name_index: cp.add_utf8("SourceFile"),
            source_file_index: cp.add_utf8(source_file_name),
        }
    }
}

impl AttributeWriter for SourceFileWriter {
    fn size(&self) -> usize {
        8
    }

    fn put(&self, out: &mut ByteVector) {
        out.put_u16(self.attribute_name_index).put_u32(2).put_u16(self.source_file_index);
    }
}

/// Writes a `NestHost` attribute naming the host class of a nest member.
pub struct NestHostWriter {
    attribute_name_index: u16,
    host_class_index: u16,
}

impl NestHostWriter {
    pub fn new(cp: &mut ConstantPool, host_class_name: &str) -> Self {
        Self {
            attribute_name_index: cp.add_utf8("NestHost"),
            host_class_index: cp.add_class(host_class_name),
        }
    }
}

impl AttributeWriter for NestHostWriter {
    fn size(&self) -> usize {
        8
    }

    fn put(&self, out: &mut ByteVector) {
        out.put_u16(self.attribute_name_index).put_u32(2).put_u16(self.host_class_index);
    }
}

/// Writes a `NestMembers` attribute listing the members of a nest host.
pub struct NestMembersWriter {
    attribute_name_index: u16,
    member_class_indices: Vec<u16>,
}

impl NestMembersWriter {
    pub fn new(cp: &mut ConstantPool, member_class_names: &[&str]) -> Self {
        Self {
            attribute_name_index: cp.add_utf8("NestMembers"),
            member_class_indices: member_class_names.iter().map(|n| cp.add_class(n)).collect(),
        }
    }
}

impl AttributeWriter for NestMembersWriter {
    fn size(&self) -> usize {
        8 + 2 * self.member_class_indices.len()
    }

    fn put(&self, out: &mut ByteVector) {
        let payload_len = 2 + 2 * self.member_class_indices.len() as u32;
        out.put_u16(self.attribute_name_index).put_u32(payload_len);
        out.put_u16(self.member_class_indices.len() as u16);
        for index in &self.member_class_indices {
            out.put_u16(*index);
        }
    }
}

struct InnerClassRecord {
    inner_class_index: u16,
    outer_class_index: u16,
    inner_name_index: u16,
    access: u16,
}

/// Writes the shared `InnerClasses` attribute; one record per `add` call.
pub struct InnerClassesWriter {
    attribute_name_index: u16,
    records: Vec<InnerClassRecord>,
}

impl InnerClassesWriter {
    pub fn new(cp: &mut ConstantPool) -> Self {
        Self { attribute_name_index: cp.add_utf8("InnerClasses"), records: Vec::new() }
    }

    pub fn add(
        &mut self,
        cp: &mut ConstantPool,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: u16,
    ) {
        self.records.push(InnerClassRecord {
            inner_class_index: cp.add_class(name),
            outer_class_index: outer_name.map_or(0, |n| cp.add_class(n)),
            inner_name_index: inner_name.map_or(0, |n| cp.add_utf8(n)),
            access,
        });
    }
}

impl AttributeWriter for InnerClassesWriter {
    fn size(&self) -> usize {
        8 + 8 * self.records.len()
    }

    fn put(&self, out: &mut ByteVector) {
        let payload_len = 2 + 8 * self.records.len() as u32;
        out.put_u16(self.attribute_name_index).put_u32(payload_len);
        out.put_u16(self.records.len() as u16);
        for record in &self.records {
            out.put_u16(record.inner_class_index)
                .put_u16(record.outer_class_index)
                .put_u16(record.inner_name_index)
                .put_u16(record.access);
        }
    }
}

/// Encodes the implemented-interfaces list of the class header.
///
/// Not a named attribute: the 2-byte count slot belongs to the fixed class
/// header, so `size` and `put` cover the per-interface indices only.
pub struct InterfaceWriter {
    interface_indices: Vec<u16>,
}

impl InterfaceWriter {
    pub fn new(cp: &mut ConstantPool, interface_names: &[&str]) -> Self {
        Self { interface_indices: interface_names.iter().map(|n| cp.add_class(n)).collect() }
    }

    pub fn count(&self) -> u16 {
        self.interface_indices.len() as u16
    }

    pub fn size(&self) -> usize {
        2 * self.interface_indices.len()
    }

    pub fn put(&self, out: &mut ByteVector) {
        for index in &self.interface_indices {
            out.put_u16(*index);
        }
    }
}

struct BootstrapMethodEntry {
    handle_index: u16,
    arg_indices: Vec<u16>,
}

/// Writes the `BootstrapMethods` attribute and hands out invoke-dynamic pool
/// entries referencing its slots. Bootstrap entries are deduplicated
/// structurally (same handle, same argument constants, same slot).
pub struct BootstrapMethodsWriter {
    attribute_name_index: u16,
    entries: Vec<BootstrapMethodEntry>,
}

impl BootstrapMethodsWriter {
    pub fn new(cp: &mut ConstantPool) -> Self {
        Self { attribute_name_index: cp.add_utf8("BootstrapMethods"), entries: Vec::new() }
    }

    /// Interns an invoke-dynamic constant for the given call site, creating
    /// or reusing a bootstrap method entry for `bsm` and its arguments.
    /// Returns the pool index of the invoke-dynamic entry.
    pub fn add_invoke_dynamic(
        &mut self,
        cp: &mut ConstantPool,
        name: &str,
        desc: &str,
        bsm: &MethodHandle,
        bsm_args: &[ConstantValue],
    ) -> u16 {
        let handle_index = cp.add_method_handle(bsm);
        let arg_indices: Vec<u16> = bsm_args.iter().map(|arg| cp.add_constant(arg)).collect();

        let slot = self
            .entries
            .iter()
            .position(|e| e.handle_index == handle_index && e.arg_indices == arg_indices)
            .unwrap_or_else(|| {
                self.entries.push(BootstrapMethodEntry { handle_index, arg_indices });
                self.entries.len() - 1
            });

        cp.add_dynamic(CONSTANT_INVOKEDYNAMIC, name, desc, slot as u16)
    }
}

impl AttributeWriter for BootstrapMethodsWriter {
    fn size(&self) -> usize {
        8 + self.entries.iter().map(|e| 4 + 2 * e.arg_indices.len()).sum::<usize>()
    }

    fn put(&self, out: &mut ByteVector) {
        let payload_len = (self.size() - 6) as u32;
        out.put_u16(self.attribute_name_index).put_u32(payload_len);
        out.put_u16(self.entries.len() as u16);
        for entry in &self.entries {
            out.put_u16(entry.handle_index).put_u16(entry.arg_indices.len() as u16);
            for index in &entry.arg_indices {
                out.put_u16(*index);
            }
        }
    }
}

/// Marker attributes derived from access flags: the pseudo-deprecated flag
/// yields a `Deprecated` record, and the synthetic flag yields a `Synthetic`
/// record on classfile versions predating the real access bit.
pub struct Markers {
    deprecated_index: Option<u16>,
    synthetic_index: Option<u16>,
}

impl Markers {
    pub fn empty() -> Self {
        Self { deprecated_index: None, synthetic_index: None }
    }

    pub fn create(cp: &mut ConstantPool, access: u32, class_version: u32) -> Self {
        let deprecated_index =
            ((access & ACC_DEPRECATED) != 0).then(|| cp.add_utf8("Deprecated"));
        let synthetic_index = ((access & ACC_SYNTHETIC) != 0
            && major_version(class_version) < major_versions::JAVA_5_0)
            .then(|| cp.add_utf8("Synthetic"));
        Self { deprecated_index, synthetic_index }
    }

    pub fn attribute_count(&self) -> u16 {
        self.deprecated_index.is_some() as u16 + self.synthetic_index.is_some() as u16
    }

    pub fn size(&self) -> usize {
        6 * self.attribute_count() as usize
    }

    pub fn put(&self, out: &mut ByteVector) {
        if let Some(index) = self.deprecated_index {
            out.put_u16(index).put_u32(0);
        }
        if let Some(index) = self.synthetic_index {
            out.put_u16(index).put_u32(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::handle_kinds::REF_INVOKE_STATIC;
    use crate::defs::version;

    fn emitted(writer: &dyn AttributeWriter) -> Vec<u8> {
        let mut out = ByteVector::new();
        writer.put(&mut out);
        out.into_vec()
    }

    #[test]
    fn test_each_writer_emits_exactly_its_size() {
        let mut cp = ConstantPool::new();

        let signature = SignatureWriter::new(&mut cp, "<T:Ljava/lang/Object;>Ljava/lang/Object;");
        assert_eq!(emitted(&signature).len(), signature.size());

        let source = SourceFileWriter::new(&mut cp, "Widget.java");
        assert_eq!(emitted(&source).len(), source.size());

        let host = NestHostWriter::new(&mut cp, "com/x/Outer");
        assert_eq!(emitted(&host).len(), host.size());

        let members = NestMembersWriter::new(&mut cp, &["com/x/Outer$A", "com/x/Outer$B"]);
        assert_eq!(emitted(&members).len(), members.size());

        let mut inner = InnerClassesWriter::new(&mut cp);
        inner.add(&mut cp, "com/x/Outer$A", Some("com/x/Outer"), Some("A"), 0x0001);
        inner.add(&mut cp, "com/x/Outer$1", None, None, 0x0008);
        assert_eq!(emitted(&inner).len(), inner.size());
        assert_eq!(inner.attribute_count(), 1);
    }

    #[test]
    fn test_attribute_length_excludes_six_byte_header() {
        let mut cp = ConstantPool::new();
        let mut inner = InnerClassesWriter::new(&mut cp);
        inner.add(&mut cp, "com/x/Outer$A", None, None, 0);
        let bytes = emitted(&inner);
        let declared = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
        assert_eq!(declared, bytes.len() - 6);
    }

    #[test]
    fn test_bootstrap_entries_deduplicate() {
        let mut cp = ConstantPool::new();
        let mut bsms = BootstrapMethodsWriter::new(&mut cp);
        let bsm = MethodHandle::new(
            REF_INVOKE_STATIC,
            "java/lang/invoke/LambdaMetafactory",
            "metafactory",
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
        );
        let args = [ConstantValue::MethodType("()V".into())];

        let a = bsms.add_invoke_dynamic(&mut cp, "run", "()Ljava/lang/Runnable;", &bsm, &args);
        let b = bsms.add_invoke_dynamic(&mut cp, "run", "()Ljava/lang/Runnable;", &bsm, &args);
        assert_eq!(a, b);
        assert_eq!(bsms.entries.len(), 1);

        // A different call-site name shares the bootstrap slot but not the
        // invoke-dynamic entry.
        let c = bsms.add_invoke_dynamic(&mut cp, "call", "()Ljava/lang/Runnable;", &bsm, &args);
        assert_ne!(a, c);
        assert_eq!(bsms.entries.len(), 1);
        assert_eq!(emitted(&bsms).len(), bsms.size());
    }

    #[test]
    fn test_markers_follow_flags_and_version() {
        let mut cp = ConstantPool::new();

        let none = Markers::create(&mut cp, 0x0001, version(0, major_versions::JAVA_8));
        assert_eq!(none.attribute_count(), 0);
        assert_eq!(none.size(), 0);

        let deprecated =
            Markers::create(&mut cp, ACC_DEPRECATED, version(0, major_versions::JAVA_8));
        assert_eq!(deprecated.attribute_count(), 1);
        assert_eq!(deprecated.size(), 6);

        // Synthetic gets a marker attribute only below the 1.5 format.
        let old = Markers::create(&mut cp, ACC_SYNTHETIC, version(0, major_versions::JAVA_1_4));
        assert_eq!(old.attribute_count(), 1);
        let new = Markers::create(&mut cp, ACC_SYNTHETIC, version(0, major_versions::JAVA_8));
        assert_eq!(new.attribute_count(), 0);

        let mut out = ByteVector::new();
        deprecated.put(&mut out);
        assert_eq!(out.len(), deprecated.size());
    }
}
