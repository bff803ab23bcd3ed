//! Method records of the class being built

use crate::attributes::{Markers, SignatureWriter};
use crate::attributes::AttributeWriter as _;
use crate::constpool::ConstantPool;
use crate::vec::ByteVector;

/// Encodes one `method_info` record.
///
/// The body comes from a collaborator: either an externally encoded `Code`
/// attribute payload handed in through the class writer, or a byte range of
/// the source image copied wholesale when the method is not being
/// transformed. `computes_frames` is fixed at creation from the class
/// version and tells the body emitter whether stack-map frames are mandatory.
pub struct MethodWriter {
    access: u32,
    name_index: u16,
    desc_index: u16,
    code: Option<CodeAttr>,
    exceptions_attribute_name_index: Option<u16>,
    exception_indices: Vec<u16>,
    signature: Option<SignatureWriter>,
    markers: Markers,
    computes_frames: bool,
    copied: Option<(usize, usize)>,
}

struct CodeAttr {
    attribute_name_index: u16,
    payload: Vec<u8>,
}

impl MethodWriter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cp: &mut ConstantPool,
        class_version: u32,
        access: u32,
        name: &str,
        desc: &str,
        signature: Option<&str>,
        exceptions: &[&str],
        computes_frames: bool,
    ) -> Self {
        let name_index = cp.add_utf8(name);
        let desc_index = cp.add_utf8(desc);
        let signature = signature.map(|s| SignatureWriter::new(cp, s));
        let exceptions_attribute_name_index =
            (!exceptions.is_empty()).then(|| cp.add_utf8("Exceptions"));
        let exception_indices = exceptions.iter().map(|e| cp.add_class(e)).collect();
        let markers = Markers::create(cp, access, class_version);

        Self {
            access,
            name_index,
            desc_index,
            code: None,
            exceptions_attribute_name_index,
            exception_indices,
            signature,
            markers,
            computes_frames,
            copied: None,
        }
    }

    /// A method copied unmodified from the source image: `offset`/`length`
    /// bound the complete original `method_info` record.
    pub(crate) fn copied(offset: usize, length: usize) -> Self {
        Self {
            access: 0,
            name_index: 0,
            desc_index: 0,
            code: None,
            exceptions_attribute_name_index: None,
            exception_indices: Vec::new(),
            signature: None,
            markers: Markers::empty(),
            computes_frames: false,
            copied: Some((offset, length)),
        }
    }

    /// Attaches the externally encoded `Code` attribute payload (max stack,
    /// max locals, bytecode, exception table and code attributes, already in
    /// wire form). The attribute name is interned here, so bodyless methods
    /// never touch the pool for it.
    pub(crate) fn set_code(&mut self, cp: &mut ConstantPool, payload: Vec<u8>) {
        self.code = Some(CodeAttr { attribute_name_index: cp.add_utf8("Code"), payload });
    }

    /// Whether the class version obliges the body emitter to compute
    /// stack-map frames for this method. Decided once, at creation.
    pub fn computes_frames(&self) -> bool {
        self.computes_frames
    }

    pub fn size(&self) -> usize {
        if let Some((_, length)) = self.copied {
            return length;
        }

        let mut size = 8;
        if let Some(code) = &self.code {
            size += 6 + code.payload.len();
        }
        if self.exceptions_attribute_name_index.is_some() {
            size += 8 + 2 * self.exception_indices.len();
        }
        if let Some(signature) = &self.signature {
            size += signature.size();
        }
        size + self.markers.size()
    }

    pub(crate) fn put(&self, out: &mut ByteVector, source: &[u8]) {
        if let Some((offset, length)) = self.copied {
            out.put_byte_array(&source[offset..offset + length]);
            return;
        }

        out.put_u16((self.access & 0xFFFF) as u16)
            .put_u16(self.name_index)
            .put_u16(self.desc_index);

        let attribute_count = self.code.is_some() as u16
            + self.exceptions_attribute_name_index.is_some() as u16
            + self.signature.is_some() as u16
            + self.markers.attribute_count();
        out.put_u16(attribute_count);

        if let Some(code) = &self.code {
            out.put_u16(code.attribute_name_index).put_u32(code.payload.len() as u32);
            out.put_byte_array(&code.payload);
        }
        if let Some(name_index) = self.exceptions_attribute_name_index {
            let payload_len = 2 + 2 * self.exception_indices.len() as u32;
            out.put_u16(name_index).put_u32(payload_len);
            out.put_u16(self.exception_indices.len() as u16);
            for index in &self.exception_indices {
                out.put_u16(*index);
            }
        }
        if let Some(signature) = &self.signature {
            signature.put(out);
        }
        self.markers.put(out);
    }
}
