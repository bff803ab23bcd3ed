//! Field records of the class being built

use crate::attributes::{Markers, SignatureWriter};
use crate::attributes::AttributeWriter as _;
use crate::constpool::{ConstantPool, ConstantValue};
use crate::error::{Error, Result};
use crate::vec::ByteVector;

/// Encodes one `field_info` record: access flags, name/descriptor indices and
/// the field attributes (ConstantValue, Signature, markers).
pub struct FieldWriter {
    access: u32,
    name_index: u16,
    desc_index: u16,
    constant_value: Option<ConstantValueAttr>,
    signature: Option<SignatureWriter>,
    markers: Markers,
}

struct ConstantValueAttr {
    attribute_name_index: u16,
    constant_index: u16,
}

impl FieldWriter {
    pub(crate) fn new(
        cp: &mut ConstantPool,
        class_version: u32,
        access: u32,
        name: &str,
        desc: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Result<Self> {
        let name_index = cp.add_utf8(name);
        let desc_index = cp.add_utf8(desc);
        let signature = signature.map(|s| SignatureWriter::new(cp, s));
        let constant_value = match value {
            Some(v) => Some(ConstantValueAttr::new(cp, v)?),
            None => None,
        };
        let markers = Markers::create(cp, access, class_version);
        Ok(Self { access, name_index, desc_index, constant_value, signature, markers })
    }

    pub fn size(&self) -> usize {
        let mut size = 8;
        if self.constant_value.is_some() {
            size += 8;
        }
        if let Some(signature) = &self.signature {
            size += signature.size();
        }
        size + self.markers.size()
    }

    pub(crate) fn put(&self, out: &mut ByteVector) {
        out.put_u16((self.access & 0xFFFF) as u16)
            .put_u16(self.name_index)
            .put_u16(self.desc_index);

        let attribute_count = self.constant_value.is_some() as u16
            + self.signature.is_some() as u16
            + self.markers.attribute_count();
        out.put_u16(attribute_count);

        if let Some(cv) = &self.constant_value {
            out.put_u16(cv.attribute_name_index).put_u32(2).put_u16(cv.constant_index);
        }
        if let Some(signature) = &self.signature {
            signature.put(out);
        }
        self.markers.put(out);
    }
}

impl ConstantValueAttr {
    /// Only the loadable primitive and string kinds are legal for a
    /// `ConstantValue` attribute; anything else is a caller contract
    /// violation.
    fn new(cp: &mut ConstantPool, value: &ConstantValue) -> Result<Self> {
        match value {
            ConstantValue::Integer(_)
            | ConstantValue::Long(_)
            | ConstantValue::Float(_)
            | ConstantValue::Double(_)
            | ConstantValue::String(_) => Ok(Self {
                attribute_name_index: cp.add_utf8("ConstantValue"),
                constant_index: cp.add_constant(value),
            }),
            other => Err(Error::UnsupportedConstant { kind: other.kind() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::access_flags::{ACC_FINAL, ACC_STATIC};
    use crate::defs::{major_versions, version};

    const V8: u32 = version(0, major_versions::JAVA_8);

    #[test]
    fn test_plain_field_is_eight_bytes() {
        let mut cp = ConstantPool::new();
        let field =
            FieldWriter::new(&mut cp, V8, ACC_STATIC, "count", "I", None, None).expect("field");
        assert_eq!(field.size(), 8);

        let mut out = ByteVector::new();
        field.put(&mut out);
        assert_eq!(out.len(), field.size());
    }

    #[test]
    fn test_constant_value_and_signature_grow_the_record() {
        let mut cp = ConstantPool::new();
        let field = FieldWriter::new(
            &mut cp,
            V8,
            ACC_STATIC | ACC_FINAL,
            "LIMIT",
            "J",
            Some("TJ;"),
            Some(&ConstantValue::Long(1 << 40)),
        )
        .expect("field");
        assert_eq!(field.size(), 8 + 8 + 8);

        let mut out = ByteVector::new();
        field.put(&mut out);
        assert_eq!(out.len(), field.size());
    }

    #[test]
    fn test_non_loadable_constant_value_is_rejected() {
        let mut cp = ConstantPool::new();
        let result = FieldWriter::new(
            &mut cp,
            V8,
            ACC_STATIC,
            "bad",
            "Ljava/lang/Class;",
            None,
            Some(&ConstantValue::Class("java/lang/String".into())),
        );
        assert!(matches!(result, Err(Error::UnsupportedConstant { kind: "class" })));
    }
}
