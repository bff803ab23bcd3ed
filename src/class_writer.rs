//! Class writer: assembles and emits a complete class-file image

use log::debug;

use crate::attributes::{
    AttributeWriter, BootstrapMethodsWriter, InnerClassesWriter, InterfaceWriter, Markers,
    NestHostWriter, NestMembersWriter, SignatureWriter, SourceFileWriter,
};
use crate::constpool::{ConstantPool, ConstantValue, MethodHandle, SourcePool};
use crate::defs::{major_version, major_versions, MAGIC, OBJECT};
use crate::error::{Error, Result};
use crate::field::FieldWriter;
use crate::hierarchy::HierarchyRegistry;
use crate::method::MethodWriter;
use crate::vec::ByteVector;

/// Optional parts of a class description, bundled so `describe` stays
/// readable at call sites.
#[derive(Default)]
pub struct ClassInfo<'a> {
    pub super_name: Option<&'a str>,
    pub interfaces: &'a [&'a str],
    pub signature: Option<&'a str>,
    pub source_file: Option<&'a str>,
    /// Host class of this nest member; mutually exclusive with
    /// `nest_members`.
    pub nest_host: Option<&'a str>,
    pub nest_members: Option<&'a [&'a str]>,
}

/// Handle to a field added to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldId(usize);

/// Handle to a method added to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodId(usize);

/// Generates a class in bytecode form: a byte buffer conforming to the Java
/// class file format.
///
/// Lifecycle: construct (from scratch or from an existing image), `describe`
/// the class header, populate fields/methods/attributes in any order, then
/// request the final image with [`ClassWriter::to_bytes`]. Emission follows
/// the two-pass protocol: the total size is computed first and the output
/// buffer is allocated once, at exactly that size.
pub struct ClassWriter {
    cp: ConstantPool,
    hierarchy: HierarchyRegistry,
    /// Original class image when building from a source; empty otherwise.
    source: Vec<u8>,
    version: u32,
    access: u32,
    name_index: u16,
    this_name: Option<String>,
    super_index: u16,
    interfaces: Option<InterfaceWriter>,
    attribute_writers: Vec<Box<dyn AttributeWriter>>,
    inner_classes: Option<InnerClassesWriter>,
    bootstrap_methods: Option<BootstrapMethodsWriter>,
    annotations: Option<AnnotationsAttr>,
    markers: Markers,
    fields: Vec<FieldWriter>,
    methods: Vec<MethodWriter>,
}

struct AnnotationsAttr {
    attribute_name_index: u16,
    payload: Vec<u8>,
}

impl Default for ClassWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassWriter {
    /// Creates a writer that builds a class from scratch.
    pub fn new() -> Self {
        Self {
            cp: ConstantPool::new(),
            hierarchy: HierarchyRegistry::new(),
            source: Vec::new(),
            version: 0,
            access: 0,
            name_index: 0,
            this_name: None,
            super_index: 0,
            interfaces: None,
            attribute_writers: Vec::new(),
            inner_classes: None,
            bootstrap_methods: None,
            annotations: None,
            markers: Markers::empty(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Creates a writer seeded from an existing class image: the source
    /// constant pool is copied verbatim (new entries are appended after it)
    /// and untransformed method bodies can be copied by byte range.
    pub fn from_source(source: Vec<u8>) -> Result<Self> {
        let source_pool = SourcePool::parse(&source)?;
        let mut writer = Self::new();
        writer.cp.copy(&source, &source_pool);
        writer.version = source_pool.version;
        writer.source = source;
        Ok(writer)
    }

    /// Sets the class header: version, access flags, own name and the
    /// optional parts bundled in `info`. The supertype may be absent only
    /// for the universal root type.
    pub fn describe(&mut self, version: u32, access: u32, name: &str, info: &ClassInfo<'_>) {
        self.version = version;
        self.access = access;
        self.name_index = self.cp.add_class(name);
        self.this_name = Some(name.to_owned());
        self.markers = Markers::create(&mut self.cp, access, version);

        self.super_index = match info.super_name {
            Some(super_name) => {
                self.hierarchy.add_super_class(name, super_name);
                self.cp.add_class(super_name)
            }
            None => 0,
        };

        if !info.interfaces.is_empty() {
            self.interfaces = Some(InterfaceWriter::new(&mut self.cp, info.interfaces));
        }
        if let Some(signature) = info.signature {
            self.attribute_writers.push(Box::new(SignatureWriter::new(&mut self.cp, signature)));
        }
        if let Some(source_file) = info.source_file {
            self.attribute_writers.push(Box::new(SourceFileWriter::new(&mut self.cp, source_file)));
        }
        if let Some(host) = info.nest_host {
            self.attribute_writers.push(Box::new(NestHostWriter::new(&mut self.cp, host)));
        } else if let Some(members) = info.nest_members {
            self.attribute_writers.push(Box::new(NestMembersWriter::new(&mut self.cp, members)));
        }
    }

    /// Appends one record to the shared `InnerClasses` attribute, creating
    /// the attribute on first use.
    pub fn add_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: u16,
    ) {
        let mut writer = match self.inner_classes.take() {
            Some(writer) => writer,
            None => InnerClassesWriter::new(&mut self.cp),
        };
        writer.add(&mut self.cp, name, outer_name, inner_name, access);
        self.inner_classes = Some(writer);
    }

    /// Adds a field. Fields are emitted in insertion order.
    pub fn add_field(
        &mut self,
        access: u32,
        name: &str,
        desc: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Result<FieldId> {
        let field =
            FieldWriter::new(&mut self.cp, self.version, access, name, desc, signature, value)?;
        self.fields.push(field);
        Ok(FieldId(self.fields.len() - 1))
    }

    /// Adds a method. Methods are emitted in insertion order. Whether the
    /// body emitter must compute stack-map frames is decided here, from the
    /// class version, and stays fixed for the method's lifetime.
    pub fn add_method(
        &mut self,
        access: u32,
        name: &str,
        desc: &str,
        signature: Option<&str>,
        exceptions: &[&str],
    ) -> MethodId {
        let computes_frames = major_version(self.version) >= major_versions::JAVA_7;
        let method = MethodWriter::new(
            &mut self.cp,
            self.version,
            access,
            name,
            desc,
            signature,
            exceptions,
            computes_frames,
        );
        self.methods.push(method);
        MethodId(self.methods.len() - 1)
    }

    /// Adds a method copied unmodified from the source image;
    /// `offset`/`length` bound the original `method_info` record. Pool
    /// indices inside the copied bytes stay valid because the source pool
    /// was adopted verbatim.
    pub fn copy_method(&mut self, offset: usize, length: usize) -> MethodId {
        self.methods.push(MethodWriter::copied(offset, length));
        MethodId(self.methods.len() - 1)
    }

    /// Attaches the externally encoded `Code` attribute payload to a method.
    pub fn set_method_code(&mut self, method: MethodId, payload: Vec<u8>) {
        self.methods[method.0].set_code(&mut self.cp, payload);
    }

    pub fn method(&self, method: MethodId) -> &MethodWriter {
        &self.methods[method.0]
    }

    /// Attaches a pre-encoded `RuntimeVisibleAnnotations` payload produced
    /// by the external annotation encoder.
    pub fn set_annotations(&mut self, payload: Vec<u8>) {
        self.annotations = Some(AnnotationsAttr {
            attribute_name_index: self.cp.add_utf8("RuntimeVisibleAnnotations"),
            payload,
        });
    }

    /// Interns an invoke-dynamic call site, creating the `BootstrapMethods`
    /// attribute on first use. Returns the invoke-dynamic pool index.
    pub fn add_invoke_dynamic(
        &mut self,
        name: &str,
        desc: &str,
        bsm: &MethodHandle,
        bsm_args: &[ConstantValue],
    ) -> u16 {
        let mut writer = match self.bootstrap_methods.take() {
            Some(writer) => writer,
            None => BootstrapMethodsWriter::new(&mut self.cp),
        };
        let index = writer.add_invoke_dynamic(&mut self.cp, name, desc, bsm, bsm_args);
        self.bootstrap_methods = Some(writer);
        index
    }

    /// Nearest common ancestor of two type-table entries, resolved through
    /// this writer's hierarchy registry.
    pub fn merged_type(&mut self, type1: u16, type2: u16) -> u16 {
        self.cp.merged_type(&self.hierarchy, type1, type2)
    }

    pub fn class_version(&self) -> u32 {
        self.version
    }

    pub fn internal_class_name(&self) -> Option<&str> {
        self.this_name.as_deref()
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.cp
    }

    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.cp
    }

    pub fn hierarchy_mut(&mut self) -> &mut HierarchyRegistry {
        &mut self.hierarchy
    }

    /// Emits the class-file image. Pass one computes the exact total size,
    /// pass two writes into a buffer pre-allocated to that size. Repeated
    /// calls produce byte-identical output.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let name = match &self.this_name {
            Some(name) => name,
            None => {
                return Err(Error::missing_description(
                    "class name and version must be set before emission",
                ))
            }
        };
        if self.super_index == 0 && name != OBJECT {
            return Err(Error::missing_description(format!(
                "class {name} has no supertype"
            )));
        }
        self.cp.check_capacity()?;

        let size = self.image_size();
        let mut out = ByteVector::with_capacity(size);
        self.put_class(&mut out);

        debug_assert_eq!(out.len(), size, "computed size diverges from emitted bytes");
        debug!("emitted class {name}: {size} bytes");
        Ok(out.into_vec())
    }

    fn image_size(&self) -> usize {
        let mut size = 24 + self.markers.size();
        for field in &self.fields {
            size += field.size();
        }
        for method in &self.methods {
            size += method.size();
        }
        if let Some(interfaces) = &self.interfaces {
            size += interfaces.size();
        }
        if let Some(bootstrap) = &self.bootstrap_methods {
            size += bootstrap.size();
        }
        for writer in &self.attribute_writers {
            size += writer.size();
        }
        if let Some(inner) = &self.inner_classes {
            size += inner.size();
        }
        if let Some(annotations) = &self.annotations {
            size += 6 + annotations.payload.len();
        }
        size + self.cp.size()
    }

    fn put_class(&self, out: &mut ByteVector) {
        out.put_u32(MAGIC).put_u32(self.version);
        self.cp.put(out);

        out.put_u16((self.access & 0xFFFF) as u16)
            .put_u16(self.name_index)
            .put_u16(self.super_index);

        match &self.interfaces {
            Some(interfaces) => {
                out.put_u16(interfaces.count());
                interfaces.put(out);
            }
            None => {
                out.put_u16(0);
            }
        }

        out.put_u16(self.fields.len() as u16);
        for field in &self.fields {
            field.put(out);
        }
        out.put_u16(self.methods.len() as u16);
        for method in &self.methods {
            method.put(out, &self.source);
        }

        out.put_u16(self.attribute_count());
        if let Some(bootstrap) = &self.bootstrap_methods {
            bootstrap.put(out);
        }
        for writer in &self.attribute_writers {
            writer.put(out);
        }
        if let Some(inner) = &self.inner_classes {
            inner.put(out);
        }
        self.markers.put(out);
        if let Some(annotations) = &self.annotations {
            out.put_u16(annotations.attribute_name_index)
                .put_u32(annotations.payload.len() as u32);
            out.put_byte_array(&annotations.payload);
        }
    }

    fn attribute_count(&self) -> u16 {
        let mut count = self.markers.attribute_count();
        if self.bootstrap_methods.is_some() {
            count += 1;
        }
        for writer in &self.attribute_writers {
            count += writer.attribute_count();
        }
        if self.inner_classes.is_some() {
            count += 1;
        }
        if self.annotations.is_some() {
            count += 1;
        }
        count
    }
}
