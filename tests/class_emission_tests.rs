//! End-to-end emission: built classes must be structurally valid images

use classforge::constpool::{ItemKey, SourcePool};
use classforge::defs::access_flags::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use classforge::defs::constant_tags::{CONSTANT_CLASS, CONSTANT_INVOKEDYNAMIC};
use classforge::defs::handle_kinds::REF_INVOKE_STATIC;
use classforge::defs::{major_versions, version, MAGIC, OBJECT};
use classforge::{ClassInfo, ClassWriter, ConstantValue, MethodHandle};

const V8: u32 = version(0, major_versions::JAVA_8);

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

/// Internal name a CONSTANT_Class entry at `class_index` resolves to.
fn class_name_at(source: &SourcePool, class_index: u16) -> String {
    let class = source
        .entries
        .iter()
        .find(|e| e.index == class_index)
        .unwrap_or_else(|| panic!("no pool entry at index {class_index}"));
    match &class.key {
        ItemKey::Str { tag, value } if *tag == CONSTANT_CLASS => value.clone(),
        other => panic!("index {class_index} is not a class entry: {other:?}"),
    }
}

/// A minimal `Code` attribute payload: max stack/locals, a lone `return`,
/// empty exception table, no code attributes.
fn return_void_code() -> Vec<u8> {
    vec![0, 1, 0, 1, 0, 0, 0, 1, 0xB1, 0, 0, 0, 0]
}

#[test]
fn test_minimal_class_is_a_valid_image() {
    let mut writer = ClassWriter::new();
    writer.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/A",
        &ClassInfo {
            super_name: Some(OBJECT),
            source_file: Some("A.java"),
            ..Default::default()
        },
    );
    writer
        .add_field(ACC_STATIC | ACC_FINAL, "LIMIT", "I", None, Some(&ConstantValue::Integer(10)))
        .expect("field");
    let init = writer.add_method(ACC_PUBLIC, "<init>", "()V", None, &[]);
    writer.set_method_code(init, return_void_code());

    let image = writer.to_bytes().expect("emit");

    assert_eq!(read_u32(&image, 0), MAGIC);
    assert_eq!(read_u32(&image, 4), V8);
    assert_eq!(read_u16(&image, 4), 0); // minor version
    assert_eq!(read_u16(&image, 6), major_versions::JAVA_8);

    // The emitted pool must scan cleanly and place the class header right
    // after it.
    let source = SourcePool::parse(&image).expect("scan own output");
    let mut offset = source.pool_end;
    assert_eq!(read_u16(&image, offset) as u32, (ACC_PUBLIC | ACC_SUPER) & 0xFFFF);
    assert_eq!(class_name_at(&source, read_u16(&image, offset + 2)), "com/x/A");
    assert_eq!(class_name_at(&source, read_u16(&image, offset + 4)), OBJECT);
    assert_eq!(read_u16(&image, offset + 6), 0); // interfaces
    offset += 8;

    assert_eq!(read_u16(&image, offset), 1); // fields
    offset += 2;
    // field_info: access, name, desc, one ConstantValue attribute
    assert_eq!(read_u16(&image, offset) as u32, ACC_STATIC | ACC_FINAL);
    assert_eq!(read_u16(&image, offset + 6), 1);
    offset += 8 + 8;

    assert_eq!(read_u16(&image, offset), 1); // methods
    offset += 2;
    assert_eq!(read_u16(&image, offset) as u32, ACC_PUBLIC);
    assert_eq!(read_u16(&image, offset + 6), 1); // the Code attribute
    offset += 8 + 6 + return_void_code().len();

    // Class attributes: SourceFile only; the image ends exactly there.
    assert_eq!(read_u16(&image, offset), 1);
    assert_eq!(image.len(), offset + 2 + 8);
}

#[test]
fn test_emission_is_idempotent() {
    let mut writer = ClassWriter::new();
    writer.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Stable",
        &ClassInfo { super_name: Some(OBJECT), ..Default::default() },
    );
    let m = writer.add_method(ACC_PUBLIC, "<init>", "()V", None, &[]);
    writer.set_method_code(m, return_void_code());

    let first = writer.to_bytes().expect("first emission");
    let second = writer.to_bytes().expect("second emission");
    assert_eq!(first, second);

    // Interning an already-present value is a no-op for the image too.
    writer.pool_mut().add_class("com/x/Stable");
    writer.pool_mut().add_utf8("Code");
    assert_eq!(writer.to_bytes().expect("third emission"), first);
}

#[test]
fn test_interfaces_and_class_attributes() {
    let mut writer = ClassWriter::new();
    writer.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Impl",
        &ClassInfo {
            super_name: Some(OBJECT),
            interfaces: &["java/lang/Runnable", "java/io/Closeable"],
            signature: Some("Ljava/lang/Object;Ljava/lang/Runnable;Ljava/io/Closeable;"),
            source_file: Some("Impl.java"),
            nest_members: Some(&["com/x/Impl$Inner"]),
            ..Default::default()
        },
    );
    let image = writer.to_bytes().expect("emit");
    let source = SourcePool::parse(&image).expect("scan");

    let offset = source.pool_end;
    assert_eq!(read_u16(&image, offset + 6), 2);
    assert_eq!(class_name_at(&source, read_u16(&image, offset + 8)), "java/lang/Runnable");
    assert_eq!(class_name_at(&source, read_u16(&image, offset + 10)), "java/io/Closeable");

    // No fields, no methods, then Signature + SourceFile + NestMembers.
    let attrs_at = offset + 8 + 4 + 2 + 2;
    assert_eq!(read_u16(&image, attrs_at), 3);
}

#[test]
fn test_invoke_dynamic_gets_bootstrap_attribute() {
    let mut writer = ClassWriter::new();
    writer.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Lambdas",
        &ClassInfo { super_name: Some(OBJECT), ..Default::default() },
    );
    let bsm = MethodHandle::new(
        REF_INVOKE_STATIC,
        "java/lang/invoke/LambdaMetafactory",
        "metafactory",
        "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
    );
    let indy = writer.add_invoke_dynamic(
        "run",
        "()Ljava/lang/Runnable;",
        &bsm,
        &[ConstantValue::MethodType("()V".into())],
    );
    writer.add_inner_class("com/x/Lambdas$1", None, None, 0x0008);

    let image = writer.to_bytes().expect("emit");
    let source = SourcePool::parse(&image).expect("scan");

    // The invoke-dynamic entry points at bootstrap slot 0.
    let entry = source.entries.iter().find(|e| e.index == indy).expect("indy entry");
    assert!(matches!(
        &entry.key,
        ItemKey::Dynamic { tag, name, bsm_index: 0, .. }
            if *tag == CONSTANT_INVOKEDYNAMIC && name == "run"
    ));

    // BootstrapMethods and InnerClasses both surface as class attributes.
    let attrs_at = source.pool_end + 8 + 2 + 2;
    assert_eq!(read_u16(&image, attrs_at), 2);
}

#[test]
fn test_pool_overflow_fails_emission() {
    let mut writer = ClassWriter::new();
    writer.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Big",
        &ClassInfo { super_name: Some(OBJECT), ..Default::default() },
    );
    for i in 0..65_534u32 {
        writer.pool_mut().add_utf8(&format!("pad-{i}"));
    }
    assert!(matches!(writer.to_bytes(), Err(classforge::Error::PoolOverflow { .. })));
}

#[test]
fn test_annotations_payload_passes_through() {
    let mut writer = ClassWriter::new();
    writer.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Annotated",
        &ClassInfo { super_name: Some(OBJECT), ..Default::default() },
    );
    let payload = vec![0x00, 0x01, 0x00, 0x09, 0x00, 0x00];
    writer.set_annotations(payload.clone());

    let image = writer.to_bytes().expect("emit");
    let source = SourcePool::parse(&image).expect("scan");

    let attrs_at = source.pool_end + 8 + 2 + 2;
    assert_eq!(read_u16(&image, attrs_at), 1);
    assert_eq!(read_u32(&image, attrs_at + 4) as usize, payload.len());
    assert_eq!(&image[image.len() - payload.len()..], &payload[..]);
}

#[test]
fn test_from_source_adopts_the_pool_verbatim() {
    let mut original = ClassWriter::new();
    original.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Original",
        &ClassInfo { super_name: Some(OBJECT), ..Default::default() },
    );
    let m = original.add_method(ACC_PUBLIC, "work", "()V", None, &[]);
    original.set_method_code(m, return_void_code());
    let image = original.to_bytes().expect("emit original");

    let original_pool = SourcePool::parse(&image).expect("scan original");
    let pool_bytes = image[original_pool.pool_start..original_pool.pool_end].to_vec();

    let mut rewriter = ClassWriter::from_source(image).expect("seed from image");
    assert_eq!(rewriter.class_version(), V8);
    rewriter.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Rewritten",
        &ClassInfo { super_name: Some(OBJECT), ..Default::default() },
    );
    let rewritten = rewriter.to_bytes().expect("emit rewritten");
    let new_pool = SourcePool::parse(&rewritten).expect("scan rewritten");

    // The adopted pool is a byte-exact prefix of the new one, and the new
    // class name was appended after it.
    assert!(new_pool.next_index > original_pool.next_index);
    assert_eq!(
        &rewritten[new_pool.pool_start..new_pool.pool_start + pool_bytes.len()],
        &pool_bytes[..]
    );
    let this_index = read_u16(&rewritten, new_pool.pool_end + 2);
    assert_eq!(class_name_at(&new_pool, this_index), "com/x/Rewritten");
    assert!(this_index >= original_pool.next_index);
}

#[test]
fn test_copied_method_passes_through_untouched() {
    let mut original = ClassWriter::new();
    original.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Original",
        &ClassInfo { super_name: Some(OBJECT), ..Default::default() },
    );
    let m = original.add_method(ACC_PUBLIC, "work", "()V", None, &[]);
    original.set_method_code(m, return_void_code());
    let image = original.to_bytes().expect("emit original");

    // With no interfaces and no fields, the single method record spans from
    // just past the field block to the empty class-attribute count.
    let source = SourcePool::parse(&image).expect("scan");
    let method_offset = source.pool_end + 12;
    let method_length = image.len() - 2 - method_offset;
    let method_bytes = image[method_offset..method_offset + method_length].to_vec();

    let mut rewriter = ClassWriter::from_source(image).expect("seed");
    rewriter.describe(
        V8,
        ACC_PUBLIC | ACC_SUPER,
        "com/x/Original",
        &ClassInfo { super_name: Some(OBJECT), ..Default::default() },
    );
    rewriter.copy_method(method_offset, method_length);
    let rewritten = rewriter.to_bytes().expect("emit rewritten");

    let new_source = SourcePool::parse(&rewritten).expect("scan rewritten");
    let new_offset = new_source.pool_end + 12;
    assert_eq!(&rewritten[new_offset..new_offset + method_length], &method_bytes[..]);
}
