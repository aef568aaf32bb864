use frameabi::jvm::class_file::{ConstantsPool, StackMapFrame, StackMapTable};
use frameabi::jvm::code::{LabelResolver, OffsetLabels, SynLabel};
use frameabi::jvm::verifier::*;
use frameabi::jvm::*;

type Frame = StackMapFrameInfo<SynLabel, RefType<BinaryName>, FieldRef>;

fn class(name: &str) -> BinaryName {
    BinaryName::from_str(name).unwrap()
}

fn object(name: &str) -> VerificationType<RefType<BinaryName>, SynLabel> {
    VerificationType::Object(RefType::Object(class(name)))
}

fn field(name: &str, flags: FieldAccessFlags) -> FieldDeclaration {
    FieldDeclaration {
        name: UnqualifiedName::from_str(name).unwrap(),
        descriptor: FieldType::int(),
        access_flags: flags,
    }
}

fn point_constructor() -> MethodContext {
    MethodContext::new(
        class("me/alec/Point"),
        UnqualifiedName::INIT,
        MethodAccessFlags::PUBLIC,
        MethodDescriptor::parse("(II)V").unwrap(),
    )
    .with_larval_fields(vec![
        field("x", FieldAccessFlags::FINAL | FieldAccessFlags::STRICT_INIT),
        field("y", FieldAccessFlags::STRICT_INIT),
        field("count", FieldAccessFlags::STATIC | FieldAccessFlags::STRICT_INIT),
        field("cache", FieldAccessFlags::PRIVATE),
    ])
}

#[test]
fn constructor_round_trip_through_constant_pool() {
    let context = point_constructor();
    let initial = context.initial_frame::<SynLabel>();
    assert_eq!(initial.locals.len(), 3);
    let unset: Vec<&str> = initial.unset_fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(unset, vec!["x", "y"]);

    let mut labels = OffsetLabels::new(20);
    let mut constants = ConstantsPool::new();
    use VerificationType::*;
    let frames: Vec<Frame> = vec![
        // `this.x` assigned
        Frame::new(labels.label_at(4).unwrap(), vec![UninitializedThis, Integer, Integer], vec![])
            .with_unset_fields(vec![initial.unset_fields[1].clone()]),
        // `super()` called
        Frame::new(
            labels.label_at(9).unwrap(),
            vec![object("me/alec/Point"), Integer, Integer],
            vec![],
        ),
        Frame::new(
            labels.label_at(12).unwrap(),
            vec![object("me/alec/Point"), Integer, Integer],
            vec![object("java/lang/String")],
        ),
    ];

    let bytes = encode_stack_map(&frames, &initial, &labels, &mut constants).unwrap();
    assert_eq!(&bytes[0..3], &[0, 3, 246]);
    assert!(!constants.is_empty());

    let decoded = decode_stack_map(&bytes, &initial, &mut labels, &mut constants).unwrap();
    assert_eq!(decoded, frames);
    assert_eq!(labels.len(), 3);
    assert_eq!(decoded[2].frame_type, 64 + 2);

    // The raw table is also available, undecoded
    let table = StackMapTable::read(&bytes).unwrap();
    assert!(matches!(table.0[0], StackMapFrame::EarlyLarval { .. }));
    assert!(matches!(table.0[1], StackMapFrame::Full { .. }));
}

#[test]
fn duplicate_offsets_are_rejected() {
    let context = MethodContext::new(
        class("me/alec/Counter"),
        UnqualifiedName::from_str("bump").unwrap(),
        MethodAccessFlags::STATIC,
        MethodDescriptor::parse("(I)V").unwrap(),
    );
    let initial = context.initial_frame::<SynLabel>();
    let mut labels = OffsetLabels::new(10);
    let five = labels.label_at(5).unwrap();
    let frames: Vec<Frame> = vec![
        Frame::new(five, vec![VerificationType::Integer], vec![]),
        Frame::new(five, vec![VerificationType::Integer], vec![]),
    ];
    let result = encode_stack_map(&frames, &initial, &labels, &mut ConstantsPool::new());
    assert!(matches!(result, Err(Error::DuplicateFrameOffset(5))));
}

#[test]
fn uninitialized_objects_refer_to_labels() {
    let context = MethodContext::new(
        class("me/alec/Factory"),
        UnqualifiedName::from_str("make").unwrap(),
        MethodAccessFlags::STATIC,
        MethodDescriptor::parse("()Lme/alec/Point;").unwrap(),
    );
    let initial = context.initial_frame::<SynLabel>();
    assert!(initial.locals.is_empty());

    let mut labels = OffsetLabels::new(30);
    let new_point = labels.label_at(3).unwrap();
    let uninitialized = VerificationType::Uninitialized(new_point);
    let frames: Vec<Frame> = vec![Frame::new(
        labels.label_at(7).unwrap(),
        vec![],
        vec![uninitialized.clone(), uninitialized],
    )];

    let mut constants = ConstantsPool::new();
    let bytes = encode_stack_map(&frames, &initial, &labels, &mut constants).unwrap();
    let decoded = decode_stack_map(&bytes, &initial, &mut labels, &mut constants).unwrap();
    assert_eq!(decoded, frames);
}

#[test]
fn labels_from_elsewhere_are_unbound() {
    let initial = InitialFrame::default();
    let labels = OffsetLabels::new(10);
    let mut other = OffsetLabels::new(10);
    let stray = other.label_at(2).unwrap();

    let frames: Vec<Frame> = vec![Frame::new(stray, vec![], vec![])];
    assert!(matches!(
        encode_stack_map(&frames, &initial, &labels, &mut ConstantsPool::new()),
        Err(Error::InvalidStackMapFrame {
            frame_index: 0,
            kind: StackMapErrorKind::UnboundLabel
        })
    ));
}

#[test]
fn offsets_past_the_code_are_rejected() {
    let initial: InitialFrame<SynLabel, RefType<BinaryName>, FieldRef> = InitialFrame::default();
    let mut constants = ConstantsPool::new();

    // One same frame with offset delta 12, in 10 bytes of code
    let bytes = [0, 1, 12];
    assert!(matches!(
        decode_stack_map(&bytes, &initial, &mut OffsetLabels::new(10), &mut constants),
        Err(Error::InvalidStackMapFrame {
            frame_index: 0,
            kind: StackMapErrorKind::InvalidOffset(12)
        })
    ));

    // Object type referring to a constant that doesn't exist
    let bytes = [0, 1, 255, 0, 0, 0, 1, 7, 0, 9, 0, 0];
    assert!(matches!(
        decode_stack_map(&bytes, &initial, &mut OffsetLabels::new(10), &mut constants),
        Err(Error::InvalidStackMapFrame {
            frame_index: 0,
            kind: StackMapErrorKind::InvalidConstantIndex(9)
        })
    ));
}
