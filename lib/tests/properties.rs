//! Property-based tests for both codecs
//!
//! - Stack map frames survive an encode/decode round trip, in and out of constructors
//! - Arranging a call uses the same storage in both directions
//! - Aggregate chunks add up to the aggregate
//! - Nothing after the variadic start lands in a float register

use frameabi::abi::*;
use frameabi::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, NameAndTypeConstantIndex, UnsetFieldIndices,
};
use frameabi::jvm::code::RawOffsets;
use frameabi::jvm::verifier::*;
use frameabi::jvm::ParseDescriptor;
use proptest::prelude::*;

type RawType = VerificationType<ClassConstantIndex, u16>;
type Frame = StackMapFrameInfo<u16, ClassConstantIndex, UnsetFieldIndices>;
type Initial = InitialFrame<u16, ClassConstantIndex, UnsetFieldIndices>;

fn verification_type_strategy() -> impl Strategy<Value = RawType> {
    prop_oneof![
        Just(VerificationType::Top),
        Just(VerificationType::Integer),
        Just(VerificationType::Float),
        Just(VerificationType::Double),
        Just(VerificationType::Long),
        Just(VerificationType::Null),
        (1u16..64).prop_map(|index| VerificationType::Object(ClassConstantIndex(ConstantIndex(index)))),
        (0u16..2000).prop_map(VerificationType::Uninitialized),
    ]
}

fn frames_strategy() -> impl Strategy<Value = (Initial, Vec<Frame>)> {
    let locals = prop::collection::vec(verification_type_strategy(), 0..6);
    let stack = prop::collection::vec(verification_type_strategy(), 0..3);
    let initial = prop::collection::vec(verification_type_strategy(), 0..4);
    let frames = prop::collection::vec((0u16..300, locals, stack), 0..20);
    (initial, frames).prop_map(|(initial, frames)| {
        let mut offset: Option<u16> = None;
        let frames = frames
            .into_iter()
            .map(|(delta, locals, stack)| {
                let target = offset.map_or(delta, |previous| previous + delta + 1);
                offset = Some(target);
                Frame::new(target, locals, stack)
            })
            .collect();
        let initial = Initial {
            locals: initial,
            unset_fields: vec![],
        };
        (initial, frames)
    })
}

fn unset_field(class: u16, name_and_type: u16) -> UnsetFieldIndices {
    UnsetFieldIndices {
        class: ClassConstantIndex(ConstantIndex(class)),
        name_and_type: NameAndTypeConstantIndex(ConstantIndex(name_and_type)),
    }
}

/// Frames of a constructor: `this` stays uninitialized for a while, with a shrinking or
/// changing set of fields still to assign
fn larval_frames_strategy() -> impl Strategy<Value = (Initial, Vec<Frame>)> {
    let pool = vec![unset_field(2, 10), unset_field(2, 11), unset_field(3, 12)];
    let locals = prop::collection::vec(verification_type_strategy(), 0..4);
    let stack = prop::collection::vec(verification_type_strategy(), 0..2);
    let mask = prop::collection::vec(any::<bool>(), 3);
    let frames = prop::collection::vec((0u16..100, any::<bool>(), mask, locals, stack), 0..16);
    let initial_locals = prop::collection::vec(verification_type_strategy(), 0..3);
    (initial_locals, frames).prop_map(move |(initial_locals, frames)| {
        let mut offset: Option<u16> = None;
        let frames = frames
            .into_iter()
            .map(|(delta, under_construction, mask, mut locals, stack)| {
                let target = offset.map_or(delta, |previous| previous + delta + 1);
                offset = Some(target);
                if under_construction {
                    locals.insert(0, VerificationType::UninitializedThis);
                    let unset = pool
                        .iter()
                        .zip(mask)
                        .filter(|(_, keep)| *keep)
                        .map(|(field, _)| *field)
                        .collect();
                    Frame::new(target, locals, stack).with_unset_fields(unset)
                } else {
                    let this = ClassConstantIndex(ConstantIndex(1));
                    locals.insert(0, VerificationType::Object(this));
                    Frame::new(target, locals, stack)
                }
            })
            .collect();
        let mut locals = vec![VerificationType::UninitializedThis];
        locals.extend(initial_locals);
        let initial = Initial {
            locals,
            unset_fields: pool.clone(),
        };
        (initial, frames)
    })
}

fn scalar_strategy() -> impl Strategy<Value = char> {
    prop::sample::select(vec!['B', 'S', 'C', 'I', 'J', 'F', 'D', 'Z', 'A'])
}

/// Text of a scalar or a small natural struct
fn layout_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => scalar_strategy().prop_map(String::from),
        1 => prop::collection::vec(scalar_strategy(), 1..6)
            .prop_map(|members| format!("[{}]", members.into_iter().collect::<String>())),
        1 => prop::collection::vec(prop::sample::select(vec!['F', 'D']), 1..5)
            .prop_map(|members| {
                let kind = members[0];
                format!("[{}]", std::iter::repeat(kind).take(members.len()).collect::<String>())
            }),
    ]
}

fn signature_strategy() -> impl Strategy<Value = (String, Option<usize>)> {
    let arguments = prop::collection::vec(layout_strategy(), 0..12);
    let return_layout = prop::option::of(layout_strategy());
    (arguments, return_layout, any::<Option<prop::sample::Index>>()).prop_map(
        |(arguments, return_layout, variadic)| {
            let first_variadic = variadic.map(|index| index.index(arguments.len() + 1));
            let descriptor = format!(
                "({}){}",
                arguments.concat(),
                return_layout.unwrap_or_else(|| String::from("V"))
            );
            (descriptor, first_variadic)
        },
    )
}

fn arrange(
    platform: &Platform,
    descriptor: &str,
    first_variadic_index: Option<usize>,
    for_upcall: bool,
) -> Bindings {
    let descriptor = FunctionDescriptor::parse(descriptor).unwrap();
    let method_type = MethodType::from_descriptor(&descriptor).unwrap();
    let options = LinkerOptions {
        first_variadic_index,
    };
    CallArranger::new(platform)
        .get_bindings(&method_type, &descriptor, for_upcall, &options)
        .unwrap()
}

proptest! {
    #[test]
    fn stack_map_round_trip((initial, frames) in frames_strategy()) {
        let bytes = encode_stack_map(&frames, &initial, &RawOffsets, &mut RawIndices).unwrap();
        let decoded = decode_stack_map(&bytes, &initial, &mut RawOffsets, &mut RawIndices).unwrap();
        prop_assert_eq!(decoded, frames);
    }

    #[test]
    fn constructor_stack_map_round_trip((initial, frames) in larval_frames_strategy()) {
        let bytes = encode_stack_map(&frames, &initial, &RawOffsets, &mut RawIndices).unwrap();
        let decoded = decode_stack_map(&bytes, &initial, &mut RawOffsets, &mut RawIndices).unwrap();
        prop_assert_eq!(decoded, frames);
    }

    #[test]
    fn both_directions_use_the_same_storage(
        (descriptor, first_variadic) in signature_strategy(),
        platform in prop::sample::select(Platform::ALL.to_vec()),
    ) {
        let downcall = arrange(&platform, &descriptor, first_variadic, false);
        let upcall = arrange(&platform, &descriptor, first_variadic, true);
        let downcall_storages: Vec<VMStorage> = downcall.calling_sequence.storages().collect();
        let upcall_storages: Vec<VMStorage> = upcall.calling_sequence.storages().collect();
        prop_assert_eq!(downcall_storages, upcall_storages);
        prop_assert_eq!(downcall.is_in_memory_return, upcall.is_in_memory_return);
    }

    #[test]
    fn chunks_add_up_to_the_aggregate(
        members in prop::collection::vec(prop::sample::select(vec!['B', 'S', 'I', 'J']), 1..10),
    ) {
        let platform = Platform {
            name: "aarch64-wide-aggregates",
            abi: Platform::LINUX_AARCH64.abi.clone(),
            rules: CallingConventionRules {
                max_aggregate_register_size: 128,
                ..Platform::LINUX_AARCH64.rules
            },
        };
        let layout = format!("[{}]", members.into_iter().collect::<String>());
        let size = MemoryLayout::parse(&layout).unwrap().byte_size();
        let bindings = arrange(&platform, &format!("({})V", layout), None, false);

        let widths: Vec<u64> = bindings.calling_sequence.argument_bindings[0]
            .iter()
            .filter_map(|binding| match binding {
                Binding::BufferLoad { byte_width, .. } => Some(*byte_width),
                _ => None,
            })
            .collect();
        prop_assert_eq!(widths.len() as u64, (size + 7) / 8);
        prop_assert_eq!(widths.iter().sum::<u64>(), size);
    }

    #[test]
    fn variadic_arguments_avoid_float_registers(
        (descriptor, first_variadic) in signature_strategy(),
        platform in prop::sample::select(Platform::ALL.to_vec()),
    ) {
        let bindings = arrange(&platform, &descriptor, first_variadic, false);
        let sequence = bindings.calling_sequence;
        if let Some(first) = sequence.first_variadic {
            for bindings in &sequence.argument_bindings[first..] {
                for binding in bindings {
                    if let Binding::VmStore { storage, .. } = binding {
                        prop_assert_ne!(storage.register_class(), Some(RegisterClass::Float));
                    }
                }
            }
        }
    }
}
