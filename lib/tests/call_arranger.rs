use frameabi::abi::*;
use frameabi::jvm::ParseDescriptor;

fn signature(descriptor: &str) -> (MethodType, FunctionDescriptor) {
    let descriptor = FunctionDescriptor::parse(descriptor).unwrap();
    let method_type = MethodType::from_descriptor(&descriptor).unwrap();
    (method_type, descriptor)
}

fn segment(value: Value) -> Segment {
    match value {
        Value::Segment(segment) => segment,
        other => panic!("expected a segment, got {:?}", other),
    }
}

fn x(index: u16) -> VMStorage {
    Platform::LINUX_AARCH64.abi.integer_inputs[index as usize]
}

fn v(index: u16) -> VMStorage {
    Platform::LINUX_AARCH64.abi.float_inputs[index as usize]
}

#[test]
fn struct_chunks_cover_the_struct_exactly() {
    let platform = Platform {
        name: "aarch64-wide-aggregates",
        abi: Platform::LINUX_AARCH64.abi.clone(),
        rules: CallingConventionRules {
            max_aggregate_register_size: 32,
            ..Platform::LINUX_AARCH64.rules
        },
    };
    let (method_type, descriptor) = signature("([IIIII])V");
    let bindings = CallArranger::new(&platform)
        .get_bindings(&method_type, &descriptor, false, &LinkerOptions::default())
        .unwrap();

    let chunk_sizes: Vec<u64> = bindings.calling_sequence.argument_bindings[0]
        .iter()
        .filter_map(|binding| match binding {
            Binding::BufferLoad { byte_width, .. } => Some(*byte_width),
            _ => None,
        })
        .collect();
    assert_eq!(chunk_sizes, vec![8, 8, 4]);
    assert_eq!(
        bindings.calling_sequence.argument_bindings[0].last(),
        Some(&Binding::VmStore {
            storage: x(2),
            carrier: Carrier::Int
        })
    );
}

#[test]
fn variadic_floats_never_use_float_registers() {
    let (method_type, descriptor) = signature("(IIF)V");
    let options = LinkerOptions::variadic(2);

    let linux = CallArranger::new(&Platform::LINUX_AARCH64)
        .get_bindings(&method_type, &descriptor, false, &options)
        .unwrap();
    assert_eq!(
        linux.calling_sequence.argument_bindings[2],
        vec![Binding::VmStore {
            storage: VMStorage::stack(0, 4),
            carrier: Carrier::Float
        }]
    );

    let windows = CallArranger::new(&Platform::WINDOWS_AARCH64)
        .get_bindings(&method_type, &descriptor, false, &options)
        .unwrap();
    assert_eq!(
        windows.calling_sequence.argument_bindings[2],
        vec![Binding::VmStore {
            storage: x(2),
            carrier: Carrier::Float
        }]
    );
}

#[test]
fn downcall_with_struct_and_double() {
    let (method_type, descriptor) = signature("([JJ]D)D");
    let handle = CallArranger::new(&Platform::LINUX_AARCH64)
        .arrange_downcall(&method_type, &descriptor, &LinkerOptions::default())
        .unwrap();

    let mut memory = NativeMemory::new();
    let pair = memory.allocate(16, 8);
    memory.set(pair, 0, Value::Long(3)).unwrap();
    memory.set(pair, 8, Value::Long(4)).unwrap();

    let result = handle
        .invoke(&mut memory, &[Value::Segment(pair), Value::Double(0.5)], |frame, _| {
            let first = frame.read(x(0)).unwrap() as i64;
            let second = frame.read(x(1)).unwrap() as i64;
            let scale = f64::from_bits(frame.read(v(0)).unwrap());
            let sum = (first + second) as f64 + scale;
            frame.write(v(0), sum.to_bits());
        })
        .unwrap();
    assert_eq!(result, Some(Value::Double(7.5)));
}

#[test]
fn downcall_returning_in_memory() {
    let (method_type, descriptor) = signature("(J)[JJJ]");
    let handle = CallArranger::new(&Platform::LINUX_AARCH64)
        .arrange_downcall(&method_type, &descriptor, &LinkerOptions::default())
        .unwrap();
    assert!(handle.bindings().is_in_memory_return);

    let mut memory = NativeMemory::new();
    let result = handle
        .invoke(&mut memory, &[Value::Long(10)], |frame, memory| {
            let buffer = Segment {
                address: frame.read(x(8)).unwrap(),
                size: 24,
            };
            let base = frame.read(x(0)).unwrap() as i64;
            for index in 0..3 {
                memory
                    .set(buffer, index * 8, Value::Long(base + index as i64))
                    .unwrap();
            }
        })
        .unwrap()
        .unwrap();

    let result = segment(result);
    assert_eq!(result.size, 24);
    let values: Vec<Value> = (0..3)
        .map(|index| memory.get(result, index * 8, Carrier::Long).unwrap())
        .collect();
    assert_eq!(values, vec![Value::Long(10), Value::Long(11), Value::Long(12)]);
}

#[test]
fn downcall_argument_count_is_checked() {
    let (method_type, descriptor) = signature("(II)V");
    let handle = CallArranger::new(&Platform::LINUX_RISCV64)
        .arrange_downcall(&method_type, &descriptor, &LinkerOptions::default())
        .unwrap();
    let result = handle.invoke(&mut NativeMemory::new(), &[Value::Int(1)], |_, _| ());
    assert_eq!(
        result,
        Err(Error::Execution(ExecutionErrorKind::ArgumentCount {
            expected: 2,
            found: 1
        }))
    );
}

#[test]
fn upcall_with_float_aggregate_and_pointer() {
    let (method_type, descriptor) = signature("(I[DD]A*J)J");
    let factory = CallArranger::new(&Platform::LINUX_AARCH64)
        .arrange_upcall(&method_type, &descriptor, &LinkerOptions::default())
        .unwrap();

    let mut memory = NativeMemory::new();
    let counter = memory.allocate(8, 8);
    memory.set(counter, 0, Value::Long(100)).unwrap();

    let mut frame = NativeFrame::new();
    frame.write(x(0), 5);
    frame.write(v(0), 1.5f64.to_bits());
    frame.write(v(1), 2.5f64.to_bits());
    frame.write(x(1), counter.address);

    let mut calls = 0;
    let mut stub = factory.make_stub(|memory, arguments| {
        calls += 1;
        let base = match arguments[0] {
            Value::Int(base) => base as f64,
            other => panic!("expected an int, got {:?}", other),
        };
        let pair = segment(arguments[1]);
        let pointer = segment(arguments[2]);
        assert_eq!(pointer.size, 8);

        let first = memory.get(pair, 0, Carrier::Double).unwrap();
        let second = memory.get(pair, 8, Carrier::Double).unwrap();
        let count = memory.get(pointer, 0, Carrier::Long).unwrap();
        match (first, second, count) {
            (Value::Double(a), Value::Double(b), Value::Long(c)) => {
                Some(Value::Long((base + a + b) as i64 + c))
            }
            other => panic!("unexpected values {:?}", other),
        }
    });
    stub.call(&mut frame, &mut memory).unwrap();
    drop(stub);

    assert_eq!(calls, 1);
    assert_eq!(frame.read(x(0)), Ok(109));
}

#[test]
fn upcall_returning_in_memory() {
    let platform = &Platform::LINUX_PPC64LE;
    let (method_type, descriptor) = signature("(S)[JJJ]");
    let factory = CallArranger::new(platform)
        .arrange_upcall(&method_type, &descriptor, &LinkerOptions::default())
        .unwrap();
    assert_eq!(factory.bindings().calling_sequence.argument_count(), 2);

    let mut memory = NativeMemory::new();
    let buffer = memory.allocate(24, 8);
    let mut frame = NativeFrame::new();
    frame.write(platform.abi.integer_inputs[0], buffer.address);
    frame.write(platform.abi.integer_inputs[1], 0xfffe);

    let mut stub = factory.make_stub(|memory, arguments| {
        assert_eq!(arguments, &[Value::Short(-2)]);
        let result = memory.allocate(24, 8);
        memory.set(result, 16, Value::Long(-2)).unwrap();
        Some(Value::Segment(result))
    });
    stub.call(&mut frame, &mut memory).unwrap();
    assert_eq!(memory.get(buffer, 16, Carrier::Long), Ok(Value::Long(-2)));
}

#[test]
fn upcall_missing_return_value() {
    let (method_type, descriptor) = signature("()I");
    let factory = CallArranger::new(&Platform::LINUX_AARCH64)
        .arrange_upcall(&method_type, &descriptor, &LinkerOptions::default())
        .unwrap();
    let mut stub = factory.make_stub(|_, _| None);
    assert_eq!(
        stub.call(&mut NativeFrame::new(), &mut NativeMemory::new()),
        Err(Error::Execution(ExecutionErrorKind::MissingReturnValue))
    );
}

#[test]
fn packed_float_aggregate_overlaps_one_element() {
    let platform = &Platform::LINUX_PPC64LE;
    let (method_type, descriptor) = signature("(DDDDDDDDDD[FFFFFF])V");
    let handle = CallArranger::new(platform)
        .arrange_downcall(&method_type, &descriptor, &LinkerOptions::default())
        .unwrap();

    let aggregate = &handle.bindings().calling_sequence.argument_bindings[10];
    let loads: Vec<(u64, u64)> = aggregate
        .iter()
        .filter_map(|binding| match binding {
            Binding::BufferLoad {
                offset, byte_width, ..
            } => Some((*offset, *byte_width)),
            _ => None,
        })
        .collect();
    assert_eq!(loads, vec![(0, 4), (4, 4), (8, 4), (8, 8), (16, 8)]);

    let mut memory = NativeMemory::new();
    let floats = memory.allocate(24, 4);
    for index in 0..6 {
        memory
            .set(floats, index * 4, Value::Float(index as f32))
            .unwrap();
    }
    let mut arguments: Vec<Value> = (0..10).map(|index| Value::Double(index as f64)).collect();
    arguments.push(Value::Segment(floats));

    // The doubles already shadowed every integer register
    let overflow = VMStorage::stack(24, 8);
    let f13 = platform.abi.float_inputs[12];
    handle
        .invoke(&mut memory, &arguments, |frame, _| {
            assert_eq!(frame.read(f13), Ok(2.0f32.to_bits() as u64));
            let packed = frame.read(overflow).unwrap();
            assert_eq!(packed as u32, 2.0f32.to_bits());
            assert_eq!((packed >> 32) as u32, 3.0f32.to_bits());
        })
        .unwrap();
}
