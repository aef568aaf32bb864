//! Execute binding programs against a simulated native frame and native memory

use super::layout::align_up;
use super::{Binding, Bindings, Carrier, Error, ExecutionErrorKind, VMStorage};
use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use std::collections::HashMap;

/// Region of native memory
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Segment {
    pub address: u64,
    pub size: u64,
}

/// Managed value
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),

    /// Carried by both [`Carrier::Address`] and [`Carrier::Segment`]
    Segment(Segment),
}

impl Value {
    pub fn carrier(&self) -> Carrier {
        match self {
            Value::Byte(_) => Carrier::Byte,
            Value::Short(_) => Carrier::Short,
            Value::Char(_) => Carrier::Char,
            Value::Int(_) => Carrier::Int,
            Value::Long(_) => Carrier::Long,
            Value::Float(_) => Carrier::Float,
            Value::Double(_) => Carrier::Double,
            Value::Boolean(_) => Carrier::Boolean,
            Value::Segment(_) => Carrier::Segment,
        }
    }

    pub fn has_carrier(&self, carrier: Carrier) -> bool {
        match self {
            Value::Segment(_) => matches!(carrier, Carrier::Address | Carrier::Segment),
            _ => self.carrier() == carrier,
        }
    }

    /// Bits of a scalar value, zero-extended to 64 bits
    pub fn to_raw(&self) -> Result<u64, ExecutionErrorKind> {
        Ok(match *self {
            Value::Byte(b) => b as u8 as u64,
            Value::Short(s) => s as u16 as u64,
            Value::Char(c) => c as u64,
            Value::Int(i) => i as u32 as u64,
            Value::Long(l) => l as u64,
            Value::Float(f) => f.to_bits() as u64,
            Value::Double(d) => d.to_bits(),
            Value::Boolean(z) => z as u64,
            Value::Segment(_) => return Err(ExecutionErrorKind::UnsupportedCarrier(Carrier::Segment)),
        })
    }

    /// Scalar value from the low bits of `raw`
    pub fn from_raw(carrier: Carrier, raw: u64) -> Result<Value, ExecutionErrorKind> {
        Ok(match carrier {
            Carrier::Byte => Value::Byte(raw as u8 as i8),
            Carrier::Short => Value::Short(raw as u16 as i16),
            Carrier::Char => Value::Char(raw as u16),
            Carrier::Int => Value::Int(raw as u32 as i32),
            Carrier::Long => Value::Long(raw as i64),
            Carrier::Float => Value::Float(f32::from_bits(raw as u32)),
            Carrier::Double => Value::Double(f64::from_bits(raw)),
            Carrier::Boolean => Value::Boolean(raw as u8 != 0),
            Carrier::Address | Carrier::Segment => {
                return Err(ExecutionErrorKind::UnsupportedCarrier(carrier))
            }
        })
    }
}

/// Bump allocated native memory, little-endian
#[derive(Clone, Debug)]
pub struct NativeMemory {
    bytes: Vec<u8>,
}

impl Default for NativeMemory {
    fn default() -> Self {
        NativeMemory::new()
    }
}

impl NativeMemory {
    /// Address of the first byte (so that `0` is never a valid address)
    pub const BASE: u64 = 0x1000;

    pub fn new() -> NativeMemory {
        NativeMemory { bytes: vec![] }
    }

    /// Allocate zeroed memory
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Segment {
        let end = NativeMemory::BASE + self.bytes.len() as u64;
        let address = align_up(end, alignment.max(1));
        self.bytes
            .resize((address + size - NativeMemory::BASE) as usize, 0);
        Segment { address, size }
    }

    fn range(&self, address: u64, size: u64) -> Result<std::ops::Range<usize>, ExecutionErrorKind> {
        let out_of_bounds = ExecutionErrorKind::OutOfBounds { address, size };
        let start = address.checked_sub(NativeMemory::BASE).ok_or(out_of_bounds.clone())?;
        let end = start.checked_add(size).ok_or(out_of_bounds.clone())?;
        if end > self.bytes.len() as u64 {
            return Err(out_of_bounds);
        }
        Ok(start as usize..end as usize)
    }

    pub fn read(&self, address: u64, size: u64) -> Result<&[u8], ExecutionErrorKind> {
        let range = self.range(address, size)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<(), ExecutionErrorKind> {
        let range = self.range(address, bytes.len() as u64)?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    fn read_uint(&self, address: u64, width: u64) -> Result<u64, ExecutionErrorKind> {
        if width == 0 {
            return Ok(0);
        }
        let bytes = self.read(address, width.min(8))?;
        Ok(LittleEndian::read_uint(bytes, bytes.len()))
    }

    fn write_uint(&mut self, address: u64, value: u64, width: u64) -> Result<(), ExecutionErrorKind> {
        let mut buffer = [0; 8];
        LittleEndian::write_u64(&mut buffer, value);
        self.write(address, &buffer[..width.min(8) as usize])
    }

    /// Check that `width` bytes at `offset` lie within the segment
    fn check(segment: Segment, offset: u64, width: u64) -> Result<u64, ExecutionErrorKind> {
        match offset.checked_add(width) {
            Some(end) if end <= segment.size => Ok(segment.address + offset),
            _ => Err(ExecutionErrorKind::OutOfBounds {
                address: segment.address.saturating_add(offset),
                size: width,
            }),
        }
    }

    /// Write a scalar into a segment
    pub fn set(&mut self, segment: Segment, offset: u64, value: Value) -> Result<(), ExecutionErrorKind> {
        let width = value.carrier().byte_width();
        let address = NativeMemory::check(segment, offset, width)?;
        self.write_uint(address, value.to_raw()?, width)
    }

    /// Read a scalar from a segment
    pub fn get(&self, segment: Segment, offset: u64, carrier: Carrier) -> Result<Value, ExecutionErrorKind> {
        let width = carrier.byte_width();
        let address = NativeMemory::check(segment, offset, width)?;
        Value::from_raw(carrier, self.read_uint(address, width)?)
    }

    /// Copy the contents of one segment into another (as much as fits)
    pub fn copy(&mut self, from: Segment, to: Segment) -> Result<(), ExecutionErrorKind> {
        let bytes = self.read(from.address, from.size.min(to.size))?.to_vec();
        self.write(to.address, &bytes)
    }
}

/// Native registers and outgoing stack area at the point of a call
#[derive(Clone, Debug, Default)]
pub struct NativeFrame {
    registers: HashMap<VMStorage, u64>,
    stack: Vec<u8>,
}

impl NativeFrame {
    pub fn new() -> NativeFrame {
        NativeFrame::default()
    }

    /// Bytes of outgoing stack area written so far
    pub fn stack_size(&self) -> u64 {
        self.stack.len() as u64
    }

    pub fn write(&mut self, storage: VMStorage, raw: u64) {
        match storage {
            VMStorage::Register { .. } => {
                self.registers.insert(storage, raw);
            }
            VMStorage::Stack { offset, size } => {
                let start = offset as usize;
                let width = (size as usize).min(8);
                if self.stack.len() < start + width {
                    self.stack.resize(start + width, 0);
                }
                let mut buffer = [0; 8];
                LittleEndian::write_u64(&mut buffer, raw);
                self.stack[start..start + width].copy_from_slice(&buffer[..width]);
            }
        }
    }

    pub fn read(&self, storage: VMStorage) -> Result<u64, ExecutionErrorKind> {
        let uninitialized = || ExecutionErrorKind::UninitializedStorage(storage.to_string());
        match storage {
            VMStorage::Register { .. } => self.registers.get(&storage).copied().ok_or_else(uninitialized),
            VMStorage::Stack { offset, size } => {
                let start = offset as usize;
                let width = (size as usize).min(8);
                match self.stack.get(start..start + width) {
                    Some(bytes) if width > 0 => Ok(LittleEndian::read_uint(bytes, width)),
                    Some(_) => Ok(0),
                    None => Err(uninitialized()),
                }
            }
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, ExecutionErrorKind> {
    stack.pop().ok_or(ExecutionErrorKind::StackUnderflow)
}

fn pop_segment(stack: &mut Vec<Value>) -> Result<Segment, ExecutionErrorKind> {
    match pop(stack)? {
        Value::Segment(segment) => Ok(segment),
        other => Err(ExecutionErrorKind::TypeMismatch {
            expected: Carrier::Segment,
            found: format!("{:?}", other),
        }),
    }
}

fn pop_carrier(stack: &mut Vec<Value>, carrier: Carrier) -> Result<Value, ExecutionErrorKind> {
    let value = pop(stack)?;
    if value.has_carrier(carrier) {
        Ok(value)
    } else {
        Err(ExecutionErrorKind::TypeMismatch {
            expected: carrier,
            found: format!("{:?}", value),
        })
    }
}

/// Run one binding program
fn interpret(
    bindings: &[Binding],
    stack: &mut Vec<Value>,
    frame: &mut NativeFrame,
    memory: &mut NativeMemory,
) -> Result<(), ExecutionErrorKind> {
    for binding in bindings {
        trace!("{} on {:?}", binding, stack);
        match *binding {
            Binding::VmStore { storage, carrier } => {
                let value = pop_carrier(stack, carrier)?;
                frame.write(storage, value.to_raw()?);
            }
            Binding::VmLoad { storage, carrier } => {
                stack.push(Value::from_raw(carrier, frame.read(storage)?)?);
            }
            Binding::BufferStore {
                offset,
                carrier,
                byte_width,
            } => {
                let value = pop_carrier(stack, carrier)?;
                let segment = pop_segment(stack)?;
                let address = NativeMemory::check(segment, offset, byte_width)?;
                memory.write_uint(address, value.to_raw()?, byte_width)?;
            }
            Binding::BufferLoad {
                offset,
                carrier,
                byte_width,
            } => {
                let segment = pop_segment(stack)?;
                let address = NativeMemory::check(segment, offset, byte_width)?;
                stack.push(Value::from_raw(carrier, memory.read_uint(address, byte_width)?)?);
            }
            Binding::Copy { size, alignment } => {
                let source = pop_segment(stack)?;
                let copy = memory.allocate(size, alignment);
                memory.copy(source, copy)?;
                stack.push(Value::Segment(copy));
            }
            Binding::Allocate { size, alignment } => {
                stack.push(Value::Segment(memory.allocate(size, alignment)));
            }
            Binding::BoxAddress { size, .. } => {
                let address = pop_carrier(stack, Carrier::Long)?.to_raw()?;
                stack.push(Value::Segment(Segment { address, size }));
            }
            Binding::UnboxAddress => {
                let segment = pop_segment(stack)?;
                stack.push(Value::Long(segment.address as i64));
            }
            Binding::Dup => {
                let top = *stack.last().ok_or(ExecutionErrorKind::StackUnderflow)?;
                stack.push(top);
            }
        }
    }
    Ok(())
}

/// Run a program that turns one value into nothing
fn consume(
    bindings: &[Binding],
    value: Value,
    frame: &mut NativeFrame,
    memory: &mut NativeMemory,
) -> Result<(), ExecutionErrorKind> {
    let mut stack = vec![value];
    interpret(bindings, &mut stack, frame, memory)?;
    match stack.len() {
        0 => Ok(()),
        n => Err(ExecutionErrorKind::LeftoverValues(n)),
    }
}

/// Run a program that turns nothing into one value
fn produce(
    bindings: &[Binding],
    frame: &mut NativeFrame,
    memory: &mut NativeMemory,
) -> Result<Value, ExecutionErrorKind> {
    let mut stack = vec![];
    interpret(bindings, &mut stack, frame, memory)?;
    let value = pop(&mut stack)?;
    match stack.len() {
        0 => Ok(value),
        n => Err(ExecutionErrorKind::LeftoverValues(n)),
    }
}

/// Managed to native call
#[derive(Clone, Debug)]
pub struct DowncallHandle {
    bindings: Bindings,
}

impl DowncallHandle {
    pub fn new(bindings: Bindings) -> DowncallHandle {
        DowncallHandle { bindings }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Call `target` with the arguments moved into a fresh native frame
    ///
    /// `target` stands in for the native function: it reads its arguments from the frame and
    /// writes its return value back into it (or into the return buffer). Values returned in memory
    /// come back as a segment.
    pub fn invoke<F>(
        &self,
        memory: &mut NativeMemory,
        arguments: &[Value],
        target: F,
    ) -> Result<Option<Value>, Error>
    where
        F: FnOnce(&mut NativeFrame, &mut NativeMemory),
    {
        let sequence = &self.bindings.calling_sequence;
        let mut values = Vec::with_capacity(sequence.argument_count());
        let buffer = sequence
            .return_in_memory
            .as_ref()
            .map(|layout| memory.allocate(layout.byte_size(), layout.byte_alignment()));
        if let Some(buffer) = buffer {
            values.push(Value::Segment(buffer));
        }
        values.extend_from_slice(arguments);
        if values.len() != sequence.argument_count() {
            return Err(Error::from(ExecutionErrorKind::ArgumentCount {
                expected: sequence.argument_count() - usize::from(buffer.is_some()),
                found: arguments.len(),
            }));
        }

        let mut frame = NativeFrame::new();
        for (value, bindings) in values.into_iter().zip(&sequence.argument_bindings) {
            consume(bindings, value, &mut frame, memory)?;
        }
        target(&mut frame, memory);

        if let Some(buffer) = buffer {
            Ok(Some(Value::Segment(buffer)))
        } else if sequence.has_return_bindings() {
            Ok(Some(produce(&sequence.return_bindings, &mut frame, memory)?))
        } else {
            Ok(None)
        }
    }
}

/// Makes native entry points for managed functions of one signature
#[derive(Clone, Debug)]
pub struct UpcallStubFactory {
    bindings: Bindings,
}

impl UpcallStubFactory {
    pub fn new(bindings: Bindings) -> UpcallStubFactory {
        UpcallStubFactory { bindings }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Entry point that calls `target`
    ///
    /// `target` receives the managed arguments (aggregates as segments) and returns the managed
    /// return value, if any.
    pub fn make_stub<F>(&self, target: F) -> UpcallStub<F>
    where
        F: FnMut(&mut NativeMemory, &[Value]) -> Option<Value>,
    {
        UpcallStub {
            bindings: self.bindings.clone(),
            target,
        }
    }
}

/// Native entry point into a managed function
pub struct UpcallStub<F> {
    bindings: Bindings,
    target: F,
}

impl<F> UpcallStub<F>
where
    F: FnMut(&mut NativeMemory, &[Value]) -> Option<Value>,
{
    /// Handle a native call whose arguments are in `frame`
    pub fn call(&mut self, frame: &mut NativeFrame, memory: &mut NativeMemory) -> Result<(), Error> {
        let sequence = &self.bindings.calling_sequence;
        let mut arguments = Vec::with_capacity(sequence.argument_count());
        for bindings in &sequence.argument_bindings {
            arguments.push(produce(bindings, frame, memory)?);
        }

        let buffer = match &sequence.return_in_memory {
            Some(_) if arguments.is_empty() => return Err(ExecutionErrorKind::StackUnderflow.into()),
            Some(_) => match arguments.remove(0) {
                Value::Segment(buffer) => Some(buffer),
                other => {
                    return Err(Error::from(ExecutionErrorKind::TypeMismatch {
                        expected: Carrier::Segment,
                        found: format!("{:?}", other),
                    }))
                }
            },
            None => None,
        };

        let result = (self.target)(memory, &arguments);
        match (buffer, result) {
            (Some(buffer), Some(Value::Segment(value))) => memory.copy(value, buffer)?,
            (Some(_), Some(other)) => {
                return Err(Error::from(ExecutionErrorKind::TypeMismatch {
                    expected: Carrier::Segment,
                    found: format!("{:?}", other),
                }))
            }
            (None, Some(value)) if sequence.has_return_bindings() => {
                consume(&sequence.return_bindings, value, frame, memory)?
            }
            (_, None) if buffer.is_some() || sequence.has_return_bindings() => {
                return Err(ExecutionErrorKind::MissingReturnValue.into())
            }
            (None, Some(_)) => return Err(ExecutionErrorKind::LeftoverValues(1).into()),
            (_, None) => (),
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn raw_values() {
        assert_eq!(Value::Byte(-1).to_raw(), Ok(0xff));
        assert_eq!(Value::Int(-2).to_raw(), Ok(0xffff_fffe));
        assert_eq!(Value::from_raw(Carrier::Int, 0xffff_fffe), Ok(Value::Int(-2)));
        assert_eq!(Value::from_raw(Carrier::Float, 1.5f32.to_bits() as u64), Ok(Value::Float(1.5)));
        assert_eq!(Value::from_raw(Carrier::Boolean, 0x100), Ok(Value::Boolean(false)));
        assert!(Value::from_raw(Carrier::Segment, 0).is_err());
    }

    #[test]
    fn memory_bounds() {
        let mut memory = NativeMemory::new();
        let first = memory.allocate(3, 1);
        let second = memory.allocate(8, 8);
        assert_eq!(first.address, NativeMemory::BASE);
        assert_eq!(second.address, NativeMemory::BASE + 8);

        memory.set(second, 4, Value::Int(7)).unwrap();
        assert_eq!(memory.get(second, 4, Carrier::Int), Ok(Value::Int(7)));
        assert_eq!(memory.get(second, 0, Carrier::Int), Ok(Value::Int(0)));
        assert!(memory.set(second, 6, Value::Int(7)).is_err());
        assert!(memory.read(0, 1).is_err());
        assert!(memory.read(NativeMemory::BASE + 16, 1).is_err());
    }

    #[test]
    fn frame_storage() {
        let mut frame = NativeFrame::new();
        let x0 = VMStorage::integer(0, "x0");
        assert!(matches!(frame.read(x0), Err(ExecutionErrorKind::UninitializedStorage(_))));
        frame.write(x0, 42);
        assert_eq!(frame.read(x0), Ok(42));

        frame.write(VMStorage::stack(8, 4), 0x1122_3344_5566);
        assert_eq!(frame.stack_size(), 12);
        assert_eq!(frame.read(VMStorage::stack(8, 4)), Ok(0x3344_5566));
        assert!(frame.read(VMStorage::stack(16, 8)).is_err());
    }

    #[test]
    fn struct_round_trip_through_registers() {
        let x0 = VMStorage::integer(0, "x0");
        let x1 = VMStorage::integer(1, "x1");
        let unbox = [
            Binding::Dup,
            Binding::BufferLoad { offset: 0, carrier: Carrier::Long, byte_width: 8 },
            Binding::VmStore { storage: x0, carrier: Carrier::Long },
            Binding::BufferLoad { offset: 8, carrier: Carrier::Int, byte_width: 4 },
            Binding::VmStore { storage: x1, carrier: Carrier::Int },
        ];
        let boxing = [
            Binding::Allocate { size: 12, alignment: 4 },
            Binding::Dup,
            Binding::VmLoad { storage: x0, carrier: Carrier::Long },
            Binding::BufferStore { offset: 0, carrier: Carrier::Long, byte_width: 8 },
            Binding::Dup,
            Binding::VmLoad { storage: x1, carrier: Carrier::Int },
            Binding::BufferStore { offset: 8, carrier: Carrier::Int, byte_width: 4 },
        ];

        let mut memory = NativeMemory::new();
        let mut frame = NativeFrame::new();
        let source = memory.allocate(12, 4);
        memory.set(source, 0, Value::Long(-5)).unwrap();
        memory.set(source, 8, Value::Int(9)).unwrap();

        consume(&unbox, Value::Segment(source), &mut frame, &mut memory).unwrap();
        let copy = match produce(&boxing, &mut frame, &mut memory).unwrap() {
            Value::Segment(copy) => copy,
            other => panic!("expected a segment, got {:?}", other),
        };
        assert_ne!(copy, source);
        assert_eq!(memory.read(copy.address, 12), memory.read(source.address, 12));
    }

    #[test]
    fn malformed_programs() {
        let mut memory = NativeMemory::new();
        let mut frame = NativeFrame::new();
        let x0 = VMStorage::integer(0, "x0");

        assert_eq!(
            consume(&[Binding::Dup], Value::Int(1), &mut frame, &mut memory),
            Err(ExecutionErrorKind::LeftoverValues(2))
        );
        assert_eq!(
            produce(&[Binding::UnboxAddress], &mut frame, &mut memory),
            Err(ExecutionErrorKind::StackUnderflow)
        );
        assert!(matches!(
            consume(
                &[Binding::VmStore { storage: x0, carrier: Carrier::Long }],
                Value::Int(1),
                &mut frame,
                &mut memory
            ),
            Err(ExecutionErrorKind::TypeMismatch { expected: Carrier::Long, .. })
        ));
    }
}
