use super::layout::{align_down, align_up};
use super::{HfaSpill, Platform, RegisterClass, VMStorage, ValueKind, VariadicPolicy};

/// Part of a value placed in one storage location
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StorageChunk {
    pub storage: VMStorage,

    /// Offset of the chunk in the value
    pub offset: u64,

    /// Size of the chunk in bytes
    pub size: u64,
}

/// Hands out registers and stack slots for one direction (arguments or return) of one call
///
/// Registers are used in order and never given back. Once a class runs out, values go on the
/// stack instead.
#[derive(Debug)]
pub struct StorageCalculator<'p> {
    platform: &'p Platform,
    for_arguments: bool,
    variadic: bool,
    consumed: [usize; 2],
    stack_offset: u64,
}

/// Split `start..end` into consecutive chunks of at most `chunk_size` bytes
fn chunk_ranges(start: u64, end: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = vec![];
    let mut offset = start;
    while offset < end {
        let size = chunk_size.min(end - offset);
        ranges.push((offset, size));
        offset += size;
    }
    ranges
}

impl<'p> StorageCalculator<'p> {
    pub fn new(platform: &'p Platform, for_arguments: bool) -> StorageCalculator<'p> {
        StorageCalculator {
            platform,
            for_arguments,
            variadic: false,
            consumed: [0, 0],
            stack_offset: 0,
        }
    }

    pub fn for_arguments(&self) -> bool {
        self.for_arguments
    }

    /// Number of registers of the class handed out (or skipped)
    pub fn consumed(&self, class: RegisterClass) -> usize {
        self.consumed[class.index()]
    }

    /// Bytes of stack used so far
    pub fn stack_offset(&self) -> u64 {
        self.stack_offset
    }

    fn registers(&self, class: RegisterClass) -> &'static [VMStorage] {
        if self.for_arguments {
            self.platform.abi.inputs(class)
        } else {
            self.platform.abi.outputs(class)
        }
    }

    pub fn registers_available(&self, class: RegisterClass) -> usize {
        self.registers(class)
            .len()
            .saturating_sub(self.consumed[class.index()])
    }

    fn next_register(&mut self, class: RegisterClass) -> Option<VMStorage> {
        let register = *self.registers(class).get(self.consumed[class.index()])?;
        self.consumed[class.index()] += 1;
        Some(register)
    }

    /// Mark every register of the class as used
    fn exhaust(&mut self, class: RegisterClass) {
        let total = self.registers(class).len();
        let consumed = &mut self.consumed[class.index()];
        *consumed = (*consumed).max(total);
    }

    /// Allocate a stack slot
    ///
    /// Slots are aligned to at least the stack slot size, and take up a whole number of slots.
    pub fn stack_alloc(&mut self, size: u64, alignment: u64) -> VMStorage {
        let slot_size = self.platform.rules.stack_slot_size;
        let offset = align_up(self.stack_offset, alignment.max(slot_size));
        self.stack_offset = offset + align_up(size, slot_size);
        VMStorage::stack(offset as u32, size as u16)
    }

    fn floats_in_integer_registers(&self) -> bool {
        let rules = &self.platform.rules;
        rules.float_in_integer_registers
            || (self.variadic && rules.variadic == VariadicPolicy::FloatsInIntegerRegisters)
    }

    /// Use up the integer registers (then stack slots) overlapping `size` bytes of arguments
    /// passed in float registers
    fn shadow_float_registers(&mut self, size: u64) {
        if !(self.for_arguments && self.platform.rules.float_shadows_integer) {
            return;
        }
        for (_, size) in chunk_ranges(0, size, self.platform.rules.register_chunk_size) {
            if self.next_register(RegisterClass::Integer).is_none() {
                self.stack_alloc(size, 1);
            }
        }
    }

    /// Storage for a scalar of the given class
    ///
    /// Floats fall back to integer registers (if the platform allows it) before the stack.
    pub fn next_storage(&mut self, class: RegisterClass, size: u64, alignment: u64) -> VMStorage {
        if let Some(register) = self.next_register(class) {
            if class == RegisterClass::Float {
                self.shadow_float_registers(size);
            }
            return register;
        }
        if class == RegisterClass::Float && self.floats_in_integer_registers() {
            if let Some(register) = self.next_register(RegisterClass::Integer) {
                return register;
            }
        }
        self.stack_alloc(size, alignment)
    }

    /// All following arguments are variadic: float registers are off limits from now on
    pub fn adjust_for_varargs(&mut self) {
        self.variadic = true;
        self.exhaust(RegisterClass::Float);
    }

    /// Storage for an aggregate passed in integer register sized chunks
    ///
    /// Without enough integer registers left, platforms that split aggregates put the leading
    /// chunks in the remaining registers and the rest on the stack. Other platforms put the whole
    /// aggregate on the stack (and hand out no more integer registers).
    pub fn struct_storages(&mut self, size: u64, alignment: u64) -> Vec<StorageChunk> {
        let mut ranges = chunk_ranges(0, size, self.platform.rules.register_chunk_size);
        let available = self.registers_available(RegisterClass::Integer);
        if available >= ranges.len() {
            return self.register_chunks(ranges);
        }
        if self.platform.rules.split_aggregates && available > 0 {
            let on_stack = ranges.split_off(available);
            let mut chunks = self.register_chunks(ranges);
            chunks.extend(self.stack_chunks(on_stack, 1));
            chunks
        } else {
            self.exhaust(RegisterClass::Integer);
            self.stack_chunks(ranges, alignment)
        }
    }

    fn register_chunks(&mut self, ranges: Vec<(u64, u64)>) -> Vec<StorageChunk> {
        let mut chunks = Vec::with_capacity(ranges.len());
        for (offset, size) in ranges {
            let storage = match self.next_register(RegisterClass::Integer) {
                Some(register) => register,
                None => self.stack_alloc(size, 1),
            };
            chunks.push(StorageChunk {
                storage,
                offset,
                size,
            });
        }
        chunks
    }

    fn stack_chunks(&mut self, ranges: Vec<(u64, u64)>, alignment: u64) -> Vec<StorageChunk> {
        let mut chunks = Vec::with_capacity(ranges.len());
        for (index, (offset, size)) in ranges.into_iter().enumerate() {
            let alignment = if index == 0 { alignment } else { 1 };
            chunks.push(StorageChunk {
                storage: self.stack_alloc(size, alignment),
                offset,
                size,
            });
        }
        chunks
    }

    /// Storage for a homogeneous float aggregate of `count` elements
    ///
    /// When packing into double-words with an odd number of `float` elements in registers, the
    /// last of those elements is also part of the first packed double-word.
    pub fn hfa_storages(
        &mut self,
        element: ValueKind,
        count: usize,
        alignment: u64,
    ) -> Vec<StorageChunk> {
        let width = element.byte_size();
        let total = width * count as u64;
        let chunk_size = self.platform.rules.register_chunk_size;
        let available = self.registers_available(RegisterClass::Float);

        if available < count {
            match self.platform.rules.hfa_spill {
                HfaSpill::WholeOnStack => {
                    self.exhaust(RegisterClass::Float);
                    let ranges = chunk_ranges(0, total, chunk_size);
                    return self.stack_chunks(ranges, alignment);
                }
                HfaSpill::AsIntegerAggregate => return self.struct_storages(total, alignment),
                HfaSpill::PackIntoDoubleWords => (),
            }
        }

        let mut chunks = Vec::with_capacity(count);
        for index in 0..count.min(available) {
            if let Some(storage) = self.next_register(RegisterClass::Float) {
                chunks.push(StorageChunk {
                    storage,
                    offset: index as u64 * width,
                    size: width,
                });
            }
        }
        if available >= count {
            self.shadow_float_registers(total);
        } else {
            let spill_start = align_down(available as u64 * width, chunk_size);
            self.shadow_float_registers(spill_start);
            for (offset, size) in chunk_ranges(spill_start, total, chunk_size) {
                let storage = match self.next_register(RegisterClass::Integer) {
                    Some(register) => register,
                    None => self.stack_alloc(size, chunk_size),
                };
                chunks.push(StorageChunk {
                    storage,
                    offset,
                    size,
                });
            }
        }
        chunks
    }
}
