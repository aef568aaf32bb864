use super::{ABIDescriptor, VMStorage};

/// What happens to a homogeneous float aggregate when there aren't enough float registers left
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum HfaSpill {
    /// The whole aggregate goes on the stack and no more float registers are used
    WholeOnStack,

    /// Leading elements go in the remaining float registers, the rest is packed into 8 byte
    /// double-words passed like integers
    PackIntoDoubleWords,

    /// The aggregate is passed like any other aggregate of its size, in integer registers and then
    /// on the stack
    AsIntegerAggregate,
}

/// How arguments in the variadic part of a call are passed
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum VariadicPolicy {
    /// Like other arguments, except that float registers are off limits
    Standard,

    /// Floats travel in integer registers and float aggregates are not treated specially
    FloatsInIntegerRegisters,
}

/// Where the address of a return buffer goes when a value is returned in memory
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum IndirectResult {
    /// Hidden first argument, allocated like any other pointer argument
    LeadingArgument,

    /// Register reserved for the purpose (not counted against argument registers)
    DedicatedRegister(VMStorage),
}

/// Platform specific rules for mapping layouts onto storage
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CallingConventionRules {
    /// Aggregates passed in integer registers are split into chunks of this many bytes
    pub register_chunk_size: u64,

    /// Largest aggregate argument passed by value (larger ones are passed by reference)
    pub max_aggregate_register_size: u64,

    /// Largest aggregate returned in registers (larger ones are returned in memory)
    pub max_aggregate_return_size: u64,

    /// Can an aggregate argument start in the last integer registers and continue on the stack?
    pub split_aggregates: bool,

    /// Most elements a float aggregate can have and still get float registers
    pub max_hfa_elements: usize,

    pub hfa_spill: HfaSpill,

    /// Can floats fall back to integer registers once float registers run out?
    pub float_in_integer_registers: bool,

    /// Does every float register argument also use up the integer register (or, once those run
    /// out, the stack slot) in the same position?
    pub float_shadows_integer: bool,

    pub variadic: VariadicPolicy,
    pub indirect_result: IndirectResult,

    /// Size and minimum alignment of stack argument slots
    pub stack_slot_size: u64,
}

/// Calling convention of a target
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Platform {
    pub name: &'static str,
    pub abi: ABIDescriptor,
    pub rules: CallingConventionRules,
}

const AARCH64_INTEGER_ARGUMENTS: &[VMStorage] = &[
    VMStorage::integer(0, "x0"),
    VMStorage::integer(1, "x1"),
    VMStorage::integer(2, "x2"),
    VMStorage::integer(3, "x3"),
    VMStorage::integer(4, "x4"),
    VMStorage::integer(5, "x5"),
    VMStorage::integer(6, "x6"),
    VMStorage::integer(7, "x7"),
];

const AARCH64_FLOAT_ARGUMENTS: &[VMStorage] = &[
    VMStorage::float(0, "v0"),
    VMStorage::float(1, "v1"),
    VMStorage::float(2, "v2"),
    VMStorage::float(3, "v3"),
    VMStorage::float(4, "v4"),
    VMStorage::float(5, "v5"),
    VMStorage::float(6, "v6"),
    VMStorage::float(7, "v7"),
];

const AARCH64_VOLATILE_INTEGERS: &[VMStorage] = &[
    VMStorage::integer(0, "x0"),
    VMStorage::integer(1, "x1"),
    VMStorage::integer(2, "x2"),
    VMStorage::integer(3, "x3"),
    VMStorage::integer(4, "x4"),
    VMStorage::integer(5, "x5"),
    VMStorage::integer(6, "x6"),
    VMStorage::integer(7, "x7"),
    VMStorage::integer(8, "x8"),
    VMStorage::integer(9, "x9"),
    VMStorage::integer(10, "x10"),
    VMStorage::integer(11, "x11"),
    VMStorage::integer(12, "x12"),
    VMStorage::integer(13, "x13"),
    VMStorage::integer(14, "x14"),
    VMStorage::integer(15, "x15"),
    VMStorage::integer(16, "x16"),
    VMStorage::integer(17, "x17"),
];

// Only the bottom 64 bits of v8-v15 are preserved, so those count as volatile too
const AARCH64_VOLATILE_FLOATS: &[VMStorage] = &[
    VMStorage::float(0, "v0"),
    VMStorage::float(1, "v1"),
    VMStorage::float(2, "v2"),
    VMStorage::float(3, "v3"),
    VMStorage::float(4, "v4"),
    VMStorage::float(5, "v5"),
    VMStorage::float(6, "v6"),
    VMStorage::float(7, "v7"),
    VMStorage::float(16, "v16"),
    VMStorage::float(17, "v17"),
    VMStorage::float(18, "v18"),
    VMStorage::float(19, "v19"),
    VMStorage::float(20, "v20"),
    VMStorage::float(21, "v21"),
    VMStorage::float(22, "v22"),
    VMStorage::float(23, "v23"),
    VMStorage::float(24, "v24"),
    VMStorage::float(25, "v25"),
    VMStorage::float(26, "v26"),
    VMStorage::float(27, "v27"),
    VMStorage::float(28, "v28"),
    VMStorage::float(29, "v29"),
    VMStorage::float(30, "v30"),
    VMStorage::float(31, "v31"),
];

const AARCH64_ABI: ABIDescriptor = ABIDescriptor {
    integer_inputs: AARCH64_INTEGER_ARGUMENTS,
    float_inputs: AARCH64_FLOAT_ARGUMENTS,
    integer_outputs: AARCH64_INTEGER_ARGUMENTS,
    float_outputs: AARCH64_FLOAT_ARGUMENTS,
    volatile_integers: AARCH64_VOLATILE_INTEGERS,
    volatile_floats: AARCH64_VOLATILE_FLOATS,
    stack_alignment: 16,
    header_size: 0,
    scratch1: VMStorage::integer(9, "x9"),
    scratch2: VMStorage::integer(10, "x10"),
};

const AARCH64_RULES: CallingConventionRules = CallingConventionRules {
    register_chunk_size: 8,
    max_aggregate_register_size: 16,
    max_aggregate_return_size: 16,
    split_aggregates: false,
    max_hfa_elements: 4,
    hfa_spill: HfaSpill::WholeOnStack,
    float_in_integer_registers: false,
    float_shadows_integer: false,
    variadic: VariadicPolicy::Standard,
    indirect_result: IndirectResult::DedicatedRegister(VMStorage::integer(8, "x8")),
    stack_slot_size: 8,
};

const PPC64_INTEGER_ARGUMENTS: &[VMStorage] = &[
    VMStorage::integer(3, "r3"),
    VMStorage::integer(4, "r4"),
    VMStorage::integer(5, "r5"),
    VMStorage::integer(6, "r6"),
    VMStorage::integer(7, "r7"),
    VMStorage::integer(8, "r8"),
    VMStorage::integer(9, "r9"),
    VMStorage::integer(10, "r10"),
];

const PPC64_FLOAT_ARGUMENTS: &[VMStorage] = &[
    VMStorage::float(1, "f1"),
    VMStorage::float(2, "f2"),
    VMStorage::float(3, "f3"),
    VMStorage::float(4, "f4"),
    VMStorage::float(5, "f5"),
    VMStorage::float(6, "f6"),
    VMStorage::float(7, "f7"),
    VMStorage::float(8, "f8"),
    VMStorage::float(9, "f9"),
    VMStorage::float(10, "f10"),
    VMStorage::float(11, "f11"),
    VMStorage::float(12, "f12"),
    VMStorage::float(13, "f13"),
];

const PPC64_VOLATILE_INTEGERS: &[VMStorage] = &[
    VMStorage::integer(0, "r0"),
    VMStorage::integer(3, "r3"),
    VMStorage::integer(4, "r4"),
    VMStorage::integer(5, "r5"),
    VMStorage::integer(6, "r6"),
    VMStorage::integer(7, "r7"),
    VMStorage::integer(8, "r8"),
    VMStorage::integer(9, "r9"),
    VMStorage::integer(10, "r10"),
    VMStorage::integer(11, "r11"),
    VMStorage::integer(12, "r12"),
];

const PPC64_VOLATILE_FLOATS: &[VMStorage] = &[
    VMStorage::float(0, "f0"),
    VMStorage::float(1, "f1"),
    VMStorage::float(2, "f2"),
    VMStorage::float(3, "f3"),
    VMStorage::float(4, "f4"),
    VMStorage::float(5, "f5"),
    VMStorage::float(6, "f6"),
    VMStorage::float(7, "f7"),
    VMStorage::float(8, "f8"),
    VMStorage::float(9, "f9"),
    VMStorage::float(10, "f10"),
    VMStorage::float(11, "f11"),
    VMStorage::float(12, "f12"),
    VMStorage::float(13, "f13"),
];

const PPC64LE_ABI: ABIDescriptor = ABIDescriptor {
    integer_inputs: PPC64_INTEGER_ARGUMENTS,
    float_inputs: PPC64_FLOAT_ARGUMENTS,
    integer_outputs: &[VMStorage::integer(3, "r3"), VMStorage::integer(4, "r4")],
    float_outputs: &[
        VMStorage::float(1, "f1"),
        VMStorage::float(2, "f2"),
        VMStorage::float(3, "f3"),
        VMStorage::float(4, "f4"),
        VMStorage::float(5, "f5"),
        VMStorage::float(6, "f6"),
        VMStorage::float(7, "f7"),
        VMStorage::float(8, "f8"),
    ],
    volatile_integers: PPC64_VOLATILE_INTEGERS,
    volatile_floats: PPC64_VOLATILE_FLOATS,
    stack_alignment: 16,
    header_size: 32,
    scratch1: VMStorage::integer(11, "r11"),
    scratch2: VMStorage::integer(12, "r12"),
};

const RISCV64_INTEGER_ARGUMENTS: &[VMStorage] = &[
    VMStorage::integer(10, "a0"),
    VMStorage::integer(11, "a1"),
    VMStorage::integer(12, "a2"),
    VMStorage::integer(13, "a3"),
    VMStorage::integer(14, "a4"),
    VMStorage::integer(15, "a5"),
    VMStorage::integer(16, "a6"),
    VMStorage::integer(17, "a7"),
];

const RISCV64_FLOAT_ARGUMENTS: &[VMStorage] = &[
    VMStorage::float(10, "fa0"),
    VMStorage::float(11, "fa1"),
    VMStorage::float(12, "fa2"),
    VMStorage::float(13, "fa3"),
    VMStorage::float(14, "fa4"),
    VMStorage::float(15, "fa5"),
    VMStorage::float(16, "fa6"),
    VMStorage::float(17, "fa7"),
];

const RISCV64_VOLATILE_INTEGERS: &[VMStorage] = &[
    VMStorage::integer(5, "t0"),
    VMStorage::integer(6, "t1"),
    VMStorage::integer(7, "t2"),
    VMStorage::integer(10, "a0"),
    VMStorage::integer(11, "a1"),
    VMStorage::integer(12, "a2"),
    VMStorage::integer(13, "a3"),
    VMStorage::integer(14, "a4"),
    VMStorage::integer(15, "a5"),
    VMStorage::integer(16, "a6"),
    VMStorage::integer(17, "a7"),
    VMStorage::integer(28, "t3"),
    VMStorage::integer(29, "t4"),
    VMStorage::integer(30, "t5"),
    VMStorage::integer(31, "t6"),
];

const RISCV64_VOLATILE_FLOATS: &[VMStorage] = &[
    VMStorage::float(0, "ft0"),
    VMStorage::float(1, "ft1"),
    VMStorage::float(2, "ft2"),
    VMStorage::float(3, "ft3"),
    VMStorage::float(4, "ft4"),
    VMStorage::float(5, "ft5"),
    VMStorage::float(6, "ft6"),
    VMStorage::float(7, "ft7"),
    VMStorage::float(10, "fa0"),
    VMStorage::float(11, "fa1"),
    VMStorage::float(12, "fa2"),
    VMStorage::float(13, "fa3"),
    VMStorage::float(14, "fa4"),
    VMStorage::float(15, "fa5"),
    VMStorage::float(16, "fa6"),
    VMStorage::float(17, "fa7"),
    VMStorage::float(28, "ft8"),
    VMStorage::float(29, "ft9"),
    VMStorage::float(30, "ft10"),
    VMStorage::float(31, "ft11"),
];

impl Platform {
    /// AAPCS64 on Linux
    pub const LINUX_AARCH64: Platform = Platform {
        name: "linux-aarch64",
        abi: AARCH64_ABI,
        rules: AARCH64_RULES,
    };

    /// AAPCS64 on Windows: variadic floats go in integer registers
    pub const WINDOWS_AARCH64: Platform = Platform {
        name: "windows-aarch64",
        abi: AARCH64_ABI,
        rules: CallingConventionRules {
            variadic: VariadicPolicy::FloatsInIntegerRegisters,
            ..AARCH64_RULES
        },
    };

    /// ELFv2 on little-endian POWER
    ///
    /// Every argument has a double-word of the parameter save area, so float register arguments
    /// shadow integer registers and aggregates spread across registers and stack.
    pub const LINUX_PPC64LE: Platform = Platform {
        name: "linux-ppc64le",
        abi: PPC64LE_ABI,
        rules: CallingConventionRules {
            register_chunk_size: 8,
            max_aggregate_register_size: 64,
            max_aggregate_return_size: 16,
            split_aggregates: true,
            max_hfa_elements: 8,
            hfa_spill: HfaSpill::PackIntoDoubleWords,
            float_in_integer_registers: false,
            float_shadows_integer: true,
            variadic: VariadicPolicy::Standard,
            indirect_result: IndirectResult::LeadingArgument,
            stack_slot_size: 8,
        },
    };

    /// LP64D on RISC-V
    ///
    /// Float pairs are approximated as two element float aggregates. When there aren't enough
    /// float registers left, they are passed like integer aggregates.
    pub const LINUX_RISCV64: Platform = Platform {
        name: "linux-riscv64",
        abi: ABIDescriptor {
            integer_inputs: RISCV64_INTEGER_ARGUMENTS,
            float_inputs: RISCV64_FLOAT_ARGUMENTS,
            integer_outputs: &[VMStorage::integer(10, "a0"), VMStorage::integer(11, "a1")],
            float_outputs: &[VMStorage::float(10, "fa0"), VMStorage::float(11, "fa1")],
            volatile_integers: RISCV64_VOLATILE_INTEGERS,
            volatile_floats: RISCV64_VOLATILE_FLOATS,
            stack_alignment: 16,
            header_size: 0,
            scratch1: VMStorage::integer(5, "t0"),
            scratch2: VMStorage::integer(6, "t1"),
        },
        rules: CallingConventionRules {
            register_chunk_size: 8,
            max_aggregate_register_size: 16,
            max_aggregate_return_size: 16,
            split_aggregates: true,
            max_hfa_elements: 2,
            hfa_spill: HfaSpill::AsIntegerAggregate,
            float_in_integer_registers: true,
            float_shadows_integer: false,
            variadic: VariadicPolicy::FloatsInIntegerRegisters,
            indirect_result: IndirectResult::LeadingArgument,
            stack_slot_size: 8,
        },
    };

    pub const ALL: &'static [Platform] = &[
        Platform::LINUX_AARCH64,
        Platform::WINDOWS_AARCH64,
        Platform::LINUX_PPC64LE,
        Platform::LINUX_RISCV64,
    ];

    pub fn by_name(name: &str) -> Option<&'static Platform> {
        Platform::ALL.iter().find(|platform| platform.name == name)
    }
}
