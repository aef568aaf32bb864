use super::{CallingConventionRules, Error, MemoryLayout, ValueKind, VariadicPolicy};
use crate::jvm::RenderDescriptor;

/// How a value is passed, independently of which registers are left
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeClass {
    Integer,
    Float,
    Pointer,

    /// Aggregate split into chunks passed like integers
    StructRegister,

    /// Aggregate too large for registers, passed by reference to a copy
    StructReference,

    /// Homogeneous float aggregate, passed element-wise in float registers
    StructHfa,
}

impl TypeClass {
    pub fn is_struct(self) -> bool {
        matches!(
            self,
            TypeClass::StructRegister | TypeClass::StructReference | TypeClass::StructHfa
        )
    }
}

fn unsupported(layout: &MemoryLayout, reason: &str) -> Error {
    Error::UnsupportedLayout(format!("{} ({})", layout.render(), reason))
}

/// Classify a layout under a platform's rules
///
/// `variadic` is whether the value is in the variadic part of the argument list.
pub fn classify(
    layout: &MemoryLayout,
    rules: &CallingConventionRules,
    variadic: bool,
) -> Result<TypeClass, Error> {
    match layout {
        MemoryLayout::Value(value) if value.kind == ValueKind::Address => Ok(TypeClass::Pointer),
        MemoryLayout::Value(value) if value.kind.is_float() => Ok(TypeClass::Float),
        MemoryLayout::Value(_) => Ok(TypeClass::Integer),
        MemoryLayout::Padding(_) => Err(unsupported(layout, "padding is not a value")),
        MemoryLayout::Sequence(_) => Err(unsupported(layout, "sequences are not passed by value")),
        MemoryLayout::Struct(_) | MemoryLayout::Union(_) => {
            if layout.byte_size() == 0 {
                return Err(unsupported(layout, "empty aggregate"));
            }
            if Leaves::of(layout) == Leaves::Empty {
                return Err(unsupported(layout, "aggregate only has padding"));
            }

            let hfa_eligible = !(variadic && rules.variadic == VariadicPolicy::FloatsInIntegerRegisters);
            if hfa_eligible && hfa_element(layout, rules).is_some() {
                Ok(TypeClass::StructHfa)
            } else if layout.byte_size() <= rules.max_aggregate_register_size {
                Ok(TypeClass::StructRegister)
            } else {
                Ok(TypeClass::StructReference)
            }
        }
    }
}

/// Classify a return value
///
/// Aggregates that would be passed in integer registers as arguments are returned in memory once
/// they are larger than the platform's return limit.
pub fn classify_return(
    layout: &MemoryLayout,
    rules: &CallingConventionRules,
) -> Result<TypeClass, Error> {
    match classify(layout, rules, false)? {
        TypeClass::StructRegister if layout.byte_size() > rules.max_aggregate_return_size => {
            Ok(TypeClass::StructReference)
        }
        class => Ok(class),
    }
}

/// Element kind and count of a homogeneous float aggregate, if the layout is one
///
/// The elements must all be the same float kind, tightly packed, and there can't be too many of
/// them. Unions never qualify.
pub fn hfa_element(
    layout: &MemoryLayout,
    rules: &CallingConventionRules,
) -> Option<(ValueKind, usize)> {
    if contains_union(layout) {
        return None;
    }
    match Leaves::of(layout) {
        Leaves::Uniform(kind, count) => {
            let packed = count.checked_mul(kind.byte_size()) == Some(layout.byte_size());
            if kind.is_float() && packed && count <= rules.max_hfa_elements as u64 {
                Some((kind, count as usize))
            } else {
                None
            }
        }
        Leaves::Empty | Leaves::Mixed => None,
    }
}

/// Scalar values of a layout, summarized without enumerating sequences
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Leaves {
    Empty,

    /// `count` values, all of the same kind
    Uniform(ValueKind, u64),

    Mixed,
}

impl Leaves {
    fn of(layout: &MemoryLayout) -> Leaves {
        match layout {
            MemoryLayout::Value(value) => Leaves::Uniform(value.kind, 1),
            MemoryLayout::Struct(group) | MemoryLayout::Union(group) => group
                .members()
                .iter()
                .fold(Leaves::Empty, |leaves, member| leaves.then(Leaves::of(member))),
            MemoryLayout::Sequence(sequence) => {
                Leaves::of(sequence.element()).repeat(sequence.count())
            }
            MemoryLayout::Padding(_) => Leaves::Empty,
        }
    }

    fn then(self, other: Leaves) -> Leaves {
        match (self, other) {
            (Leaves::Empty, leaves) | (leaves, Leaves::Empty) => leaves,
            (Leaves::Uniform(kind, count), Leaves::Uniform(other_kind, other_count))
                if kind == other_kind =>
            {
                Leaves::Uniform(kind, count.saturating_add(other_count))
            }
            _ => Leaves::Mixed,
        }
    }

    fn repeat(self, times: u64) -> Leaves {
        match self {
            _ if times == 0 => Leaves::Empty,
            Leaves::Uniform(kind, count) => Leaves::Uniform(kind, count.saturating_mul(times)),
            leaves => leaves,
        }
    }
}

fn contains_union(layout: &MemoryLayout) -> bool {
    match layout {
        MemoryLayout::Union(_) => true,
        MemoryLayout::Struct(group) => group.members().iter().any(contains_union),
        MemoryLayout::Sequence(sequence) => contains_union(sequence.element()),
        MemoryLayout::Value(_) | MemoryLayout::Padding(_) => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::abi::Platform;
    use crate::jvm::ParseDescriptor;

    fn classify_text(text: &str, platform: &Platform, variadic: bool) -> Result<TypeClass, Error> {
        classify(&MemoryLayout::parse(text).unwrap(), &platform.rules, variadic)
    }

    #[test]
    fn scalars() {
        let platform = &Platform::LINUX_AARCH64;
        assert_eq!(classify_text("I", platform, false), Ok(TypeClass::Integer));
        assert_eq!(classify_text("Z", platform, false), Ok(TypeClass::Integer));
        assert_eq!(classify_text("D", platform, false), Ok(TypeClass::Float));
        assert_eq!(classify_text("A*[II]", platform, false), Ok(TypeClass::Pointer));
    }

    #[test]
    fn aggregates() {
        let platform = &Platform::LINUX_AARCH64;
        assert_eq!(classify_text("[IJ]", platform, false), Ok(TypeClass::StructRegister));
        assert_eq!(classify_text("[JJJ]", platform, false), Ok(TypeClass::StructReference));
        assert_eq!(classify_text("[FFF]", platform, false), Ok(TypeClass::StructHfa));
        assert_eq!(classify_text("[D{3:D}]", platform, false), Ok(TypeClass::StructHfa));

        // Too many elements, mixed kinds, unions
        assert_eq!(classify_text("[FFFFF]", platform, false), Ok(TypeClass::StructReference));
        assert_eq!(classify_text("[FD]", platform, false), Ok(TypeClass::StructRegister));
        assert_eq!(classify_text("<FF>", platform, false), Ok(TypeClass::StructRegister));
        assert_eq!(classify_text("[F<FF>]", platform, false), Ok(TypeClass::StructRegister));
    }

    #[test]
    fn hfa_limits_depend_on_platform() {
        assert_eq!(
            classify_text("[FFFFFF]", &Platform::LINUX_PPC64LE, false),
            Ok(TypeClass::StructHfa)
        );
        assert_eq!(
            classify_text("[FFF]", &Platform::LINUX_RISCV64, false),
            Ok(TypeClass::StructRegister)
        );
    }

    #[test]
    fn variadic_hfas() {
        assert_eq!(
            classify_text("[DD]", &Platform::WINDOWS_AARCH64, true),
            Ok(TypeClass::StructRegister)
        );
        assert_eq!(
            classify_text("[DD]", &Platform::LINUX_AARCH64, true),
            Ok(TypeClass::StructHfa)
        );
    }

    #[test]
    fn returns_have_their_own_size_limit() {
        let platform = &Platform::LINUX_PPC64LE;
        assert_eq!(classify_text("[JJJ]", platform, false), Ok(TypeClass::StructRegister));
        let layout = MemoryLayout::parse("[JJJ]").unwrap();
        assert_eq!(classify_return(&layout, &platform.rules), Ok(TypeClass::StructReference));
        let layout = MemoryLayout::parse("[DDD]").unwrap();
        assert_eq!(classify_return(&layout, &platform.rules), Ok(TypeClass::StructHfa));
    }

    #[test]
    fn large_sequences_are_summarized() {
        let platform = &Platform::LINUX_AARCH64;
        assert_eq!(
            classify_text("[{50000000000:B}]", platform, false),
            Ok(TypeClass::StructReference)
        );
        assert_eq!(
            classify_text("[{1152921504606846975:D}]", platform, false),
            Ok(TypeClass::StructReference)
        );
        assert_eq!(classify_text("[{2:D}{0:I}D]", platform, false), Ok(TypeClass::StructHfa));
        assert_eq!(
            hfa_element(&MemoryLayout::parse("[{2:{2:F}}]").unwrap(), &platform.rules),
            Some((ValueKind::Float, 4))
        );
        assert!(matches!(
            classify_text("[{3:x4}]", platform, false),
            Err(Error::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn unsupported_layouts() {
        let platform = &Platform::LINUX_AARCH64;
        assert!(matches!(classify_text("[]", platform, false), Err(Error::UnsupportedLayout(_))));
        assert!(matches!(classify_text("[x8]", platform, false), Err(Error::UnsupportedLayout(_))));
        assert!(matches!(classify_text("x8", platform, false), Err(Error::UnsupportedLayout(_))));
        assert!(matches!(classify_text("{2:I}", platform, false), Err(Error::UnsupportedLayout(_))));
    }
}
