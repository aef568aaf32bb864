use super::Error;
use crate::jvm::{ParseDescriptor, RenderDescriptor};
use std::iter::Peekable;
use std::str::Chars;

/// Scalar values that can appear in native memory
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueKind {
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Boolean,

    /// 64-bit address
    Address,
}

impl ValueKind {
    pub fn byte_size(self) -> u64 {
        match self {
            ValueKind::Byte | ValueKind::Boolean => 1,
            ValueKind::Short | ValueKind::Char => 2,
            ValueKind::Int | ValueKind::Float => 4,
            ValueKind::Long | ValueKind::Double | ValueKind::Address => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValueKind::Float | ValueKind::Double)
    }

    fn from_char(c: char) -> Option<ValueKind> {
        match c {
            'B' => Some(ValueKind::Byte),
            'S' => Some(ValueKind::Short),
            'C' => Some(ValueKind::Char),
            'I' => Some(ValueKind::Int),
            'J' => Some(ValueKind::Long),
            'F' => Some(ValueKind::Float),
            'D' => Some(ValueKind::Double),
            'Z' => Some(ValueKind::Boolean),
            'A' => Some(ValueKind::Address),
            _ => None,
        }
    }

    fn to_char(self) -> char {
        match self {
            ValueKind::Byte => 'B',
            ValueKind::Short => 'S',
            ValueKind::Char => 'C',
            ValueKind::Int => 'I',
            ValueKind::Long => 'J',
            ValueKind::Float => 'F',
            ValueKind::Double => 'D',
            ValueKind::Boolean => 'Z',
            ValueKind::Address => 'A',
        }
    }
}

/// Scalar value, naturally aligned
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ValueLayout {
    pub kind: ValueKind,

    /// For addresses: layout of the memory pointed to (if known)
    pub target: Option<Box<MemoryLayout>>,
}

/// Members of a struct or a union
///
/// Struct members are laid out one after the other, so any padding between them is explicit.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GroupLayout {
    members: Vec<MemoryLayout>,
}

impl GroupLayout {
    pub fn members(&self) -> &[MemoryLayout] {
        &self.members
    }
}

/// Repetition of an element layout
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SequenceLayout {
    count: u64,
    element: Box<MemoryLayout>,
}

/// Structure of a region of native memory
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemoryLayout {
    Value(ValueLayout),
    Struct(GroupLayout),
    Union(GroupLayout),
    Sequence(SequenceLayout),
    Padding(u64),
}

pub(crate) fn checked_align_up(value: u64, alignment: u64) -> Option<u64> {
    if alignment <= 1 {
        Some(value)
    } else {
        Some(value.checked_add(alignment - 1)? / alignment * alignment)
    }
}

/// Round up to a multiple of `alignment`, saturating at the last multiple that fits
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    checked_align_up(value, alignment).unwrap_or_else(|| align_down(u64::MAX, alignment))
}

pub(crate) fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value / alignment * alignment
    }
}

impl MemoryLayout {
    pub fn value(kind: ValueKind) -> MemoryLayout {
        MemoryLayout::Value(ValueLayout { kind, target: None })
    }

    /// Address of memory with a known layout
    pub fn address_to(target: MemoryLayout) -> MemoryLayout {
        MemoryLayout::Value(ValueLayout {
            kind: ValueKind::Address,
            target: Some(Box::new(target)),
        })
    }

    pub fn padding(size: u64) -> MemoryLayout {
        MemoryLayout::Padding(size)
    }

    /// Struct with exactly the given members, which must each be aligned
    pub fn structure(members: Vec<MemoryLayout>) -> Result<MemoryLayout, Error> {
        let mut offset = 0;
        for (index, member) in members.iter().enumerate() {
            let alignment = member.byte_alignment();
            if offset % alignment != 0 {
                return Err(Error::InvalidLayout(format!(
                    "Struct member {} at offset {} is not aligned to {} bytes",
                    index, offset, alignment
                )));
            }
            offset = match offset.checked_add(member.byte_size()) {
                Some(offset) => offset,
                None => return Err(too_large(index)),
            };
        }
        Ok(MemoryLayout::Struct(GroupLayout { members }))
    }

    /// Struct with padding inserted the way a C compiler would
    ///
    /// Every member is aligned, and the size is rounded up to the struct alignment.
    pub fn natural_struct(members: Vec<MemoryLayout>) -> Result<MemoryLayout, Error> {
        let mut padded = Vec::with_capacity(members.len());
        let mut offset: u64 = 0;
        let mut struct_alignment = 1;
        for (index, member) in members.into_iter().enumerate() {
            let alignment = member.byte_alignment();
            struct_alignment = struct_alignment.max(alignment);
            let aligned = checked_align_up(offset, alignment).ok_or_else(|| too_large(index))?;
            if aligned > offset {
                padded.push(MemoryLayout::Padding(aligned - offset));
            }
            offset = aligned
                .checked_add(member.byte_size())
                .ok_or_else(|| too_large(index))?;
            padded.push(member);
        }
        let size = checked_align_up(offset, struct_alignment)
            .ok_or_else(|| too_large(padded.len()))?;
        if size > offset {
            padded.push(MemoryLayout::Padding(size - offset));
        }
        Ok(MemoryLayout::Struct(GroupLayout { members: padded }))
    }

    pub fn union(members: Vec<MemoryLayout>) -> MemoryLayout {
        MemoryLayout::Union(GroupLayout { members })
    }

    pub fn sequence(count: u64, element: MemoryLayout) -> Result<MemoryLayout, Error> {
        SequenceLayout::new(count, element).map(MemoryLayout::Sequence)
    }

    /// Size in bytes
    ///
    /// Constructors reject layouts whose size doesn't fit in a `u64`.
    pub fn byte_size(&self) -> u64 {
        match self {
            MemoryLayout::Value(value) => value.kind.byte_size(),
            MemoryLayout::Struct(group) => group
                .members
                .iter()
                .fold(0, |size, m| size.saturating_add(m.byte_size())),
            MemoryLayout::Union(group) => group
                .members
                .iter()
                .map(|m| m.byte_size())
                .max()
                .unwrap_or(0),
            MemoryLayout::Sequence(sequence) => {
                sequence.count.saturating_mul(sequence.element.byte_size())
            }
            MemoryLayout::Padding(size) => *size,
        }
    }

    pub fn byte_alignment(&self) -> u64 {
        match self {
            MemoryLayout::Value(value) => value.kind.byte_size(),
            MemoryLayout::Struct(group) | MemoryLayout::Union(group) => group
                .members
                .iter()
                .map(|m| m.byte_alignment())
                .max()
                .unwrap_or(1),
            MemoryLayout::Sequence(sequence) => sequence.element.byte_alignment(),
            MemoryLayout::Padding(_) => 1,
        }
    }
}

fn too_large(member: usize) -> Error {
    Error::InvalidLayout(format!("Struct size overflows at member {}", member))
}

impl SequenceLayout {
    pub fn new(count: u64, element: MemoryLayout) -> Result<SequenceLayout, Error> {
        let element_size = element.byte_size();
        if element_size % element.byte_alignment() != 0 {
            return Err(Error::InvalidLayout(format!(
                "Sequence element size {} is not a multiple of its alignment {}",
                element_size,
                element.byte_alignment()
            )));
        }
        if count.checked_mul(element_size).is_none() {
            return Err(Error::InvalidLayout(format!(
                "Sequence of {} elements of {} bytes overflows",
                count, element_size
            )));
        }
        Ok(SequenceLayout {
            count,
            element: Box::new(element),
        })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn element(&self) -> &MemoryLayout {
        &self.element
    }

    /// Collapse nested sequences into one sequence of the innermost element
    ///
    /// Fails if the total element count doesn't fit in a `u64` (only possible with empty elements).
    pub fn flatten(&self) -> Result<SequenceLayout, Error> {
        let mut count = self.count;
        let mut element = &*self.element;
        while let MemoryLayout::Sequence(inner) = element {
            count = count.checked_mul(inner.count).ok_or_else(|| {
                Error::InvalidLayout(format!(
                    "Flattening {} overflows the element count",
                    MemoryLayout::Sequence(self.clone()).render()
                ))
            })?;
            element = &inner.element;
        }
        Ok(SequenceLayout {
            count,
            element: Box::new(element.clone()),
        })
    }

    /// Re-nest the flattened elements into the given dimensions (outermost first)
    ///
    /// At most one dimension can be `-1`, in which case it is inferred.
    pub fn reshape(&self, dimensions: &[i64]) -> Result<SequenceLayout, Error> {
        let invalid = |message: String| Err(Error::InvalidLayout(message));
        if dimensions.is_empty() {
            return invalid(String::from("Reshape needs at least one dimension"));
        }

        let flat = self.flatten()?;
        let mut inferred_position = None;
        let mut known_product: u64 = 1;
        for (position, dimension) in dimensions.iter().enumerate() {
            match *dimension {
                -1 if inferred_position.is_some() => {
                    return invalid(String::from("Only one dimension can be inferred"));
                }
                -1 => inferred_position = Some(position),
                d if d < 0 => return invalid(format!("Invalid element count {}", d)),
                d => known_product = known_product.saturating_mul(d as u64),
            }
        }

        let mut counts: Vec<u64> = dimensions.iter().map(|d| (*d).max(0) as u64).collect();
        match inferred_position {
            Some(position) => {
                if known_product == 0 || flat.count % known_product != 0 {
                    return invalid(format!(
                        "Can't reshape {} elements into {:?}",
                        flat.count, dimensions
                    ));
                }
                counts[position] = flat.count / known_product;
            }
            None if known_product != flat.count => {
                return invalid(format!(
                    "Can't reshape {} elements into {:?}",
                    flat.count, dimensions
                ));
            }
            None => (),
        }

        let mut element = *flat.element;
        for count in counts.iter().skip(1).rev() {
            element = MemoryLayout::Sequence(SequenceLayout {
                count: *count,
                element: Box::new(element),
            });
        }
        Ok(SequenceLayout {
            count: counts[0],
            element: Box::new(element),
        })
    }
}

/// Signature of a native function
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FunctionDescriptor {
    pub arguments: Vec<MemoryLayout>,

    /// `None` for `void`
    pub return_layout: Option<MemoryLayout>,
}

impl FunctionDescriptor {
    pub fn new(arguments: Vec<MemoryLayout>, return_layout: Option<MemoryLayout>) -> Self {
        FunctionDescriptor {
            arguments,
            return_layout,
        }
    }

    pub fn arity(&self) -> usize {
        self.arguments.len()
    }
}

/// Text form of layouts:
///
///   - `B S C I J F D Z A` are values (`A*` followed by a layout is an address of that layout)
///   - `x8` is 8 bytes of padding
///   - `[...]` is a struct (parsed with natural alignment, rendered with explicit padding)
///   - `<...>` is a union
///   - `{4:F}` is a sequence of four floats
impl RenderDescriptor for MemoryLayout {
    fn render_to(&self, write_to: &mut String) {
        match self {
            MemoryLayout::Value(value) => {
                write_to.push(value.kind.to_char());
                if let Some(target) = &value.target {
                    write_to.push('*');
                    target.render_to(write_to);
                }
            }
            MemoryLayout::Struct(group) => {
                write_to.push('[');
                group.members.iter().for_each(|m| m.render_to(write_to));
                write_to.push(']');
            }
            MemoryLayout::Union(group) => {
                write_to.push('<');
                group.members.iter().for_each(|m| m.render_to(write_to));
                write_to.push('>');
            }
            MemoryLayout::Sequence(sequence) => {
                write_to.push_str(&format!("{{{}:", sequence.count));
                sequence.element.render_to(write_to);
                write_to.push('}');
            }
            MemoryLayout::Padding(size) => write_to.push_str(&format!("x{}", size)),
        }
    }
}

fn parse_number(source: &mut Peekable<Chars>) -> Result<u64, String> {
    let mut digits = String::new();
    while let Some(c) = source.next_if(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    digits
        .parse()
        .map_err(|_| format!("Expected a number, found '{}'", digits))
}

fn parse_members(source: &mut Peekable<Chars>, close: char) -> Result<Vec<MemoryLayout>, String> {
    let mut members = vec![];
    loop {
        match source.peek() {
            Some(c) if *c == close => {
                source.next();
                return Ok(members);
            }
            None => return Err(format!("Expected '{}' to close group", close)),
            Some(_) => members.push(MemoryLayout::parse_from(source)?),
        }
    }
}

impl ParseDescriptor for MemoryLayout {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        match source.next() {
            Some('A') => {
                if source.next_if_eq(&'*').is_some() {
                    Ok(MemoryLayout::address_to(MemoryLayout::parse_from(source)?))
                } else {
                    Ok(MemoryLayout::value(ValueKind::Address))
                }
            }
            Some('x') => Ok(MemoryLayout::Padding(parse_number(source)?)),
            Some('[') => MemoryLayout::natural_struct(parse_members(source, ']')?)
                .map_err(|err| format!("{:?}", err)),
            Some('<') => Ok(MemoryLayout::union(parse_members(source, '>')?)),
            Some('{') => {
                let count = parse_number(source)?;
                if source.next() != Some(':') {
                    return Err(String::from("Expected ':' after sequence count"));
                }
                let element = MemoryLayout::parse_from(source)?;
                if source.next() != Some('}') {
                    return Err(String::from("Expected '}' to close sequence"));
                }
                MemoryLayout::sequence(count, element).map_err(|err| format!("{:?}", err))
            }
            Some(c) => ValueKind::from_char(c)
                .map(MemoryLayout::value)
                .ok_or_else(|| format!("Invalid layout character '{}'", c)),
            None => Err(String::from("Missing layout")),
        }
    }
}

impl RenderDescriptor for FunctionDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        self.arguments.iter().for_each(|a| a.render_to(write_to));
        write_to.push(')');
        match &self.return_layout {
            None => write_to.push('V'),
            Some(layout) => layout.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FunctionDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        if source.next() != Some('(') {
            return Err(String::from("Expected '(' for function"));
        }
        let arguments = parse_members(source, ')')?;
        let return_layout = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(MemoryLayout::parse_from(source)?)
        };
        Ok(FunctionDescriptor {
            arguments,
            return_layout,
        })
    }
}
