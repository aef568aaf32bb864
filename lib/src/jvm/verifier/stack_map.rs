use super::frame::has_uninitialized_this;
use super::{FieldRef, InitialFrame, StackMapFrameInfo, VerificationType};
use crate::jvm::class_file::{
    ClassConstantIndex, Constant, ConstantsPool, RawVerificationType, Serialize, StackMapFrame,
    StackMapTable, UnsetFieldIndices,
};
use crate::jvm::code::LabelResolver;
use crate::jvm::{
    BinaryName, Error, FieldType, Name, ParseDescriptor, RefType, RenderDescriptor,
    StackMapErrorKind, UnqualifiedName,
};
use log::trace;

/// Maps between constant pool indices and the classes and fields they refer to
///
/// Decoding only reads from the pool. Encoding may need to add entries, which is how the updated
/// pool comes out of the encoder.
pub trait ConstantResolver {
    type Class;
    type Field;

    /// Class named by a `CONSTANT_Class_info` (`None` if the index doesn't point at a class)
    fn resolve_class(&self, index: ClassConstantIndex) -> Option<Self::Class>;

    /// Field named by a class and a name-and-type (`None` if the indices are invalid)
    fn resolve_field(&self, indices: UnsetFieldIndices) -> Option<Self::Field>;

    /// Index of a class, allocating it if needed
    fn class_index(&mut self, class: &Self::Class) -> Result<ClassConstantIndex, Error>;

    /// Indices for a field, allocating them if needed
    fn field_indices(&mut self, field: &Self::Field) -> Result<UnsetFieldIndices, Error>;
}

/// Resolver that leaves all indices unresolved
#[derive(Debug, Copy, Clone, Default)]
pub struct RawIndices;

impl ConstantResolver for RawIndices {
    type Class = ClassConstantIndex;
    type Field = UnsetFieldIndices;

    fn resolve_class(&self, index: ClassConstantIndex) -> Option<ClassConstantIndex> {
        Some(index)
    }

    fn resolve_field(&self, indices: UnsetFieldIndices) -> Option<UnsetFieldIndices> {
        Some(indices)
    }

    fn class_index(&mut self, class: &ClassConstantIndex) -> Result<ClassConstantIndex, Error> {
        Ok(*class)
    }

    fn field_indices(&mut self, field: &UnsetFieldIndices) -> Result<UnsetFieldIndices, Error> {
        Ok(*field)
    }
}

impl ConstantResolver for ConstantsPool {
    type Class = RefType<BinaryName>;
    type Field = FieldRef;

    fn resolve_class(&self, index: ClassConstantIndex) -> Option<RefType<BinaryName>> {
        match self.get(index.0)? {
            Constant::Class(name) => {
                RefType::parse_class_constant_name(self.get_utf8_str(*name)?).ok()
            }
            _ => None,
        }
    }

    fn resolve_field(&self, indices: UnsetFieldIndices) -> Option<FieldRef> {
        let class = match self.resolve_class(indices.class)? {
            RefType::Object(class) => class,
            _ => return None,
        };
        match self.get(indices.name_and_type.0)? {
            Constant::NameAndType { name, descriptor } => Some(FieldRef {
                class,
                name: UnqualifiedName::from_str(self.get_utf8_str(*name)?).ok()?,
                descriptor: FieldType::parse(self.get_utf8_str(*descriptor)?).ok()?,
            }),
            _ => None,
        }
    }

    fn class_index(&mut self, class: &RefType<BinaryName>) -> Result<ClassConstantIndex, Error> {
        Ok(self.get_class(class)?)
    }

    fn field_indices(&mut self, field: &FieldRef) -> Result<UnsetFieldIndices, Error> {
        let class = self.get_class(&RefType::Object(field.class.clone()))?;
        let name = self.get_utf8(field.name.as_str())?;
        let descriptor = self.get_utf8(field.descriptor.render())?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        Ok(UnsetFieldIndices {
            class,
            name_and_type,
        })
    }
}

/// Frame state as it is stored in a class file
#[derive(Debug, Clone, Default)]
struct RawState {
    offset: Option<u16>,
    locals: Vec<RawVerificationType>,
    unset_fields: Vec<UnsetFieldIndices>,
}

fn invalid(frame_index: usize, kind: StackMapErrorKind) -> Error {
    Error::InvalidStackMapFrame { frame_index, kind }
}

fn check_count(frame_index: usize, count: usize) -> Result<(), Error> {
    if count > u16::MAX as usize {
        Err(invalid(frame_index, StackMapErrorKind::TooManyEntries(count)))
    } else {
        Ok(())
    }
}

fn raw_type<R: LabelResolver, K: ConstantResolver>(
    vtype: &VerificationType<K::Class, R::Label>,
    labels: &R,
    constants: &mut K,
    frame_index: usize,
) -> Result<RawVerificationType, Error> {
    vtype.try_map(
        |class| constants.class_index(class),
        |label| {
            labels
                .offset_of(label)
                .ok_or_else(|| invalid(frame_index, StackMapErrorKind::UnboundLabel))
        },
    )
}

fn resolved_type<R: LabelResolver, K: ConstantResolver>(
    raw: &RawVerificationType,
    labels: &mut R,
    constants: &K,
    frame_index: usize,
) -> Result<VerificationType<K::Class, R::Label>, Error> {
    raw.try_map(
        |index| {
            constants
                .resolve_class(*index)
                .ok_or_else(|| invalid(frame_index, StackMapErrorKind::InvalidConstantIndex((index.0).0)))
        },
        |offset| {
            labels
                .label_at(*offset)
                .ok_or_else(|| invalid(frame_index, StackMapErrorKind::InvalidOffset(*offset as u32)))
        },
    )
}

fn raw_initial_state<R: LabelResolver, K: ConstantResolver>(
    initial: &InitialFrame<R::Label, K::Class, K::Field>,
    labels: &R,
    constants: &mut K,
) -> Result<RawState, Error> {
    let locals = initial
        .locals
        .iter()
        .map(|local| raw_type(local, labels, constants, 0))
        .collect::<Result<_, _>>()?;
    let unset_fields = initial
        .unset_fields
        .iter()
        .map(|field| constants.field_indices(field))
        .collect::<Result<_, _>>()?;
    Ok(RawState {
        offset: None,
        locals,
        unset_fields,
    })
}

/// Turns frame states into the differential frames of a `StackMapTable`
///
/// Each frame is encoded relative to the one before it (starting from the method's initial
/// frame), using the most compact frame type that can express the change.
pub struct StackMapEncoder<'a, R: LabelResolver, K: ConstantResolver> {
    labels: &'a R,
    constants: &'a mut K,
    previous: RawState,
}

impl<'a, R: LabelResolver, K: ConstantResolver> StackMapEncoder<'a, R, K> {
    pub fn new(
        initial: &InitialFrame<R::Label, K::Class, K::Field>,
        labels: &'a R,
        constants: &'a mut K,
    ) -> Result<Self, Error> {
        let previous = raw_initial_state(initial, labels, constants)?;
        Ok(StackMapEncoder {
            labels,
            constants,
            previous,
        })
    }

    /// Encode all of the frames of a method
    ///
    /// Frames can be passed in any order: they get sorted by the offset their targets resolve to.
    /// Errors report the position of the offending frame in `frames`.
    pub fn encode_table(
        mut self,
        frames: &[StackMapFrameInfo<R::Label, K::Class, K::Field>],
    ) -> Result<StackMapTable, Error> {
        check_count(frames.len(), frames.len())?;

        let mut ordered = frames
            .iter()
            .enumerate()
            .map(|(frame_index, frame)| {
                let offset = self
                    .labels
                    .offset_of(&frame.target)
                    .ok_or_else(|| invalid(frame_index, StackMapErrorKind::UnboundLabel))?;
                Ok((offset, frame_index))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        ordered.sort();
        for pair in ordered.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::DuplicateFrameOffset(pair[0].0));
            }
        }

        let mut encoded = Vec::with_capacity(ordered.len());
        for (offset, frame_index) in ordered {
            encoded.push(self.encode_frame(offset, &frames[frame_index], frame_index)?);
        }
        Ok(StackMapTable(encoded))
    }

    /// Encode the next frame, which must be after the previously encoded frame
    pub fn encode_frame(
        &mut self,
        offset: u16,
        frame: &StackMapFrameInfo<R::Label, K::Class, K::Field>,
        frame_index: usize,
    ) -> Result<StackMapFrame, Error> {
        check_count(frame_index, frame.locals.len())?;
        check_count(frame_index, frame.stack.len())?;
        check_count(frame_index, frame.unset_fields.len())?;

        let uninitialized_this = frame.has_uninitialized_this();
        if !frame.unset_fields.is_empty() && !uninitialized_this {
            let kind = StackMapErrorKind::UnsetFieldsWithoutUninitializedThis;
            return Err(invalid(frame_index, kind));
        }

        let offset_delta = match self.previous.offset {
            None => offset as i64,
            Some(previous) => offset as i64 - previous as i64 - 1,
        };
        if offset_delta < 0 {
            let kind = StackMapErrorKind::NegativeOffsetDelta(offset_delta);
            return Err(invalid(frame_index, kind));
        }
        let offset_delta = offset_delta as u16;

        let locals = frame
            .locals
            .iter()
            .map(|local| raw_type(local, self.labels, self.constants, frame_index))
            .collect::<Result<Vec<_>, _>>()?;
        let mut stack = frame
            .stack
            .iter()
            .map(|item| raw_type(item, self.labels, self.constants, frame_index))
            .collect::<Result<Vec<_>, _>>()?;
        let unset_fields = frame
            .unset_fields
            .iter()
            .map(|field| self.constants.field_indices(field))
            .collect::<Result<Vec<_>, _>>()?;

        let base = self.base_frame(offset_delta, &locals, &mut stack);
        let encoded = if unset_fields != self.previous.unset_fields && uninitialized_this {
            StackMapFrame::EarlyLarval {
                unset_fields: unset_fields.clone(),
                base: Box::new(base),
            }
        } else {
            base
        };
        trace!("Encoded frame at offset {}: {:?}", offset, encoded);

        self.previous = RawState {
            offset: Some(offset),
            locals,
            unset_fields,
        };
        Ok(encoded)
    }

    /// Pick the first frame type that can express the frame
    ///
    /// The order of the checks decides the exact bytes produced, so it must stay as is.
    fn base_frame(
        &self,
        offset_delta: u16,
        locals: &[RawVerificationType],
        stack: &mut Vec<RawVerificationType>,
    ) -> StackMapFrame {
        let previous_locals = &self.previous.locals;
        let same_locals = locals == previous_locals.as_slice();

        if same_locals && stack.is_empty() && offset_delta <= 63 {
            return StackMapFrame::SameLocalsNoStack { offset_delta };
        }

        if same_locals && stack.len() == 1 {
            if let Some(stack) = stack.pop() {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack,
                };
            }
        }

        let length_difference = locals.len() as i64 - previous_locals.len() as i64;
        let common = locals.len().min(previous_locals.len());
        if stack.is_empty()
            && (-3..=3).contains(&length_difference)
            && locals[..common] == previous_locals[..common]
        {
            return match length_difference {
                0 => StackMapFrame::SameLocalsNoStack { offset_delta },
                d if d < 0 => StackMapFrame::ChopLocalsNoStack {
                    offset_delta,
                    chopped_k: (-d) as u8,
                },
                _ => StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals: locals[common..].to_vec(),
                },
            };
        }

        StackMapFrame::Full {
            offset_delta,
            locals: locals.to_vec(),
            stack: std::mem::take(stack),
        }
    }
}

/// Turns the differential frames of a `StackMapTable` back into frame states
pub struct StackMapDecoder<'a, R: LabelResolver, K: ConstantResolver> {
    labels: &'a mut R,
    constants: &'a K,
    previous: RawState,
}

impl<'a, R: LabelResolver, K: ConstantResolver> StackMapDecoder<'a, R, K> {
    /// Make a decoder starting from a method's initial frame
    ///
    /// The constants are mutable only so that the initial frame can be put in terms of indices.
    pub fn new(
        initial: &InitialFrame<R::Label, K::Class, K::Field>,
        labels: &'a mut R,
        constants: &'a mut K,
    ) -> Result<Self, Error> {
        let previous = raw_initial_state(initial, labels, constants)?;
        Ok(StackMapDecoder {
            labels,
            constants,
            previous,
        })
    }

    pub fn decode_table(
        mut self,
        table: &StackMapTable,
    ) -> Result<Vec<StackMapFrameInfo<R::Label, K::Class, K::Field>>, Error> {
        table
            .0
            .iter()
            .enumerate()
            .map(|(frame_index, frame)| self.decode_frame(frame, frame_index))
            .collect()
    }

    /// Decode the next frame
    pub fn decode_frame(
        &mut self,
        frame: &StackMapFrame,
        frame_index: usize,
    ) -> Result<StackMapFrameInfo<R::Label, K::Class, K::Field>, Error> {
        let (larval_unset_fields, base) = match frame {
            StackMapFrame::EarlyLarval { unset_fields, base } => (Some(unset_fields), &**base),
            other => (None, other),
        };

        let offset = match self.previous.offset {
            None => base.offset_delta() as u32,
            Some(previous) => previous as u32 + base.offset_delta() as u32 + 1,
        };
        if offset > u16::MAX as u32 {
            return Err(invalid(frame_index, StackMapErrorKind::InvalidOffset(offset)));
        }
        let offset = offset as u16;

        let previous_locals = &self.previous.locals;
        let (locals, stack) = match base {
            StackMapFrame::SameLocalsNoStack { .. } => (previous_locals.clone(), vec![]),
            StackMapFrame::SameLocalsOneStack { stack, .. } => {
                (previous_locals.clone(), vec![*stack])
            }
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let chopped = *chopped_k as usize;
                if chopped > previous_locals.len() {
                    let kind = StackMapErrorKind::ChopPastStart {
                        chopped: *chopped_k,
                        locals: previous_locals.len(),
                    };
                    return Err(invalid(frame_index, kind));
                }
                let kept = previous_locals.len() - chopped;
                (previous_locals[..kept].to_vec(), vec![])
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                let mut appended = previous_locals.clone();
                appended.extend_from_slice(locals);
                check_count(frame_index, appended.len())?;
                (appended, vec![])
            }
            StackMapFrame::Full { locals, stack, .. } => (locals.clone(), stack.clone()),
            StackMapFrame::EarlyLarval { .. } => {
                return Err(invalid(frame_index, StackMapErrorKind::NestedLarvalFrame))
            }
        };

        let uninitialized_this = has_uninitialized_this(&locals);
        let unset_fields = match larval_unset_fields {
            Some(unset_fields) => unset_fields.clone(),
            None if !uninitialized_this => vec![],
            None => self.previous.unset_fields.clone(),
        };
        if !unset_fields.is_empty() && !uninitialized_this {
            let kind = StackMapErrorKind::UnsetFieldsWithoutUninitializedThis;
            return Err(invalid(frame_index, kind));
        }

        let target = self
            .labels
            .label_at(offset)
            .ok_or_else(|| invalid(frame_index, StackMapErrorKind::InvalidOffset(offset as u32)))?;
        let resolved_locals = locals
            .iter()
            .map(|local| resolved_type(local, self.labels, self.constants, frame_index))
            .collect::<Result<_, _>>()?;
        let resolved_stack = stack
            .iter()
            .map(|item| resolved_type(item, self.labels, self.constants, frame_index))
            .collect::<Result<_, _>>()?;
        let resolved_unset_fields = unset_fields
            .iter()
            .map(|field| {
                self.constants.resolve_field(*field).ok_or_else(|| {
                    let index = (field.name_and_type.0).0;
                    invalid(frame_index, StackMapErrorKind::InvalidConstantIndex(index))
                })
            })
            .collect::<Result<_, _>>()?;
        trace!("Decoded frame at offset {}: {:?}", offset, frame);

        self.previous = RawState {
            offset: Some(offset),
            locals,
            unset_fields,
        };
        Ok(StackMapFrameInfo {
            frame_type: base.frame_type(),
            target,
            locals: resolved_locals,
            stack: resolved_stack,
            unset_fields: resolved_unset_fields,
        })
    }
}

/// Encode frame states into the body of a `StackMapTable` attribute
pub fn encode_stack_map<R: LabelResolver, K: ConstantResolver>(
    frames: &[StackMapFrameInfo<R::Label, K::Class, K::Field>],
    initial: &InitialFrame<R::Label, K::Class, K::Field>,
    labels: &R,
    constants: &mut K,
) -> Result<Vec<u8>, Error> {
    let table = StackMapEncoder::new(initial, labels, constants)?.encode_table(frames)?;
    let mut bytes = vec![];
    table.serialize(&mut bytes)?;
    Ok(bytes)
}

/// Decode the body of a `StackMapTable` attribute into frame states
pub fn decode_stack_map<R: LabelResolver, K: ConstantResolver>(
    bytes: &[u8],
    initial: &InitialFrame<R::Label, K::Class, K::Field>,
    labels: &mut R,
    constants: &mut K,
) -> Result<Vec<StackMapFrameInfo<R::Label, K::Class, K::Field>>, Error> {
    let table = StackMapTable::read(bytes)?;
    StackMapDecoder::new(initial, labels, constants)?.decode_table(&table)
}
