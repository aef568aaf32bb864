use super::VerificationType;
use crate::jvm::{
    BinaryName, FieldAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor, RefType,
    UnqualifiedName,
};

/// Snapshot of the stack, local variables, and pending field assignments at a point in the bytecode
///
///   - `L` is the label type (used for the frame target and for uninitialized objects)
///   - `C` is the class type (used for object types)
///   - `F` is the field type (used for unset fields)
///
/// Equality ignores `frame_type`: two frames describing the same state are equal, regardless of
/// how they were encoded.
#[derive(Debug, Clone)]
pub struct StackMapFrameInfo<L, C, F> {
    /// Tag byte the frame was decoded from or encoded with (`0` if not known yet)
    pub frame_type: u8,

    /// Instruction the frame describes
    pub target: L,

    /// Local variables in scope
    pub locals: Vec<VerificationType<C, L>>,

    /// Types of values on the stack
    pub stack: Vec<VerificationType<C, L>>,

    /// Fields of `this` not yet assigned (only while `this` is uninitialized)
    pub unset_fields: Vec<F>,
}

impl<L: PartialEq, C: PartialEq, F: PartialEq> PartialEq for StackMapFrameInfo<L, C, F> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.locals == other.locals
            && self.stack == other.stack
            && self.unset_fields == other.unset_fields
    }
}

impl<L: Eq, C: Eq, F: Eq> Eq for StackMapFrameInfo<L, C, F> {}

impl<L, C, F> StackMapFrameInfo<L, C, F> {
    pub fn new(
        target: L,
        locals: Vec<VerificationType<C, L>>,
        stack: Vec<VerificationType<C, L>>,
    ) -> Self {
        StackMapFrameInfo {
            frame_type: 0,
            target,
            locals,
            stack,
            unset_fields: vec![],
        }
    }

    pub fn with_unset_fields(mut self, unset_fields: Vec<F>) -> Self {
        self.unset_fields = unset_fields;
        self
    }

    /// Is `this` still under construction in the locals?
    pub fn has_uninitialized_this(&self) -> bool {
        has_uninitialized_this(&self.locals)
    }
}

pub(crate) fn has_uninitialized_this<C, L>(locals: &[VerificationType<C, L>]) -> bool {
    locals
        .iter()
        .any(|local| matches!(local, VerificationType::UninitializedThis))
}

/// Implicit frame at the start of a method
///
/// It is never written in the stack map table: the first frame is encoded relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialFrame<L, C, F> {
    pub locals: Vec<VerificationType<C, L>>,
    pub unset_fields: Vec<F>,
}

impl<L, C, F> Default for InitialFrame<L, C, F> {
    fn default() -> Self {
        InitialFrame {
            locals: vec![],
            unset_fields: vec![],
        }
    }
}

/// Field, identified the way a `fieldref` constant would identify it
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

/// Field declared in the class that owns the method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub access_flags: FieldAccessFlags,
}

/// Everything about a method needed to derive its initial frame
#[derive(Debug, Clone)]
pub struct MethodContext {
    /// Class declaring the method
    pub class: BinaryName,

    /// Superclass of the declaring class (`None` only for `java/lang/Object`)
    pub superclass: Option<BinaryName>,

    pub name: UnqualifiedName,
    pub access_flags: MethodAccessFlags,
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Fields declared by `class`, in declaration order
    pub fields: Vec<FieldDeclaration>,

    /// Track strictly-initialized fields as unset in constructor frames
    pub larval_tracking: bool,
}

impl MethodContext {
    pub fn new(
        class: BinaryName,
        name: UnqualifiedName,
        access_flags: MethodAccessFlags,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> MethodContext {
        let superclass = if class == BinaryName::OBJECT {
            None
        } else {
            Some(BinaryName::OBJECT)
        };
        MethodContext {
            class,
            superclass,
            name,
            access_flags,
            descriptor,
            fields: vec![],
            larval_tracking: false,
        }
    }

    pub fn with_superclass(mut self, superclass: Option<BinaryName>) -> Self {
        self.superclass = superclass;
        self
    }

    /// Declare the fields of the class and turn on larval tracking
    pub fn with_larval_fields(mut self, fields: Vec<FieldDeclaration>) -> Self {
        self.fields = fields;
        self.larval_tracking = true;
        self
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        !self.is_static() && self.name == UnqualifiedName::INIT
    }

    /// Is `this` uninitialized on entry?
    ///
    /// Only constructors of classes with a superclass need to call a super constructor first.
    fn starts_uninitialized(&self) -> bool {
        self.is_constructor() && self.superclass.is_some()
    }

    /// Compute the implicit frame at offset 0
    ///
    /// Every parameter takes up exactly one entry in the locals, wide or not.
    pub fn initial_frame<L>(&self) -> InitialFrame<L, RefType<BinaryName>, FieldRef> {
        let mut locals = Vec::with_capacity(self.descriptor.parameters.len() + 1);

        if !self.is_static() {
            if self.starts_uninitialized() {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::Object(RefType::Object(self.class.clone())));
            }
        }
        locals.extend(
            self.descriptor
                .parameters
                .iter()
                .map(|parameter| VerificationType::from(parameter.clone())),
        );

        let unset_fields = if self.larval_tracking && self.starts_uninitialized() {
            self.fields
                .iter()
                .filter(|field| {
                    field.access_flags.contains(FieldAccessFlags::STRICT_INIT)
                        && !field.access_flags.contains(FieldAccessFlags::STATIC)
                })
                .map(|field| FieldRef {
                    class: self.class.clone(),
                    name: field.name.clone(),
                    descriptor: field.descriptor.clone(),
                })
                .collect()
        } else {
            vec![]
        };

        InitialFrame {
            locals,
            unset_fields,
        }
    }
}
