use std::collections::HashMap;
use std::fmt;

/// Opaque label
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SynLabel(usize);

impl SynLabel {
    /// Label for the first block in the method
    pub const START: SynLabel = SynLabel(0);

    /// Get the next fresh label
    pub fn next(&self) -> SynLabel {
        SynLabel(self.0 + 1)
    }
}

/// Generates new labels
pub trait LabelGenerator<Label> {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

/// Label generator for [`SynLabel`]
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone)]
pub struct SynLabelGenerator(SynLabel);

impl SynLabelGenerator {
    pub fn new(start: SynLabel) -> SynLabelGenerator {
        SynLabelGenerator(start)
    }
}

impl LabelGenerator<SynLabel> for SynLabelGenerator {
    fn fresh_label(&mut self) -> SynLabel {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl fmt::Debug for SynLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Maps between bytecode offsets and labels
///
/// Stack map frames and uninitialized types refer to positions in the code by offset, but code
/// being built or inspected usually wants to talk about labels.
pub trait LabelResolver {
    type Label;

    /// Label for the instruction at the given offset (`None` if the offset is outside the code)
    fn label_at(&mut self, offset: u16) -> Option<Self::Label>;

    /// Offset of the instruction a label points to (`None` if the label is unbound)
    fn offset_of(&self, label: &Self::Label) -> Option<u16>;
}

/// Labels which just are the raw bytecode offsets
#[derive(Debug, Copy, Clone, Default)]
pub struct RawOffsets;

impl LabelResolver for RawOffsets {
    type Label = u16;

    fn label_at(&mut self, offset: u16) -> Option<u16> {
        Some(offset)
    }

    fn offset_of(&self, label: &u16) -> Option<u16> {
        Some(*label)
    }
}

/// Hands out one [`SynLabel`] per distinct offset inside a method body of known length
#[derive(Clone)]
pub struct OffsetLabels {
    code_length: u16,
    generator: SynLabelGenerator,
    labels: HashMap<u16, SynLabel>,
    offsets: HashMap<SynLabel, u16>,
}

impl OffsetLabels {
    pub fn new(code_length: u16) -> OffsetLabels {
        OffsetLabels {
            code_length,
            generator: SynLabelGenerator::new(SynLabel::START),
            labels: HashMap::new(),
            offsets: HashMap::new(),
        }
    }

    /// Number of distinct offsets that have been labelled
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl LabelResolver for OffsetLabels {
    type Label = SynLabel;

    fn label_at(&mut self, offset: u16) -> Option<SynLabel> {
        if offset >= self.code_length {
            return None;
        }
        if let Some(label) = self.labels.get(&offset) {
            return Some(*label);
        }
        let label = self.generator.fresh_label();
        self.labels.insert(offset, label);
        self.offsets.insert(label, offset);
        Some(label)
    }

    fn offset_of(&self, label: &SynLabel) -> Option<u16> {
        self.offsets.get(label).copied()
    }
}
