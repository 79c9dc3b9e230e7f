use super::Label;
use crate::jvm::class_file::{
    RawVerificationType, StackMapFrame, StackMapTable, VerificationType,
};
use crate::jvm::{BaseType, BinaryName, ConstantsPool, Error, FieldType, MethodDescriptor};
use crate::util::Width;
use std::collections::HashMap;

/// Verification type inside a method body: classes by name, uninitialized objects by the label
/// of their `new` instruction
pub type FrameType = VerificationType<String, Label>;

/// Full stack map frame (what locals and stack hold when control reaches a label)
///
/// As in the class file, `long` and `double` take one entry in these lists even though they
/// span two local slots.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Frame {
    pub locals: Vec<FrameType>,
    pub stack: Vec<FrameType>,
}

impl Frame {
    /// Frame on method entry
    pub fn entry(
        class_name: &str,
        is_static: bool,
        is_constructor: bool,
        descriptor: &MethodDescriptor,
    ) -> Frame {
        let mut locals = vec![];
        if !is_static {
            locals.push(if is_constructor && class_name != BinaryName::OBJECT.as_str() {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(class_name.to_owned())
            });
        }
        locals.extend(descriptor.parameters.iter().map(Frame::field_type));
        Frame {
            locals,
            stack: vec![],
        }
    }

    /// Verification type of a value of some field type
    pub fn field_type(field_type: &FieldType) -> FrameType {
        match field_type {
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Base(_) => VerificationType::Integer,
            FieldType::Ref(reference) => VerificationType::Object(reference.class_constant_name()),
        }
    }

    /// Same locals, different stack
    pub fn with_stack(&self, stack: Vec<FrameType>) -> Frame {
        Frame {
            locals: self.locals.clone(),
            stack,
        }
    }

    /// Number of local variable slots covered by the frame
    pub fn local_slots(&self) -> usize {
        self.locals.iter().map(|local| local.width()).sum()
    }
}

/// Absolute offsets of the frames in a compressed table
pub(crate) fn frame_offsets(table: &StackMapTable) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(table.0.len());
    let mut previous: Option<usize> = None;
    for frame in &table.0 {
        let delta = frame.offset_delta() as usize;
        let offset = match previous {
            None => delta,
            Some(previous) => previous + delta + 1,
        };
        offsets.push(offset);
        previous = Some(offset);
    }
    offsets
}

/// Offsets of `new` instructions mentioned in a compressed table
pub(crate) fn uninitialized_offsets(table: &StackMapTable) -> Vec<usize> {
    let mut offsets = vec![];
    let mut collect = |types: &[RawVerificationType]| {
        for typ in types {
            if let VerificationType::Uninitialized(offset) = typ {
                offsets.push(*offset as usize);
            }
        }
    };
    for frame in &table.0 {
        match frame {
            StackMapFrame::SameLocalsOneStack { stack, .. } => collect(std::slice::from_ref(stack)),
            StackMapFrame::AppendLocalsNoStack { locals, .. } => collect(locals),
            StackMapFrame::Full { locals, stack, .. } => {
                collect(locals);
                collect(stack);
            }
            _ => (),
        }
    }
    offsets
}

/// Expand a compressed table into full frames, paired with their absolute offsets
pub(crate) fn expand_frames(
    table: &StackMapTable,
    entry: &Frame,
    constants: &ConstantsPool,
    labels: &HashMap<usize, Label>,
) -> Result<Vec<(usize, Frame)>, Error> {
    let resolve = |raw: &RawVerificationType| -> Result<FrameType, Error> {
        raw.map(
            |class| constants.class_name(*class).map(str::to_owned),
            |offset| {
                labels
                    .get(&(*offset as usize))
                    .copied()
                    .ok_or_else(|| Error::MalformedAttribute {
                        name: "StackMapTable",
                        reason: format!("uninitialized type at offset {}", offset),
                    })
            },
        )
    };
    let resolve_all = |raws: &[RawVerificationType]| -> Result<Vec<FrameType>, Error> {
        raws.iter().map(&resolve).collect()
    };

    let mut expanded = Vec::with_capacity(table.0.len());
    let mut current = entry.clone();
    for (frame, offset) in table.0.iter().zip(frame_offsets(table)) {
        current = match frame {
            StackMapFrame::SameLocalsNoStack { .. } => current.with_stack(vec![]),
            StackMapFrame::SameLocalsOneStack { stack, .. } => {
                current.with_stack(vec![resolve(stack)?])
            }
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let mut locals = current.locals;
                let keep = locals.len().checked_sub(*chopped_k as usize).ok_or_else(|| {
                    Error::MalformedAttribute {
                        name: "StackMapTable",
                        reason: format!("chop of {} locals at offset {}", chopped_k, offset),
                    }
                })?;
                locals.truncate(keep);
                Frame {
                    locals,
                    stack: vec![],
                }
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                let mut all_locals = current.locals;
                all_locals.extend(resolve_all(locals)?);
                Frame {
                    locals: all_locals,
                    stack: vec![],
                }
            }
            StackMapFrame::Full { locals, stack, .. } => Frame {
                locals: resolve_all(locals)?,
                stack: resolve_all(stack)?,
            },
        };
        expanded.push((offset, current.clone()));
    }
    Ok(expanded)
}

/// Encode frames (sorted by offset, one per offset) as a table of full frames
pub(crate) fn compress_frames(
    frames: &[(usize, &Frame)],
    constants: &mut ConstantsPool,
    labels: &HashMap<Label, usize>,
) -> Result<StackMapTable, Error> {
    let mut encode = |typ: &FrameType| -> Result<RawVerificationType, Error> {
        Ok(match typ {
            VerificationType::Object(name) => VerificationType::Object(constants.get_class(name)?),
            VerificationType::Uninitialized(label) => {
                let offset = labels.get(label).ok_or(Error::UnplacedLabel(*label))?;
                VerificationType::Uninitialized(*offset as u16)
            }
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
        })
    };

    let mut table = Vec::with_capacity(frames.len());
    let mut previous: Option<usize> = None;
    for (offset, frame) in frames {
        let offset_delta = match previous {
            None => *offset,
            Some(previous) => offset - previous - 1,
        };
        previous = Some(*offset);
        let locals = frame.locals.iter().map(&mut encode).collect::<Result<_, _>>()?;
        let stack = frame.stack.iter().map(&mut encode).collect::<Result<_, _>>()?;
        table.push(StackMapFrame::Full {
            offset_delta: offset_delta as u16,
            locals,
            stack,
        });
    }
    Ok(StackMapTable(table))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::parse_method_descriptor;

    #[test]
    fn entry_frames() {
        let descriptor = parse_method_descriptor("(J[ILjava/lang/String;)V").unwrap();
        let frame = Frame::entry("com/acme/Widget", false, false, &descriptor);
        assert_eq!(
            frame.locals,
            vec![
                VerificationType::Object("com/acme/Widget".to_owned()),
                VerificationType::Long,
                VerificationType::Object("[I".to_owned()),
                VerificationType::Object("java/lang/String".to_owned()),
            ]
        );
        assert_eq!(frame.local_slots(), 5);

        let constructor = Frame::entry("com/acme/Widget", false, true, &descriptor);
        assert_eq!(constructor.locals[0], VerificationType::UninitializedThis);
    }

    #[test]
    fn compressed_frames_expand_relative_to_previous() {
        let constants = ConstantsPool::new();
        let table = StackMapTable(vec![
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 4,
                locals: vec![VerificationType::Integer, VerificationType::Long],
            },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 2,
                stack: VerificationType::Float,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 0,
                chopped_k: 1,
            },
        ]);
        assert_eq!(frame_offsets(&table), vec![4, 7, 8]);

        let entry = Frame {
            locals: vec![VerificationType::Object("A".to_owned())],
            stack: vec![],
        };
        let frames = expand_frames(&table, &entry, &constants, &HashMap::new()).unwrap();
        assert_eq!(frames[0].1.locals.len(), 3);
        assert_eq!(frames[1].1.stack, vec![VerificationType::Float]);
        assert_eq!(frames[1].1.locals.len(), 3);
        assert_eq!(
            frames[2].1.locals,
            vec![
                VerificationType::Object("A".to_owned()),
                VerificationType::Integer
            ]
        );
    }

    #[test]
    fn over_chopping_is_malformed() {
        let table = StackMapTable(vec![StackMapFrame::ChopLocalsNoStack {
            offset_delta: 0,
            chopped_k: 2,
        }]);
        let constants = ConstantsPool::new();
        let result = expand_frames(&table, &Frame::default(), &constants, &HashMap::new());
        assert!(matches!(result, Err(Error::MalformedAttribute { .. })));
    }
}
