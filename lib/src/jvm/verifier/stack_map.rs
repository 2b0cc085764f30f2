use super::{Frame, SerializableFrame};
use crate::jvm::class_file::{StackMapFrame, StackMapTable};

impl SerializableFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        let this_locals_len = self.locals.len();
        let prev_locals_len = previous_frame.locals.len();

        match self.stack.len() {
            0 if this_locals_len <= prev_locals_len => {
                let len_difference = prev_locals_len - this_locals_len;
                if len_difference < 4 && previous_frame.locals.starts_with(&self.locals) {
                    if len_difference == 0 {
                        return StackMapFrame::SameLocalsNoStack { offset_delta };
                    } else {
                        return StackMapFrame::ChopLocalsNoStack {
                            offset_delta,
                            chopped_k: len_difference as u8,
                        };
                    }
                }
            }
            0 if this_locals_len - prev_locals_len < 4 => {
                if self.locals.starts_with(&previous_frame.locals) {
                    return StackMapFrame::AppendLocalsNoStack {
                        offset_delta,
                        locals: self.locals[prev_locals_len..].to_vec(),
                    };
                }
            }
            1 if self.locals == previous_frame.locals => {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: self.stack[0].clone(),
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            locals: self.locals.clone(),
            stack: self.stack.clone(),
        }
    }
}

/// Reduce frames (ordered by strictly increasing offset) into a stack map table
///
/// The first frame is encoded relative to the implicit frame on entry to the method and its
/// offset delta is the offset itself. Every later frame is relative to the frame before it, with
/// an offset delta one less than the distance between the two.
pub fn stack_map_table(
    entry_frame: &SerializableFrame,
    frames: &[(u16, SerializableFrame)],
) -> StackMapTable {
    let mut stack_map_frames = Vec::with_capacity(frames.len());
    let mut previous: Option<(u16, &SerializableFrame)> = None;

    for (offset, frame) in frames {
        let (offset_delta, previous_frame) = match previous {
            None => (*offset, entry_frame),
            Some((previous_offset, previous_frame)) => {
                debug_assert!(*offset > previous_offset, "frame offsets out of order");
                (offset - previous_offset - 1, previous_frame)
            }
        };
        let encoded = frame.stack_map_frame(offset_delta, previous_frame);
        log::trace!("Frame at {}: {:?}", offset, encoded);
        stack_map_frames.push(encoded);
        previous = Some((*offset, frame));
    }

    StackMapTable(stack_map_frames)
}

/// Replay a stack map table, recovering the absolute offset and full frame of every entry
///
/// This is the inverse of [`stack_map_table`] and is used when reading class files back in.
pub fn expand_stack_map_table(
    entry_frame: &SerializableFrame,
    table: &StackMapTable,
) -> Result<Vec<(u16, SerializableFrame)>, String> {
    let mut frames: Vec<(u16, SerializableFrame)> = vec![];
    let mut previous_frame = entry_frame.clone();
    let mut previous_offset: Option<u16> = None;

    for stack_map_frame in &table.0 {
        let offset_delta = stack_map_frame.offset_delta();
        let offset = match previous_offset {
            None => Some(offset_delta),
            Some(previous) => previous
                .checked_add(offset_delta)
                .and_then(|offset| offset.checked_add(1)),
        }
        .ok_or_else(|| "Stack map frame offset overflows".to_string())?;

        let frame = match stack_map_frame {
            StackMapFrame::SameLocalsNoStack { .. } => Frame {
                locals: previous_frame.locals.clone(),
                stack: vec![],
            },
            StackMapFrame::SameLocalsOneStack { stack, .. } => Frame {
                locals: previous_frame.locals.clone(),
                stack: vec![stack.clone()],
            },
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let kept = previous_frame
                    .locals
                    .len()
                    .checked_sub(*chopped_k as usize)
                    .ok_or_else(|| format!("Cannot chop {} locals", chopped_k))?;
                Frame {
                    locals: previous_frame.locals[..kept].to_vec(),
                    stack: vec![],
                }
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                let mut all_locals = previous_frame.locals.clone();
                all_locals.extend(locals.iter().cloned());
                Frame {
                    locals: all_locals,
                    stack: vec![],
                }
            }
            StackMapFrame::Full { locals, stack, .. } => Frame {
                locals: locals.clone(),
                stack: stack.clone(),
            },
        };

        frames.push((offset, frame.clone()));
        previous_frame = frame;
        previous_offset = Some(offset);
    }

    Ok(frames)
}
