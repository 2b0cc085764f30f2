use super::Error;
use crate::ast::LocalId;
use crate::jvm::{self, FieldType};
use std::collections::HashMap;

/// Assigns local variable slots to parameters and local declarations
///
/// Locals are allocated like a stack: each declaration takes the next free slot, and leaving a
/// block frees every slot allocated inside it. Sibling blocks (eg. the two arms of an `if`) end up
/// sharing slots, while locals whose scopes overlap never do.
pub struct LocalSlots {
    /// Slot and declared type of every local currently in scope
    slots: HashMap<LocalId, (u16, FieldType)>,

    /// Locals declared in each open block, along with the first free slot on entry to the block
    scopes: Vec<(usize, Vec<LocalId>)>,

    /// Next free slot
    next_slot: usize,

    /// Highest `next_slot` ever reached
    max_locals: usize,
}

impl LocalSlots {
    /// Allocator whose first `reserved` slots are taken (eg. by `this`)
    pub fn new(reserved: usize) -> LocalSlots {
        LocalSlots {
            slots: HashMap::new(),
            scopes: vec![(reserved, vec![])],
            next_slot: reserved,
            max_locals: reserved,
        }
    }

    /// Allocate a slot for a new local in the current block
    pub fn declare(&mut self, local: LocalId, local_type: FieldType) -> Result<u16, Error> {
        let slot = u16::try_from(self.next_slot)
            .map_err(|_| jvm::Error::MethodCodeMaxLocalsOverflow(self.next_slot + 1))?;
        self.next_slot += 1;
        self.max_locals = self.max_locals.max(self.next_slot);

        log::trace!("Local {:?} in slot {}", local, slot);
        self.slots.insert(local, (slot, local_type));
        if let Some((_, declared)) = self.scopes.last_mut() {
            declared.push(local);
        }
        Ok(slot)
    }

    /// Slot and declared type of a local
    pub fn lookup(&self, local: LocalId) -> Result<(u16, &FieldType), Error> {
        self.slots
            .get(&local)
            .map(|(slot, local_type)| (*slot, local_type))
            .ok_or(Error::UnknownLocal(local))
    }

    pub fn enter_block(&mut self) {
        self.scopes.push((self.next_slot, vec![]));
    }

    /// Leave the innermost block, returning the first slot that was freed
    pub fn exit_block(&mut self) -> usize {
        if let Some((first_slot, declared)) = self.scopes.pop() {
            for local in declared {
                self.slots.remove(&local);
            }
            self.next_slot = first_slot;
        }
        self.next_slot
    }

    /// First free slot
    pub fn next_slot(&self) -> usize {
        self.next_slot
    }

    pub fn max_locals(&self) -> usize {
        self.max_locals
    }
}
