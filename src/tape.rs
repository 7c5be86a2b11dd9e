//! The memory a BF program runs against.

use std::num::NonZeroUsize;

/// A fixed-size array of byte cells and a pointer into it.
///
/// The tape never grows. The pointer is signed so that, when overflow
/// checking is off, a program may step off either end and come back;
/// any cell access made while it is off the tape fails instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape {
    cells: Vec<u8>,
    pointer: isize,
}

impl Tape {
    pub fn new(size: NonZeroUsize) -> Self {
        Tape {
            cells: vec![0; size.get()],
            pointer: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn pointer(&self) -> isize {
        self.pointer
    }

    pub(crate) fn set_pointer(&mut self, pointer: isize) {
        self.pointer = pointer;
    }

    /// The tape index `offset` cells away from the pointer, if that is
    /// on the tape.
    pub fn index(&self, offset: isize) -> Option<usize> {
        let target = self.pointer.checked_add(offset)?;
        usize::try_from(target)
            .ok()
            .filter(|&index| index < self.cells.len())
    }

    /// The cell `offset` cells away from the pointer.
    pub fn get(&self, offset: isize) -> Option<u8> {
        self.index(offset).map(|index| self.cells[index])
    }

    pub(crate) fn cell_mut(&mut self, index: usize) -> &mut u8 {
        &mut self.cells[index]
    }

    /// Zero every cell and move the pointer back to the start.
    pub fn reset(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = 0);
        self.pointer = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tape(size: usize) -> Tape {
        Tape::new(NonZeroUsize::new(size).unwrap())
    }

    #[test]
    fn new_tape_is_zeroed() {
        let tape = tape(4);
        assert_eq!(tape.cells(), &[0, 0, 0, 0]);
        assert_eq!(tape.pointer(), 0);
        assert_eq!(tape.len(), 4);
    }

    #[test]
    fn index_is_bounded() {
        let mut tape = tape(3);
        assert_eq!(tape.index(0), Some(0));
        assert_eq!(tape.index(2), Some(2));
        assert_eq!(tape.index(3), None);
        assert_eq!(tape.index(-1), None);

        tape.set_pointer(-2);
        assert_eq!(tape.index(0), None);
        assert_eq!(tape.index(2), Some(0));
        assert_eq!(tape.get(2), Some(0));
        assert_eq!(tape.get(1), None);
    }

    #[test]
    fn reset_clears_cells_and_pointer() {
        let mut tape = tape(2);
        *tape.cell_mut(1) = 7;
        tape.set_pointer(1);
        tape.reset();
        assert_eq!(tape, self::tape(2));
    }
}
