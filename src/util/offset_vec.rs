/// Number of slots an element takes up in an `OffsetVec`
pub trait Width {
    fn width(&self) -> usize;
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// Append-only vector addressed by the summed widths of preceding elements
///
/// This is how the constant pool is indexed: entries start at 1, and `long`/`double` entries
/// take two slots, the second of which can't be referenced.
#[derive(Clone, Debug)]
pub struct OffsetVec<T> {
    /// Entries, sorted by their offset
    entries: Vec<(Offset, T)>,

    /// Offset the next pushed element will get
    next_offset: Offset,
}

impl<T: Width> OffsetVec<T> {
    pub fn starting_at(first_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            next_offset: first_offset,
        }
    }

    pub fn next_offset(&self) -> Offset {
        self.next_offset
    }

    pub fn push(&mut self, element: T) -> Offset {
        let offset = self.next_offset;
        self.next_offset.0 += element.width();
        self.entries.push((offset, element));
        offset
    }

    /// Element starting exactly at an offset
    ///
    /// Offsets past the end, or in the middle of a wide element, have no element.
    pub fn get(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(start, _)| *start)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Offset, &T)> + '_ {
        self.entries.iter().map(|(offset, element)| (*offset, element))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Slot {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::Narrow(_) => 1,
                Slot::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn wide_entries_take_two_offsets() {
        let mut slots = OffsetVec::starting_at(Offset(1));
        assert_eq!(slots.push(Slot::Narrow(1)), Offset(1));
        assert_eq!(slots.push(Slot::Wide(2)), Offset(2));
        assert_eq!(slots.push(Slot::Narrow(3)), Offset(4));
        assert_eq!(slots.next_offset(), Offset(5));

        assert_eq!(slots.get(Offset(2)), Some(&Slot::Wide(2)));
        assert_eq!(slots.get(Offset(3)), None);
        assert_eq!(slots.get(Offset(5)), None);
        assert_eq!(slots.get(Offset(0)), None);
        assert_eq!(
            slots.iter().map(|(offset, slot)| (offset.0, *slot)).collect::<Vec<_>>(),
            vec![(1, Slot::Narrow(1)), (2, Slot::Wide(2)), (4, Slot::Narrow(3))]
        );
    }
}
