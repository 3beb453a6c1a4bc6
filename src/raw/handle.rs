use core::fmt;
use core::num::NonZero;

// Narrow in unit tests so the capacity limit is reachable.
#[cfg(test)]
type Slot = u16;
#[cfg(not(test))]
type Slot = u32;

/// Position of a node in its tree's arena, stored one-based so that
/// `Option<Handle>` is the same size as `Handle`.
///
/// Parent and leaf-chain links are handles, so they never own the node they
/// point at.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub(crate) struct Handle(NonZero<Slot>);

impl Handle {
    /// Largest arena index a handle can address.
    pub(crate) const MAX: usize = Slot::MAX as usize - 1;

    /// Handle for arena index `index`, or `None` past [`Handle::MAX`].
    pub(crate) fn try_from_index(index: usize) -> Option<Self> {
        let one_based = index.checked_add(1)?;
        Slot::try_from(one_based).ok().and_then(NonZero::new).map(Self)
    }

    /// # Panics
    ///
    /// Panics if `index > Handle::MAX`: the arena is full.
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        match Self::try_from_index(index) {
            Some(handle) => handle,
            None => panic!("arena index {index} exceeds handle capacity {}", Self::MAX),
        }
    }

    #[inline]
    pub(crate) fn to_index(self) -> usize {
        self.0.get() as usize - 1
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(Handle, Option<Handle>);
    assert_eq_size!(Handle, Slot);

    #[test]
    fn capacity_is_bounded() {
        assert!(Handle::try_from_index(Handle::MAX).is_some());
        assert!(Handle::try_from_index(Handle::MAX + 1).is_none());
        assert!(Handle::try_from_index(usize::MAX).is_none());
    }

    #[test]
    #[should_panic(expected = "exceeds handle capacity")]
    fn full_arena_panics() {
        let _ = Handle::from_index(Handle::MAX + 1);
    }

    #[test]
    fn debug_is_zero_based() {
        assert_eq!(format!("{:?}", Handle::from_index(0)), "#0");
        assert_eq!(format!("{:?}", Handle::from_index(41)), "#41");
    }

    proptest! {
        #[test]
        fn index_survives_conversion(index in 0..=Handle::MAX) {
            prop_assert_eq!(Handle::from_index(index).to_index(), index);
        }
    }
}
