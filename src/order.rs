use core::fmt;

use crate::error::IndexError;

/// The branching factor `m` of a [`BPlusTree`](crate::BPlusTree).
///
/// A node splits as soon as it holds `m` keys, so `m - 1` keys is the most a
/// node keeps between operations. Non-root nodes never drop below
/// `⌊m/2⌋ - 1` keys after a delete.
///
/// # Examples
///
/// ```
/// use bplus_index::Order;
///
/// let order = Order::new(5).unwrap();
/// assert_eq!(order.max_keys(), 4);
/// assert_eq!(order.min_keys(), 1);
/// assert!(Order::new(2).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(usize);

impl Order {
    /// The smallest order for which the split arithmetic is well defined.
    pub const MIN: usize = 3;

    /// Order used when none is configured.
    pub const DEFAULT: Self = Self(5);

    /// Validates `m` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidOrder`] if `m < Order::MIN`.
    pub fn new(m: usize) -> Result<Self, IndexError> {
        if m < Self::MIN {
            return Err(IndexError::InvalidOrder { order: m });
        }
        Ok(Self(m))
    }

    /// Returns `m`.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Most keys a node holds once an operation completes (`m - 1`).
    #[must_use]
    pub const fn max_keys(self) -> usize {
        self.0 - 1
    }

    /// The underflow threshold `⌊m/2⌋ - 1`.
    #[must_use]
    pub const fn min_keys(self) -> usize {
        self.0 / 2 - 1
    }

    /// Number of keys the left half keeps on a split (`⌊m/2⌋`).
    #[must_use]
    pub const fn split_point(self) -> usize {
        self.0 / 2
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for Order {
    type Error = IndexError;

    fn try_from(m: usize) -> Result<Self, Self::Error> {
        Self::new(m)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_follow_floor_division() {
        let five = Order::new(5).unwrap();
        assert_eq!((five.max_keys(), five.min_keys(), five.split_point()), (4, 1, 2));

        let four = Order::new(4).unwrap();
        assert_eq!((four.max_keys(), four.min_keys(), four.split_point()), (3, 1, 2));

        let three = Order::new(3).unwrap();
        assert_eq!((three.max_keys(), three.min_keys(), three.split_point()), (2, 0, 1));
    }

    #[test]
    fn rejects_tiny_orders() {
        for m in 0..Order::MIN {
            assert!(matches!(Order::try_from(m), Err(IndexError::InvalidOrder { order }) if order == m));
        }
    }

    #[test]
    fn default_is_five() {
        assert_eq!(Order::default().get(), 5);
        assert_eq!(Order::DEFAULT.to_string(), "5");
    }
}
