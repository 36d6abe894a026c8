use std::fmt::{self, Display, Formatter};

/// Number of times the 32-bit transaction id space has wrapped around.
pub type Epoch = u32;

/// 32-bit transaction identifier compared modulo 2^32.
///
/// Identifiers below [`TransactionId::FIRST_NORMAL`] are reserved and never wrap: they compare as plain
/// unsigned integers, which makes [`TransactionId::INVALID`] precede every normal transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransactionId(u32);

impl TransactionId {
    pub const INVALID: Self = Self(0);
    pub const BOOTSTRAP: Self = Self(1);
    pub const FROZEN: Self = Self(2);
    pub const FIRST_NORMAL: Self = Self(3);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    pub const fn is_normal(self) -> bool {
        self.0 >= Self::FIRST_NORMAL.0
    }

    /// Signed distance from `other` to `self`, only meaningful when both are normal.
    fn distance(self, other: Self) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// Is `self` logically older than `other`?
    pub fn precedes(self, other: Self) -> bool {
        if !self.is_normal() || !other.is_normal() {
            return self.0 < other.0;
        }
        self.distance(other) < 0
    }

    pub fn precedes_or_equals(self, other: Self) -> bool {
        if !self.is_normal() || !other.is_normal() {
            return self.0 <= other.0;
        }
        self.distance(other) <= 0
    }

    pub fn follows(self, other: Self) -> bool {
        if !self.is_normal() || !other.is_normal() {
            return self.0 > other.0;
        }
        self.distance(other) > 0
    }

    pub fn follows_or_equals(self, other: Self) -> bool {
        if !self.is_normal() || !other.is_normal() {
            return self.0 >= other.0;
        }
        self.distance(other) >= 0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction id widened with its epoch, giving a total order that survives wraparound.
///
/// The epoch occupies the high 32 bits so the derived `Ord` on the packed value is the logical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FullTransactionId(u64);

impl FullTransactionId {
    pub const fn new(epoch: Epoch, xid: TransactionId) -> Self {
        Self(((epoch as u64) << 32) | xid.get() as u64)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn epoch(self) -> Epoch {
        (self.0 >> 32) as Epoch
    }

    pub const fn xid(self) -> TransactionId {
        TransactionId::new(self.0 as u32)
    }

    pub fn precedes(self, other: Self) -> bool {
        self < other
    }

    pub fn follows(self, other: Self) -> bool {
        self > other
    }
}

impl Display for FullTransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.epoch(), self.xid())
    }
}

#[cfg(test)]
mod tests {
    use super::{FullTransactionId, TransactionId};

    #[test]
    fn test_invalid_precedes_normal() {
        let xid = TransactionId::new(100);
        assert!(TransactionId::INVALID.precedes(xid));
        assert!(!xid.precedes(TransactionId::INVALID));
        assert!(TransactionId::FROZEN.precedes(TransactionId::FIRST_NORMAL));
    }

    #[test]
    fn test_wraparound() {
        let old = TransactionId::new(u32::MAX - 10);
        let young = TransactionId::new(5);
        assert!(old.precedes(young));
        assert!(young.follows(old));
        assert!(young.follows_or_equals(old));
        assert!(!young.precedes_or_equals(old));
        assert!(young.follows_or_equals(young));
        assert!(young.precedes_or_equals(young));
    }

    #[test]
    fn test_full_transaction_id() {
        let before = FullTransactionId::new(1, TransactionId::new(u32::MAX - 1));
        let after = FullTransactionId::new(2, TransactionId::new(3));
        assert!(before.precedes(after));
        assert!(after.follows(before));
        assert_eq!(2, after.epoch());
        assert_eq!(TransactionId::new(3), after.xid());
        assert_eq!(after, FullTransactionId::from_raw(after.raw()));
        assert_eq!("2:3", after.to_string());
    }
}
