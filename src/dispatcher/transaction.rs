/// An opaque, equality-comparable, hashable stand-in for "the calling
/// thread." The dispatcher never inspects `std::thread::current()`; the
/// embedding engine owns the mapping from its own executor/task identities
/// to these tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadToken(u64);

impl ThreadToken {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for ThreadToken {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// The four accessors the dispatcher's admission policy needs from a
/// transaction. Everything else about the transaction is opaque to it.
pub trait TransactionDescriptor {
    fn thread(&self) -> ThreadToken;
    fn is_exclusive(&self) -> bool;
    fn set_exclusive(&mut self, exclusive: bool);
    fn was_created_exclusive(&self) -> bool;
    fn is_gc_transaction(&self) -> bool;
    fn set_acquired_permits(&mut self, permits: u32);
}
