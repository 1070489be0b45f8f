use std::sync::atomic::{AtomicU32, Ordering};

/// Counter that returns unique IDs.
///
/// Under the hood it uses a `u32` that will eventually wrap around. Entities that get an ID from
/// the counter are short-lived compared to that.
pub struct IdCounter {
    value: AtomicU32,
}

impl IdCounter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU32::new(1),
        }
    }

    pub fn next(&self) -> u32 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Declares an opaque process-wide unique ID type backed by its own [`IdCounter`].
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn next() -> Self {
                static COUNTER: $crate::utils::id::IdCounter = $crate::utils::id::IdCounter::new();
                Self(COUNTER.next())
            }

            pub fn get(self) -> u32 {
                self.0
            }
        }
    };
}

pub(crate) use define_id;

#[cfg(test)]
mod tests {
    define_id!(TestId);

    #[test]
    fn ids_are_unique() {
        let a = TestId::next();
        let b = TestId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }
}
