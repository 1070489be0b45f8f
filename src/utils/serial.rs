use std::cmp::Ordering;

use super::timestamp_compare;

/// Protocol serial handed out by the display.
///
/// Serials wrap around, so they are compared with [`timestamp_compare`] rather than numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Serial(pub u32);

impl Serial {
    /// Whether this serial was issued at the same time or after `other`.
    pub fn is_no_older_than(&self, other: &Serial) -> bool {
        timestamp_compare(self.0, other.0) != Ordering::Less
    }
}

impl PartialOrd for Serial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(timestamp_compare(self.0, other.0))
    }
}

impl From<u32> for Serial {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Serial> for u32 {
    fn from(value: Serial) -> Self {
        value.0
    }
}

/// Monotonic serial source.
///
/// Zero is never returned because clients treat it as "no serial".
#[derive(Debug)]
pub struct SerialCounter {
    next: u32,
}

impl SerialCounter {
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_serial(&mut self) -> Serial {
        let serial = self.next;
        self.next = self.next.wrapping_add(1);
        if self.next == 0 {
            self.next = 1;
        }
        Serial(serial)
    }

    /// Serial that the next call to [`SerialCounter::next_serial`] will return.
    pub fn peek(&self) -> Serial {
        Serial(self.next)
    }
}

impl Default for SerialCounter {
    fn default() -> Self {
        Self::new()
    }
}
