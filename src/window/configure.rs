use std::collections::VecDeque;

use smithay::utils::{Logical, Rectangle};

use super::MaximizeMode;
use crate::display::ProtocolError;
use crate::utils::serial::Serial;

/// `xdg_surface.error.invalid_serial`
pub const ERROR_INVALID_SERIAL: u32 = 4;

/// Configure sent to the client that wasn't reflected in a commit yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConfigure {
    pub serial: Serial,
    /// Frame geometry the window will have once the client commits a buffer for this configure.
    pub geometry: Rectangle<i32, Logical>,
    pub maximize: MaximizeMode,
    pub fullscreen: bool,
}

/// Ordered queue of configures awaiting acknowledgement.
#[derive(Debug, Default)]
pub struct ConfigureQueue {
    pending: VecDeque<PendingConfigure>,
    last_acked: Option<Serial>,
    /// Serial acked since the last commit.
    unapplied_ack: Option<Serial>,
}

impl ConfigureQueue {
    pub fn push(&mut self, configure: PendingConfigure) {
        self.pending.push_back(configure);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Most recently sent configure that is still pending.
    pub fn latest(&self) -> Option<&PendingConfigure> {
        self.pending.back()
    }

    pub fn last_acked(&self) -> Option<Serial> {
        self.last_acked
    }

    /// Records a client acknowledgement.
    ///
    /// Acking a serial that was never sent is a protocol error.
    pub fn ack(&mut self, serial: Serial) -> Result<(), ProtocolError> {
        if !self.pending.iter().any(|c| c.serial == serial) {
            return Err(ProtocolError::new(
                "xdg_surface",
                ERROR_INVALID_SERIAL,
                format!("wrong configure serial: {}", serial.0),
            ));
        }

        self.last_acked = Some(serial);
        self.unapplied_ack = Some(serial);
        Ok(())
    }

    /// Takes the configures that the commit being processed applies.
    ///
    /// Returns the acked configure with the greatest serial and discards every older one. Entries
    /// sent after the acked serial stay queued.
    pub fn take_acked(&mut self) -> Option<PendingConfigure> {
        let acked = self.unapplied_ack.take()?;

        let mut rv = None;
        while let Some(front) = self.pending.front() {
            if !acked.is_no_older_than(&front.serial) {
                break;
            }
            rv = self.pending.pop_front();
        }
        rv
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.unapplied_ack = None;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn configure(serial: u32, x: i32) -> PendingConfigure {
        PendingConfigure {
            serial: Serial(serial),
            geometry: Rectangle::new((x, 0).into(), (100, 100).into()),
            maximize: MaximizeMode::empty(),
            fullscreen: false,
        }
    }

    #[test]
    fn ack_applies_up_to_serial() {
        let mut queue = ConfigureQueue::default();
        queue.push(configure(1, 10));
        queue.push(configure(2, 20));
        queue.push(configure(3, 30));

        queue.ack(Serial(2)).unwrap();
        let applied = queue.take_acked().unwrap();
        assert_eq!(applied.geometry.loc.x, 20);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.latest().unwrap().serial, Serial(3));

        // Nothing new was acked.
        assert_eq!(queue.take_acked(), None);
    }

    #[test]
    fn unknown_serial_is_protocol_error() {
        let mut queue = ConfigureQueue::default();
        queue.push(configure(5, 0));
        let err = queue.ack(Serial(4)).unwrap_err();
        assert_eq!(err.interface, "xdg_surface");
        assert_eq!(queue.last_acked(), None);
    }

    proptest! {
        #[test]
        fn commit_applies_greatest_acked(count in 1u32..10, ack_idx in 0u32..10) {
            let ack_idx = ack_idx % count;
            let mut queue = ConfigureQueue::default();
            for i in 0..count {
                queue.push(configure(i + 1, i as i32 * 10));
            }

            let acked = ack_idx + 1;
            queue.ack(Serial(acked)).unwrap();
            let applied = queue.take_acked().unwrap();

            prop_assert_eq!(applied.serial, Serial(acked));
            prop_assert_eq!(applied.geometry.loc.x, ack_idx as i32 * 10);
            prop_assert_eq!(queue.len() as u32, count - acked);
        }
    }
}
