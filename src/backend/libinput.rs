//! Input devices through libinput, opened via a libseat session.

use anyhow::Context as _;
use calloop::LoopHandle;
use smithay::backend::libinput::{LibinputInputBackend, LibinputSessionInterface};
use smithay::backend::session::libseat::LibSeatSession;
use smithay::backend::session::{Event as SessionEvent, Session};
use smithay::reexports::input::Libinput;

use crate::strata::State;

/// Keeps the session that grants access to the input devices.
pub struct LibinputInput {
    session: LibSeatSession,
    libinput: Libinput,
}

impl LibinputInput {
    pub fn new(event_loop: &LoopHandle<'static, State>) -> anyhow::Result<Self> {
        let (session, notifier) = LibSeatSession::new().context("error creating the session")?;
        let seat_name = session.seat();

        let mut libinput =
            Libinput::new_with_udev(LibinputSessionInterface::from(session.clone()));
        libinput
            .udev_assign_seat(&seat_name)
            .map_err(|()| anyhow::anyhow!("error assigning libinput to {seat_name}"))?;

        let input_backend = LibinputInputBackend::new(libinput.clone());
        event_loop
            .insert_source(input_backend, |event, _, state| {
                state.strata.process_input_event(event);
            })
            .map_err(|err| anyhow::anyhow!("error inserting the libinput source: {err}"))?;

        let mut session_libinput = libinput.clone();
        event_loop
            .insert_source(notifier, move |event, _, _| match event {
                SessionEvent::PauseSession => {
                    debug!("pausing session");
                    session_libinput.suspend();
                }
                SessionEvent::ActivateSession => {
                    debug!("resuming session");
                    if session_libinput.resume().is_err() {
                        error!("error resuming libinput");
                    }
                }
            })
            .map_err(|err| anyhow::anyhow!("error inserting the session source: {err}"))?;

        info!("reading input devices on {seat_name}");
        Ok(Self { session, libinput })
    }

    pub fn seat_name(&self) -> String {
        self.session.seat()
    }
}

impl Drop for LibinputInput {
    fn drop(&mut self) {
        self.libinput.suspend();
    }
}
