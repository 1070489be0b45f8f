//! Xwayland startup and the window manager connection to X servers.

use std::os::fd::OwnedFd;
use std::process::Stdio;

use anyhow::Context as _;
use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use smithay::xwayland::{XWayland, XWaylandEvent};

use crate::strata::{State, Strata};
use crate::x11::connection::XConnection;

/// Hands an X connection to the window manager and dispatches its events from the loop.
pub fn insert_x11_connection(
    event_loop: &LoopHandle<'static, State>,
    strata: &mut Strata,
    conn: XConnection,
) -> anyhow::Result<()> {
    let fd: OwnedFd = conn.fd().context("error duplicating the X connection fd")?;
    strata.set_x11_connection(Box::new(conn));

    let source = Generic::new(fd, Interest::READ, Mode::Level);
    event_loop
        .insert_source(source, |_, _, state| {
            state.strata.dispatch_x11_events();
            Ok(PostAction::Continue)
        })
        .map_err(|err| anyhow::anyhow!("error inserting the X connection source: {err}"))?;

    strata.dispatch_x11_events();
    Ok(())
}

/// Starts Xwayland as a Wayland client and manages its windows once it's ready.
pub fn spawn_xwayland(
    event_loop: &LoopHandle<'static, State>,
    strata: &mut Strata,
) -> anyhow::Result<()> {
    let _span = tracy_client::span!("spawn_xwayland");

    let id = strata.display.create_xwayland_client(None);
    let (xwayland, client) = XWayland::spawn(
        &strata.frontend.display_handle,
        None,
        std::iter::empty::<(String, String)>(),
        true,
        Stdio::null(),
        Stdio::null(),
        |user_data| {
            user_data.insert_if_missing(|| id);
        },
    )
    .context("error spawning Xwayland")?;
    strata.frontend.client_connected(id, client);

    event_loop
        .insert_source(xwayland, move |event, _, state| match event {
            XWaylandEvent::Ready {
                x11_socket,
                display_number,
            } => {
                info!("Xwayland ready on :{display_number}");
                std::env::set_var("DISPLAY", format!(":{display_number}"));

                let strata = &mut state.strata;
                let result = XConnection::from_stream(x11_socket)
                    .context("error taking over Xwayland")
                    .and_then(|conn| {
                        let event_loop = strata.event_loop.clone();
                        insert_x11_connection(&event_loop, strata, conn)
                    });
                if let Err(err) = result {
                    warn!("{err:?}");
                }
            }
            XWaylandEvent::Error => {
                warn!("Xwayland failed to start");
                state.strata.client_disconnected(id);
            }
        })
        .map_err(|err| anyhow::anyhow!("error inserting the Xwayland source: {err}"))?;

    Ok(())
}
