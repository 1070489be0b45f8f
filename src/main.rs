#[macro_use]
extern crate tracing;

use std::env;
use std::process::Command;
use std::time::Duration;

use anyhow::Context as _;
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use clap::Parser;
use strata::backend::headless::Headless;
use strata::backend::libinput::LibinputInput;
use strata::backend::Backend;
use strata::cli::{config_path, Cli, Sub};
use strata::frontend::xwayland::{insert_x11_connection, spawn_xwayland};
use strata::strata::{Environment, State};
use strata::texture::formats::FormatEntry;
use strata::utils::clock::Clock;
use strata::utils::version;
use strata::x11::connection::XConnection;
use strata_config::Config;
use tracing_subscriber::EnvFilter;

/// Size of the virtual outputs created with `--outputs`.
const DEFAULT_OUTPUT_SIZE: (u16, u16) = (1920, 1080);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if env::var_os("RUST_BACKTRACE").is_none() {
        env::set_var("RUST_BACKTRACE", "1");
    }

    let directives = env::var("RUST_LOG").unwrap_or_else(|_| "strata=debug,info".to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();

    match cli.subcommand {
        Some(Sub::Validate { config }) => {
            tracy_client::Client::start();

            config_path(config).load()?;
            info!("config is valid");
            return Ok(());
        }
        Some(Sub::Formats) => {
            print_formats()?;
            return Ok(());
        }
        None => (),
    }

    let _client = tracy_client::Client::start();

    info!("starting version {}", &version());

    let path = config_path(cli.config);
    let (created_at, result) = path.load_or_create();
    if let Some(created_at) = created_at {
        info!("wrote the default config to {created_at:?}");
    }
    let config = match result {
        Ok(config) => config,
        Err(err) => {
            warn!("{err:?}");
            Config::default()
        }
    };
    let has_outputs = !config.outputs.is_empty();

    let mut event_loop = EventLoop::<State>::try_new().context("error creating the event loop")?;
    let mut state = State::new(
        config,
        Environment::from_process(),
        event_loop.handle(),
        event_loop.get_signal(),
        Backend::Headless(Headless::new()),
        Clock::default(),
    )?;

    if !has_outputs {
        for _ in 0..cli.outputs.unwrap_or(1) {
            state
                .backend
                .headless()
                .add_next_output(&mut state.strata, DEFAULT_OUTPUT_SIZE);
        }
    }

    let handle = event_loop.handle();
    if let Err(err) = state.strata.frontend.add_listening_socket(&handle) {
        warn!("error adding the Wayland socket: {err:?}");
    }

    let _input = if cli.libinput {
        match LibinputInput::new(&handle) {
            Ok(input) => {
                debug!("libinput seat: {}", input.seat_name());
                Some(input)
            }
            Err(err) => {
                warn!("error initializing libinput: {err:?}");
                None
            }
        }
    } else {
        None
    };

    if cli.xwayland {
        if let Err(err) = spawn_xwayland(&handle, &mut state.strata) {
            warn!("{err:?}");
        }
    } else if env::var_os("DISPLAY").is_some() {
        let result = XConnection::connect(None)
            .context("error connecting to the X server")
            .and_then(|conn| insert_x11_connection(&handle, &mut state.strata, conn));
        if let Err(err) = result {
            warn!("error taking over the X server: {err:?}");
        }
    }

    // Wake up at the refresh rate so queued outputs get repainted.
    let interval = state
        .strata
        .outputs
        .iter()
        .map(|output| output.refresh_interval())
        .min()
        .unwrap_or(Duration::from_millis(16));
    event_loop
        .handle()
        .insert_source(Timer::immediate(), move |_, _, state| {
            state.refresh_and_flush_clients();
            TimeoutAction::ToDuration(interval)
        })
        .map_err(|err| anyhow::anyhow!("error inserting the refresh timer: {err}"))?;

    #[cfg(feature = "dbus")]
    if cli.session {
        strata::dbus::DBusClients::start(&mut state);
    }
    #[cfg(not(feature = "dbus"))]
    if cli.session {
        warn!("built without D-Bus support, not starting the session services");
    }

    if let Some((command, args)) = cli.command.split_first() {
        info!("spawning command: {command:?}");
        if let Err(err) = Command::new(command).args(args).spawn() {
            warn!("error spawning {command:?}: {err}");
        }
    }

    event_loop.run(None, &mut state, |state| state.refresh_and_flush_clients())?;

    Ok(())
}

fn print_formats() -> anyhow::Result<()> {
    let history = usize::from(Config::default().compositing.render_time_history);
    let renderer = Headless::new()
        .create_opengl_backend(false, history)
        .context("error creating the renderer")?;

    let formats: Vec<FormatEntry> = renderer
        .dmabuf_formats()
        .iter()
        .map(FormatEntry::from)
        .collect();
    let json = serde_json::to_string_pretty(&formats).context("error serializing formats")?;
    println!("{json}");
    Ok(())
}
