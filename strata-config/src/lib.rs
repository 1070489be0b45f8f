#[macro_use]
extern crate tracing;

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use miette::{Context as _, IntoDiagnostic as _};

pub mod compositing;
pub mod debug;
pub mod effects;
pub mod focus;
pub mod input;
pub mod output;
pub mod utils;
pub mod window_rule;

pub use crate::compositing::{Compositing, CompositingBackend};
pub use crate::debug::DebugConfig;
pub use crate::effects::{EffectConfig, Effects};
pub use crate::focus::{Focus, FocusStealingPrevention};
pub use crate::input::{Input, Keyboard, NumLock, TrackLayout, Xkb};
pub use crate::output::{Mode, Output, Position, Scale};
pub use crate::utils::RegexEq;
pub use crate::window_rule::{BoolRule, Match, MatchProps, PointRule, SizeRule, WindowRule};

#[derive(knuffel::Decode, Debug, PartialEq)]
pub struct Config {
    #[knuffel(child, default)]
    pub input: Input,
    #[knuffel(children(name = "output"))]
    pub outputs: Vec<Output>,
    #[knuffel(child, default)]
    pub focus: Focus,
    #[knuffel(child, default)]
    pub virtual_desktops: VirtualDesktops,
    #[knuffel(child, default)]
    pub compositing: Compositing,
    #[knuffel(child, default)]
    pub effects: Effects,
    #[knuffel(children(name = "window-rule"))]
    pub window_rules: Vec<WindowRule>,
    #[knuffel(child, default)]
    pub debug: DebugConfig,
}

#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualDesktops {
    #[knuffel(child, unwrap(argument), default = 1)]
    pub count: u32,
}

impl Default for VirtualDesktops {
    fn default() -> Self {
        Self { count: 1 }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigPath {
    /// Explicitly set config path.
    ///
    /// Load the config only from this path, never create it.
    Explicit(PathBuf),

    /// Default config path.
    ///
    /// Prioritize the user path, fallback to the system path, fallback to creating the user path
    /// at startup.
    Regular {
        /// User config path, usually `$XDG_CONFIG_HOME/strata/config.kdl`.
        user_path: PathBuf,
        /// System config path, usually `/etc/strata/config.kdl`.
        system_path: PathBuf,
    },
}

impl Config {
    pub fn load(path: &Path) -> miette::Result<Self> {
        let contents = fs::read_to_string(path)
            .into_diagnostic()
            .with_context(|| format!("error reading {path:?}"))?;

        let config = Self::parse(
            path.file_name()
                .and_then(OsStr::to_str)
                .unwrap_or("config.kdl"),
            &contents,
        )
        .context("error parsing")?;
        debug!("loaded config from {path:?}");
        Ok(config)
    }

    pub fn parse(filename: &str, text: &str) -> Result<Self, knuffel::Error> {
        let _span = tracy_client::span!("Config::parse");
        knuffel::parse(filename, text)
    }

    /// Returns the window rules matching the given window properties, in config order.
    pub fn matching_rules<'a>(
        &'a self,
        props: &'a window_rule::MatchProps<'a>,
    ) -> impl Iterator<Item = &'a WindowRule> + 'a {
        self.window_rules.iter().filter(move |rule| rule.applies_to(props))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::parse(
            "default-config.kdl",
            include_str!("../../resources/default-config.kdl"),
        )
        .unwrap()
    }
}

impl ConfigPath {
    /// Load the config, or return an error if it doesn't exist.
    pub fn load(&self) -> miette::Result<Config> {
        let _span = tracy_client::span!("ConfigPath::load");

        self.load_inner(|user_path, system_path| {
            Err(miette::miette!(
                "no config file found; create one at {user_path:?} or {system_path:?}",
            ))
        })
        .context("error loading config")
    }

    /// Load the config, or create it if it doesn't exist.
    ///
    /// Returns a tuple containing the path that was created, if any, and the loaded config.
    pub fn load_or_create(&self) -> (Option<&Path>, miette::Result<Config>) {
        let _span = tracy_client::span!("ConfigPath::load_or_create");

        let mut created_at = None;

        let result = self
            .load_inner(|user_path, _| {
                Self::create(user_path, &mut created_at)
                    .map(|()| user_path)
                    .with_context(|| format!("error creating config at {user_path:?}"))
            })
            .context("error loading config");

        (created_at, result)
    }

    fn load_inner<'a>(
        &'a self,
        maybe_create: impl FnOnce(&'a Path, &'a Path) -> miette::Result<&'a Path>,
    ) -> miette::Result<Config> {
        let path = match self {
            ConfigPath::Explicit(path) => path.as_path(),
            ConfigPath::Regular {
                user_path,
                system_path,
            } => {
                if user_path.exists() {
                    user_path.as_path()
                } else if system_path.exists() {
                    system_path.as_path()
                } else {
                    maybe_create(user_path.as_path(), system_path.as_path())?
                }
            }
        };
        Config::load(path)
    }

    fn create<'a>(path: &'a Path, created_at: &mut Option<&'a Path>) -> miette::Result<()> {
        if let Some(default_parent) = path.parent() {
            fs::create_dir_all(default_parent)
                .into_diagnostic()
                .with_context(|| format!("error creating config directory {default_parent:?}"))?;
        }

        // Create the config and fill it with the default config if it doesn't exist.
        let mut new_file = match File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(x) => x,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(());
            }
            Err(err) => {
                return Err(err)
                    .into_diagnostic()
                    .with_context(|| format!("error opening config file at {path:?}"));
            }
        };

        *created_at = Some(path);

        let default = include_bytes!("../../resources/default-config.kdl");

        new_file
            .write_all(default)
            .into_diagnostic()
            .with_context(|| format!("error writing default config to {path:?}"))?;

        Ok(())
    }
}
