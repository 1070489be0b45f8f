use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use strata_config::ConfigPath;

use crate::utils::{expand_home, version};

#[derive(Parser)]
#[command(author, version = version(), about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
#[command(subcommand_value_name = "SUBCOMMAND")]
#[command(subcommand_help_heading = "Subcommands")]
pub struct Cli {
    /// Path to config file (default: `$XDG_CONFIG_HOME/strata/config.kdl`).
    ///
    /// This can also be set with the `STRATA_CONFIG` environment variable. If both are set, the
    /// command line argument takes precedence.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Number of virtual outputs to create when the config doesn't name any.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..))]
    pub outputs: Option<u8>,
    /// Run the session services, such as the ambient light sensor client.
    #[arg(long)]
    pub session: bool,
    /// Read input devices through libinput. Needs a seat from logind or seatd.
    #[arg(long)]
    pub libinput: bool,
    /// Start Xwayland and manage its windows instead of taking over `$DISPLAY`.
    #[arg(long)]
    pub xwayland: bool,
    /// Command to run upon compositor startup.
    #[arg(last = true)]
    pub command: Vec<OsString>,

    #[command(subcommand)]
    pub subcommand: Option<Sub>,
}

#[derive(Subcommand)]
pub enum Sub {
    /// Validate the config file.
    Validate {
        /// Path to config file (default: `$XDG_CONFIG_HOME/strata/config.kdl`).
        ///
        /// This can also be set with the `STRATA_CONFIG` environment variable. If both are set,
        /// the command line argument takes precedence.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the DMA-BUF formats and modifiers the renderer can import, as JSON.
    Formats,
}

/// Resolves where the config is loaded from.
///
/// An explicit path, from the command line or `STRATA_CONFIG`, is used as is. Otherwise the user
/// config is preferred over the system one.
pub fn config_path(cli_path: Option<PathBuf>) -> ConfigPath {
    let env_path = std::env::var_os("STRATA_CONFIG")
        .filter(|path| !path.is_empty())
        .map(PathBuf::from);
    if let Some(path) = cli_path.or(env_path) {
        let path = match expand_home(&path) {
            Ok(Some(expanded)) => expanded,
            Ok(None) => path,
            Err(err) => {
                warn!("error expanding ~ in {path:?}: {err:?}");
                path
            }
        };
        return ConfigPath::Explicit(path);
    }

    let user_path = ProjectDirs::from("", "", "strata")
        .map(|dirs| dirs.config_dir().join("config.kdl"))
        .unwrap_or_else(|| PathBuf::from("config.kdl"));
    let system_path = PathBuf::from("/etc/strata/config.kdl");
    ConfigPath::Regular {
        user_path,
        system_path,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn trailing_command_and_flags() {
        let cli = Cli::try_parse_from([
            "strata", "--outputs", "2", "--session", "--", "xterm", "-e", "top",
        ])
        .unwrap();
        assert_eq!(cli.outputs, Some(2));
        assert!(cli.session);
        assert_eq!(cli.command, ["xterm", "-e", "top"]);
        assert!(cli.subcommand.is_none());
    }

    #[test]
    fn input_and_xwayland_are_opt_in() {
        let cli = Cli::try_parse_from(["strata"]).unwrap();
        assert!(!cli.libinput);
        assert!(!cli.xwayland);

        let cli = Cli::try_parse_from(["strata", "--libinput", "--xwayland"]).unwrap();
        assert!(cli.libinput);
        assert!(cli.xwayland);
    }

    #[test]
    fn zero_outputs_is_rejected() {
        assert!(Cli::try_parse_from(["strata", "--outputs", "0"]).is_err());
    }

    #[test]
    fn validate_takes_its_own_config() {
        let cli = Cli::try_parse_from(["strata", "validate", "-c", "/tmp/strata.kdl"]).unwrap();
        match cli.subcommand {
            Some(Sub::Validate { config }) => {
                assert_eq!(config, Some(PathBuf::from("/tmp/strata.kdl")))
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn explicit_config_path() {
        let path = config_path(Some(PathBuf::from("/etc/other.kdl")));
        assert!(matches!(path, ConfigPath::Explicit(p) if p == PathBuf::from("/etc/other.kdl")));
    }
}
