// Command line interface module
// Handles parsing of command line arguments

use anyhow::{bail, Result};
use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;

/// rview - A minimal keyboard-driven image viewer for Wayland
///
/// Keys: +/= zoom in, - zoom out, arrows pan, r reset, Esc/q quit
#[derive(Parser, Debug)]
#[command(name = "rview")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the image file
    #[arg(value_name = "IMAGE")]
    pub image_path: Option<PathBuf>,
}

/// Parse command line arguments and resolve the image path
pub fn parse_args() -> Result<PathBuf> {
    parse_from(std::env::args_os())
}

/// Argument errors are returned so they exit with status 1 like every other
/// startup failure; `--help` and `--version` still print and exit 0.
fn parse_from<I, T>(args: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Args::try_parse_from(args) {
        Ok(args) => resolve(args),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => bail!("Invalid arguments: {}\nUsage: rview <IMAGE>", e.kind()),
    }
}

fn resolve(args: Args) -> Result<PathBuf> {
    match args.image_path {
        Some(path) => Ok(path),
        None => bail!("No image provided.\nUsage: rview <IMAGE>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_argument_is_returned() {
        let args = Args::try_parse_from(["rview", "/tmp/cat.png"]).unwrap();
        assert_eq!(resolve(args).unwrap(), PathBuf::from("/tmp/cat.png"));
    }

    #[test]
    fn missing_path_yields_usage() {
        let args = Args::try_parse_from(["rview"]).unwrap();
        let err = resolve(args).unwrap_err();
        assert!(err.to_string().contains("Usage: rview <IMAGE>"));
    }

    #[test]
    fn extra_positional_is_rejected() {
        let err = parse_from(["rview", "a.png", "b.png"]).unwrap_err();
        assert!(err.to_string().contains("Usage: rview <IMAGE>"), "{err}");
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = parse_from(["rview", "--bogus", "a.png"]).unwrap_err();
        assert!(err.to_string().contains("Usage: rview <IMAGE>"), "{err}");
    }

    #[test]
    fn parse_from_resolves_path() {
        assert_eq!(parse_from(["rview", "cat.png"]).unwrap(), PathBuf::from("cat.png"));
        assert!(parse_from(["rview"]).is_err());
    }
}
