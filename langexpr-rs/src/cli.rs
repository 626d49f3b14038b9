//! Command-line argument parsing.
//!
//! Usage:
//!   langexpr [-d] [-f[<file>]] [-e<expr>]... [-D<name>=<value>]... [-t<type>] [-V|-F|-P]
//!
//! Without `-e`, expressions are read from stdin, one per line.

use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs};

/// Environment variable naming an explicit settings file.
pub const RC_ENV: &str = "LANGEXPR_RC";
/// Settings file name looked up in the home and current directories.
pub const RC_NAME: &str = ".langexprrc";

pub const USAGE: &str =
    "Usage: langexpr [-d] [-f[<file>]] [-e<expr>]... [-D<name>=<value>]... [-t<type>] [-V|-F|-P]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Settings-file specification.
    pub config: ConfigFile,
    /// Expressions given with `-e`, in order.
    pub exprs: Vec<String>,
    /// Variables given with `-D`, in order.
    pub defines: Vec<(String, String)>,
    /// Result type for `-t<type>`.
    pub result_type: Option<String>,
    /// What to do with each expression.
    pub mode: Mode,
    /// Debug mode (`-d`).
    pub debug: bool,
}

/// How to choose the settings file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search the standard locations (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the settings file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Evaluate and print the result (default).
    #[default]
    Evaluate,
    /// `-V`: check syntax only.
    Validate,
    /// `-F`: print the compact form.
    Format,
    /// `-P`: print the pretty form.
    Pretty,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if !arg.starts_with('-') || arg == "-" {
            return Err(format!("unexpected argument: {arg}"));
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'V' => args.mode = Mode::Validate,
                'F' => args.mode = Mode::Format,
                'P' => args.mode = Mode::Pretty,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                'e' => {
                    let expr = take_value(argv, &mut i, &chars, &mut j, "-e requires an expression")?;
                    args.exprs.push(expr);
                }

                't' => {
                    let ty = take_value(argv, &mut i, &chars, &mut j, "-t requires a type name")?;
                    args.result_type = Some(ty);
                }

                'D' => {
                    let def = take_value(argv, &mut i, &chars, &mut j, "-D requires name=value")?;
                    let (name, value) = def
                        .split_once('=')
                        .filter(|(name, _)| !name.trim().is_empty())
                        .ok_or_else(|| format!("-D expects name=value, got '{def}'"))?;
                    args.defines.push((name.trim().to_owned(), value.to_owned()));
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

/// The value of a flag: the rest of this argument, or the next one.
fn take_value(
    argv: &[String],
    i: &mut usize,
    chars: &[char],
    j: &mut usize,
    missing: &str,
) -> Result<String, String> {
    if *j + 1 < chars.len() {
        let s: String = chars[*j + 1..].iter().collect();
        *j = chars.len();
        Ok(s)
    } else if *i + 1 < argv.len() {
        *i += 1;
        Ok(argv[*i].clone())
    } else {
        Err(missing.to_owned())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Candidate settings files in search order: `$LANGEXPR_RC`, the platform
/// config directory, the home directory, the current directory.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = std::env::var_os(RC_ENV) {
        paths.push(PathBuf::from(p));
    }
    if let Some(dirs) = ProjectDirs::from("", "", "langexpr") {
        paths.push(dirs.config_dir().join("config"));
    }
    if let Some(base) = BaseDirs::new() {
        paths.push(base.home_dir().join(RC_NAME));
    }
    paths.push(PathBuf::from(".").join(RC_NAME));
    paths
}

/// The first candidate settings file that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    config_candidates().into_iter().find(|p| p.is_file())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(a.exprs.is_empty());
        assert_eq!(a.mode, Mode::Evaluate);
        assert!(matches!(a.config, ConfigFile::Search));
    }

    #[test]
    fn expressions_embedded_and_separate() {
        let a = parse_argv(&argv(&["-e1 + 2", "-e", "'a' + 1"])).unwrap();
        assert_eq!(a.exprs, ["1 + 2", "'a' + 1"]);
    }

    #[test]
    fn mode_flags_last_wins() {
        assert_eq!(parse_argv(&argv(&["-V"])).unwrap().mode, Mode::Validate);
        assert_eq!(parse_argv(&argv(&["-VP"])).unwrap().mode, Mode::Pretty);
        assert_eq!(parse_argv(&argv(&["-F", "-d"])).unwrap().mode, Mode::Format);
    }

    #[test]
    fn combined_flags_with_value() {
        let a = parse_argv(&argv(&["-dtint", "-e", "7"])).unwrap();
        assert!(a.debug);
        assert_eq!(a.result_type.as_deref(), Some("int"));
    }

    #[test]
    fn defines() {
        let a = parse_argv(&argv(&["-Dlevel=5", "-D", "name=a=b"])).unwrap();
        assert_eq!(
            a.defines,
            [("level".to_owned(), "5".to_owned()), ("name".to_owned(), "a=b".to_owned())]
        );
        assert!(parse_argv(&argv(&["-Dnovalue"])).is_err());
        assert!(parse_argv(&argv(&["-D=1"])).is_err());
    }

    #[test]
    fn config_skip() {
        let a = parse_argv(&argv(&["-f"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
        let a = parse_argv(&argv(&["-f", "-d"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
    }

    #[test]
    fn config_explicit() {
        let a = parse_argv(&argv(&["-fmy.rc"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("my.rc")));
        let a = parse_argv(&argv(&["-f", "my.rc"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("my.rc")));
    }

    #[test]
    fn missing_values_and_unknown_flags() {
        assert!(parse_argv(&argv(&["-e"])).is_err());
        assert!(parse_argv(&argv(&["-t"])).is_err());
        assert!(parse_argv(&argv(&["-z"])).is_err());
        assert!(parse_argv(&argv(&["stray"])).is_err());
    }

    #[test]
    fn candidates_end_with_current_directory() {
        let c = config_candidates();
        assert_eq!(c.last(), Some(&PathBuf::from(".").join(RC_NAME)));
    }
}
