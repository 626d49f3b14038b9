//! Settings file parser.
//!
//! A line-oriented file in which every non-blank, non-comment line is a
//! directive:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set <name>=<value>` or `/set <name> <value>` | unlimited-use variable |
//! | `/let <name>=<value> <uses>` | use-counted variable |
//! | `/context <key>=<value>` | context entry |
//! | `/def <name>(<params>) => <body>` | text-defined function |
//! | `/allow functions\|variables <name>…` | whitelist |
//! | `/deny functions\|variables <name>…` | blacklist |
//! | `/debug on\|off`, `/strict on\|off` | engine modes |
//! | `/recursion <n>` | maximum call depth |
//! | `/timeout <ms>` | evaluation timeout, `0` for none |
//! | Lines starting with `;` | comment, ignored |
//!
//! Values are read the way bare words are in expressions: numbers, then
//! `true`/`false`, then plain text.  Double quotes keep spaces together.

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::expr::define::FunctionDefinition;
use crate::expr::engine::Engine;
use crate::expr::value::Value;
use crate::var::UNLIMITED;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error on one line of a settings file.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarSetting {
    pub name: String,
    pub value: Value,
    pub uses: i64,
}

/// Which names an `/allow` or `/deny` line applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    Functions,
    Variables,
}

/// Parsed settings, applied to an engine with [`Config::apply`].
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub variables: Vec<VarSetting>,
    pub context: Vec<(String, Value)>,
    pub definitions: Vec<FunctionDefinition>,
    pub function_whitelist: Vec<String>,
    pub function_blacklist: Vec<String>,
    pub variable_whitelist: Vec<String>,
    pub variable_blacklist: Vec<String>,
    pub debug: Option<bool>,
    pub strict: Option<bool>,
    pub max_recursion_depth: Option<usize>,
    pub evaluation_timeout: Option<Duration>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings text.  Bad lines are skipped and reported; the rest of
    /// the file still loads.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some(rest) = line.strip_prefix('/') else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("expected a /directive, found '{line}'"),
                });
                continue;
            };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let args_str = args_str.trim();

            if let Err(message) = config.directive(cmd, args_str) {
                errors.push(ConfigError {
                    line: lineno,
                    message,
                });
            }
        }

        (config, errors)
    }

    /// Read and parse a settings file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Replay the settings into `engine`.  Definitions whose name is already
    /// registered are skipped with a warning.
    pub fn apply(&self, engine: &mut Engine) {
        for var in &self.variables {
            // Names were checked when the line was parsed.
            if let Err(e) = engine.set_variable_uses(&var.name, var.value.clone(), var.uses) {
                warn!(variable = %var.name, error = %e, "skipping variable");
            }
        }
        for (key, value) in &self.context {
            engine.put_context(key.clone(), value.clone());
        }
        for def in &self.definitions {
            if !engine.register(&def.name, def.clone().into_function()) {
                warn!(function = %def.name, "function already registered; definition skipped");
            }
        }
        if !self.function_whitelist.is_empty() {
            engine.set_function_whitelist(self.function_whitelist.iter().cloned());
        }
        if !self.function_blacklist.is_empty() {
            engine.set_function_blacklist(self.function_blacklist.iter().cloned());
        }
        if !self.variable_whitelist.is_empty() {
            engine.set_variable_whitelist(self.variable_whitelist.iter().cloned());
        }
        if !self.variable_blacklist.is_empty() {
            engine.set_variable_blacklist(self.variable_blacklist.iter().cloned());
        }
        if let Some(on) = self.debug {
            engine.set_debug_mode(on);
        }
        if let Some(on) = self.strict {
            engine.set_strict_mode(on);
        }
        if let Some(depth) = self.max_recursion_depth {
            engine.set_max_recursion_depth(depth);
        }
        if let Some(timeout) = self.evaluation_timeout {
            engine.set_evaluation_timeout(timeout);
        }
    }

    fn directive(&mut self, cmd: &str, args_str: &str) -> Result<(), String> {
        match cmd {
            "set" => {
                let (name, value) = parse_assignment("set", &split_args(args_str))?;
                self.variables.push(VarSetting {
                    name,
                    value,
                    uses: UNLIMITED,
                });
            }
            "let" => {
                let mut tokens = split_args(args_str);
                let uses = match tokens.pop() {
                    Some(n) if tokens.is_empty() => {
                        return Err(format!("/let: missing use count after '{n}'"))
                    }
                    Some(n) => n
                        .parse::<i64>()
                        .map_err(|_| format!("/let: invalid use count '{n}'"))?,
                    None => return Err("/let: requires an argument".into()),
                };
                let (name, value) = parse_assignment("let", &tokens)?;
                self.variables.push(VarSetting { name, value, uses });
            }
            "context" => {
                let entry = parse_assignment("context", &split_args(args_str))?;
                self.context.push(entry);
            }
            "def" => {
                let def = FunctionDefinition::parse(args_str).map_err(|e| format!("/def: {e}"))?;
                self.definitions.push(def);
            }
            "allow" | "deny" => {
                let tokens = split_args(args_str);
                let (target, names) = tokens
                    .split_first()
                    .ok_or_else(|| format!("/{cmd}: requires 'functions' or 'variables'"))?;
                let target = match target.as_str() {
                    "functions" => FilterTarget::Functions,
                    "variables" => FilterTarget::Variables,
                    other => return Err(format!("/{cmd}: unknown target '{other}'")),
                };
                let list = match (cmd, target) {
                    ("allow", FilterTarget::Functions) => &mut self.function_whitelist,
                    ("allow", FilterTarget::Variables) => &mut self.variable_whitelist,
                    (_, FilterTarget::Functions) => &mut self.function_blacklist,
                    (_, FilterTarget::Variables) => &mut self.variable_blacklist,
                };
                list.extend(names.iter().cloned());
            }
            "debug" => self.debug = Some(parse_switch(cmd, args_str)?),
            "strict" => self.strict = Some(parse_switch(cmd, args_str)?),
            "recursion" => {
                let n = args_str
                    .parse::<usize>()
                    .map_err(|_| format!("/recursion: invalid depth '{args_str}'"))?;
                self.max_recursion_depth = Some(n);
            }
            "timeout" => {
                let ms = args_str
                    .parse::<u64>()
                    .map_err(|_| format!("/timeout: invalid milliseconds '{args_str}'"))?;
                self.evaluation_timeout = Some(Duration::from_millis(ms));
            }
            other => return Err(format!("unknown directive /{other}")),
        }
        Ok(())
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` on whitespace, keeping double-quoted runs together.  Inside
/// quotes `\` escapes the next character.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() || quoted {
                    args.push(std::mem::take(&mut cur));
                }
                quoted = false;
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() || quoted {
        args.push(cur);
    }
    args
}

// ── Directive helpers ─────────────────────────────────────────────────────────

/// `<name>=<value>` in one token, or `<name> <value…>`.
fn parse_assignment(cmd: &str, tokens: &[String]) -> Result<(String, Value), String> {
    let Some(first) = tokens.first() else {
        return Err(format!("/{cmd}: requires an argument"));
    };

    let (name, value) = if let Some((name, value)) = first.split_once('=') {
        if tokens.len() > 1 {
            return Err(format!("/{cmd}: unexpected text after '{first}'"));
        }
        (name.to_string(), value.to_string())
    } else if tokens.len() >= 2 {
        (first.clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("/{cmd}: missing value for '{first}'"));
    };

    if name.trim().is_empty() {
        return Err(format!("/{cmd}: name cannot be empty"));
    }
    Ok((name, Value::from_bare(&value)))
}

fn parse_switch(cmd: &str, arg: &str) -> Result<bool, String> {
    match arg.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(format!("/{cmd}: expected on or off, found '{arg}'")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // -- split_args -----------------------------------------------------------

    #[test]
    fn split_simple() {
        assert_eq!(split_args("foo bar baz"), ["foo", "bar", "baz"]);
    }

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#""hello world" 3"#), ["hello world", "3"]);
        assert_eq!(split_args(r#"name="" 1"#), ["name=", "1"]);
    }

    #[test]
    fn split_escaped_quote_inside_quotes() {
        assert_eq!(split_args(r#""say \"hi\"""#), [r#"say "hi""#]);
    }

    // -- variables and context ------------------------------------------------

    #[test]
    fn set_forms() {
        let (cfg, errs) = Config::load_str("/set level=5\n/set greeting hello world");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(
            cfg.variables[0],
            VarSetting {
                name: "level".into(),
                value: Value::Int(5),
                uses: UNLIMITED
            }
        );
        assert_eq!(cfg.variables[1].value, Value::from("hello world"));
    }

    #[test]
    fn let_takes_use_count() {
        let (cfg, errs) = Config::load_str("/let token=abc 1\n/let n 2.5 3");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.variables[0].uses, 1);
        assert_eq!(cfg.variables[1].value, Value::Float(2.5));
        assert_eq!(cfg.variables[1].uses, 3);

        let (_, errs) = Config::load_str("/let token=abc\n/let x=1 many\n/let");
        assert_eq!(errs.iter().map(|e| e.line).collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn context_entries() {
        let (cfg, errs) = Config::load_str("/context lang=\"de\"\n/context verbose=true");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.context[0], ("lang".to_string(), Value::from("de")));
        assert_eq!(cfg.context[1].1, Value::Bool(true));
    }

    // -- functions, filters, settings -----------------------------------------

    #[test]
    fn definitions_are_compiled_at_load() {
        let (cfg, errs) = Config::load_str("/def double(x) => x * 2\n/def broken(x => x");
        assert_eq!(cfg.definitions.len(), 1);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 2);
        assert!(errs[0].message.starts_with("/def:"));
    }

    #[test]
    fn filters() {
        let (cfg, errs) = Config::load_str(
            "/allow functions add strlen\n/deny variables secret\n/deny things x",
        );
        assert_eq!(cfg.function_whitelist, ["add", "strlen"]);
        assert_eq!(cfg.variable_blacklist, ["secret"]);
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn switches_and_limits() {
        let (cfg, errs) =
            Config::load_str("/debug on\n/strict off\n/recursion 10\n/timeout 250\n/debug maybe");
        assert_eq!(cfg.debug, Some(true));
        assert_eq!(cfg.strict, Some(false));
        assert_eq!(cfg.max_recursion_depth, Some(10));
        assert_eq!(cfg.evaluation_timeout, Some(Duration::from_millis(250)));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].to_string(), "line 5: /debug: expected on or off, found 'maybe'");
    }

    // -- comments & bad lines -------------------------------------------------

    #[test]
    fn comments_and_blank_lines_ignored() {
        let (cfg, errs) = Config::load_str(";; header\n\n; note\n/set real=yes\n\n");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.variables.len(), 1);
    }

    #[test]
    fn unknown_lines_are_reported() {
        let (cfg, errs) = Config::load_str("/bogus 1\nplain text\n/set ok=1");
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].message, "unknown directive /bogus");
        assert_eq!(cfg.variables.len(), 1);
    }

    // -- apply ----------------------------------------------------------------

    #[test]
    fn apply_configures_engine() {
        let src = "\
;; settings\n\
/set level=5\n\
/let once=7 1\n\
/context lang=de\n\
/def double(x) => x * 2\n\
/deny functions strlen\n\
/recursion 12\n\
/strict on\n";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");

        let mut engine = Engine::new();
        cfg.apply(&mut engine);
        assert_eq!(engine.evaluate("double(level)").unwrap(), Value::Float(10.0));
        assert_eq!(engine.evaluate("lang").unwrap(), Value::from("de"));
        assert_eq!(engine.evaluate("once").unwrap(), Value::Float(7.0));
        assert!(engine.evaluate("once").is_err());
        assert!(engine.evaluate("strlen('x')").unwrap_err().is_function_error());
        assert_eq!(engine.max_recursion_depth(), 12);
        assert!(engine.is_strict_mode());
    }

    #[test]
    fn load_file_reads_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "/set answer=42").unwrap();
        writeln!(f, "/timeout 0").unwrap();
        let (cfg, errs) = Config::load_file(f.path()).unwrap();
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.variables[0].value, Value::Int(42));
        assert_eq!(cfg.evaluation_timeout, Some(Duration::ZERO));

        assert!(Config::load_file(Path::new("/definitely/not/here.rc")).is_err());
    }
}
