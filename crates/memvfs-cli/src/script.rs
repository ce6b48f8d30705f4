// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Line-oriented command scripts
//!
//! One command per line, arguments separated by whitespace. Blank lines and
//! lines starting with `#` are skipped. The payload of `write`, `append` and
//! `put` is the rest of the line, with `\n` turned into a newline.

use std::io::SeekFrom;
use std::str::FromStr;

use memvfs_core::LockOperation;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { line: usize, command: String },
    #[error("line {line}: {command}: missing {what}")]
    MissingArgument {
        line: usize,
        command: String,
        what: &'static str,
    },
    #[error("line {line}: {command}: invalid {what} '{value}'")]
    InvalidArgument {
        line: usize,
        command: String,
        what: &'static str,
        value: String,
    },
    #[error("line {line}: {command}: unexpected argument '{value}'")]
    UnexpectedArgument {
        line: usize,
        command: String,
        value: String,
    },
}

/// How `open` accesses a file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
    Append,
}

impl FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            "rw" | "r+" => Ok(OpenMode::ReadWrite),
            "a" => Ok(OpenMode::Append),
            _ => Err(format!("Invalid open mode: {}. Use 'r', 'w', 'rw' or 'a'", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptCommand {
    Mkdir {
        path: String,
        parents: bool,
        mode: Option<u32>,
    },
    Touch {
        path: String,
        mtime: Option<i64>,
        atime: Option<i64>,
    },
    Write {
        path: String,
        data: String,
    },
    Append {
        path: String,
        data: String,
    },
    Cat {
        path: String,
    },
    Ln {
        target: String,
        link: String,
    },
    Mv {
        from: String,
        to: String,
    },
    Rm {
        path: String,
        recursive: bool,
    },
    Rmdir {
        path: String,
    },
    Ls {
        path: String,
        all: bool,
    },
    Stat {
        path: String,
    },
    Chmod {
        mode: u32,
        path: String,
    },
    Chown {
        owner: String,
        path: String,
    },
    Chgrp {
        group: String,
        path: String,
    },
    /// Switch the acting identity
    Su {
        user: String,
        group: Option<String>,
    },
    Open {
        name: String,
        path: String,
        mode: OpenMode,
    },
    Read {
        name: String,
        len: Option<usize>,
    },
    /// Write at the handle's cursor
    Put {
        name: String,
        data: String,
    },
    Seek {
        name: String,
        position: SeekFrom,
    },
    Truncate {
        name: String,
        size: usize,
    },
    Tell {
        name: String,
    },
    Eof {
        name: String,
    },
    Fstat {
        name: String,
    },
    Lock {
        name: String,
        operation: LockOperation,
    },
    Close {
        name: String,
    },
}

impl ScriptCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptCommand::Mkdir { .. } => "mkdir",
            ScriptCommand::Touch { .. } => "touch",
            ScriptCommand::Write { .. } => "write",
            ScriptCommand::Append { .. } => "append",
            ScriptCommand::Cat { .. } => "cat",
            ScriptCommand::Ln { .. } => "ln",
            ScriptCommand::Mv { .. } => "mv",
            ScriptCommand::Rm { .. } => "rm",
            ScriptCommand::Rmdir { .. } => "rmdir",
            ScriptCommand::Ls { .. } => "ls",
            ScriptCommand::Stat { .. } => "stat",
            ScriptCommand::Chmod { .. } => "chmod",
            ScriptCommand::Chown { .. } => "chown",
            ScriptCommand::Chgrp { .. } => "chgrp",
            ScriptCommand::Su { .. } => "su",
            ScriptCommand::Open { .. } => "open",
            ScriptCommand::Read { .. } => "read",
            ScriptCommand::Put { .. } => "put",
            ScriptCommand::Seek { .. } => "seek",
            ScriptCommand::Truncate { .. } => "truncate",
            ScriptCommand::Tell { .. } => "tell",
            ScriptCommand::Eof { .. } => "eof",
            ScriptCommand::Fstat { .. } => "fstat",
            ScriptCommand::Lock { .. } => "lock",
            ScriptCommand::Close { .. } => "close",
        }
    }
}

/// A parsed command with the script line it came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptLine {
    pub line: usize,
    pub command: ScriptCommand,
}

pub fn parse_script(source: &str) -> Result<Vec<ScriptLine>, ParseError> {
    let mut commands = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        if let Some(command) = parse_line(raw, index + 1)? {
            commands.push(ScriptLine {
                line: index + 1,
                command,
            });
        }
    }
    Ok(commands)
}

/// Parse one line; `None` for blanks and comments
pub fn parse_line(raw: &str, line: usize) -> Result<Option<ScriptCommand>, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim_start()),
        None => (trimmed, ""),
    };
    let mut args = Args {
        line,
        command,
        tokens: rest.split_whitespace().collect(),
        next: 0,
    };

    let parsed = match command {
        "mkdir" => {
            let mut parents = false;
            let mut mode = None;
            while let Some(flag) = args.flag() {
                match flag {
                    "-p" => parents = true,
                    "-m" => mode = Some(args.octal("mode")?),
                    other => return Err(args.unexpected(other)),
                }
            }
            ScriptCommand::Mkdir {
                path: args.required("path")?,
                parents,
                mode,
            }
        }
        "touch" => {
            let mut mtime = None;
            let mut atime = None;
            while let Some(flag) = args.flag() {
                match flag {
                    "-t" => mtime = Some(args.parsed("modification time")?),
                    "-a" => atime = Some(args.parsed("access time")?),
                    other => return Err(args.unexpected(other)),
                }
            }
            ScriptCommand::Touch {
                path: args.required("path")?,
                mtime,
                atime,
            }
        }
        "write" | "append" | "put" => {
            let what = if command == "put" { "handle name" } else { "path" };
            let (target, data) = match rest.split_once(char::is_whitespace) {
                Some((target, data)) => (target.to_string(), unescape(data.trim_start())),
                None if !rest.is_empty() => (rest.to_string(), String::new()),
                None => return Err(args.missing(what)),
            };
            return Ok(Some(match command {
                "write" => ScriptCommand::Write { path: target, data },
                "append" => ScriptCommand::Append { path: target, data },
                _ => ScriptCommand::Put { name: target, data },
            }));
        }
        "cat" => ScriptCommand::Cat {
            path: args.required("path")?,
        },
        "ln" => ScriptCommand::Ln {
            target: args.required("target")?,
            link: args.required("link path")?,
        },
        "mv" => ScriptCommand::Mv {
            from: args.required("source")?,
            to: args.required("destination")?,
        },
        "rm" => {
            let mut recursive = false;
            while let Some(flag) = args.flag() {
                match flag {
                    "-r" | "-R" | "-rf" => recursive = true,
                    other => return Err(args.unexpected(other)),
                }
            }
            ScriptCommand::Rm {
                path: args.required("path")?,
                recursive,
            }
        }
        "rmdir" => ScriptCommand::Rmdir {
            path: args.required("path")?,
        },
        "ls" => {
            let mut all = false;
            while let Some(flag) = args.flag() {
                match flag {
                    "-a" => all = true,
                    other => return Err(args.unexpected(other)),
                }
            }
            ScriptCommand::Ls {
                path: args.optional().unwrap_or_else(|| "/".to_string()),
                all,
            }
        }
        "stat" => ScriptCommand::Stat {
            path: args.required("path")?,
        },
        "chmod" => ScriptCommand::Chmod {
            mode: args.octal("mode")?,
            path: args.required("path")?,
        },
        "chown" => ScriptCommand::Chown {
            owner: args.required("owner")?,
            path: args.required("path")?,
        },
        "chgrp" => ScriptCommand::Chgrp {
            group: args.required("group")?,
            path: args.required("path")?,
        },
        "su" => ScriptCommand::Su {
            user: args.required("user")?,
            group: args.optional(),
        },
        "open" => ScriptCommand::Open {
            name: args.required("handle name")?,
            path: args.required("path")?,
            mode: match args.optional() {
                Some(mode) => mode
                    .parse()
                    .map_err(|_| args.invalid("open mode", &mode))?,
                None => OpenMode::Read,
            },
        },
        "read" => ScriptCommand::Read {
            name: args.required("handle name")?,
            len: match args.optional() {
                Some(len) => Some(len.parse().map_err(|_| args.invalid("length", &len))?),
                None => None,
            },
        },
        "seek" => {
            let name = args.required("handle name")?;
            let offset: i64 = args.parsed("offset")?;
            let whence = args.optional().unwrap_or_else(|| "set".to_string());
            let position = match whence.as_str() {
                "set" => SeekFrom::Start(
                    u64::try_from(offset).map_err(|_| args.invalid("offset", &offset.to_string()))?,
                ),
                "cur" => SeekFrom::Current(offset),
                "end" => SeekFrom::End(offset),
                _ => return Err(args.invalid("whence", &whence)),
            };
            ScriptCommand::Seek { name, position }
        }
        "truncate" => ScriptCommand::Truncate {
            name: args.required("handle name")?,
            size: match args.optional() {
                Some(size) => size.parse().map_err(|_| args.invalid("size", &size))?,
                None => 0,
            },
        },
        "tell" => ScriptCommand::Tell {
            name: args.required("handle name")?,
        },
        "eof" => ScriptCommand::Eof {
            name: args.required("handle name")?,
        },
        "fstat" => ScriptCommand::Fstat {
            name: args.required("handle name")?,
        },
        "lock" => {
            let name = args.required("handle name")?;
            let operation = args.required("lock operation")?;
            ScriptCommand::Lock {
                operation: operation
                    .parse()
                    .map_err(|_| args.invalid("lock operation", &operation))?,
                name,
            }
        }
        "close" => ScriptCommand::Close {
            name: args.required("handle name")?,
        },
        other => {
            return Err(ParseError::UnknownCommand {
                line,
                command: other.to_string(),
            })
        }
    };

    args.finish()?;
    Ok(Some(parsed))
}

fn unescape(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    let mut chars = data.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

struct Args<'a> {
    line: usize,
    command: &'a str,
    tokens: Vec<&'a str>,
    next: usize,
}

impl<'a> Args<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.next).copied()
    }

    /// Next token if it looks like a flag
    fn flag(&mut self) -> Option<&'a str> {
        let token = self.peek().filter(|t| t.starts_with('-') && t.len() > 1)?;
        self.next += 1;
        Some(token)
    }

    fn optional(&mut self) -> Option<String> {
        let token = self.peek()?;
        self.next += 1;
        Some(token.to_string())
    }

    fn required(&mut self, what: &'static str) -> Result<String, ParseError> {
        self.optional().ok_or_else(|| self.missing(what))
    }

    fn parsed<T: FromStr>(&mut self, what: &'static str) -> Result<T, ParseError> {
        let raw = self.required(what)?;
        raw.parse().map_err(|_| self.invalid(what, &raw))
    }

    fn octal(&mut self, what: &'static str) -> Result<u32, ParseError> {
        let raw = self.required(what)?;
        u32::from_str_radix(raw.trim_start_matches("0o"), 8).map_err(|_| self.invalid(what, &raw))
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            Some(extra) => Err(self.unexpected(extra)),
            None => Ok(()),
        }
    }

    fn missing(&self, what: &'static str) -> ParseError {
        ParseError::MissingArgument {
            line: self.line,
            command: self.command.to_string(),
            what,
        }
    }

    fn invalid(&self, what: &'static str, value: &str) -> ParseError {
        ParseError::InvalidArgument {
            line: self.line,
            command: self.command.to_string(),
            what,
            value: value.to_string(),
        }
    }

    fn unexpected(&self, value: &str) -> ParseError {
        ParseError::UnexpectedArgument {
            line: self.line,
            command: self.command.to_string(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(line: &str) -> ScriptCommand {
        parse_line(line, 1).unwrap().unwrap()
    }

    #[test]
    fn test_skips_blank_lines_and_comments() {
        let script = "\n# setup\n   \nmkdir /a\n  # indented comment\n";
        let parsed = parse_script(script).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].line, 4);
    }

    #[test]
    fn test_mkdir_flags() {
        assert_eq!(
            one("mkdir -p -m 0700 /a/b"),
            ScriptCommand::Mkdir {
                path: "/a/b".into(),
                parents: true,
                mode: Some(0o700),
            }
        );
        assert_eq!(
            one("mkdir /a"),
            ScriptCommand::Mkdir {
                path: "/a".into(),
                parents: false,
                mode: None,
            }
        );
    }

    #[test]
    fn test_write_keeps_rest_of_line() {
        assert_eq!(
            one("write /f hello  world\\n"),
            ScriptCommand::Write {
                path: "/f".into(),
                data: "hello  world\n".into(),
            }
        );
        assert_eq!(
            one("append /f"),
            ScriptCommand::Append {
                path: "/f".into(),
                data: String::new(),
            }
        );
    }

    #[test]
    fn test_handle_commands() {
        assert_eq!(
            one("open h /f rw"),
            ScriptCommand::Open {
                name: "h".into(),
                path: "/f".into(),
                mode: OpenMode::ReadWrite,
            }
        );
        assert_eq!(
            one("lock h ex"),
            ScriptCommand::Lock {
                name: "h".into(),
                operation: LockOperation::Exclusive,
            }
        );
        assert_eq!(one("read h"), ScriptCommand::Read { name: "h".into(), len: None });
        assert_eq!(one("ls"), ScriptCommand::Ls { path: "/".into(), all: false });
    }

    #[test]
    fn test_cursor_commands() {
        assert_eq!(
            one("put h  two words"),
            ScriptCommand::Put {
                name: "h".into(),
                data: "two words".into(),
            }
        );
        assert_eq!(
            one("seek h 4"),
            ScriptCommand::Seek {
                name: "h".into(),
                position: SeekFrom::Start(4),
            }
        );
        assert_eq!(
            one("seek h -2 end"),
            ScriptCommand::Seek {
                name: "h".into(),
                position: SeekFrom::End(-2),
            }
        );
        assert_eq!(
            one("seek h 1 cur"),
            ScriptCommand::Seek {
                name: "h".into(),
                position: SeekFrom::Current(1),
            }
        );
        assert_eq!(one("truncate h"), ScriptCommand::Truncate { name: "h".into(), size: 0 });
        assert_eq!(one("truncate h 3"), ScriptCommand::Truncate { name: "h".into(), size: 3 });
        assert_eq!(one("tell h"), ScriptCommand::Tell { name: "h".into() });
        assert_eq!(one("eof h"), ScriptCommand::Eof { name: "h".into() });
        assert_eq!(one("fstat h"), ScriptCommand::Fstat { name: "h".into() });

        assert_eq!(
            parse_line("seek h -1", 2).unwrap_err().to_string(),
            "line 2: seek: invalid offset '-1'"
        );
        assert!(parse_line("seek h 1 middle", 1).is_err());
        assert!(parse_line("put", 1).is_err());
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_script("mkdir /a\nfrobnicate /b").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownCommand {
                line: 2,
                command: "frobnicate".into()
            }
        );

        let err = parse_line("chmod 999 /f", 7).unwrap_err();
        assert_eq!(err.to_string(), "line 7: chmod: invalid mode '999'");

        let err = parse_line("mv /a", 3).unwrap_err();
        assert_eq!(err.to_string(), "line 3: mv: missing destination");

        let err = parse_line("cat /a /b", 1).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedArgument { .. }));

        assert!(parse_line("lock h maybe", 1).is_err());
        assert!(parse_line("open h /f x", 1).is_err());
    }
}
