//! REPL command parsing and definitions
//!
//! Handles parsing of dot-commands (.load, .open, .set, etc.). Lines that
//! do not start with a dot are declaration source.

use anyhow::{anyhow, Result};

/// Available REPL commands
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Show help information
    Help,
    /// Exit the REPL
    Quit,
    /// Toggle quiet mode
    Quiet,
    /// Load a `.frames` or `.json` declaration file
    Load(String),
    /// Load declaration source typed at the prompt
    Declare(String),
    /// Bind a new instance: `.new <var> <Class> [args...]`
    New {
        var: String,
        class: String,
        args: Vec<String>,
    },
    /// Open a frame, or make an already open one active again
    Open(Option<u64>),
    /// Commit the active frame or the given generation
    Commit(Option<u64>),
    /// Discard the active frame or the given generation
    Discard(Option<u64>),
    /// Read one property, or all of them
    Get {
        var: String,
        property: Option<String>,
    },
    /// Write a property in the active frame
    Set {
        var: String,
        property: String,
        value: String,
    },
    /// List open frames and runtime counters
    Frames,
    /// Show an instance's record chain
    Chain(String),
    /// Trim every framed instance's chain
    Gc,
    /// List loaded classes and bound instances
    Classes,
}

/// Parse a command string into a ReplCommand
pub fn parse_command(input: &str) -> Result<ReplCommand> {
    let trimmed = input.trim();

    let Some(command) = trimmed.strip_prefix('.') else {
        return Ok(ReplCommand::Declare(trimmed.to_string()));
    };

    let parts: Vec<&str> = command.split_whitespace().collect();
    let Some(&name) = parts.first() else {
        return Err(anyhow!("Empty command"));
    };

    match name {
        "help" | "h" => Ok(ReplCommand::Help),
        "quit" | "q" | "exit" => Ok(ReplCommand::Quit),
        "quiet" => Ok(ReplCommand::Quiet),
        "load" => match parts.as_slice() {
            [_, path] => Ok(ReplCommand::Load(path.to_string())),
            _ => Err(anyhow!("Usage: .load <file>")),
        },
        "new" => match parts.as_slice() {
            // arguments may contain spaces, so they come from the raw text
            [_, var, class, ..] => Ok(ReplCommand::New {
                var: var.to_string(),
                class: class.to_string(),
                args: split_values(rest_after(command, 3)),
            }),
            _ => Err(anyhow!("Usage: .new <var> <Class> [args...]")),
        },
        "open" => generation_arg(&parts, ".open [generation]").map(ReplCommand::Open),
        "commit" => generation_arg(&parts, ".commit [generation]").map(ReplCommand::Commit),
        "discard" => generation_arg(&parts, ".discard [generation]").map(ReplCommand::Discard),
        "get" => match parts.as_slice() {
            [_, var] => Ok(ReplCommand::Get {
                var: var.to_string(),
                property: None,
            }),
            [_, var, property] => Ok(ReplCommand::Get {
                var: var.to_string(),
                property: Some(property.to_string()),
            }),
            _ => Err(anyhow!("Usage: .get <var> [property]")),
        },
        "set" => match parts.as_slice() {
            [_, var, property, _, ..] => Ok(ReplCommand::Set {
                var: var.to_string(),
                property: property.to_string(),
                value: rest_after(command, 3).to_string(),
            }),
            _ => Err(anyhow!("Usage: .set <var> <property> <value>")),
        },
        "frames" => Ok(ReplCommand::Frames),
        "chain" => match parts.as_slice() {
            [_, var] => Ok(ReplCommand::Chain(var.to_string())),
            _ => Err(anyhow!("Usage: .chain <var>")),
        },
        "gc" => Ok(ReplCommand::Gc),
        "classes" | "ls" => Ok(ReplCommand::Classes),
        _ => Err(anyhow!("Unknown command: .{name}")),
    }
}

fn generation_arg(parts: &[&str], usage: &str) -> Result<Option<u64>> {
    match parts {
        [_] => Ok(None),
        [_, generation] => generation
            .trim_start_matches('g')
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Not a generation: {generation}")),
        _ => Err(anyhow!("Usage: {usage}")),
    }
}

/// Text following the first `words` whitespace-separated words
fn rest_after(text: &str, words: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..words {
        rest = match rest.find(char::is_whitespace) {
            Some(end) => rest[end..].trim_start(),
            None => "",
        };
    }
    rest.trim_end()
}

/// Split constructor arguments on top-level commas and spaces, keeping
/// quoted strings and lists whole
fn split_values(text: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;

    for c in text.chars() {
        if quoted {
            current.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => {
                quoted = true;
                current.push(c);
            }
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' | ' ' | '\t' if depth == 0 => {
                if !current.is_empty() {
                    values.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        values.push(current);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_help() {
        assert_eq!(parse_command(".help").unwrap(), ReplCommand::Help);
        assert_eq!(parse_command(".h").unwrap(), ReplCommand::Help);
    }

    #[test]
    fn test_parse_quit() {
        assert_eq!(parse_command(".quit").unwrap(), ReplCommand::Quit);
        assert_eq!(parse_command(".q").unwrap(), ReplCommand::Quit);
        assert_eq!(parse_command(".exit").unwrap(), ReplCommand::Quit);
    }

    #[test]
    fn test_parse_new_with_arguments() {
        assert_eq!(
            parse_command(r#".new c Counter 3, "a b", [1, 2]"#).unwrap(),
            ReplCommand::New {
                var: "c".into(),
                class: "Counter".into(),
                args: vec!["3".into(), r#""a b""#.into(), "[1, 2]".into()],
            }
        );
        assert_eq!(
            parse_command(".new c Counter").unwrap(),
            ReplCommand::New {
                var: "c".into(),
                class: "Counter".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_parse_set_keeps_value_text() {
        assert_eq!(
            parse_command(r#".set c label "two words""#).unwrap(),
            ReplCommand::Set {
                var: "c".into(),
                property: "label".into(),
                value: r#""two words""#.into(),
            }
        );
    }

    #[test]
    fn test_parse_frame_commands() {
        assert_eq!(parse_command(".open").unwrap(), ReplCommand::Open(None));
        assert_eq!(parse_command(".open 4").unwrap(), ReplCommand::Open(Some(4)));
        assert_eq!(parse_command(".commit g7").unwrap(), ReplCommand::Commit(Some(7)));
        assert_eq!(parse_command(".discard").unwrap(), ReplCommand::Discard(None));
        assert!(parse_command(".commit seven").is_err());
    }

    #[test]
    fn test_plain_lines_are_declarations() {
        assert_eq!(
            parse_command("class A {}").unwrap(),
            ReplCommand::Declare("class A {}".into())
        );
    }

    #[test]
    fn test_parse_invalid_command() {
        assert!(parse_command(".invalid").is_err());
        assert!(parse_command(".").is_err());
        assert!(parse_command(".load").is_err()); // Missing argument
        assert!(parse_command(".set c count").is_err());
    }
}
