//! Text menu commands read from stdin

use crate::control::Knob;
use std::fmt::Write as _;
use stomp_core::domain::{EffectKind, PARAMETER_NAMES};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),

    #[error("'{command}' expects {expected}")]
    Usage {
        command: &'static str,
        expected: &'static str,
    },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Quit,
    Select(EffectKind),
    Set { name: String, value: f32 },
    Knob { knob: Knob, raw: u8 },
    Turn(i32),
    Press,
    Show,
    Status,
    Start,
    Stop,
    Save(String),
    Load(String),
    Presets,
    Help,
}

fn usage(command: &'static str, expected: &'static str) -> CommandError {
    CommandError::Usage { command, expected }
}

/// Parse one menu line. `0` quits, `1`-`8` select an effect.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let head = words.next().ok_or(CommandError::Empty)?;
    let args: Vec<&str> = words.collect();

    if let Ok(number) = head.parse::<usize>() {
        return match number {
            0 => Ok(Command::Quit),
            n => EffectKind::from_index(n - 1)
                .map(Command::Select)
                .ok_or_else(|| CommandError::Invalid(format!("no effect number {}", n))),
        };
    }

    let command = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("q" | "quit" | "exit", []) => Command::Quit,
        ("effect", [name]) => {
            Command::Select(name.parse().map_err(|e: stomp_core::domain::UnknownEffect| {
                CommandError::Invalid(e.to_string())
            })?)
        }
        ("effect", _) => return Err(usage("effect", "an effect name")),
        ("set", [name, value]) => {
            if !PARAMETER_NAMES.contains(name) {
                return Err(CommandError::Invalid(format!("unknown parameter '{}'", name)));
            }
            let value = value
                .parse::<f32>()
                .map_err(|_| CommandError::Invalid(format!("'{}' is not a number", value)))?;
            Command::Set {
                name: name.to_string(),
                value,
            }
        }
        ("set", _) => return Err(usage("set", "<param> <value>")),
        ("knob", [knob, raw]) => Command::Knob {
            knob: knob.parse().map_err(CommandError::Invalid)?,
            raw: raw
                .parse()
                .map_err(|_| CommandError::Invalid(format!("'{}' is not in 0..255", raw)))?,
        },
        ("knob", _) => return Err(usage("knob", "<mix|volume> <0..255>")),
        ("turn", [steps]) => Command::Turn(
            steps
                .trim_start_matches('+')
                .parse()
                .map_err(|_| CommandError::Invalid(format!("'{}' is not a step count", steps)))?,
        ),
        ("turn", _) => return Err(usage("turn", "<+1|-1>")),
        ("press", []) => Command::Press,
        ("show", []) => Command::Show,
        ("status", []) => Command::Status,
        ("start", []) => Command::Start,
        ("stop", []) => Command::Stop,
        ("save", [name]) => Command::Save(name.to_string()),
        ("save", _) => return Err(usage("save", "a preset name")),
        ("load", [name]) => Command::Load(name.to_string()),
        ("load", _) => return Err(usage("load", "a preset name")),
        ("presets", []) => Command::Presets,
        ("help" | "?", _) => Command::Help,
        (other, _) => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

pub fn menu_text(active: EffectKind) -> String {
    let mut out = String::from("\n=== Stomp ===\n");
    for kind in EffectKind::ALL {
        let marker = if kind == active { '*' } else { ' ' };
        let _ = writeln!(out, " {} {}. {}", marker, kind.index() + 1, kind);
    }
    out.push_str("   0. exit\n");
    out
}

pub fn help_text() -> String {
    let mut out = String::from(
        "Commands:\n\
         \x20 1-8 | effect <name>      select an effect\n\
         \x20 set <param> <value>      set a parameter\n\
         \x20 knob <mix|volume> <raw>  pot reading 0..255\n\
         \x20 turn <+1|-1>             encoder step\n\
         \x20 press                    toggle bypass\n\
         \x20 show | status            print parameters or engine state\n\
         \x20 start | stop             control streaming\n\
         \x20 save|load <name>, presets\n\
         \x20 0 | quit                 exit\n\
         Parameters:",
    );
    for name in PARAMETER_NAMES {
        let _ = write!(out, " {}", name);
    }
    out
}
