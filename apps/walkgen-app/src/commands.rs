//! Walk script commands.
//!
//! A script is a list of lines, one command each, `#` starting a comment:
//!
//! ```text
//! :walkmode heuristic
//! :singlesupporttime 0.8
//! :stepseq 0.0 -0.105 0.0  0.2 0.19 0.0  0.2 -0.19 0.0
//! :finish
//! :run 4.4
//! ```
//!
//! Step yaws and tilt angles are given in degrees.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use walkgen_core::types::{ReferenceVelocity, RelativeFootPosition};

use crate::session::{Session, SessionError, WalkMode};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),

    #[error("`{command}` expects {expected}, got {got} argument(s)")]
    Arity {
        command: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("`{command}`: `{value}` is not a number")]
    Number { command: &'static str, value: String },

    #[error("`{command}`: {message}")]
    Invalid { command: &'static str, message: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A command failure with the script line it came from.
#[derive(Debug, Error)]
#[error("line {line}: {source}")]
pub struct ScriptError {
    pub line: usize,
    pub source: CommandError,
}

pub type Handler = fn(&mut Session, &[&str]) -> Result<(), CommandError>;

/// Command name to handler.
pub struct CommandTable {
    handlers: HashMap<&'static str, Handler>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable {
    /// Table with every built-in command.
    pub fn new() -> Self {
        let mut table = Self {
            handlers: HashMap::new(),
        };
        table.register(":walkmode", walk_mode);
        table.register(":singlesupporttime", single_support_time);
        table.register(":doublesupporttime", double_support_time);
        table.register(":stepheight", step_height);
        table.register(":omega", omega);
        table.register(":stepseq", step_sequence);
        table.register(":stepstairseq", stair_sequence);
        table.register(":addstep", add_step);
        table.register(":finish", finish);
        table.register(":setvelreference", velocity_reference);
        table.register(":changestep", change_step);
        table.register(":run", run);
        table
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run one line. Blank lines and comments are accepted and ignored.
    pub fn execute_line(&self, session: &mut Session, line: &str) -> Result<(), CommandError> {
        let code = line.split('#').next().unwrap_or_default();
        let mut tokens = code.split_whitespace();
        let Some(name) = tokens.next() else {
            return Ok(());
        };
        let args: Vec<&str> = tokens.collect();
        let key = name.to_ascii_lowercase();
        let handler = self
            .handlers
            .get(key.as_str())
            .ok_or_else(|| CommandError::Unknown(name.to_owned()))?;
        debug!(command = %key, args = args.len(), "executing");
        handler(session, &args)
    }

    /// Run a whole script, stopping at the first failing line.
    pub fn execute_script(&self, session: &mut Session, script: &str) -> Result<usize, ScriptError> {
        let mut executed = 0;
        for (index, line) in script.lines().enumerate() {
            self.execute_line(session, line)
                .map_err(|source| ScriptError {
                    line: index + 1,
                    source,
                })?;
            if !line.split('#').next().unwrap_or_default().trim().is_empty() {
                executed += 1;
            }
        }
        info!(commands = executed, "script executed");
        Ok(executed)
    }
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

fn numbers(command: &'static str, args: &[&str]) -> Result<Vec<f64>, CommandError> {
    args.iter()
        .map(|value| {
            value.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| {
                CommandError::Number {
                    command,
                    value: (*value).to_owned(),
                }
            })
        })
        .collect()
}

fn exactly<const N: usize>(
    command: &'static str,
    expected: &'static str,
    args: &[&str],
) -> Result<[f64; N], CommandError> {
    let values = numbers(command, args)?;
    <[f64; N]>::try_from(values).map_err(|values| CommandError::Arity {
        command,
        expected,
        got: values.len(),
    })
}

fn groups(
    command: &'static str,
    expected: &'static str,
    width: usize,
    args: &[&str],
) -> Result<Vec<Vec<f64>>, CommandError> {
    if args.is_empty() || args.len() % width != 0 {
        return Err(CommandError::Arity {
            command,
            expected,
            got: args.len(),
        });
    }
    Ok(numbers(command, args)?
        .chunks(width)
        .map(<[f64]>::to_vec)
        .collect())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn walk_mode(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    const NAME: &str = ":walkmode";
    let [mode] = args else {
        return Err(CommandError::Arity {
            command: NAME,
            expected: "one mode",
            got: args.len(),
        });
    };
    let mode: WalkMode = mode.parse().map_err(|message| CommandError::Invalid {
        command: NAME,
        message,
    })?;
    session.set_mode(mode);
    Ok(())
}

fn single_support_time(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let [duration] = exactly::<1>(":singlesupporttime", "a duration in seconds", args)?;
    Ok(session.set_single_support(duration)?)
}

fn double_support_time(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let [duration] = exactly::<1>(":doublesupporttime", "a duration in seconds", args)?;
    Ok(session.set_double_support(duration)?)
}

fn step_height(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let [height] = exactly::<1>(":stepheight", "a height in metres", args)?;
    Ok(session.set_step_height(height)?)
}

fn omega(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let [degrees] = exactly::<1>(":omega", "a tilt angle in degrees", args)?;
    Ok(session.set_omega(degrees.to_radians())?)
}

fn step_sequence(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let steps: Vec<_> = groups(":stepseq", "groups of dx dy dtheta", 3, args)?
        .iter()
        .map(|g| RelativeFootPosition::new(g[0], g[1], g[2].to_radians()))
        .collect();
    Ok(session.start_sequence(&steps)?)
}

fn stair_sequence(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let steps: Vec<_> = groups(":stepstairseq", "groups of dx dy dz dtheta", 4, args)?
        .iter()
        .map(|g| RelativeFootPosition::with_height(g[0], g[1], g[2], g[3].to_radians()))
        .collect();
    Ok(session.start_sequence(&steps)?)
}

fn add_step(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let [dx, dy, dtheta] = exactly::<3>(":addstep", "dx dy dtheta", args)?;
    Ok(session.add_step(RelativeFootPosition::new(dx, dy, dtheta.to_radians()))?)
}

fn finish(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let [] = exactly::<0>(":finish", "no arguments", args)?;
    session.finish();
    Ok(())
}

fn velocity_reference(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let [vx, vy, yaw_rate] = exactly::<3>(":setvelreference", "vx vy yaw-rate", args)?;
    Ok(session.set_velocity_reference(ReferenceVelocity::new(vx, vy, yaw_rate))?)
}

fn change_step(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    let [time, x, y, theta] = exactly::<4>(":changestep", "time x y theta", args)?;
    let start = session.change_step(time, x, y, theta.to_radians())?;
    info!(time, start, "step changed");
    Ok(())
}

fn run(session: &mut Session, args: &[&str]) -> Result<(), CommandError> {
    const NAME: &str = ":run";
    let [duration] = exactly::<1>(NAME, "a duration in seconds", args)?;
    if duration < 0.0 {
        return Err(CommandError::Invalid {
            command: NAME,
            message: "duration must be >= 0".into(),
        });
    }
    session.run(duration)?;
    Ok(())
}
