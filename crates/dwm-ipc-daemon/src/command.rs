//! IPC command registry and `RunCommand` dispatch
//!
//! Commands are registered by name together with the argument types they
//! accept. A `RunCommand` payload is parsed into an [`Invocation`], checked
//! against the registered signature, and then handed to the command's
//! action with the validated arguments.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::wm::WmState;

/// A single command argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// The command takes no arguments
    None,
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f64),
    String(String),
    /// Opaque handle, used for layout ids
    Handle(usize),
}

impl Arg {
    pub fn arg_type(&self) -> ArgType {
        match self {
            Self::None => ArgType::None,
            Self::SignedInt(_) => ArgType::SignedInt,
            Self::UnsignedInt(_) => ArgType::UnsignedInt,
            Self::Float(_) => ArgType::Float,
            Self::String(_) => ArgType::String,
            Self::Handle(_) => ArgType::Handle,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::SignedInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::UnsignedInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<usize> {
        match *self {
            Self::Handle(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    None,
    SignedInt,
    UnsignedInt,
    Float,
    String,
    Handle,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::SignedInt => "sint",
            Self::UnsignedInt => "uint",
            Self::Float => "float",
            Self::String => "string",
            Self::Handle => "ptr",
        })
    }
}

/// A parsed `RunCommand` request
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<Arg>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Failed to parse run command: {0}")]
    Parse(String),

    #[error("Command {0} not found")]
    NotFound(String),

    #[error("Command {name} expected {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Command {name} expected argument {index} to be of type {expected}, got {got}")]
    TypeMismatch {
        name: String,
        index: usize,
        expected: ArgType,
        got: ArgType,
    },

    #[error("Command {0} is already registered")]
    Duplicate(String),
}

/// Action invoked with validated arguments
///
/// Actions report nothing back, so a command that receives e.g. an
/// out-of-range layout id silently does nothing and the client still
/// receives a success reply.
pub type CommandAction = Box<dyn Fn(&mut WmState, &[Arg])>;

pub struct CommandDescriptor {
    pub name: String,
    pub arg_types: Vec<ArgType>,
    action: CommandAction,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("arg_types", &self.arg_types)
            .finish_non_exhaustive()
    }
}

/// Commands callable over IPC, keyed by name
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the standard window-manager commands
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::wm::actions::register_defaults(&mut registry);
        registry
    }

    /// Register a command
    ///
    /// A command taking no arguments is registered with `&[ArgType::None]`.
    pub fn register<F>(
        &mut self,
        name: &str,
        arg_types: &[ArgType],
        action: F,
    ) -> Result<(), CommandError>
    where
        F: Fn(&mut WmState, &[Arg]) + 'static,
    {
        if self.commands.contains_key(name) {
            return Err(CommandError::Duplicate(name.to_string()));
        }
        self.commands.insert(
            name.to_string(),
            CommandDescriptor {
                name: name.to_string(),
                arg_types: arg_types.to_vec(),
                action: Box::new(action),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Parse, validate and run a `RunCommand` payload
    pub fn dispatch(&self, payload: &str, wm: &mut WmState) -> Result<(), CommandError> {
        let invocation = parse(payload)?;
        let descriptor = self
            .get(&invocation.name)
            .ok_or_else(|| CommandError::NotFound(invocation.name.clone()))?;
        let args = validate(descriptor, invocation.args)?;
        debug!("Running command {} with {:?}", descriptor.name, args);
        (descriptor.action)(wm, &args);
        Ok(())
    }
}

/// Parse a `{"command": <string>, "args": [...]}` payload
///
/// A missing, null or empty `args` becomes a single [`Arg::None`]. Negative
/// integers parse as signed, other integers as unsigned, any remaining
/// number as a float.
pub fn parse(payload: &str) -> Result<Invocation, CommandError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| CommandError::Parse(e.to_string()))?;

    let name = match value.get("command") {
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(CommandError::Parse("command must be a string".to_string())),
        None => return Err(CommandError::Parse("missing command".to_string())),
    };

    let args = match value.get("args") {
        None | Some(Value::Null) => vec![Arg::None],
        Some(Value::Array(items)) if items.is_empty() => vec![Arg::None],
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_arg(index, item))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(CommandError::Parse("args must be an array".to_string())),
    };

    Ok(Invocation { name, args })
}

fn parse_arg(index: usize, value: &Value) -> Result<Arg, CommandError> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64().filter(|v| *v < 0) {
                Ok(Arg::SignedInt(v))
            } else if let Some(v) = n.as_u64() {
                Ok(Arg::UnsignedInt(v))
            } else {
                n.as_f64()
                    .map(Arg::Float)
                    .ok_or_else(|| CommandError::Parse(format!("argument {index} is not a number")))
            }
        }
        Value::String(s) => Ok(Arg::String(s.clone())),
        other => Err(CommandError::Parse(format!(
            "argument {index} has unsupported type {}",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check arguments against a descriptor, coercing where allowed
///
/// An unsigned integer is accepted where a handle or a signed integer is
/// expected; the value is reinterpreted bit for bit.
pub fn validate(descriptor: &CommandDescriptor, args: Vec<Arg>) -> Result<Vec<Arg>, CommandError> {
    if args.len() != descriptor.arg_types.len() {
        return Err(CommandError::ArityMismatch {
            name: descriptor.name.clone(),
            expected: descriptor.arg_types.len(),
            got: args.len(),
        });
    }

    args.into_iter()
        .zip(&descriptor.arg_types)
        .enumerate()
        .map(|(index, (arg, &expected))| match (arg, expected) {
            (arg, expected) if arg.arg_type() == expected => Ok(arg),
            (Arg::UnsignedInt(v), ArgType::Handle) => Ok(Arg::Handle(v as usize)),
            (Arg::UnsignedInt(v), ArgType::SignedInt) => Ok(Arg::SignedInt(v as i64)),
            (arg, expected) => Err(CommandError::TypeMismatch {
                name: descriptor.name.clone(),
                index,
                expected,
                got: arg.arg_type(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwm_ipc_config::Config;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_registry() -> (CommandRegistry, Rc<RefCell<Vec<Vec<Arg>>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CommandRegistry::new();

        let recorded = Rc::clone(&calls);
        registry
            .register("view", &[ArgType::UnsignedInt], move |_, args| {
                recorded.borrow_mut().push(args.to_vec())
            })
            .unwrap();
        let recorded = Rc::clone(&calls);
        registry
            .register("focusstack", &[ArgType::SignedInt], move |_, args| {
                recorded.borrow_mut().push(args.to_vec())
            })
            .unwrap();
        let recorded = Rc::clone(&calls);
        registry
            .register("setlayoutsafe", &[ArgType::Handle], move |_, args| {
                recorded.borrow_mut().push(args.to_vec())
            })
            .unwrap();
        let recorded = Rc::clone(&calls);
        registry
            .register("zoom", &[ArgType::None], move |_, args| {
                recorded.borrow_mut().push(args.to_vec())
            })
            .unwrap();

        (registry, calls)
    }

    #[test]
    fn test_parse_number_kinds() {
        let invocation = parse(r#"{"command": "x", "args": [-3, 7, 0.5, "s"]}"#).unwrap();
        assert_eq!(invocation.name, "x");
        assert_eq!(
            invocation.args,
            vec![
                Arg::SignedInt(-3),
                Arg::UnsignedInt(7),
                Arg::Float(0.5),
                Arg::String("s".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_missing_or_empty_args() {
        for payload in [
            r#"{"command": "zoom"}"#,
            r#"{"command": "zoom", "args": null}"#,
            r#"{"command": "zoom", "args": []}"#,
        ] {
            assert_eq!(parse(payload).unwrap().args, vec![Arg::None]);
        }
    }

    #[test]
    fn test_parse_rejects_bad_payloads() {
        assert!(matches!(parse("not json"), Err(CommandError::Parse(_))));
        assert!(matches!(parse(r#"{"args": [1]}"#), Err(CommandError::Parse(_))));
        assert!(matches!(parse(r#"{"command": 5}"#), Err(CommandError::Parse(_))));
        assert!(matches!(
            parse(r#"{"command": "x", "args": [true]}"#),
            Err(CommandError::Parse(_))
        ));
        assert!(matches!(
            parse(r#"{"command": "x", "args": {"a": 1}}"#),
            Err(CommandError::Parse(_))
        ));
    }

    #[test]
    fn test_dispatch_runs_action_with_args() {
        let (registry, calls) = recording_registry();
        let mut wm = WmState::from_config(&Config::default());

        registry
            .dispatch(r#"{"command": "view", "args": [4]}"#, &mut wm)
            .unwrap();
        assert_eq!(calls.borrow().as_slice(), &[vec![Arg::UnsignedInt(4)]]);
    }

    #[test]
    fn test_dispatch_unknown_command() {
        let (registry, calls) = recording_registry();
        let mut wm = WmState::from_config(&Config::default());

        let err = registry
            .dispatch(r#"{"command": "nonexistent", "args": []}"#, &mut wm)
            .unwrap_err();
        assert_eq!(err.to_string(), "Command nonexistent not found");
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_dispatch_arity_mismatch() {
        let (registry, calls) = recording_registry();
        let mut wm = WmState::from_config(&Config::default());

        let err = registry
            .dispatch(r#"{"command": "view", "args": [1, 2]}"#, &mut wm)
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::ArityMismatch {
                name: "view".to_string(),
                expected: 1,
                got: 2,
            }
        );
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_dispatch_type_mismatch() {
        let (registry, _) = recording_registry();
        let mut wm = WmState::from_config(&Config::default());

        let err = registry
            .dispatch(r#"{"command": "view", "args": ["1"]}"#, &mut wm)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command view expected argument 0 to be of type uint, got string"
        );

        // A negative value is signed and never coerces to unsigned
        let err = registry
            .dispatch(r#"{"command": "view", "args": [-1]}"#, &mut wm)
            .unwrap_err();
        assert!(matches!(err, CommandError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unsigned_coerces_to_signed_and_handle() {
        let (registry, calls) = recording_registry();
        let mut wm = WmState::from_config(&Config::default());

        registry
            .dispatch(r#"{"command": "focusstack", "args": [1]}"#, &mut wm)
            .unwrap();
        registry
            .dispatch(r#"{"command": "setlayoutsafe", "args": [2]}"#, &mut wm)
            .unwrap();

        registry
            .dispatch(r#"{"command": "focusstack", "args": [18446744073709551615]}"#, &mut wm)
            .unwrap();
        registry
            .dispatch(r#"{"command": "setlayoutsafe", "args": [18446744073709551615]}"#, &mut wm)
            .unwrap();

        // The bit pattern is carried over unchanged
        assert_eq!(
            calls.borrow().as_slice(),
            &[
                vec![Arg::SignedInt(1)],
                vec![Arg::Handle(2)],
                vec![Arg::SignedInt(-1)],
                vec![Arg::Handle(u64::MAX as usize)],
            ]
        );
    }

    #[test]
    fn test_no_arg_command_accepts_empty_args() {
        let (registry, calls) = recording_registry();
        let mut wm = WmState::from_config(&Config::default());

        registry.dispatch(r#"{"command": "zoom"}"#, &mut wm).unwrap();
        assert_eq!(calls.borrow().as_slice(), &[vec![Arg::None]]);

        let err = registry
            .dispatch(r#"{"command": "zoom", "args": [1]}"#, &mut wm)
            .unwrap_err();
        assert!(matches!(err, CommandError::TypeMismatch { .. }));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = CommandRegistry::new();
        registry.register("quit", &[ArgType::None], |_, _| {}).unwrap();
        assert_eq!(
            registry.register("quit", &[ArgType::None], |_, _| {}),
            Err(CommandError::Duplicate("quit".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }
}
