//! Console command bridge
//!
//! Maps console command names onto `MessagingService` calls. Names are
//! matched case-insensitively and lines are tokenized on whitespace.

use crate::endpoint::Endpoint;
use crate::error::{SendError, TransportError};
use crate::message::DataPacket;
use crate::retry::RetryLimit;
use crate::service::MessagingService;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

pub const CONNECT_COMMAND: &str = "DataLinkConnect";
pub const SEND_COMMAND: &str = "DataLinkSend";
pub const HELP_COMMAND: &str = "help";

const ENDPOINT_ARG: &str = "-Endpoint:";
const RETRIES_ARG: &str = "-Retries:";

/// Handler signature for registered commands
pub type CommandHandler = fn(&MessagingService, &[String]) -> Result<CommandOutcome, CommandError>;

/// What a command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A connect was requested
    Connecting {
        endpoint: Endpoint,
        retry_limit: RetryLimit,
        /// Endpoint text that failed to parse, replaced by the default
        rejected_endpoint: Option<String>,
    },
    /// A packet of this many bytes was queued
    Queued { bytes: usize },
    /// Nothing to do
    Ignored,
    /// Help text
    Help(String),
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Connecting {
                endpoint,
                retry_limit,
                rejected_endpoint,
            } => {
                if let Some(rejected) = rejected_endpoint {
                    writeln!(f, "invalid endpoint '{}', using default {}", rejected, endpoint)?;
                }
                match retry_limit {
                    RetryLimit::Unlimited => write!(f, "connecting to {}", endpoint),
                    RetryLimit::Attempts(n) => {
                        write!(f, "connecting to {} ({} attempts)", endpoint, n)
                    }
                }
            }
            CommandOutcome::Queued { bytes } => write!(f, "queued {} bytes", bytes),
            CommandOutcome::Ignored => write!(f, "nothing to send"),
            CommandOutcome::Help(text) => f.write_str(text),
        }
    }
}

/// Command dispatch failures
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help' for a list")]
    UnknownCommand(String),

    #[error("invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct CommandEntry {
    name: &'static str,
    usage: &'static str,
    description: &'static str,
    handler: CommandHandler,
}

/// Name → handler table
pub struct CommandRegistry {
    commands: Vec<CommandEntry>,
}

impl CommandRegistry {
    /// Empty table; `help` is always available
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Table with the connect and send commands registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            CONNECT_COMMAND,
            "DataLinkConnect [-Endpoint:<host>:<port>] [-Retries:<n>]",
            "Connect to a peer (default 127.0.0.1:5000, unlimited retries)",
            handle_connect,
        );
        registry.register(
            SEND_COMMAND,
            "DataLinkSend <words...>",
            "Queue the words, each followed by a space, as one packet",
            handle_send,
        );
        registry
    }

    /// Add a command, replacing any with the same name
    pub fn register(
        &mut self,
        name: &'static str,
        usage: &'static str,
        description: &'static str,
        handler: CommandHandler,
    ) {
        self.commands
            .retain(|entry| !entry.name.eq_ignore_ascii_case(name));
        self.commands.push(CommandEntry {
            name,
            usage,
            description,
            handler,
        });
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.iter().map(|entry| entry.name)
    }

    pub fn contains(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(HELP_COMMAND) || self.find(name).is_some()
    }

    fn find(&self, name: &str) -> Option<&CommandEntry> {
        self.commands
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Run command `name` with `args`
    pub fn dispatch(
        &self,
        service: &MessagingService,
        name: &str,
        args: &[String],
    ) -> Result<CommandOutcome, CommandError> {
        if name.eq_ignore_ascii_case(HELP_COMMAND) {
            return Ok(CommandOutcome::Help(self.help_text()));
        }
        let entry = self
            .find(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        debug!(command = entry.name, args = args.len(), "Dispatching command");
        (entry.handler)(service, args)
    }

    /// Tokenize `line` on whitespace and dispatch it; a blank line is ignored
    pub fn dispatch_line(
        &self,
        service: &MessagingService,
        line: &str,
    ) -> Result<CommandOutcome, CommandError> {
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            return Ok(CommandOutcome::Ignored);
        };
        let args: Vec<String> = tokens.map(str::to_string).collect();
        self.dispatch(service, name, &args)
    }

    pub fn help_text(&self) -> String {
        let mut text = String::from("Commands:\n");
        for entry in &self.commands {
            text.push_str(&format!("  {:<58} {}\n", entry.usage, entry.description));
        }
        text.push_str(&format!("  {:<58} {}", HELP_COMMAND, "Show this list"));
        text
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Case-insensitive `strip_prefix` for `-Key:value` arguments
fn arg_value<'a>(arg: &'a str, prefix: &str) -> Option<&'a str> {
    let head = arg.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &arg[prefix.len()..])
}

/// `DataLinkConnect [-Endpoint:<host>:<port>] [-Retries:<n>]`
pub fn handle_connect(
    service: &MessagingService,
    args: &[String],
) -> Result<CommandOutcome, CommandError> {
    let mut endpoint = Endpoint::default();
    let mut rejected_endpoint = None;

    if let Some(value) = args.iter().find_map(|arg| arg_value(arg, ENDPOINT_ARG)) {
        match value.parse::<Endpoint>() {
            Ok(parsed) => endpoint = parsed,
            Err(e) => {
                warn!(input = value, error = %e, default = %endpoint, "Invalid endpoint, using default");
                rejected_endpoint = Some(value.to_string());
            }
        }
    }

    let mut options = service.config().connect_defaults.clone();
    if let Some(value) = args.iter().find_map(|arg| arg_value(arg, RETRIES_ARG)) {
        let raw = value
            .parse::<u32>()
            .map_err(|e| CommandError::InvalidArgument {
                argument: format!("{}{}", RETRIES_ARG, value),
                reason: e.to_string(),
            })?;
        options.max_retry_attempts = RetryLimit::from_raw(raw);
    }

    let retry_limit = options.max_retry_attempts;
    service.connect_socket(endpoint.clone(), options)?;
    Ok(CommandOutcome::Connecting {
        endpoint,
        retry_limit,
        rejected_endpoint,
    })
}

/// `DataLinkSend <words...>`
pub fn handle_send(
    service: &MessagingService,
    args: &[String],
) -> Result<CommandOutcome, CommandError> {
    if args.is_empty() {
        return Ok(CommandOutcome::Ignored);
    }
    let packet = DataPacket::from_args(args);
    let bytes = packet.len();
    service.send(packet)?;
    Ok(CommandOutcome::Queued { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_arg_value_is_case_insensitive() {
        assert_eq!(arg_value("-endpoint:1.2.3.4:5", ENDPOINT_ARG), Some("1.2.3.4:5"));
        assert_eq!(arg_value("-Retries:3", RETRIES_ARG), Some("3"));
        assert_eq!(arg_value("-Ret", RETRIES_ARG), None);
        assert_eq!(arg_value("Endpoint:x", ENDPOINT_ARG), None);
    }

    #[test]
    fn test_send_joins_arguments() {
        let service = MessagingService::new();
        let registry = CommandRegistry::with_defaults();

        let outcome = registry
            .dispatch(&service, SEND_COMMAND, &args(&["foo", "bar"]))
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Queued { bytes: 8 });
        assert_eq!(service.pending_count(), 1);
    }

    #[test]
    fn test_empty_send_is_ignored() {
        let service = MessagingService::new();
        let registry = CommandRegistry::with_defaults();

        let outcome = registry.dispatch_line(&service, "datalinksend").unwrap();
        assert_eq!(outcome, CommandOutcome::Ignored);
        assert_eq!(service.pending_count(), 0);
        assert_eq!(
            registry.dispatch_line(&service, "   ").unwrap(),
            CommandOutcome::Ignored
        );
    }

    #[test]
    fn test_unknown_command() {
        let service = MessagingService::new();
        let registry = CommandRegistry::with_defaults();

        let err = registry.dispatch_line(&service, "Teleport now").unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(name) if name == "Teleport"));
    }

    #[test]
    fn test_invalid_endpoint_falls_back_to_default() {
        let service = MessagingService::new();
        let registry = CommandRegistry::with_defaults();

        let outcome = registry
            .dispatch_line(&service, "DataLinkConnect -Endpoint:not-an-endpoint -Retries:1")
            .unwrap();
        match outcome {
            CommandOutcome::Connecting {
                endpoint,
                retry_limit,
                rejected_endpoint,
            } => {
                assert_eq!(endpoint, Endpoint::default());
                assert_eq!(retry_limit, RetryLimit::attempts(1));
                assert_eq!(rejected_endpoint.as_deref(), Some("not-an-endpoint"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        service.stop();
    }

    #[test]
    fn test_invalid_retries_is_an_error() {
        let service = MessagingService::new();
        let registry = CommandRegistry::with_defaults();

        let err = registry
            .dispatch_line(&service, "DataLinkConnect -Retries:lots")
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgument { .. }));
        assert!(!service.is_running());
    }

    #[test]
    fn test_help_lists_commands() {
        let service = MessagingService::new();
        let registry = CommandRegistry::with_defaults();

        let CommandOutcome::Help(text) = registry.dispatch_line(&service, "HELP").unwrap() else {
            panic!("expected help text");
        };
        assert!(text.contains(CONNECT_COMMAND));
        assert!(text.contains(SEND_COMMAND));
        assert!(registry.contains("datalinkconnect"));
    }

    #[test]
    fn test_register_replaces_existing() {
        fn noop(_: &MessagingService, _: &[String]) -> Result<CommandOutcome, CommandError> {
            Ok(CommandOutcome::Ignored)
        }

        let service = MessagingService::new();
        let mut registry = CommandRegistry::with_defaults();
        registry.register("DATALINKSEND", "DATALINKSEND", "noop", noop);

        assert_eq!(registry.names().count(), 2);
        assert_eq!(
            registry.dispatch_line(&service, "DataLinkSend hi").unwrap(),
            CommandOutcome::Ignored
        );
    }
}
