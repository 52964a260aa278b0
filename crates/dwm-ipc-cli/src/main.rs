//! dwm-msg
//!
//! Command-line client for the dwm IPC socket.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dwm_ipc_proto::{read_frame, write_frame, MessageType};
use miette::{IntoDiagnostic, WrapErr};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "dwm-msg")]
#[command(about = "Send messages to dwm over IPC")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/dwm-ipc/config.kdl")]
    config: String,

    /// Socket path, overriding the configuration
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Send the request without waiting for a reply
    #[arg(long)]
    ignore_reply: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command, e.g. `run-command view 4`
    RunCommand {
        name: String,
        /// Arguments, typed as unsigned, signed, float or string
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print all monitors
    GetMonitors,

    /// Print tag labels
    GetTags,

    /// Print available layouts
    GetLayouts,

    /// Print a client by window id, or the focused client
    GetDwmClient { window_id: Option<u64> },

    /// Print the first client whose name matches
    FindDwmClient { name: String },

    /// Subscribe to events and print them as they arrive
    Subscribe {
        #[arg(required = true)]
        events: Vec<String>,
    },

    /// Validate the configuration file
    Validate,
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    let (msg_type, payload) = match cli.command {
        Commands::Validate => return cmd_validate(&config_path),
        Commands::Subscribe { events } => {
            let socket_path = socket_path(cli.socket, &config_path)?;
            return cmd_subscribe(&socket_path, &events, cli.ignore_reply);
        }
        Commands::RunCommand { name, args } => (MessageType::RunCommand, run_command_payload(&name, &args)),
        Commands::GetMonitors => (MessageType::GetMonitors, String::new()),
        Commands::GetTags => (MessageType::GetTags, String::new()),
        Commands::GetLayouts => (MessageType::GetLayouts, String::new()),
        Commands::GetDwmClient { window_id } => (
            MessageType::GetDwmClient,
            window_id
                .map(|id| json!({ "client_window_id": id }).to_string())
                .unwrap_or_default(),
        ),
        Commands::FindDwmClient { name } => (
            MessageType::FindDwmClient,
            json!({ "client_name": name }).to_string(),
        ),
    };

    let socket_path = socket_path(cli.socket, &config_path)?;
    let mut stream = connect(&socket_path)?;
    tracing::debug!("Sending {} ({} bytes)", msg_type, payload.len());
    write_frame(&mut stream, msg_type, payload.as_bytes())
        .into_diagnostic()
        .wrap_err("Failed to send request")?;

    if cli.ignore_reply {
        return Ok(());
    }

    let reply = receive(&mut stream)?;
    println!("{}", pretty(&reply));
    match error_reason(&reply) {
        Some(reason) => Err(miette::miette!("{}", reason)),
        None => Ok(()),
    }
}

/// Socket from the command line, then the configuration, then the default
fn socket_path(flag: Option<PathBuf>, config_path: &Path) -> miette::Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    if config_path.exists() {
        let config = dwm_ipc_config::parse_config(config_path)?;
        return Ok(config.ipc.resolved_socket_path());
    }
    Ok(dwm_ipc_config::default_socket_path())
}

fn connect(socket_path: &Path) -> miette::Result<UnixStream> {
    tracing::debug!("Connecting to {}", socket_path.display());
    UnixStream::connect(socket_path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to connect to {}", socket_path.display()))
}

fn receive(stream: &mut UnixStream) -> miette::Result<Value> {
    let message = read_frame(stream)
        .into_diagnostic()
        .wrap_err("Failed to read reply")?
        .ok_or_else(|| miette::miette!("Connection closed by dwm"))?;

    let text = String::from_utf8_lossy(&message.payload);
    Ok(serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned())))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn error_reason(reply: &Value) -> Option<&str> {
    (reply["result"] == "error").then(|| reply["reason"].as_str().unwrap_or("unknown error"))
}

/// Type a command-line argument the way the server expects it
fn typed_arg(arg: &str) -> Value {
    if let Ok(v) = arg.parse::<u64>() {
        json!(v)
    } else if let Ok(v) = arg.parse::<i64>() {
        json!(v)
    } else if let Some(v) = arg.parse::<f64>().ok().filter(|v| v.is_finite()) {
        json!(v)
    } else {
        json!(arg)
    }
}

fn run_command_payload(name: &str, args: &[String]) -> String {
    let args: Vec<Value> = args.iter().map(|a| typed_arg(a)).collect();
    json!({ "command": name, "args": args }).to_string()
}

fn cmd_subscribe(socket_path: &Path, events: &[String], ignore_reply: bool) -> miette::Result<()> {
    let mut stream = connect(socket_path)?;

    for event in events {
        let payload = json!({ "event": event, "action": "subscribe" }).to_string();
        write_frame(&mut stream, MessageType::Subscribe, payload.as_bytes())
            .into_diagnostic()
            .wrap_err("Failed to send subscribe request")?;

        let reply = receive(&mut stream)?;
        if let Some(reason) = error_reason(&reply) {
            return Err(miette::miette!("Cannot subscribe to {}: {}", event, reason));
        }
        if !ignore_reply {
            println!("{}", pretty(&reply));
        }
    }

    loop {
        let message = read_frame(&mut stream)
            .into_diagnostic()
            .wrap_err("Failed to read event")?;
        let Some(message) = message else {
            tracing::debug!("Socket closed, stopping subscription");
            return Ok(());
        };
        let text = String::from_utf8_lossy(&message.payload);
        match serde_json::from_str::<Value>(&text) {
            Ok(event) => println!("{}", pretty(&event)),
            Err(_) => println!("{}", text),
        }
    }
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = dwm_ipc_config::parse_config(config_path)?;
    println!("Configuration is valid!");
    println!("  Socket: {}", config.ipc.resolved_socket_path().display());
    println!("  Tags: {}", config.tags.join(" "));
    println!("  Layouts: {}", config.layouts.join(" "));
    println!("  Monitors: {}", config.monitors.len());
    println!("  Clients: {}", config.clients.len());
    Ok(())
}
