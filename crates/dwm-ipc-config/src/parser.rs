//! KDL configuration parser

use std::path::Path;

use crate::error::{ConfigError, SourceLocation};
use crate::model::*;

/// Extract source location from a KDL node's name span
fn get_node_location(node: &kdl::KdlNode, source: &str) -> SourceLocation {
    let span = node.name().span();
    let offset = span.offset();
    let len = span.len();

    let (line, column) = offset_to_line_col(source, offset);

    SourceLocation::new(line, column, offset, len)
}

/// Convert byte offset to line and column (1-indexed)
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;

    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

fn invalid(node: &kdl::KdlNode, source: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        node: node.name().value().to_string(),
        message: message.into(),
        location: get_node_location(node, source),
    }
}

/// Positional (unnamed) values of a node, in order
fn args(node: &kdl::KdlNode) -> impl Iterator<Item = &kdl::KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

fn string_arg<'a>(node: &'a kdl::KdlNode, source: &str) -> Result<&'a str, ConfigError> {
    args(node)
        .next()
        .and_then(|v| v.as_string())
        .ok_or_else(|| invalid(node, source, "expected a string"))
}

fn int_arg(node: &kdl::KdlNode, source: &str) -> Result<i64, ConfigError> {
    args(node)
        .next()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| invalid(node, source, "expected an integer"))
}

fn float_arg(node: &kdl::KdlNode, source: &str) -> Result<f64, ConfigError> {
    args(node)
        .next()
        .and_then(|v| v.as_f64().or_else(|| v.as_i64().map(|i| i as f64)))
        .ok_or_else(|| invalid(node, source, "expected a number"))
}

fn bool_arg(node: &kdl::KdlNode, source: &str) -> Result<bool, ConfigError> {
    args(node)
        .next()
        .and_then(|v| v.as_bool())
        .ok_or_else(|| invalid(node, source, "expected true or false"))
}

fn narrow<T: TryFrom<i64>>(
    node: &kdl::KdlNode,
    source: &str,
    value: i64,
) -> Result<T, ConfigError> {
    T::try_from(value).map_err(|_| invalid(node, source, format!("{} is out of range", value)))
}

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl uses an older miette version, so we need to extract offset/len manually
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();
    let mut monitors = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node, content)?;
            }
            "ipc" => {
                config.ipc = parse_ipc(node, content)?;
            }
            "tags" => {
                config.tags = args(node)
                    .map(|v| v.as_string().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid(node, content, "tag labels must be strings"))?;
            }
            "layouts" => {
                config.layouts = parse_layouts(node, content)?;
            }
            "monitor" => {
                monitors.push(parse_monitor(node, content)?);
            }
            "client-flags" => {
                config.client_flags = args(node)
                    .map(|v| {
                        v.as_string()
                            .ok_or_else(|| "client flags must be strings".to_string())
                            .and_then(str::parse::<OptionalFlag>)
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|message| invalid(node, content, message))?;
            }
            "client" => {
                config.clients.push(parse_client(node, content)?);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    if !monitors.is_empty() {
        config.monitors = monitors;
    }

    validate(&config)?;

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode, source: &str) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    global.log_level = string_arg(child, source)?
                        .parse()
                        .map_err(|e: String| invalid(child, source, e))?;
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_ipc(node: &kdl::KdlNode, source: &str) -> Result<IpcConfig, ConfigError> {
    let mut ipc = IpcConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "socket-path" => {
                    let path = string_arg(child, source)?;
                    ipc.socket_path = Some(shellexpand::tilde(path).into_owned().into());
                }
                "max-clients" => {
                    let value = int_arg(child, source)?;
                    ipc.max_clients = narrow(child, source, value)?;
                    if ipc.max_clients == 0 {
                        return Err(invalid(child, source, "must be at least 1"));
                    }
                }
                "idle-timeout-ms" => {
                    let value = int_arg(child, source)?;
                    ipc.idle_timeout_ms = narrow(child, source, value)?;
                }
                name => {
                    tracing::warn!("Unknown ipc config option: {}", name);
                }
            }
        }
    }

    Ok(ipc)
}

fn parse_layouts(node: &kdl::KdlNode, source: &str) -> Result<Vec<String>, ConfigError> {
    let mut layouts = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "layout" => layouts.push(string_arg(child, source)?.to_string()),
                name => {
                    tracing::warn!("Unknown layouts entry: {}", name);
                }
            }
        }
    }

    Ok(layouts)
}

fn parse_monitor(node: &kdl::KdlNode, source: &str) -> Result<MonitorConfig, ConfigError> {
    let mut monitor = MonitorConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "geometry" => {
                    let values: Vec<i64> = args(child).filter_map(|v| v.as_i64()).collect();
                    let &[x, y, width, height] = values.as_slice() else {
                        return Err(invalid(child, source, "expected x y width height"));
                    };
                    monitor.x = narrow(child, source, x)?;
                    monitor.y = narrow(child, source, y)?;
                    monitor.width = narrow(child, source, width)?;
                    monitor.height = narrow(child, source, height)?;
                    if monitor.width <= 0 || monitor.height <= 0 {
                        return Err(invalid(child, source, "width and height must be positive"));
                    }
                }
                "mfact" => {
                    let mfact = float_arg(child, source)?;
                    if !(0.05..=0.95).contains(&mfact) {
                        return Err(invalid(child, source, "mfact must be within 0.05..0.95"));
                    }
                    monitor.mfact = mfact as f32;
                }
                "nmaster" => {
                    let value = int_arg(child, source)?;
                    monitor.nmaster = narrow(child, source, value)?;
                }
                "bar-height" => {
                    let value = int_arg(child, source)?;
                    monitor.bar_height = narrow(child, source, value)?;
                }
                "show-bar" => monitor.show_bar = bool_arg(child, source)?,
                "top-bar" => monitor.top_bar = bool_arg(child, source)?,
                name => {
                    tracing::warn!("Unknown monitor config option: {}", name);
                }
            }
        }
    }

    Ok(monitor)
}

fn parse_client(node: &kdl::KdlNode, source: &str) -> Result<ClientConfig, ConfigError> {
    let name = args(node)
        .next()
        .and_then(|v| v.as_string())
        .ok_or_else(|| ConfigError::MissingField {
            field: "client name (e.g., `client \"st\" { ... }`)".to_string(),
        })?;

    let mut client = ClientConfig::new(name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "pid" => {
                    let value = int_arg(child, source)?;
                    client.pid = narrow(child, source, value)?;
                }
                "tags" => {
                    let value = int_arg(child, source)?;
                    client.tags = narrow(child, source, value)?;
                }
                "monitor" => {
                    let value = int_arg(child, source)?;
                    client.monitor = narrow(child, source, value)?;
                }
                "floating" => client.floating = bool_arg(child, source)?,
                "urgent" => client.urgent = bool_arg(child, source)?,
                "fullscreen" => client.fullscreen = bool_arg(child, source)?,
                name => {
                    tracing::warn!("Unknown client config option: {}", name);
                }
            }
        }
    }

    Ok(client)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.tags.is_empty() {
        return Err(ConfigError::Invalid {
            message: "at least one tag must be configured".to_string(),
        });
    }
    if config.tags.len() > MAX_TAGS {
        return Err(ConfigError::Invalid {
            message: format!(
                "{} tags configured, at most {} are supported",
                config.tags.len(),
                MAX_TAGS
            ),
        });
    }
    if config.layouts.is_empty() {
        return Err(ConfigError::Invalid {
            message: "at least one layout must be configured".to_string(),
        });
    }

    let tag_mask = config.tag_mask();
    for client in &config.clients {
        if client.monitor >= config.monitors.len() {
            return Err(ConfigError::Invalid {
                message: format!(
                    "Client '{}' is on monitor {} but only {} monitor(s) are configured",
                    client.name,
                    client.monitor,
                    config.monitors.len()
                ),
            });
        }
        if client.tags & tag_mask == 0 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "Client '{}' has tag mask {:#x} which selects no configured tag",
                    client.name, client.tags
                ),
            });
        }
    }

    Ok(())
}
