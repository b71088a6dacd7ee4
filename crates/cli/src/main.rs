// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ICS command-line front-end.
//!
//! Thin mapping from subcommands onto the daemon's wire protocol. Exit
//! code 0 on success, 1 on any error including `wait` timeouts.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;

use clap::{Parser, Subcommand};
use client::Client;
use ics_core::attributes::{AttrValue, ModifyOp};
use ics_core::states::{GroupState, ResourceState};
use ics_daemon::protocol::{Request, Response};

#[derive(Parser)]
#[command(name = "ics", version, about = "Manage the ICS service-group supervisor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage resources
    Res {
        #[command(subcommand)]
        command: ResCommand,
    },
    /// Manage service groups
    Grp {
        #[command(subcommand)]
        command: GrpCommand,
    },
    /// Manage cluster nodes and system attributes
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },
    /// Manage the alert pipeline
    Alert {
        #[command(subcommand)]
        command: AlertCommand,
    },
    /// Server operations
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },
}

#[derive(Subcommand)]
enum ResCommand {
    /// Add a resource to a group
    Add { name: String, group: String },
    /// Delete a resource
    Delete { name: String },
    /// Bring a resource online
    Online {
        name: String,
        #[arg(long)]
        node: Option<String>,
    },
    /// Bring a resource offline
    Offline {
        name: String,
        #[arg(long)]
        node: Option<String>,
    },
    /// Print resource states
    State {
        names: Vec<String>,
        #[arg(long)]
        cluster: bool,
    },
    /// Make CHILD depend on PARENT
    Link { parent: String, child: String },
    /// Remove a dependency
    Unlink { parent: String, child: String },
    /// Clear a faulted resource
    Clear { name: String },
    /// Trigger an immediate monitor poll
    Probe { name: String },
    /// Flush a resource back to a quiescent state
    Flush { name: String },
    /// Print dependency edges
    Dep { names: Vec<String> },
    /// List resources
    List {
        #[arg(long)]
        cluster: bool,
    },
    /// Print one attribute value
    Value {
        name: String,
        attr: String,
        #[arg(long)]
        cluster: bool,
    },
    /// Modify an attribute
    Modify {
        name: String,
        attr: String,
        values: Vec<String>,
        /// Append to a list attribute
        #[arg(long)]
        append: bool,
        /// Remove from a list attribute
        #[arg(long)]
        remove: bool,
    },
    /// Print all attributes
    Attr { name: String },
    /// Wait for the resource to reach a state
    Wait {
        name: String,
        state: ResourceState,
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum GrpCommand {
    /// Add a group
    Add { name: String },
    /// Delete an empty group
    Delete { name: String },
    /// Bring a group online (cluster placement applies)
    Online {
        name: String,
        #[arg(long)]
        node: Option<String>,
    },
    /// Bring a group offline (everywhere unless --node is given)
    Offline {
        name: String,
        #[arg(long)]
        node: Option<String>,
    },
    /// Print group states
    State {
        names: Vec<String>,
        #[arg(long)]
        cluster: bool,
    },
    /// Enable a group
    Enable { name: String },
    /// Disable a group
    Disable { name: String },
    /// Enable every member resource
    EnableResources { name: String },
    /// Disable every member resource
    DisableResources { name: String },
    /// Flush every member resource
    Flush {
        name: String,
        #[arg(long)]
        node: Option<String>,
    },
    /// Clear every member resource
    Clear {
        name: String,
        #[arg(long)]
        node: Option<String>,
    },
    /// List member resources
    Resources { name: String },
    /// List groups
    List {
        #[arg(long)]
        cluster: bool,
    },
    /// Print one attribute value
    Value {
        name: String,
        attr: String,
        #[arg(long)]
        cluster: bool,
    },
    /// Modify an attribute
    Modify {
        name: String,
        attr: String,
        values: Vec<String>,
        #[arg(long)]
        append: bool,
        #[arg(long)]
        remove: bool,
    },
    /// Print all attributes
    Attr { name: String },
    /// Wait for the group to reach a state
    Wait {
        name: String,
        state: GroupState,
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Add a peer node to the cluster
    Add { host: String },
    /// Delete a peer node
    Delete { host: String },
    /// List cluster nodes
    List,
    /// Print all system attributes
    Attr,
    /// Print one system attribute
    Value { attr: String },
    /// Modify a system attribute
    Modify {
        attr: String,
        values: Vec<String>,
        #[arg(long)]
        append: bool,
        #[arg(long)]
        remove: bool,
    },
    /// Print this node's current load
    Load,
}

#[derive(Subcommand)]
enum AlertCommand {
    /// Print the alert level threshold
    Level,
    /// Set the alert level threshold
    SetLevel { level: String },
    /// Add a mail recipient
    AddRecipient { address: String },
    /// Remove a mail recipient
    RemoveRecipient { address: String },
    /// Push a test alert through the pipeline
    Test { resource: String },
}

#[derive(Subcommand)]
enum ServerCommand {
    /// Check that the daemon answers
    Ping,
    /// Print a full snapshot of the node
    Dump,
    /// Apply a JSON config snapshot from a file
    Load { file: std::path::PathBuf },
    /// Set the server log level
    LogLevel { level: String },
}

fn modify_op(values: Vec<String>, append: bool, remove: bool) -> Result<ModifyOp, String> {
    if append && remove {
        return Err("--append and --remove are mutually exclusive".to_string());
    }
    let mut values = values;
    if append || remove {
        if values.len() != 1 {
            return Err("append/remove take exactly one value".to_string());
        }
        let value = values.remove(0);
        return Ok(if append {
            ModifyOp::Append { value }
        } else {
            ModifyOp::Remove { value }
        });
    }
    Ok(match values.len() {
        0 => ModifyOp::Set {
            value: AttrValue::from(""),
        },
        1 => ModifyOp::Set {
            value: AttrValue::from(values.remove(0)),
        },
        _ => ModifyOp::Set {
            value: AttrValue::List(values),
        },
    })
}

/// Build the wire request for a parsed command.
fn to_request(command: Command) -> Result<(Request, bool), String> {
    use Command::*;
    let request = match command {
        Res { command } => {
            use ResCommand::*;
            match command {
                Add { name, group } => (
                    Request::ResAdd {
                        name,
                        group,
                        remote: false,
                    },
                    true,
                ),
                Delete { name } => (Request::ResDelete { name, remote: false }, true),
                Online { name, node } => (Request::ResOnline { name, node }, true),
                Offline { name, node } => (Request::ResOffline { name, node }, true),
                State { names, cluster } => (Request::ResState { names, cluster }, false),
                Link { parent, child } => (
                    Request::ResLink {
                        parent,
                        child,
                        remote: false,
                    },
                    true,
                ),
                Unlink { parent, child } => (
                    Request::ResUnlink {
                        parent,
                        child,
                        remote: false,
                    },
                    true,
                ),
                Clear { name } => (Request::ResClear { name, remote: false }, true),
                Probe { name } => (Request::ResProbe { name }, true),
                Flush { name } => (Request::ResFlush { name }, true),
                Dep { names } => (Request::ResDep { names }, false),
                List { cluster } => (Request::ResList { cluster }, false),
                Value {
                    name,
                    attr,
                    cluster,
                } => (Request::ResValue { name, attr, cluster }, false),
                Modify {
                    name,
                    attr,
                    values,
                    append,
                    remove,
                } => (
                    Request::ResModify {
                        name,
                        attr,
                        op: modify_op(values, append, remove)?,
                        remote: false,
                    },
                    true,
                ),
                Attr { name } => (Request::ResAttr { name }, false),
                Wait {
                    name,
                    state,
                    timeout,
                } => (
                    Request::ResWait {
                        name,
                        state,
                        timeout_secs: timeout,
                    },
                    false,
                ),
            }
        }
        Grp { command } => {
            use GrpCommand::*;
            match command {
                Add { name } => (Request::GrpAdd { name, remote: false }, true),
                Delete { name } => (Request::GrpDelete { name, remote: false }, true),
                Online { name, node } => (Request::GrpOnline { name, node }, true),
                Offline { name, node } => (Request::GrpOffline { name, node }, true),
                State { names, cluster } => (Request::GrpState { names, cluster }, false),
                Enable { name } => (Request::GrpEnable { name, remote: false }, true),
                Disable { name } => (Request::GrpDisable { name, remote: false }, true),
                EnableResources { name } => (
                    Request::GrpEnableResources {
                        name,
                        remote: false,
                    },
                    true,
                ),
                DisableResources { name } => (
                    Request::GrpDisableResources {
                        name,
                        remote: false,
                    },
                    true,
                ),
                Flush { name, node } => (Request::GrpFlush { name, node }, true),
                Clear { name, node } => (Request::GrpClear { name, node }, true),
                Resources { name } => (Request::GrpResources { name }, false),
                List { cluster } => (Request::GrpList { cluster }, false),
                Value {
                    name,
                    attr,
                    cluster,
                } => (Request::GrpValue { name, attr, cluster }, false),
                Modify {
                    name,
                    attr,
                    values,
                    append,
                    remove,
                } => (
                    Request::GrpModify {
                        name,
                        attr,
                        op: modify_op(values, append, remove)?,
                        remote: false,
                    },
                    true,
                ),
                Attr { name } => (Request::GrpAttr { name }, false),
                Wait {
                    name,
                    state,
                    timeout,
                } => (
                    Request::GrpWait {
                        name,
                        state,
                        timeout_secs: timeout,
                    },
                    false,
                ),
            }
        }
        Node { command } => {
            use NodeCommand::*;
            match command {
                Add { host } => (Request::NodeAdd { host }, true),
                Delete { host } => (Request::NodeDelete { host }, true),
                List => (Request::NodeList, false),
                Attr => (Request::NodeAttr, false),
                Value { attr } => (Request::NodeValue { attr }, false),
                Modify {
                    attr,
                    values,
                    append,
                    remove,
                } => (
                    Request::NodeModify {
                        attr,
                        op: modify_op(values, append, remove)?,
                        remote: false,
                    },
                    true,
                ),
                Load => (Request::NodeLoad, false),
            }
        }
        Alert { command } => {
            use AlertCommand::*;
            match command {
                Level => (Request::AlertLevel, false),
                SetLevel { level } => (
                    Request::AlertSetLevel {
                        level,
                        remote: false,
                    },
                    true,
                ),
                AddRecipient { address } => (
                    Request::AlertAddRecipient {
                        address,
                        remote: false,
                    },
                    true,
                ),
                RemoveRecipient { address } => (
                    Request::AlertRemoveRecipient {
                        address,
                        remote: false,
                    },
                    true,
                ),
                Test { resource } => {
                    let epoch_ms = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0);
                    (
                        Request::AlertAdd {
                            alert: ics_core::alert::Alert {
                                cluster_name: String::new(),
                                node_name: String::new(),
                                group_name: String::new(),
                                resource_name: resource,
                                level: ics_core::alert::AlertLevel::Warning,
                                message: "Test alert".to_string(),
                                epoch_ms,
                            },
                        },
                        false,
                    )
                }
            }
        }
        Server { command } => {
            use ServerCommand::*;
            match command {
                Ping => (Request::Ping, false),
                Dump => (Request::Dump, false),
                Load { file } => {
                    let raw = std::fs::read_to_string(&file)
                        .map_err(|e| format!("unable to read {}: {}", file.display(), e))?;
                    let data = serde_json::from_str(&raw)
                        .map_err(|e| format!("invalid config {}: {}", file.display(), e))?;
                    (Request::LoadConfig { data, remote: false }, true)
                }
                LogLevel { level } => (Request::SetLogLevel { level }, true),
            }
        }
    };
    Ok(request)
}

fn print_response(response: Response) -> Result<(), String> {
    match response {
        Response::Error { message } => return Err(message),
        Response::Ok => {}
        Response::Pong => println!("pong"),
        Response::Value { value } => println!("{}", value),
        Response::Values { rows } => {
            for row in rows {
                println!("{:<16} {}", row.node, row.value);
            }
        }
        Response::Attrs { attrs } => {
            for (name, value) in attrs {
                println!("{:<24} {}", name, value);
            }
        }
        Response::Names { names } => {
            for name in names {
                println!("{}", name);
            }
        }
        Response::NameRows { rows } => {
            for row in rows {
                println!("{:<16} {}", row.node, row.names.join(" "));
            }
        }
        Response::States { rows } => {
            for row in rows {
                match row.node {
                    Some(node) => {
                        println!("{:<16} {:<16} {}", node, row.name, row.state.to_uppercase())
                    }
                    None => println!("{:<16} {}", row.name, row.state.to_uppercase()),
                }
            }
        }
        Response::Deps { rows } => {
            for row in rows {
                println!("{:<16} {:<16} {}", row.group, row.parent, row.child);
            }
        }
        Response::Dump { data } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&data).unwrap_or_default()
            );
        }
        Response::Load { load } => println!("{}", load),
        Response::Level { level } => println!("{}", level),
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let audit_line = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let (request, mutating) = to_request(cli.command)?;

    let mut client = Client::connect().await.map_err(|e| e.to_string())?;
    if mutating {
        client.log_command(format!("ics {}", audit_line)).await;
    }
    let response = client.call(&request).await.map_err(|e| e.to_string())?;
    print_response(response)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(message) = run(cli).await {
        eprintln!("ERROR: {}", message);
        std::process::exit(1);
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
