//! The impls and functions
//!
use anyhow::{bail, Result};
use colored::*;
use log::*;
use crate::transport::Connection;
use crate::wire::Command;

/// Send one admin command and return the reply, or `None` when the server closed without replying.
pub async fn send_admin_command(
    address: &str,
    command: Command,
) -> Result<Option<Command>>
{
    if !matches!(command, Command::Refresh | Command::Shutdown | Command::Status) {
        bail!("{} is not an admin command", command);
    }
    let mut connection = Connection::connect(address).await;
    if !connection.is_connected() {
        bail!("Could not connect to server at {}", address);
    }
    connection.send_command(command).await;
    let reply = connection.recv_command().await;
    connection.close().await;
    debug!("{} to {}: reply {:?}", command, address, reply);
    Ok(reply)
}

pub fn print_reply(
    command: Command,
    reply: Option<Command>,
)
{
    println!("Sent: {}", command);
    match reply {
        Some(Command::Ok) => println!("Received: {}", Command::Ok.name().green()),
        Some(Command::Error) => println!("Received: {}", Command::Error.name().red()),
        Some(other) => println!("Received: {}", other.name().yellow()),
        None => println!("Received: {}", "<UNKNOWN>".red()),
    }
}

/// Resolve the name, send it and print the exchange.
pub async fn admin_command(
    name: &str,
    address: &str,
) -> Result<()>
{
    let Some(command) = Command::from_admin_name(name) else {
        bail!("Unknown command: {}, use one of REFRESH, SHUTDOWN, STATUS", name);
    };
    let reply = send_admin_command(address, command).await?;
    print_reply(command, reply);
    Ok(())
}
