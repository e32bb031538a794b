//! Server profile commands

use colored::Colorize;

use crate::error::{PlakError, Result};
use crate::ssh;
use crate::store::{ServerEntry, DEFAULT_PORT};

use super::{
    empty_notice, heading, print_json, print_numbered_table, print_table, prompt, prompt_choice,
    prompt_required, select, success, Context,
};

/// Add a new server profile
pub fn create(ctx: &Context) -> Result<()> {
    heading("Add SSH connection");

    let entry = prompt_server_details()?;
    let name = entry.name.clone();
    ctx.servers().create(entry)?;

    println!();
    success(&format!("SSH connection '{}' added!", name));
    Ok(())
}

/// Show all configured servers
pub fn view(ctx: &Context, json: bool) -> Result<()> {
    let servers = ctx.servers().list()?;
    if json {
        return print_json(&servers);
    }

    heading("SSH connections");
    if servers.is_empty() {
        empty_notice("No SSH connections found in config.");
        println!("Run {} to add one.", "plak server create".cyan());
        return Ok(());
    }

    let rows: Vec<Vec<String>> = servers
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                s.hostname.clone(),
                s.user.clone().unwrap_or_default(),
                s.port.to_string(),
                s.identity_file.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["NAME", "HOSTNAME", "USER", "PORT", "IDENTITY FILE"], &rows);
    println!();
    Ok(())
}

/// Remove a server profile
pub fn delete(ctx: &Context, name: Option<String>) -> Result<()> {
    heading("Delete SSH connection");

    let store = ctx.servers();
    let Some(server) = pick(ctx, name, "connection to delete")? else {
        return Ok(());
    };

    if !ctx.confirm(&format!("Are you sure you want to delete '{}'?", server.name)) {
        return Err(PlakError::Cancelled);
    }
    store.delete(&server.name)?;

    success(&format!("SSH connection '{}' deleted.", server.name));
    Ok(())
}

/// Open an interactive ssh session to a configured server
pub fn connect(ctx: &Context, name: Option<String>) -> Result<()> {
    let Some(server) = pick(ctx, name, "connection to connect")? else {
        return Ok(());
    };

    println!(
        "{} {}",
        "Connecting to:".cyan(),
        server.connection_string().bold()
    );
    println!();

    ssh::connect(&ctx.runner, &server)
}

/// Use the named server, or list them all and ask
fn pick(ctx: &Context, name: Option<String>, what: &str) -> Result<Option<ServerEntry>> {
    let store = ctx.servers();
    if let Some(name) = name {
        return store.get(&name).map(Some);
    }

    let servers = store.list()?;
    match servers.len() {
        0 => {
            empty_notice("No SSH connections found in config.");
            Ok(None)
        }
        _ => {
            let rows = servers
                .iter()
                .map(|s| {
                    vec![
                        s.name.clone(),
                        s.hostname.clone(),
                        s.user.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            print_numbered_table(&["NAME", "HOSTNAME", "USER"], rows);
            println!();
            Ok(select(&servers, what)?.cloned())
        }
    }
}

fn prompt_server_details() -> Result<ServerEntry> {
    let name = prompt_required("Connection name")?;
    let hostname = prompt_required("Hostname/IP")?;
    let user = prompt_required("Username")?;

    let port = prompt("Port", Some(&DEFAULT_PORT.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| PlakError::InvalidEntry(format!("'{port}' is not a valid port number")))?;

    let mut entry = ServerEntry::new(name, hostname).with_user(user).with_port(port);

    if prompt_choice("Use identity file?", &["y", "n"], "n")? == "y" {
        let identity = prompt("Path to identity file", Some("~/.ssh/id_ed25519"))?;
        entry = entry.with_identity_file(identity);
    }

    Ok(entry)
}
