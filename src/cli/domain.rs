//! Hosts-file domain commands

use colored::Colorize;

use crate::error::{PlakError, Result};
use crate::store::DomainEntry;

use super::{
    empty_notice, heading, print_json, print_numbered_table, print_table, prompt, prompt_required,
    select, success, Context,
};

const DEFAULT_IP: &str = "127.0.0.1";

/// Map a domain to an IP address
pub fn create(ctx: &Context, hostname: Option<String>, ip: Option<String>) -> Result<()> {
    heading("Add domain to hosts");

    let hostname = match hostname {
        Some(hostname) => hostname,
        None => prompt_required("Domain name")?,
    };
    let ip = match ip {
        Some(ip) => ip,
        None => prompt("IP address", Some(DEFAULT_IP))?,
    };

    let store = ctx.domains();
    println!("Adding {} with IP {} to {}...", hostname.cyan(), ip.cyan(), store.path().display());
    if ctx.elevate {
        println!("{}", "Writing the hosts file may require sudo privileges.".yellow());
    }
    store.create(&ip, &hostname)?;

    success(&format!("Domain '{}' added!", hostname));
    Ok(())
}

/// Show the mappings of the hosts file
pub fn view(ctx: &Context, json: bool) -> Result<()> {
    let entries = ctx.domains().list()?;
    if json {
        return print_json(&entries);
    }

    heading("Domains in hosts file");
    if entries.is_empty() {
        empty_notice("No domain entries found in hosts file.");
        return Ok(());
    }

    print_table(&["IP", "DOMAIN"], &rows(&entries));
    println!();
    Ok(())
}

/// Remove a mapping; with only a hostname, the first mapping for it
pub fn delete(ctx: &Context, hostname: Option<String>, ip: Option<String>) -> Result<()> {
    heading("Delete domain from hosts");

    let store = ctx.domains();
    let entries = store.list()?;

    let target = match hostname {
        Some(hostname) => Some(
            entries
                .into_iter()
                .find(|e| e.hostname == hostname && ip.as_ref().map_or(true, |ip| *ip == e.ip))
                .ok_or_else(|| PlakError::NotFound {
                    what: "domain",
                    key: hostname,
                })?,
        ),
        None if entries.is_empty() => {
            empty_notice("No domain entries found in hosts file.");
            None
        }
        None => {
            print_numbered_table(&["IP", "DOMAIN"], rows(&entries));
            println!();
            select(&entries, "domain to delete")?.cloned()
        }
    };
    let Some(target) = target else {
        return Ok(());
    };

    if !ctx.confirm(&format!("Are you sure you want to delete '{}' ({})?", target.hostname, target.ip)) {
        return Err(PlakError::Cancelled);
    }
    store.delete(&target.ip, &target.hostname)?;

    success(&format!("Domain '{}' deleted.", target.hostname));
    Ok(())
}

fn rows(entries: &[DomainEntry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|e| vec![e.ip.clone(), e.hostname.clone()])
        .collect()
}
