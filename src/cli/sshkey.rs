//! SSH key commands

use colored::Colorize;
use zeroize::Zeroizing;

use crate::error::{PlakError, Result};
use crate::ssh::{KeyGenRequest, KeyType, DEFAULT_RSA_BITS};
use crate::store::KeyPair;

use super::{
    confirm, empty_notice, heading, print_json, print_numbered_table, prompt, prompt_choice,
    prompt_optional, select, success, Context,
};

/// Generate a key pair with ssh-keygen
pub fn create(ctx: &Context) -> Result<()> {
    heading("Create SSH key");

    let store = ctx.keys();
    let name = prompt("Key name", Some("id_ed25519"))?;

    let overwrite = store.get(&name).is_ok();
    if overwrite && !confirm(&format!("Key '{}' already exists. Overwrite?", name)) {
        return Err(PlakError::Cancelled);
    }

    let choices: Vec<&str> = KeyType::ALL.iter().map(|t| t.as_str()).collect();
    let key_type: KeyType = prompt_choice("Key type", &choices, KeyType::default().as_str())?.parse()?;

    let mut request = KeyGenRequest::new(name, key_type);
    if key_type == KeyType::Rsa {
        let bits = prompt_choice("Key bits", &["2048", "3072", "4096"], &DEFAULT_RSA_BITS.to_string())?;
        request = request.with_bits(bits.parse().unwrap_or(DEFAULT_RSA_BITS));
    }
    if let Some(comment) = prompt_optional("Comment")? {
        request = request.with_comment(comment);
    }

    let passphrase = Zeroizing::new(rpassword::prompt_password(
        "Passphrase (empty for no passphrase): ",
    )?);
    if !passphrase.is_empty() {
        let again = Zeroizing::new(rpassword::prompt_password("Repeat passphrase: ")?);
        if *again != *passphrase {
            return Err(PlakError::InvalidEntry("passphrases do not match".into()));
        }
    }
    request = request.with_passphrase(passphrase);

    let key = store.generate(&ctx.runner, &request, overwrite)?;
    success(&format!("SSH key '{}' created!", key.name));

    if let Some(public) = store.public_key(&key.name)? {
        println!();
        println!("{}", "Your public key:".cyan().bold());
        println!("{}", public);
    }
    Ok(())
}

/// List keys, or show the details of one
pub fn view(ctx: &Context, name: Option<String>, json: bool) -> Result<()> {
    let store = ctx.keys();

    if let Some(name) = name {
        let key = store.get(&name)?;
        return show_details(ctx, &key, json);
    }

    let keys = store.list()?;
    if json {
        return print_json(&keys);
    }

    heading("SSH keys");
    if keys.is_empty() {
        empty_notice(&format!("No SSH keys found in {}.", store.dir().display()));
        return Ok(());
    }

    print_numbered_table(&["NAME", "HAS PUBLIC KEY"], rows(&keys));
    println!();

    match select(&keys, "key to view details")? {
        Some(key) => show_details(ctx, key, false),
        None => Ok(()),
    }
}

/// Delete a private key and its public key
pub fn delete(ctx: &Context, name: Option<String>) -> Result<()> {
    heading("Delete SSH key");

    let store = ctx.keys();
    let key = match name {
        Some(name) => store.get(&name)?,
        None => {
            let keys = store.list()?;
            if keys.is_empty() {
                empty_notice(&format!("No SSH keys found in {}.", store.dir().display()));
                return Ok(());
            }
            print_numbered_table(&["NAME", "HAS PUBLIC KEY"], rows(&keys));
            println!();
            match select(&keys, "key to delete")? {
                Some(key) => key.clone(),
                None => return Ok(()),
            }
        }
    };

    let prompt = format!(
        "Are you sure you want to delete '{}'? This cannot be undone.",
        key.name
    );
    if !ctx.confirm(&prompt) {
        return Err(PlakError::Cancelled);
    }
    store.delete(&key.name)?;

    success(&format!("SSH key '{}' deleted.", key.name));
    Ok(())
}

fn show_details(ctx: &Context, key: &KeyPair, json: bool) -> Result<()> {
    let store = ctx.keys();
    let details = store.inspect(&key.name, &ctx.runner)?;
    if json {
        return print_json(&details);
    }

    println!();
    println!("{} {}", "Details for key:".cyan().bold(), key.name.bold());
    println!("Type: {}", details.key_type);
    println!(
        "Bits: {}",
        details.bit_length.map_or_else(|| "?".to_string(), |b| b.to_string())
    );
    println!("Fingerprint: {}", details.fingerprint);
    println!("Comment: {}", details.comment);

    match store.public_key(&key.name)? {
        Some(public) => {
            println!();
            println!("{}", "Public key:".cyan().bold());
            println!("{}", public);
        }
        None => empty_notice("No public key found for this private key."),
    }
    Ok(())
}

fn rows(keys: &[KeyPair]) -> Vec<Vec<String>> {
    keys.iter()
        .map(|k| {
            vec![
                k.name.clone(),
                if k.has_public_key { "Yes" } else { "No" }.to_string(),
            ]
        })
        .collect()
}
