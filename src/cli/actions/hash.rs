use crate::guard::{Argon2Comparator, HashComparator};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::io::{self, BufRead, Write};

/// Read one password line from stdin and print its Argon2id PHC string.
/// # Errors
/// Returns an error if stdin is empty or hashing fails.
pub fn execute() -> Result<()> {
    let password = read_password(io::stdin().lock())?;
    let phc = hash_password(&Argon2Comparator::new(), &password)?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{phc}")?;
    Ok(())
}

fn read_password(mut input: impl BufRead) -> Result<SecretString> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("empty password on stdin");
    }
    Ok(SecretString::from(password))
}

fn hash_password(comparator: &dyn HashComparator, password: &SecretString) -> Result<String> {
    let stored = comparator
        .hash(password.expose_secret().as_bytes())
        .context("Failed to hash password")?;
    Ok(stored.as_str().to_string())
}
