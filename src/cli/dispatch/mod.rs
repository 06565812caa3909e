//! Map validated CLI arguments to an [`Action`].

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{audit, guard, ARG_CREDENTIALS, ARG_PORT, CMD_HASH_PASSWORD};
use anyhow::Result;
use std::path::PathBuf;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if matches.subcommand_name() == Some(CMD_HASH_PASSWORD) {
        return Ok(Action::HashPassword);
    }

    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8081);
    let credentials = match matches.get_one::<String>(ARG_CREDENTIALS) {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => anyhow::bail!("missing required argument: --{ARG_CREDENTIALS}"),
    };

    let guard_opts = guard::Options::parse(matches)?;
    let audit_opts = audit::Options::parse(matches);

    let mut config = guard_opts.config;
    if let Some(limit) = audit_opts.user_agent_limit {
        config = config.with_user_agent_limit(limit);
    }

    Ok(Action::Server(Args {
        port,
        credentials,
        offload: guard_opts.offload,
        config: config.normalize(),
        audit_log: audit_opts.log_path,
    }))
}
