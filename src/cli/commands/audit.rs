use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_AUDIT_LOG: &str = "audit-log";
pub const ARG_AUDIT_USER_AGENT_LIMIT: &str = "audit-user-agent-limit";

#[derive(Debug, Clone)]
pub struct Options {
    pub log_path: Option<PathBuf>,
    pub user_agent_limit: Option<usize>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            log_path: matches
                .get_one::<String>(ARG_AUDIT_LOG)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            user_agent_limit: matches.get_one::<usize>(ARG_AUDIT_USER_AGENT_LIMIT).copied(),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUDIT_LOG)
                .long(ARG_AUDIT_LOG)
                .help("Append audit records as JSON lines to this file")
                .long_help(
                    "Append audit records as JSON lines to this file.\n\nRecords are always emitted on the `audit` tracing target; this adds a file sink.",
                )
                .env("PORTIER_AUDIT_LOG"),
        )
        .arg(
            Arg::new(ARG_AUDIT_USER_AGENT_LIMIT)
                .long(ARG_AUDIT_USER_AGENT_LIMIT)
                .help("Truncate audited user agents beyond this many characters")
                .env("PORTIER_AUDIT_USER_AGENT_LIMIT")
                .default_value("120")
                .value_parser(clap::value_parser!(usize)),
        )
}
