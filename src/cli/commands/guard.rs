use crate::guard::{GuardConfig, OffloadStrategy};
use clap::{Arg, ArgMatches, Command};

pub const ARG_BACKOFF_BASE_SECONDS: &str = "backoff-base-seconds";
pub const ARG_BACKOFF_MAX_SECONDS: &str = "backoff-max-seconds";
pub const ARG_RESET_WINDOW_SECONDS: &str = "reset-window-seconds";
pub const ARG_MAX_USERNAME_LENGTH: &str = "max-username-length";
pub const ARG_MAX_PASSWORD_BYTES: &str = "max-password-bytes";
pub const ARG_OFFLOAD: &str = "offload";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub config: GuardConfig,
    pub offload: OffloadStrategy,
}

impl Options {
    /// Parse backoff, input limit, and offload arguments.
    ///
    /// # Errors
    /// Returns an error if the offload strategy is not recognised.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let defaults = GuardConfig::new();
        let seconds = |id: &str, fallback: u64| matches.get_one::<u64>(id).copied().unwrap_or(fallback);
        let length = |id: &str, fallback: usize| {
            matches.get_one::<usize>(id).copied().unwrap_or(fallback)
        };

        let config = defaults
            .with_base_backoff_seconds(seconds(
                ARG_BACKOFF_BASE_SECONDS,
                defaults.base_backoff().as_secs(),
            ))
            .with_max_backoff_seconds(seconds(
                ARG_BACKOFF_MAX_SECONDS,
                defaults.max_backoff().as_secs(),
            ))
            .with_reset_window_seconds(seconds(
                ARG_RESET_WINDOW_SECONDS,
                defaults.reset_window().as_secs(),
            ))
            .with_max_username_length(length(
                ARG_MAX_USERNAME_LENGTH,
                defaults.max_username_length(),
            ))
            .with_max_password_bytes(length(
                ARG_MAX_PASSWORD_BYTES,
                defaults.max_password_bytes(),
            ));

        let offload = match matches.get_one::<String>(ARG_OFFLOAD) {
            Some(value) => value.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            None => OffloadStrategy::default(),
        };

        Ok(Self { config, offload })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKOFF_BASE_SECONDS)
                .long(ARG_BACKOFF_BASE_SECONDS)
                .help("Block duration after the first failed login, in seconds")
                .env("PORTIER_BACKOFF_BASE_SECONDS")
                .default_value("1")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_BACKOFF_MAX_SECONDS)
                .long(ARG_BACKOFF_MAX_SECONDS)
                .help("Upper bound for the block duration, in seconds")
                .env("PORTIER_BACKOFF_MAX_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RESET_WINDOW_SECONDS)
                .long(ARG_RESET_WINDOW_SECONDS)
                .help("Forget a client's failures after this many quiet seconds")
                .env("PORTIER_RESET_WINDOW_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MAX_USERNAME_LENGTH)
                .long(ARG_MAX_USERNAME_LENGTH)
                .help("Maximum username length in characters")
                .env("PORTIER_MAX_USERNAME_LENGTH")
                .default_value("32")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_MAX_PASSWORD_BYTES)
                .long(ARG_MAX_PASSWORD_BYTES)
                .help("Maximum password length in bytes")
                .long_help(
                    "Maximum password length in bytes. Longer passwords are rejected instead of being silently truncated by the hash primitive.",
                )
                .env("PORTIER_MAX_PASSWORD_BYTES")
                .default_value("72")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_OFFLOAD)
                .long(ARG_OFFLOAD)
                .help("Where password comparison runs: always, never, on-request")
                .long_help(
                    "Where password comparison runs.\n\n`always` uses the blocking thread pool, `never` runs on the request task, `on-request` offloads only when the request carries `?offload=1`.",
                )
                .env("PORTIER_OFFLOAD")
                .default_value("always")
                .value_parser(["always", "never", "on-request", "on_request"]),
        )
}
