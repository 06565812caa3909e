pub mod audit;
pub mod guard;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_CREDENTIALS: &str = "credentials";
pub const CMD_HASH_PASSWORD: &str = "hash-password";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("portier")
        .about("Password verification with per-client exponential backoff")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8081")
                .env("PORTIER_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_CREDENTIALS)
                .short('c')
                .long(ARG_CREDENTIALS)
                .help("JSON file mapping usernames to Argon2 PHC hashes")
                .long_help(
                    "JSON file mapping usernames to Argon2 PHC hashes, e.g. {\"alice\": \"$argon2id$...\"}.\n\nUse the `hash-password` subcommand to produce hashes.",
                )
                .env("PORTIER_CREDENTIALS"),
        )
        .subcommand(
            Command::new(CMD_HASH_PASSWORD)
                .about("Read a password from stdin and print its Argon2id PHC hash"),
        );

    let command = guard::with_args(command);
    let command = audit::with_args(command);
    logging::with_args(command)
}
