use clap::{Arg, ArgMatches, Command};

pub const ARG_TOKEN_KEY: &str = "token-key";

#[derive(Debug, Clone)]
pub struct Options {
    pub token_key_path: String,
}

impl Options {
    /// Parse signing key arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let token_key_path = matches
            .get_one::<String>(ARG_TOKEN_KEY)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_TOKEN_KEY}"))?;

        Ok(Self { token_key_path })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_TOKEN_KEY)
            .long(ARG_TOKEN_KEY)
            .help("Path to the RSA private key (PEM or DER) used to sign access tokens")
            .env("GATEHOUSE_TOKEN_KEY")
            .required(true),
    )
}
