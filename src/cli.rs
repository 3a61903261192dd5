//! Command line arguments for the `pglocks` binary.

use clap::{Args, Parser, Subcommand};
use pglocks::{LockError, LockIdentifier, LockOptions};

/// Inspect, hold, and run commands under PostgreSQL advisory locks.
///
/// Connection settings come from DATABASE_URL (a `.env` file is honored).
#[derive(Parser, Debug)]
#[command(name = "pglocks")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report whether any session holds the lock. Exits 0 when locked, 1 when not.
    Probe(ProbeArgs),

    /// Take the lock and keep it until interrupted or the timer runs out.
    Hold(HoldArgs),

    /// Run a command while holding the lock and exit with its status.
    Run(RunArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct IdentifierArgs {
    /// 64-bit integer key.
    #[arg(long, allow_negative_numbers = true)]
    pub key: Option<i64>,

    /// Composite key of two 32-bit integers.
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"], allow_negative_numbers = true)]
    pub pair: Option<Vec<i64>>,

    /// Resource name, hashed to a key with CRC-32.
    #[arg(long)]
    pub name: Option<String>,
}

impl IdentifierArgs {
    pub fn identifier(&self) -> Result<LockIdentifier, LockError> {
        match (&self.key, &self.pair, &self.name) {
            (Some(key), _, _) => Ok(LockIdentifier::Int(*key)),
            (_, Some(pair), _) => LockIdentifier::try_from(pair.as_slice()),
            (_, _, Some(name)) => Ok(LockIdentifier::Text(name.clone())),
            _ => Err(LockError::invalid("one of --key, --pair or --name is required")),
        }
    }
}

#[derive(Args, Debug)]
pub struct ModeArgs {
    /// Take a shared lock instead of an exclusive one.
    #[arg(long)]
    pub shared: bool,

    /// Fail immediately instead of waiting when the lock is taken.
    #[arg(long)]
    pub no_wait: bool,

    /// Annotate lock statements with a debug comment.
    #[arg(long)]
    pub comment: bool,
}

impl ModeArgs {
    pub fn options(&self) -> LockOptions {
        let options = LockOptions::new().shared(self.shared).wait(!self.no_wait);
        if self.comment {
            options.comment(true)
        } else {
            options
        }
    }
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub id: IdentifierArgs,
}

#[derive(Args, Debug)]
pub struct HoldArgs {
    #[command(flatten)]
    pub id: IdentifierArgs,

    #[command(flatten)]
    pub mode: ModeArgs,

    /// Release after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    pub seconds: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub id: IdentifierArgs,

    #[command(flatten)]
    pub mode: ModeArgs,

    /// Command and arguments to run.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_pair() {
        let cli = Cli::try_parse_from([
            "pglocks", "run", "--pair", "-1", "2", "--no-wait", "--", "echo", "hi",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.id.identifier().unwrap(), LockIdentifier::Pair(-1, 2));
        assert!(!args.mode.options().mode.wait);
        assert_eq!(args.command, vec!["echo", "hi"]);
    }

    #[test]
    fn test_identifier_flags_are_exclusive() {
        assert!(Cli::try_parse_from(["pglocks", "probe", "--key", "1", "--name", "x"]).is_err());
        assert!(Cli::try_parse_from(["pglocks", "probe"]).is_err());
    }

    #[test]
    fn test_pair_out_of_range_is_invalid() {
        let cli =
            Cli::try_parse_from(["pglocks", "probe", "--pair", "1", "99999999999"]).unwrap();
        let Command::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert!(matches!(
            args.id.identifier(),
            Err(LockError::InvalidIdentifier(_))
        ));
    }
}
