// src/bin/pwdecrypt.rs
//! pwdecrypt — decrypt SDR-encoded secrets, one per line

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use pwdecrypt::config::{Backend, Config};
use pwdecrypt::{
    decrypt, decrypt_interactive, tty, EngineHandle, Password, SdrError, SecurityEngine,
    SoftEngine,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "pwdecrypt", version, about = "Decrypt SDR-encoded secrets line by line")]
struct Cli {
    /// Key database directory (overrides the config file)
    #[arg(short = 'd', long)]
    dir: Option<PathBuf>,

    /// Input file with one encoded secret per line (default: stdin)
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Token password; prompts on the terminal when neither -p nor -f is given
    #[arg(short = 'p', long, conflicts_with = "password_file")]
    password: Option<String>,

    /// File whose first line is the token password
    #[arg(short = 'f', long)]
    password_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = pwdecrypt::load_config().context("Failed to load configuration")?;
    let dir = cli.dir.clone().unwrap_or_else(|| config.profile.dir.clone());

    match config.profile.backend {
        Backend::Soft => run(SoftEngine::new(), &dir, &cli, config),
        #[cfg(feature = "nss")]
        Backend::Nss => run(pwdecrypt::native::NssEngine, &dir, &cli, config),
        #[cfg(not(feature = "nss"))]
        Backend::Nss => bail!("this build has no NSS support — rebuild with `--features nss`"),
    }
}

fn run<E: SecurityEngine>(engine: E, dir: &Path, cli: &Cli, config: &Config) -> Result<()> {
    let handle = EngineHandle::initialize(engine, dir)
        .with_context(|| format!("Failed to open key database in {}", dir.display()))?;
    info!(dir = %dir.display(), "key database opened");

    let password = fixed_password(cli)?;
    let input: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut output: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    // Last password typed; answers the first request of later lines
    let mut remembered: Option<Zeroizing<String>> = None;

    let mut decrypted_count = 0;
    let mut failed_count = 0;

    for line in input.lines() {
        let line = line.context("failed to read input")?;
        let encoded = line.trim();
        if encoded.is_empty() {
            continue;
        }

        let result = match &password {
            Some(password) => decrypt(&handle, encoded.as_bytes(), password),
            None => decrypt_interactive(&handle, encoded.as_bytes(), |retry| {
                prompt_password(retry, config, &mut remembered)
            }),
        };

        match result {
            Ok(plaintext) => {
                output.write_all(plaintext.expose_secret())?;
                output.write_all(b"\n")?;
                decrypted_count += 1;
            }
            Err(err) => {
                warn!(%err, "line failed");
                writeln!(output, "{}", error_line(&err))?;
                failed_count += 1;
            }
        }
    }
    output.flush()?;

    handle.shutdown().context("Failed to shut down key database")?;

    info!(decrypted = decrypted_count, failed = failed_count, "batch complete");
    if failed_count > 0 {
        bail!("{failed_count} secret(s) could not be decrypted");
    }
    Ok(())
}

fn fixed_password(cli: &Cli) -> Result<Option<Password>> {
    if let Some(password) = &cli.password {
        return Ok(Some(Password::new(password.clone())));
    }
    if let Some(path) = &cli.password_file {
        let text = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("cannot read password file {}", path.display()))?,
        );
        let first = text.lines().next().unwrap_or_default();
        return Ok(Some(Password::new(first.to_owned())));
    }
    Ok(None)
}

fn prompt_password(
    retry: bool,
    config: &Config,
    remembered: &mut Option<Zeroizing<String>>,
) -> io::Result<Password> {
    if !retry {
        if let Some(known) = remembered.as_ref() {
            return Ok(Password::new(known.as_str().to_owned()));
        }
    }

    if !tty::is_tty(io::stderr().as_raw_fd()) {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no terminal available for the password prompt",
        ));
    }

    let prompt = if retry {
        &config.prompt.retry
    } else {
        &config.prompt.password
    };
    let entered = Zeroizing::new(rpassword::prompt_password(prompt)?);
    *remembered = Some(entered.clone());
    Ok(Password::new(entered.as_str().to_owned()))
}

fn error_line(err: &SdrError) -> String {
    let kind = match err {
        SdrError::DecodeFailed { .. } => "decode",
        SdrError::DecryptFailed { .. } => "decrypt",
        SdrError::ResolverFailed(_) => "password",
        _ => "other",
    };
    match err.code() {
        Some(code) => format!("ERROR {kind} {code}"),
        None => format!("ERROR {kind}"),
    }
}
