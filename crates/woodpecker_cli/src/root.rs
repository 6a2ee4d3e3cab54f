//! Woodpecker root bootstrap
//!
//! Creates the self-signed test CA that `woodpecker` issues from.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use woodpecker_cli::{exit, init_logging};
use woodpecker_issue::{RootAuthority, create_root};

#[derive(Parser)]
#[command(name = "woodpecker-root")]
#[command(about = "Create a test root CA for woodpecker", long_about = None)]
struct Args {
    /// Where to write the CA certificate (PEM)
    #[arg(long)]
    cert_file: PathBuf,
    /// Where to write the CA private key (PKCS#8 PEM)
    #[arg(long)]
    key_file: PathBuf,
}

fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("installing error reporter: {e}");
    }
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { exit::CONFIG } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    init_logging();

    match bootstrap(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(exit::CONFIG)
        }
    }
}

fn bootstrap(args: &Args) -> Result<()> {
    let root = create_root(&args.cert_file, &args.key_file).wrap_err("creating root CA")?;
    let subject = describe_subject(&root);
    info!(
        cert = %args.cert_file.display(),
        key = %args.key_file.display(),
        %subject,
        "wrote root CA"
    );
    Ok(())
}

/// `CN=.., O=.., C=..` in certificate order
fn describe_subject(root: &RootAuthority) -> String {
    let mut fields = Vec::new();
    for entry in root.certificate().subject_name().entries() {
        if let Ok(value) = entry.data().as_utf8() {
            let key = entry.object().nid().short_name().unwrap_or("?");
            fields.push(format!("{key}={}", &*value));
        }
    }
    fields.join(", ")
}
