use super::load_document;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Document JSON files to validate
    #[arg(required = true)]
    pub documents: Vec<PathBuf>,

    /// Print each document's tree signature
    #[arg(short, long)]
    pub signature: bool,
}

pub fn check(args: CheckArgs, config: &Config) -> Result<()> {
    let mut error_count = 0;

    for path in &args.documents {
        match load_document(path, config.schema()) {
            Ok(doc) => {
                eprintln!(
                    "  {} {} ({} items)",
                    "✓".green(),
                    path.display(),
                    doc.len()
                );
                if args.signature {
                    println!("{}", doc.tree().signature());
                }
            }
            Err(e) => {
                error_count += 1;
                eprintln!("  {} {} - {:#}", "✗".red(), path.display(), e);
            }
        }
    }

    if error_count > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} documents failed validation",
            error_count,
            args.documents.len()
        ));
    }

    Ok(())
}
