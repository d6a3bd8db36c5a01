mod apply;
mod archive;
mod create;
mod error;
mod index;
mod matcher;
mod patch_format;
mod planner;
mod util;
mod verify;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jardiff", about = "ZIP/JAR delta creator and applier")]
struct Cli {
    /// Log every classification decision
    #[arg(long, short, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a patch that turns the old archive into the new one
    Create {
        /// Path to the old (original) archive
        #[arg(long)]
        old: PathBuf,
        /// Path to the new (updated) archive
        #[arg(long)]
        new: PathBuf,
        /// Output path for the patch file
        #[arg(long, short, default_value = "out.jardiff")]
        output: PathBuf,
        /// Never emit two moves from the same source; re-send the entry instead
        /// (for consumers that cannot apply such patches)
        #[arg(long, short = 'n')]
        non_minimal: bool,
    },
    /// Apply a patch to the old archive, writing the reconstructed new archive
    Apply {
        /// Path to the old (original) archive
        #[arg(long)]
        old: PathBuf,
        /// Path to the patch file
        #[arg(long, short)]
        patch: PathBuf,
        /// Output path for the reconstructed archive
        #[arg(long, short)]
        output: PathBuf,
        /// Print completion percentage while applying
        #[arg(long)]
        progress: bool,
    },
    /// Print the commands and payload entries of a patch
    Show {
        /// Path to the patch file
        #[arg(long, short)]
        patch: PathBuf,
    },
    /// Check that two archives hold the same entries with the same content
    Verify {
        first: PathBuf,
        second: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let default_directive = if debug { "jardiff=debug" } else { "jardiff=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::Create {
            old,
            new,
            output,
            non_minimal,
        } => {
            println!("Creating patch...");
            println!("  Old: {}", old.display());
            println!("  New: {}", new.display());
            println!("  Output: {}", output.display());

            let options = create::CreateOptions {
                minimal: !non_minimal,
            };
            let start = Instant::now();
            let summary = create::create_patch(&old, &new, &output, options).await?;
            let elapsed = start.elapsed();

            println!("\nPatch created successfully!");
            println!("  Entries added or modified: {}", summary.entries_added);
            println!("  Entries moved: {}", summary.entries_moved);
            println!("  Entries removed: {}", summary.entries_removed);
            println!("  Entries unchanged: {}", summary.entries_unchanged);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Apply {
            old,
            patch,
            output,
            progress,
        } => {
            println!("Applying patch...");
            println!("  Old: {}", old.display());
            println!("  Patch: {}", patch.display());
            println!("  Output: {}", output.display());

            let callback: Option<apply::ProgressFn> = progress.then(|| {
                Box::new(|percent: u8| {
                    eprint!("\r  Progress: {percent:3}%");
                    if percent == 100 {
                        eprintln!();
                    }
                    let _ = std::io::stderr().flush();
                }) as apply::ProgressFn
            });

            let start = Instant::now();
            let summary = apply::apply_patch(&old, &patch, &output, callback).await?;
            let elapsed = start.elapsed();

            println!("\nPatch applied successfully!");
            println!("  Entries added or modified: {}", summary.entries_added);
            println!("  Entries moved: {}", summary.entries_moved);
            println!("  Entries removed: {}", summary.entries_removed);
            println!("  Entries unchanged: {}", summary.entries_unchanged);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Show { patch } => {
            let decoded = tokio::task::spawn_blocking(move || {
                let mut reader = archive::ArchiveReader::open(&patch)?;
                patch_format::decode_patch(&mut reader)
            })
            .await??;

            if decoded.index.is_empty() && decoded.payloads.is_empty() {
                eprintln!("Patch carries no changes.");
            }
            println!("{}", patch_format::VERSION_HEADER);
            for name in decoded.index.removes() {
                println!(
                    "{} {}",
                    patch_format::REMOVE_COMMAND,
                    patch_format::escape_path(name)
                );
            }
            for command in decoded.index.moves() {
                println!("{command}");
            }
            for entry in &decoded.payloads {
                println!(
                    "payload {} ({} bytes, {} compressed, {:?})",
                    entry.name, entry.size, entry.compressed_size, entry.method
                );
            }
        }
        Commands::Verify { first, second } => {
            let (first, second, comparison) = tokio::task::spawn_blocking(move || {
                let comparison = verify::compare_archives(&first, &second)?;
                Ok::<_, error::Error>((first, second, comparison))
            })
            .await??;

            for name in &comparison.only_in_first {
                println!("only in {}: {}", first.display(), name);
            }
            for name in &comparison.only_in_second {
                println!("only in {}: {}", second.display(), name);
            }
            for name in &comparison.differing {
                println!("differs: {name}");
            }
            if !comparison.is_identical() {
                anyhow::bail!("archives differ");
            }
            println!("Archives are identical.");
        }
    }

    Ok(())
}
