//! Registry Inspection CLI
//!
//! Loads type archives into a registry and answers questions about it:
//! gallery listings, archive verification, patch application and peer
//! reconciliation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use metarepo_core::{
    CoreConfig, PatchEngine, TypeArchive, TypeDefGallery, TypeDefPatch, TypeRegistry,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "registry-inspect")]
#[command(about = "Inspect a type registry built from archives")]
struct Cli {
    /// Path to a config file (defaults to metarepo.toml lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registry's type gallery
    Gallery {
        /// Include peer-accepted types, not just active ones
        #[arg(long)]
        known: bool,
    },

    /// Verify the fingerprints of an archive file
    Verify {
        /// Archive file to verify
        archive: PathBuf,
    },

    /// Apply a patch file to its target type and print the result
    ApplyPatch {
        /// JSON file holding a TypeDefPatch
        patch: PathBuf,
        /// Publish the result back into the registry listing
        #[arg(long)]
        publish: bool,
    },

    /// Compare a peer's gallery file against the local registry
    Reconcile {
        /// JSON file holding the peer's TypeDefGallery
        peer: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = CoreConfig::load_from(cli.config.as_deref().and_then(|p| p.to_str()))?;
    let source_name = config.repository.name.clone();

    let registry = Arc::new(TypeRegistry::from_config(&config.repository));
    for path in metarepo_core::archive::discover_archives(&config.archives.search_paths) {
        let archive = TypeArchive::from_file(&path)?;
        let added = registry.load_archive(&source_name, &archive)?;
        println!("📦 {} - {} type(s) loaded", archive.archive_name, added);
    }

    match cli.command {
        Commands::Gallery { known } => {
            let gallery = if known {
                registry.known_type_def_gallery()
            } else {
                registry.active_type_def_gallery()
            };

            let mut type_defs = gallery.type_defs;
            type_defs.sort_by(|a, b| a.name.cmp(&b.name));
            println!(
                "{} type definition(s), {} attribute type(s)",
                type_defs.len(),
                gallery.attribute_type_defs.len()
            );
            for type_def in &type_defs {
                println!(
                    "  {} v{} ({}) [{}]",
                    type_def.name,
                    type_def.version,
                    type_def.category().type_name(),
                    type_def.guid
                );
            }
            Ok(())
        }

        Commands::Verify { archive } => {
            let archive = TypeArchive::from_file(&archive)?;
            match archive.verify(&source_name) {
                Ok(()) => {
                    println!(
                        "✅ {} - all {} fingerprint(s) valid",
                        archive.archive_name,
                        archive.type_defs.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    println!("❌ {} - {}", archive.archive_name, e);
                    std::process::exit(1);
                }
            }
        }

        Commands::ApplyPatch { patch, publish } => {
            let content = std::fs::read_to_string(&patch)?;
            let patch: TypeDefPatch = serde_json::from_str(&content)?;

            let original = registry.get_type_def(&source_name, &patch.type_def_guid)?;
            let engine = PatchEngine::new(Arc::clone(&registry));
            let updated = engine.apply_patch(&source_name, &original, &patch)?;

            println!(
                "✅ {} v{} -> v{}",
                updated.name, original.version, updated.version
            );
            println!("{}", serde_json::to_string_pretty(&updated)?);

            if publish {
                registry.publish_type_def_update(&source_name, updated)?;
                println!("✅ published to the registry");
            }
            Ok(())
        }

        Commands::Reconcile { peer } => {
            let content = std::fs::read_to_string(&peer)?;
            let peer_gallery: TypeDefGallery = serde_json::from_str(&content)?;

            let conflicts = registry.validate_against_local_type_defs(&source_name, &peer_gallery);
            if conflicts.is_empty() {
                println!(
                    "✅ no conflicts across {} peer type(s)",
                    peer_gallery.type_defs.len()
                );
            } else {
                println!("❌ {} conflict(s) detected:", conflicts.len());
                for conflict in &conflicts {
                    println!("  └─ {}", serde_json::to_string(conflict)?);
                }
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
