//! Versioned OpenAPI CLI
//!
//! Command-line interface for generating per-version documents from a
//! manifest and linting the results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use versioned_openapi::{
    documents_to_json, lint, load_document, load_project, to_json, write_documents, Document,
    FileStatus, Severity,
};

#[derive(Parser)]
#[command(name = "versioned-openapi")]
#[command(about = "Generate per-version OpenAPI schema documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate documents for every version declared in a manifest
    Generate {
        /// Manifest describing types, versions, changes and endpoints
        manifest: PathBuf,

        /// Base document to merge generated schemas into
        #[arg(long)]
        base: Option<PathBuf>,

        /// Only generate this version (e.g., 2024-01-01 or head)
        #[arg(long)]
        version: Option<String>,

        /// Write openapi-<version>.json files here (stdout if not specified)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Lint documents for errors (syntax, broken refs, undeclared required fields)
    Lint {
        /// File or directory to lint
        path: PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            manifest,
            base,
            version,
            out_dir,
            pretty,
        } => run_generate(&manifest, base.as_deref(), version.as_deref(), out_dir, pretty),

        Commands::Lint {
            path,
            format,
            strict,
            quiet,
        } => run_lint(&path, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_generate(
    manifest: &Path,
    base: Option<&Path>,
    version: Option<&str>,
    out_dir: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let project = load_project(manifest).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let base = match base {
        Some(path) => load_document(path).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?,
        None => Document::default(),
    };

    let mut generator = project.generator();
    let documents = match version {
        Some(requested) => {
            let Some(version) = project.bundle.find(requested) else {
                eprintln!("Error: unknown version: {}", requested);
                return Err(2);
            };
            let document = generator
                .generate_spec_for_version(&base, &version)
                .map_err(|e| {
                    eprintln!("Error: {}", e);
                    2u8
                })?;
            BTreeMap::from([(version.to_string(), document)])
        }
        None => generator.generate_versioned_specs(&base).map_err(|e| {
            eprintln!("Error: {}", e);
            2u8
        })?,
    };

    match out_dir {
        Some(dir) => {
            let written = write_documents(&documents, &dir, pretty).map_err(|e| {
                eprintln!("Error: {}", e);
                3u8
            })?;
            for path in written {
                eprintln!("wrote {}", path.display());
            }
        }
        None => {
            // Single version prints the document itself
            let output = match (version, documents.values().next()) {
                (Some(v), Some(document)) => to_json(document, v, pretty),
                _ => documents_to_json(&documents, pretty),
            }
            .map_err(|e| {
                eprintln!("Error: {}", e);
                2u8
            })?;
            println!("{}", output);
        }
    }

    Ok(())
}

fn run_lint(path: &Path, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(3);
    }

    let result = lint(path, strict);

    if format == "json" {
        let json = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", json);
    } else {
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color, label, diag.code, diag.path, diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
