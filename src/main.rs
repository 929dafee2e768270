use anyhow::Result as AnyhowResult;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flexfs::error::{ExitCode, FsError};
use flexfs::paths;

/// Inspect Windows path semantics, volumes, and file metadata
#[derive(Parser, Debug)]
#[command(name = "flexfs")]
#[command(about = "Inspect Windows path semantics, volumes, and file metadata", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a path string and show its root and qualification
    Classify { path: String },
    /// Canonicalize directory separators in a path string
    Normalize { path: String },
    /// Reduce a set of paths to their minimal covering roots
    CommonRoots { paths: Vec<String> },
    /// Resolve a path against the per-volume current directory table
    FullPath {
        path: String,
        /// Fully-qualified base to resolve relative paths against
        #[arg(long)]
        base: Option<String>,
    },
    /// Show metadata for a file or directory
    Info { path: String },
    /// List logical drives and their volume information
    Volumes,
    /// Query DOS device aliases (the whole namespace when no name is given)
    DosDevices { name: Option<String> },
    /// List alternate data streams of a file
    Streams { path: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(error) = run(&args) {
        eprintln!("error: {error:#}");
        let code = error
            .downcast_ref::<FsError>()
            .map(ExitCode::from)
            .unwrap_or(ExitCode::GeneralFailure);
        std::process::exit(code as i32);
    }
}

fn run(args: &Args) -> AnyhowResult<()> {
    match &args.command {
        Command::Classify { path } => classify(path, args.json),
        Command::Normalize { path } => {
            println!("{}", paths::normalize_directory_separators(path));
            Ok(())
        }
        Command::CommonRoots { paths: inputs } => {
            for root in paths::find_common_roots(inputs) {
                println!("{root}");
            }
            Ok(())
        }
        service_command => run_service_command(service_command, args.json),
    }
}

fn classify(path: &str, json: bool) -> AnyhowResult<()> {
    let format = paths::get_path_format(path);
    let root = paths::get_root(path);
    if json {
        println!(
            "{}",
            serde_json::json!({
                "path": path,
                "format": format!("{format:?}"),
                "root": root,
                "partially_qualified": paths::is_partially_qualified(path),
                "device": paths::is_device(path),
                "extended": paths::is_extended(path),
            })
        );
    } else {
        println!("format:              {format:?}");
        match root {
            Some(root) => println!("root:                {root:?}"),
            None => println!("root:                (malformed)"),
        }
        println!(
            "partially qualified: {}",
            paths::is_partially_qualified(path)
        );
        println!("device namespace:    {}", paths::is_device(path));
        println!("extended length:     {}", paths::is_extended(path));
    }
    Ok(())
}

#[cfg(not(windows))]
fn run_service_command(_command: &Command, _json: bool) -> AnyhowResult<()> {
    anyhow::bail!("volume and file queries need a Windows host")
}

#[cfg(windows)]
fn run_service_command(command: &Command, json: bool) -> AnyhowResult<()> {
    use anyhow::Context;
    use flexfs::storage::windows::WindowsStorage;
    use flexfs::{ExtendedFileService, FileService, FlexFileService};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn epoch_seconds(time: SystemTime) -> u64 {
        time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }

    let service =
        FlexFileService::new(WindowsStorage::new()).context("initialize file service")?;
    match command {
        Command::FullPath { path, base } => {
            println!("{}", service.full_path_with_base(path, base.as_deref())?);
        }
        Command::Info { path } => {
            let info = service.path_info_by_handle(path)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "path": info.path(),
                        "name": info.name(),
                        "exists": info.exists(),
                        "directory": info.is_directory(),
                        "attributes": info.attributes().bits(),
                        "len": info.len(),
                        "volume_serial": info.volume_serial(),
                        "link_count": info.link_count(),
                        "created": epoch_seconds(info.creation_time()),
                        "accessed": epoch_seconds(info.last_access_time()),
                        "written": epoch_seconds(info.last_write_time()),
                    })
                );
            } else {
                println!("path:       {}", info.path());
                println!("name:       {}", info.name());
                println!("directory:  {}", info.is_directory());
                println!("attributes: {:?}", info.attributes());
                println!("length:     {}", info.len());
                if let Some(serial) = info.volume_serial() {
                    println!("volume:     {serial:08x}");
                }
                if let Some(links) = info.link_count() {
                    println!("links:      {links}");
                }
            }
        }
        Command::Volumes => {
            for root in service.logical_drive_strings()? {
                match service.volume_information(&root) {
                    Ok(info) => {
                        if json {
                            println!(
                                "{}",
                                serde_json::json!({ "root": root, "volume": info })
                            );
                        } else {
                            println!(
                                "{root}  {}  {}  serial {:08x}",
                                info.file_system, info.name, info.serial_number
                            );
                        }
                    }
                    // Removable drives without media still enumerate.
                    Err(error) => tracing::warn!("no volume information for {root}: {error}"),
                }
            }
        }
        Command::DosDevices { name } => {
            for device in service.query_dos_device_names(name.as_deref())? {
                println!("{device}");
            }
        }
        Command::Streams { path } => {
            for stream in service.alternate_streams(path)? {
                if json {
                    println!("{}", serde_json::json!(stream));
                } else {
                    println!("{}  {} bytes", stream.name, stream.len);
                }
            }
        }
        Command::Classify { .. } | Command::Normalize { .. } | Command::CommonRoots { .. } => {
            unreachable!("handled before service dispatch")
        }
    }
    Ok(())
}
