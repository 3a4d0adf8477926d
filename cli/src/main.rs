//! storage - Command-line interface for the storage engine.
//!
//! Runs one batch operation against a storage rooted at a local or mounted
//! directory and prints the `{Successful, Failed}` envelope as JSON on stdout.
//! Logs and per-file progress go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use engine::{
    BatchResult, ChecksumAlgorithm, Direction, EngineError, StorageBackend, StorageConfig,
    TransferObserver, TransferOutcome,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// storage - Inspect and transfer files on a storage backend
#[derive(Parser, Debug)]
#[command(name = "storage")]
#[command(version)]
#[command(about = "Verified file and directory transfers against a storage backend")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE", conflicts_with = "root")]
    config: Option<PathBuf>,

    /// Storage root directory (instead of --config)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Override the configured host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured protocol
    #[arg(long)]
    protocol: Option<String>,

    /// Also verify transfers by checksum: crc32, md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM")]
    verify: Option<String>,

    /// Debug logging and one line per transferred file
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Whether each path exists
    Exists { #[arg(required = true)] paths: Vec<String> },
    /// Whether each path is a file
    IsFile { #[arg(required = true)] paths: Vec<String> },
    /// Whether each path is a directory
    IsDir { #[arg(required = true)] paths: Vec<String> },
    /// Size of each file
    Size { #[arg(required = true)] paths: Vec<String> },
    /// Metadata of each file
    Meta { #[arg(required = true)] paths: Vec<String> },
    /// Remove files
    Rm { #[arg(required = true)] paths: Vec<String> },
    /// Create directories
    Mkdir { #[arg(required = true)] paths: Vec<String> },
    /// List directories
    Ls { #[arg(required = true)] paths: Vec<String> },
    /// Metadata of each directory
    DirMeta { #[arg(required = true)] paths: Vec<String> },
    /// File count, size and subdirectory count of each directory
    Du {
        #[arg(long)]
        recursive: bool,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Download files
    Get {
        /// Local directory to download into
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Upload files given as DEST=SRC
    Put {
        #[arg(required = true, value_parser = parse_pair, value_name = "DEST=SRC")]
        pairs: Vec<(String, PathBuf)>,
    },
    /// Upload directory trees given as DEST=SRC
    PutDir {
        #[arg(required = true, value_parser = parse_pair, value_name = "DEST=SRC")]
        pairs: Vec<(String, PathBuf)>,
    },
    /// Download directory trees
    GetDir {
        /// Local directory to download into
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Remove directories
    Rmdir {
        #[arg(long)]
        recursive: bool,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Bring files online (tape-backed storage only)
    Prestage { #[arg(required = true)] paths: Vec<String> },
    /// Pin files (tape-backed storage only)
    Pin { #[arg(required = true)] paths: Vec<String> },
    /// Release pinned files (tape-backed storage only)
    Release { #[arg(required = true)] paths: Vec<String> },
}

fn parse_pair(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((dest, src)) if !dest.is_empty() && !src.is_empty() => {
            Ok((dest.to_string(), PathBuf::from(src)))
        }
        _ => Err(format!("expected DEST=SRC, got '{s}'")),
    }
}

/// Prints one line per file transfer to stderr
struct CliProgress;

impl CliProgress {
    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

impl TransferObserver for CliProgress {
    fn on_file_started(&self, direction: Direction, remote: &str, local: &Path) {
        eprintln!("{direction}: {remote} <-> {}", local.display());
    }

    fn on_file_completed(&self, direction: Direction, remote: &str, outcome: Result<u64, &str>) {
        match outcome {
            Ok(size) => eprintln!("{direction} done: {remote} ({})", Self::format_bytes(size)),
            Err(reason) => eprintln!("{direction} FAILED: {remote}: {reason}"),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse arguments, run the operation and exit with 0 (all items
/// succeeded), 1 (some item failed) or 2 (the call itself failed)
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut stdout = std::io::stdout().lock();
    let exit_code = match run_cli(&args, &mut stdout) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn build_config(args: &Args) -> Result<StorageConfig, String> {
    let mut config = match (&args.config, &args.root) {
        (Some(path), _) => StorageConfig::load(path).map_err(|e| e.to_string())?,
        (None, Some(root)) => StorageConfig::new(root.to_string_lossy()),
        (None, None) => return Err("either --config or --root is required".to_string()),
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(protocol) = &args.protocol {
        config.protocol = protocol.clone();
    }
    if let Some(name) = &args.verify {
        let algorithm: ChecksumAlgorithm = name.parse()?;
        config.checksum = Some(algorithm);
    }
    Ok(config)
}

/// Main CLI logic - separated for testability
///
/// # Returns
/// Whether every item of the batch succeeded
fn run_cli(args: &Args, out: &mut dyn Write) -> Result<bool, String> {
    let config = build_config(args)?;
    tracing::debug!(url = %config.url("/"), command = ?args.command, "running command");
    let backend = StorageBackend::open_fs(config);
    let backend = if args.verbose {
        backend.with_observer(CliProgress)
    } else {
        backend
    };

    let all_ok = match &args.command {
        Command::Exists { paths } => emit(out, backend.exists(paths.clone()))?,
        Command::IsFile { paths } => emit(out, backend.is_file(paths.clone()))?,
        Command::IsDir { paths } => emit(out, backend.is_directory(paths.clone()))?,
        Command::Size { paths } => emit(out, backend.get_file_size(paths.clone()))?,
        Command::Meta { paths } => emit(out, backend.get_file_metadata(paths.clone()))?,
        Command::Rm { paths } => emit(out, backend.remove_file(paths.clone()))?,
        Command::Mkdir { paths } => emit(out, backend.create_directory(paths.clone()))?,
        Command::Ls { paths } => emit(out, backend.list_directory(paths.clone()))?,
        Command::DirMeta { paths } => emit(out, backend.get_directory_metadata(paths.clone()))?,
        Command::Du { recursive, paths } => {
            emit(out, backend.get_directory_size(paths.clone(), *recursive))?
        }
        Command::Get { dest, paths } => emit(out, backend.get_file(paths.clone(), dest.as_deref()))?,
        Command::Put { pairs } => emit(out, backend.put_file(pairs.clone()))?,
        Command::PutDir { pairs } => emit_transfers(out, backend.put_directory(pairs.clone()))?,
        Command::GetDir { dest, paths } => {
            emit_transfers(out, backend.get_directory(paths.clone(), dest.as_deref()))?
        }
        Command::Rmdir { recursive, paths } => {
            emit_transfers(out, backend.remove_directory(paths.clone(), *recursive))?
        }
        Command::Prestage { paths } => emit(out, backend.prestage_file(paths.clone()))?,
        Command::Pin { paths } => emit(out, backend.pin_file(paths.clone()))?,
        Command::Release { paths } => emit(out, backend.release_file(paths.clone()))?,
    };

    backend.close().map_err(|e| e.to_string())?;
    Ok(all_ok)
}

fn emit<V: Serialize>(out: &mut dyn Write, result: Result<BatchResult<V>, EngineError>) -> Result<bool, String> {
    let result = result.map_err(|e| e.to_string())?;
    print_json(out, &result)?;
    Ok(result.all_successful())
}

/// Like `emit`, but an incomplete directory transfer also counts as a failure.
fn emit_transfers(
    out: &mut dyn Write,
    result: Result<BatchResult<TransferOutcome>, EngineError>,
) -> Result<bool, String> {
    let result = result.map_err(|e| e.to_string())?;
    print_json(out, &result)?;
    Ok(result.all_successful() && result.successful.values().all(|o| o.all_completed))
}

fn print_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<(), String> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(|e| format!("Failed to write output: {}", e))?;
    writeln!(out).map_err(|e| format!("Failed to write output: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    fn args_for(root: &Path, command: Command) -> Args {
        Args {
            config: None,
            root: Some(root.to_path_buf()),
            host: None,
            port: None,
            protocol: None,
            verify: None,
            verbose: false,
            command,
        }
    }

    fn run_json(args: &Args) -> (Result<bool, String>, serde_json::Value) {
        let mut out = Vec::new();
        let result = run_cli(args, &mut out);
        let json = if out.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&out).expect("Output should be JSON")
        };
        (result, json)
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_put_pairs() {
        let args = Args::try_parse_from(["storage", "--root", "/srv", "put", "/data/a.csv=a.csv", "/b=local/b"])
            .expect("Should parse");
        match args.command {
            Command::Put { pairs } => {
                assert_eq!(pairs[0], ("/data/a.csv".to_string(), PathBuf::from("a.csv")));
                assert_eq!(pairs.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Args::try_parse_from(["storage", "--root", "/srv", "put", "no-separator"]).is_err());
        assert!(Args::try_parse_from(["storage", "--root", "/srv", "--config", "c.toml", "exists", "/a"]).is_err());
    }

    #[test]
    fn test_cli_put_then_inspect() {
        let store = TempDir::new().expect("Failed to create temp dir");
        let local = TempDir::new().expect("Failed to create temp dir");
        let src = local.path().join("report.csv");
        std::fs::write(&src, "a,b\n1,2\n").expect("Failed to write file");

        let put = args_for(
            store.path(),
            Command::Put {
                pairs: vec![("/data/report.csv".to_string(), src)],
            },
        );
        let (result, json) = run_json(&put);
        assert_eq!(result, Ok(true));
        assert_eq!(json["Successful"]["/data/report.csv"], 8);
        assert!(json["Failed"].as_object().expect("Failed map").is_empty());

        let size = args_for(
            store.path(),
            Command::Size {
                paths: vec!["/data/report.csv".to_string(), "/data/missing".to_string()],
            },
        );
        let (result, json) = run_json(&size);
        assert_eq!(result, Ok(false), "A missing path is an item failure");
        assert_eq!(json["Successful"]["/data/report.csv"], 8);
        assert!(json["Failed"]["/data/missing"].is_string());
    }

    #[test]
    fn test_cli_directory_round_trip() {
        let store = TempDir::new().expect("Failed to create temp dir");
        let local = TempDir::new().expect("Failed to create temp dir");
        let tree = local.path().join("tree");
        std::fs::create_dir_all(tree.join("sub")).expect("Failed to create dir");
        std::fs::write(tree.join("one.txt"), "one").expect("Failed to write file");
        std::fs::write(tree.join("sub").join("two.txt"), "two!").expect("Failed to write file");

        let put = args_for(
            store.path(),
            Command::PutDir {
                pairs: vec![("/tree".to_string(), tree)],
            },
        );
        let (result, json) = run_json(&put);
        assert_eq!(result, Ok(true));
        assert_eq!(json["Successful"]["/tree"]["files"], 2);
        assert_eq!(json["Successful"]["/tree"]["size"], 7);

        let du = args_for(
            store.path(),
            Command::Du {
                recursive: true,
                paths: vec!["/tree".to_string()],
            },
        );
        let (result, json) = run_json(&du);
        assert_eq!(result, Ok(true));
        assert_eq!(json["Successful"]["/tree"]["files"], 2);
        assert_eq!(json["Successful"]["/tree"]["subdirs"], 1);

        let dest = TempDir::new().expect("Failed to create temp dir");
        let get = args_for(
            store.path(),
            Command::GetDir {
                dest: Some(dest.path().to_path_buf()),
                paths: vec!["/tree".to_string()],
            },
        );
        let (result, _) = run_json(&get);
        assert_eq!(result, Ok(true));
        assert_eq!(
            std::fs::read_to_string(dest.path().join("tree/sub/two.txt")).expect("Failed to read file"),
            "two!"
        );

        let rmdir = args_for(
            store.path(),
            Command::Rmdir {
                recursive: false,
                paths: vec!["/tree".to_string()],
            },
        );
        let (result, json) = run_json(&rmdir);
        assert_eq!(result, Ok(false), "A subdirectory keeps the parent in place");
        assert_eq!(json["Successful"]["/tree"]["all_completed"], false);
        assert!(store.path().join("tree/sub").exists());
    }

    #[test]
    fn test_cli_unsupported_operation_fails_the_call() {
        let store = TempDir::new().expect("Failed to create temp dir");
        let args = args_for(
            store.path(),
            Command::Prestage {
                paths: vec!["/a".to_string()],
            },
        );
        let (result, json) = run_json(&args);
        assert!(result.expect_err("Prestage is unsupported").contains("not supported"));
        assert!(json.is_null());
    }

    #[test]
    fn test_cli_requires_storage_location() {
        let mut args = args_for(Path::new("/unused"), Command::Exists { paths: vec!["/a".to_string()] });
        args.root = None;
        assert!(run_cli(&args, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_cli_rejects_missing_root() {
        let args = args_for(
            Path::new("/nonexistent/storage/root"),
            Command::Exists { paths: vec!["/a".to_string()] },
        );
        let result = run_cli(&args, &mut Vec::new());
        assert!(result.expect_err("Root does not exist").contains("not initialized"));
    }

    #[test]
    fn test_cli_rejects_invalid_hash_algorithm() {
        let store = TempDir::new().expect("Failed to create temp dir");
        let mut args = args_for(store.path(), Command::Exists { paths: vec!["/a".to_string()] });
        args.verify = Some("invalid_algo".to_string());
        assert!(run_cli(&args, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_cli_loads_config_file_with_overrides() {
        let store = TempDir::new().expect("Failed to create temp dir");
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = dir.path().join("storage.toml");
        std::fs::write(
            &config_path,
            format!(
                "base_path = {:?}\nhost = \"nn.example.org\"\nchecksum = \"md5\"\n",
                store.path().to_string_lossy()
            ),
        )
        .expect("Failed to write config");

        let mut args = args_for(store.path(), Command::Exists { paths: vec!["/a".to_string()] });
        args.root = None;
        args.config = Some(config_path);
        args.port = Some(8020);
        args.verify = Some("sha256".to_string());

        let config = build_config(&args).expect("Config should load");
        assert_eq!(config.host, "nn.example.org");
        assert_eq!(config.port, 8020);
        assert_eq!(config.checksum, Some(ChecksumAlgorithm::Sha256));

        let (result, json) = run_json(&args);
        assert_eq!(result, Ok(true));
        assert_eq!(json["Successful"]["/a"], false);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(CliProgress::format_bytes(512), "512.00 B");
        assert_eq!(CliProgress::format_bytes(1536), "1.50 KB");
    }
}
