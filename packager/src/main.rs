//! xcpack CLI entrypoint.
//!
//! This binary packages xcframeworks for Swift Package Manager. Logs go to
//! stderr; plans, reports, and inspections go to stdout.

use camino::Utf8Path;
use clap::Parser;
use std::io::Write;
use tracing_subscriber::EnvFilter;
use xcpack_common::SystemCommandExecutor;
use xcpack_packager::cli::{Cli, Command, InspectArgs, VerifyArgs};
use xcpack_packager::config::{Config, VersionOverrides};
use xcpack_packager::error::Result;
use xcpack_packager::fetch::download::HttpDownloader;
use xcpack_packager::inspect::inspect_file;
use xcpack_packager::packaging::PackageReport;
use xcpack_packager::pipeline::Pipeline;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_logging(cli: &Cli) {
    let filter = cli.log_filter().map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        EnvFilter::new,
    );
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

fn run(cli: &Cli, stdout: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Inspect(args) => run_inspect(args, stdout),
        Command::Verify(args) => {
            let config = load_config(&cli.config, &VersionOverrides::default())?;
            run_verify(cli, &config, args, stdout)
        }
        Command::Manifest(args) => {
            let config = load_config(&cli.config, &args.overrides())?;
            let generated = with_pipeline(cli, &config, |p| {
                p.generate_manifest(args.manifest_dir.as_std_path())
            })?;
            write_line(
                stdout,
                format!("wrote {}", generated.package_swift.display()),
            );
            Ok(())
        }
        Command::Package(args) => {
            let config = load_config(&cli.config, &args.versions.overrides())?;
            with_pipeline(cli, &config, |p| {
                if args.dry_run {
                    write_line(stdout, p.plan(None).to_string().trim_end());
                    return Ok(());
                }
                let report = p.package()?;
                print_package_report(&report, stdout);
                Ok(())
            })
        }
        Command::Run(args) => {
            let config = load_config(&cli.config, &args.versions.overrides())?;
            let manifest_dir = args.manifest_dir.as_std_path();
            with_pipeline(cli, &config, |p| {
                if args.dry_run {
                    write_line(stdout, p.plan(Some(manifest_dir)).to_string().trim_end());
                    return Ok(());
                }
                let report = p.run(manifest_dir)?;
                print_package_report(&report.package, stdout);
                write_line(
                    stdout,
                    format!("wrote {}", report.manifest.package_swift.display()),
                );
                Ok(())
            })
        }
    }
}

fn load_config(path: &Utf8Path, overrides: &VersionOverrides) -> Result<Config> {
    let mut config = Config::load(path)?;
    config.apply_overrides(overrides);
    Ok(config)
}

/// Builds a pipeline wired to the real toolchain and network.
fn with_pipeline<T>(
    cli: &Cli,
    config: &Config,
    f: impl FnOnce(&Pipeline<'_>) -> Result<T>,
) -> Result<T> {
    let executor = SystemCommandExecutor;
    let downloader = HttpDownloader::default();
    let pipeline = Pipeline::new(
        config,
        &executor,
        &downloader,
        cli.work_dir.as_std_path(),
        cli.output_dir.as_std_path(),
    );
    f(&pipeline)
}

fn run_verify(cli: &Cli, config: &Config, args: &VerifyArgs, stdout: &mut dyn Write) -> Result<()> {
    let report = with_pipeline(cli, config, |p| p.verify())?;
    if args.json {
        write_line(stdout, serde_json::to_string_pretty(&report)?);
    } else {
        for name in &report.verified {
            write_line(stdout, format!("{name}: OK"));
        }
    }
    Ok(())
}

fn run_inspect(args: &InspectArgs, stdout: &mut dyn Write) -> Result<()> {
    let inspection = inspect_file(args.file.as_std_path())?;
    if args.json {
        write_line(stdout, serde_json::to_string_pretty(&inspection)?);
    } else if write!(stdout, "{}", inspection.render_text()).is_err() {
        // Best-effort output; ignore write failures.
    }
    Ok(())
}

fn print_package_report(report: &PackageReport, stdout: &mut dyn Write) {
    for bundle in &report.bundles {
        write_line(
            stdout,
            format!("{}  {}", bundle.checksum, bundle.zip_path.display()),
        );
    }
    write_line(stdout, format!("wrote {}", report.combined.display()));
    write_line(stdout, format!("wrote {}", report.checksums_path.display()));
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_line(stderr, format!("error: {err}"));
            1
        }
    }
}

fn write_line(out: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(out, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use xcpack_common::sha256_of_bytes;
    use xcpack_fatbin::ArchiveBuilder;
    use xcpack_packager::checksum::{CHECKSUM_FILE_NAME, ChecksumRecord};
    use xcpack_packager::error::PackagerError;

    const MINIMAL_CONFIG: &str = r#"
[package]
name = "Vendor"

[release]
repository = "acme/vendor-binaries"

[platform]
os = "ios"
deployment_target = "13.0"

[[products]]
name = "Core"
dependencies = [{ binary = "Core" }]
"#;

    fn cli_in(dir: &Utf8Path, args: &[&str]) -> Cli {
        let config = dir.join("xcpack.toml");
        let work = dir.join("work");
        let output = dir.join("dist");
        let mut argv = vec![
            "xcpack",
            "--config",
            config.as_str(),
            "--work-dir",
            work.as_str(),
            "--output-dir",
            output.as_str(),
        ];
        argv.extend_from_slice(args);
        temp_env::with_var_unset("XCPACK_RELEASE_TAG", || Cli::parse_from(argv))
    }

    fn workspace() -> (tempfile::TempDir, camino::Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf-8 path");
        fs::write(root.join("xcpack.toml"), MINIMAL_CONFIG).expect("config");
        (dir, root)
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        assert_eq!(exit_code_for_run_result(Ok(()), &mut stderr), 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = PackagerError::NothingToPackage;
        let mut stderr = Vec::new();
        assert_eq!(exit_code_for_run_result(Err(err), &mut stderr), 1);
        let text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(text.starts_with("error: no bundles were assembled"));
    }

    #[test]
    fn dry_run_prints_plan_without_side_effects() {
        let (_guard, root) = workspace();
        let cli = cli_in(&root, &["run", "--dry-run", "--manifest-dir", root.as_str()]);
        let mut stdout = Vec::new();
        run(&cli, &mut stdout).expect("dry run");
        let text = String::from_utf8(stdout).expect("utf-8");
        assert!(text.starts_with(" 1. lock and wipe working directory"));
        assert!(text.contains("Vendor-all.zip"));
        assert!(!root.join("work").exists());
    }

    #[test]
    fn manifest_writes_package_swift() {
        let (_guard, root) = workspace();
        let mut record = ChecksumRecord::new();
        record
            .insert("Core.zip", sha256_of_bytes(b"core"))
            .expect("insert");
        record
            .write(root.join("dist").join(CHECKSUM_FILE_NAME).as_std_path())
            .expect("record");

        let cli = cli_in(
            &root,
            &["manifest", "--release-tag", "1.0.0", "--manifest-dir", root.as_str()],
        );
        let mut stdout = Vec::new();
        run(&cli, &mut stdout).expect("manifest");
        let swift = fs::read_to_string(root.join("Package.swift")).expect("Package.swift");
        assert!(swift.contains(&sha256_of_bytes(b"core").to_string()));
    }

    #[test]
    fn manifest_without_tag_fails() {
        let (_guard, root) = workspace();
        let cli = cli_in(&root, &["manifest", "--manifest-dir", root.as_str()]);
        let err = run(&cli, &mut Vec::new()).expect_err("no tag");
        assert!(err.to_string().contains("release.tag"));
    }

    #[test]
    fn verify_reports_json() {
        let (_guard, root) = workspace();
        let dist = root.join("dist");
        fs::create_dir_all(&dist).expect("dist");
        fs::write(dist.join("Core.zip"), b"core").expect("zip");
        let mut record = ChecksumRecord::new();
        record
            .insert("Core.zip", sha256_of_bytes(b"core"))
            .expect("insert");
        record
            .write(dist.join(CHECKSUM_FILE_NAME).as_std_path())
            .expect("record");

        let cli = cli_in(&root, &["verify", "--json"]);
        let mut stdout = Vec::new();
        run(&cli, &mut stdout).expect("verify");
        let json: serde_json::Value = serde_json::from_slice(&stdout).expect("json");
        assert_eq!(json["verified"][0], "Core.zip");
    }

    #[test]
    fn inspect_prints_members() {
        let (_guard, root) = workspace();
        let mut builder = ArchiveBuilder::new();
        builder.append("Core.o", b"object".to_vec()).expect("append");
        let lib = root.join("libCore.a");
        fs::write(&lib, builder.finish().expect("finish")).expect("library");

        let cli = cli_in(&root, &["inspect", lib.as_str()]);
        let mut stdout = Vec::new();
        run(&cli, &mut stdout).expect("inspect");
        let text = String::from_utf8(stdout).expect("utf-8");
        assert!(text.contains("static archive with 1 slice(s)"));
        assert!(text.contains("Core.o (6 bytes)"));
    }
}
