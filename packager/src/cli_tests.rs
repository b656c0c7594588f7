//! Tests for xcpack CLI parsing and default behaviours.

use super::*;
use clap::CommandFactory;
use rstest::rstest;

const VERSION_VARS: [(&str, Option<&str>); 3] = [
    ("XCPACK_PREBUILT_VERSION", None),
    ("XCPACK_SOURCE_TAG", None),
    ("XCPACK_RELEASE_TAG", None),
];

fn parse(args: &[&str]) -> Cli {
    temp_env::with_vars(VERSION_VARS, || Cli::parse_from(args))
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn cli_parses_global_defaults() {
    let cli = parse(&["xcpack", "verify"]);
    assert_eq!(cli.config, Utf8PathBuf::from("xcpack.toml"));
    assert_eq!(cli.work_dir, Utf8PathBuf::from(".xcpack/work"));
    assert_eq!(cli.output_dir, Utf8PathBuf::from("dist"));
    assert_eq!(cli.verbosity, 0);
    assert!(!cli.quiet);
}

#[test]
fn cli_accepts_globals_after_subcommand() {
    let cli = parse(&["xcpack", "package", "--config", "ci.toml", "-o", "/tmp/out"]);
    assert_eq!(cli.config, Utf8PathBuf::from("ci.toml"));
    assert_eq!(cli.output_dir, Utf8PathBuf::from("/tmp/out"));
    assert!(matches!(cli.command, Command::Package(_)));
}

#[test]
fn cli_parses_run_with_dry_run() {
    let cli = parse(&["xcpack", "run", "--dry-run", "--manifest-dir", "swift"]);
    match cli.command {
        Command::Run(args) => {
            assert!(args.dry_run);
            assert_eq!(args.manifest_dir, Utf8PathBuf::from("swift"));
            assert_eq!(args.versions, VersionArgs::default());
        }
        other => panic!("expected Run command, got {other:?}"),
    }
}

#[test]
fn cli_parses_inspect_with_json() {
    let cli = parse(&["xcpack", "inspect", "libAlpha.a", "--json"]);
    match cli.command {
        Command::Inspect(args) => {
            assert!(args.json);
            assert_eq!(args.file, Utf8PathBuf::from("libAlpha.a"));
        }
        other => panic!("expected Inspect command, got {other:?}"),
    }
}

#[test]
fn cli_requires_subcommand() {
    assert!(Cli::try_parse_from(["xcpack"]).is_err());
}

#[test]
fn verbose_and_quiet_conflict() {
    assert!(Cli::try_parse_from(["xcpack", "-v", "-q", "verify"]).is_err());
}

#[rstest]
#[case::default(&["xcpack", "verify"], None)]
#[case::verbose(&["xcpack", "-v", "verify"], Some("debug"))]
#[case::very_verbose(&["xcpack", "verify", "-vv"], Some("trace"))]
#[case::quiet(&["xcpack", "-q", "verify"], Some("warn"))]
fn log_filter_follows_flags(#[case] args: &[&str], #[case] expected: Option<&str>) {
    assert_eq!(parse(args).log_filter(), expected);
}

#[test]
fn version_overrides_come_from_environment() {
    let cli = temp_env::with_vars(
        [
            ("XCPACK_PREBUILT_VERSION", Some("11.2.0")),
            ("XCPACK_SOURCE_TAG", Some("v2.1.0")),
            ("XCPACK_RELEASE_TAG", Some("11.2.0-1")),
        ],
        || Cli::parse_from(["xcpack", "package"]),
    );
    let Command::Package(args) = cli.command else {
        panic!("expected Package command");
    };
    assert_eq!(
        args.versions.overrides(),
        VersionOverrides {
            prebuilt_version: Some("11.2.0".to_owned()),
            source_tag: Some("v2.1.0".to_owned()),
            release_tag: Some("11.2.0-1".to_owned()),
        }
    );
}

#[test]
fn command_line_beats_environment() {
    let cli = temp_env::with_var("XCPACK_RELEASE_TAG", Some("from-env"), || {
        Cli::parse_from(["xcpack", "manifest", "--release-tag", "from-cli"])
    });
    let Command::Manifest(args) = cli.command else {
        panic!("expected Manifest command");
    };
    assert_eq!(args.overrides().release_tag.as_deref(), Some("from-cli"));
    assert_eq!(args.overrides().source_tag, None);
}
