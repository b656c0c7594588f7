//! Tests for universal artefact assembly.

use super::*;
use camino::Utf8Path;
use rstest::{fixture, rstest};
use std::collections::BTreeMap;
use std::process::Output;
use std::sync::Mutex;
use tempfile::TempDir;
use xcpack_common::CommandError;
use xcpack_common::test_support::success_output;
use xcpack_fatbin::{read_members, thin};

const CONFIG: &str = r#"
[package]
name = "Vendor"
bundle_identifier_prefix = "com.acme"

[release]
repository = "acme/vendor"

[source]
repository = "https://example.test/vendor.git"
tag = "v2.1.0"

[platform]
os = "ios"
deployment_target = "13.0"
variant = "simulator"

[[artefacts]]
name = "Alpha"
headers = ["Sources/Alpha/include"]

[[artefacts]]
name = "Beta"
optional = true
"#;

struct Fixture {
    dir: TempDir,
    config: Config,
}

impl Fixture {
    fn source_dir(&self) -> PathBuf {
        self.dir.path().join("source")
    }

    fn stage_dir(&self) -> PathBuf {
        self.dir.path().join("stage")
    }

    fn spec(&self, name: &str) -> ArtefactSpec {
        self.config
            .artefacts
            .iter()
            .find(|a| a.name.as_str() == name)
            .cloned()
            .expect("artefact configured")
    }

    /// Fake build output with one object per module, tagged with the
    /// module and architecture so tests can tell them apart.
    fn output(&self, architecture: Architecture, modules: &[&str]) -> BuildOutput {
        let release = self
            .dir
            .path()
            .join(format!("build/{architecture}/release"));
        let mut map = BTreeMap::new();
        for module in modules {
            let path = release.join(format!("{module}.build/{module}.swift.o"));
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, format!("{module} symbols for {architecture}")).expect("object");
            map.insert((*module).to_owned(), vec![path]);
        }
        BuildOutput {
            architecture,
            release_dir: release,
            modules: map,
        }
    }

    fn context<'a>(&'a self, executor: &'a dyn CommandExecutor, stage: &'a Path, source: &'a Path) -> AssemblyContext<'a> {
        AssemblyContext {
            executor,
            config: &self.config,
            source_dir: source,
            stage_dir: stage,
            default_version: "v2.1.0",
        }
    }
}

#[fixture]
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = Config::from_toml_str(CONFIG, Utf8Path::new("xcpack.toml")).expect("config");
    let fixture = Fixture { dir, config };
    let include = fixture.source_dir().join("Sources/Alpha/include");
    fs::create_dir_all(&include).expect("mkdir include");
    fs::write(include.join("Alpha.h"), "void alpha(void);\n").expect("header");
    fs::create_dir_all(fixture.stage_dir()).expect("mkdir stage");
    fixture
}

/// Records commands and succeeds without touching the library.
#[derive(Default)]
struct RecordingExecutor {
    seen: Mutex<Vec<CommandSpec>>,
}

impl CommandExecutor for RecordingExecutor {
    fn run(&self, spec: &CommandSpec) -> std::result::Result<Output, CommandError> {
        self.seen.lock().expect("lock").push(spec.clone());
        Ok(success_output())
    }
}

#[rstest]
fn assembling_alpha_excludes_beta_objects(fixture: Fixture) {
    let outputs = [
        fixture.output(Architecture::X86_64, &["Alpha", "Beta"]),
        fixture.output(Architecture::Arm64, &["Alpha", "Beta"]),
    ];
    let executor = RecordingExecutor::default();
    let (stage, source) = (fixture.stage_dir(), fixture.source_dir());
    let ctx = fixture.context(&executor, &stage, &source);

    let outcome = assemble_artefact(&ctx, &fixture.spec("Alpha"), &outputs).expect("assemble");
    let xcframework = stage.join("Alpha.xcframework");
    assert_eq!(outcome, AssemblyOutcome::Assembled(xcframework.clone()));

    let framework = xcframework.join("ios-arm64_x86_64-simulator/Alpha.framework");
    let binary = fs::read(framework.join("Alpha")).expect("binary");
    for architecture in Architecture::ALL {
        let library = thin(&binary, architecture).expect("slice");
        let members = read_members(library).expect("members");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "Alpha.swift.o");
        assert_eq!(
            members[0].data,
            format!("Alpha symbols for {architecture}").into_bytes()
        );
    }
    assert!(
        !binary.windows(4).any(|w| w == b"Beta"),
        "fused binary must not contain Beta objects"
    );
    assert!(framework.join("Headers/Alpha.h").is_file());
    let modulemap = fs::read_to_string(framework.join("Modules/module.modulemap")).expect("map");
    assert!(modulemap.contains("umbrella header \"Alpha.h\""));
    let plist = fs::read_to_string(framework.join("Info.plist")).expect("plist");
    assert!(plist.contains("<string>com.acme.Alpha</string>"));
    assert!(plist.contains("<string>2.1.0</string>"));
    assert!(xcframework.join("Info.plist").is_file());
    assert_eq!(executor.seen.lock().expect("lock").len(), 2);
}

#[rstest]
fn missing_architecture_fails_required_artefact(fixture: Fixture) {
    let outputs = [fixture.output(Architecture::X86_64, &["Alpha"])];
    let executor = RecordingExecutor::default();
    let (stage, source) = (fixture.stage_dir(), fixture.source_dir());
    let ctx = fixture.context(&executor, &stage, &source);

    let err = assemble_artefact(&ctx, &fixture.spec("Alpha"), &outputs).expect_err("fails");
    assert!(matches!(
        err,
        PackagerError::MissingBuildOutput {
            architecture: Architecture::Arm64,
            ..
        }
    ));
    assert!(!stage.join("Alpha.xcframework").exists());
}

#[rstest]
fn missing_module_skips_optional_artefact(fixture: Fixture) {
    let outputs = [
        fixture.output(Architecture::X86_64, &["Alpha", "Beta"]),
        fixture.output(Architecture::Arm64, &["Alpha"]),
    ];
    let executor = RecordingExecutor::default();
    let (stage, source) = (fixture.stage_dir(), fixture.source_dir());
    let ctx = fixture.context(&executor, &stage, &source);

    let outcome = assemble_artefact(&ctx, &fixture.spec("Beta"), &outputs).expect("skipped");
    assert_eq!(outcome, AssemblyOutcome::Skipped);
    assert!(!stage.join("Beta.xcframework").exists());
}

#[rstest]
fn artefact_without_headers_still_assembles(fixture: Fixture) {
    let outputs = [
        fixture.output(Architecture::X86_64, &["Beta"]),
        fixture.output(Architecture::Arm64, &["Beta"]),
    ];
    let executor = RecordingExecutor::default();
    let (stage, source) = (fixture.stage_dir(), fixture.source_dir());
    let ctx = fixture.context(&executor, &stage, &source);

    assemble_artefact(&ctx, &fixture.spec("Beta"), &outputs).expect("assemble");
    let framework = stage.join("Beta.xcframework/ios-arm64_x86_64-simulator/Beta.framework");
    assert!(!framework.join("Headers").exists());
    let modulemap = fs::read_to_string(framework.join("Modules/module.modulemap")).expect("map");
    assert_eq!(modulemap, "framework module Beta {\n  export *\n}\n");
}

#[rstest]
fn default_ranlib_runs_once_per_architecture(fixture: Fixture) {
    let outputs = [
        fixture.output(Architecture::X86_64, &["Alpha"]),
        fixture.output(Architecture::Arm64, &["Alpha"]),
    ];
    let executor = RecordingExecutor::default();
    let (stage, source) = (fixture.stage_dir(), fixture.source_dir());
    let ctx = fixture.context(&executor, &stage, &source);

    assemble_artefact(&ctx, &fixture.spec("Alpha"), &outputs).expect("assemble");
    let seen = executor.seen.lock().expect("lock");
    assert_eq!(seen.len(), 2);
    for spec in seen.iter() {
        assert_eq!(spec.program, "xcrun");
        assert_eq!(spec.args.first().map(String::as_str), Some("ranlib"));
        assert!(spec.args.last().is_some_and(|a| a.ends_with(".a")));
    }
}

#[rstest]
fn empty_ranlib_command_leaves_library_untouched(mut fixture: Fixture) {
    fixture.config.assembly.ranlib = Vec::new();
    let outputs = [
        fixture.output(Architecture::X86_64, &["Alpha"]),
        fixture.output(Architecture::Arm64, &["Alpha"]),
    ];
    let executor = RecordingExecutor::default();
    let (stage, source) = (fixture.stage_dir(), fixture.source_dir());
    let ctx = fixture.context(&executor, &stage, &source);

    assemble_artefact(&ctx, &fixture.spec("Alpha"), &outputs).expect("assemble");
    assert!(executor.seen.lock().expect("lock").is_empty());
}

#[rstest]
fn resource_bundle_is_copied_when_present(mut fixture: Fixture) {
    let outputs = [
        fixture.output(Architecture::X86_64, &["Alpha"]),
        fixture.output(Architecture::Arm64, &["Alpha"]),
    ];
    let bundle = outputs[0].release_dir.join("Alpha_Alpha.bundle");
    fs::create_dir_all(&bundle).expect("mkdir bundle");
    fs::write(bundle.join("strings.json"), "{}").expect("resource");
    fixture.config.artefacts[0].resource_bundle = Some("Alpha_Alpha.bundle".to_owned());

    let executor = RecordingExecutor::default();
    let (stage, source) = (fixture.stage_dir(), fixture.source_dir());
    let ctx = fixture.context(&executor, &stage, &source);
    assemble_artefact(&ctx, &fixture.spec("Alpha"), &outputs).expect("assemble");

    assert!(
        stage
            .join("Alpha.xcframework/ios-arm64_x86_64-simulator/Alpha.framework/Alpha_Alpha.bundle/strings.json")
            .is_file()
    );
}

#[test]
fn clashing_object_names_get_module_prefix() {
    let mut used = BTreeSet::new();
    assert_eq!(
        unique_member_name("Alpha", Path::new("a/Utils.swift.o"), &mut used),
        "Utils.swift.o"
    );
    assert_eq!(
        unique_member_name("AlphaCore", Path::new("b/Utils.swift.o"), &mut used),
        "AlphaCore_Utils.swift.o"
    );
}
