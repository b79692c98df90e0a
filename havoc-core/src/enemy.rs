//! Enemy templates and the build pipeline
//!
//! A template is a C source file with free symbolic constants plus a
//! side-car parameter description. Building renders a parameter
//! assignment as `-DNAME=value` flags and invokes the C toolchain.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{HavocError, Result};
use crate::params::{ParamAssignment, ParameterSpace};

/// A parameterized enemy source template with its parameter side-car
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnemyTemplate {
    /// Short name used in logs and result descriptors
    pub name: String,
    /// The template C source
    pub source: PathBuf,
    /// The side-car JSON describing its parameters
    pub params_file: PathBuf,
}

impl EnemyTemplate {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        params_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            params_file: params_file.into(),
        }
    }

    /// Load this template's parameter space from its side-car file
    pub fn parameter_space(&self) -> Result<ParameterSpace> {
        ParameterSpace::from_file(&self.params_file)
    }
}

/// The enemy templates shipped with the tool, rooted at `root`.
///
/// Each lives in its own directory next to a `parameters.json`.
pub fn known_templates(root: &Path) -> Vec<EnemyTemplate> {
    [
        ("cache", "template_cache_stress.c"),
        ("mem_thrashing", "template_mem_thrashing.c"),
        ("pipeline_stress", "template_pipeline_stress.c"),
        ("system_calls", "template_system_calls.c"),
    ]
    .iter()
    .map(|(name, file)| {
        let dir = root.join(name);
        EnemyTemplate::new(*name, dir.join(file), dir.join("parameters.json"))
    })
    .collect()
}

/// Toolchain invocation that turns a template + assignment into a binary.
///
/// The program and flags are injectable so tests can substitute a stub
/// for the real compiler.
#[derive(Clone, Debug)]
pub struct Compiler {
    program: String,
    flags: Vec<String>,
    libs: Vec<String>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            program: "cc".to_string(),
            flags: vec!["-std=gnu11".to_string(), "-Wall".to_string()],
            libs: vec!["-lm".to_string()],
        }
    }
}

impl Compiler {
    /// Use a specific compiler program with the default flags
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Replace the base flags
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    /// Replace the trailing link libraries
    pub fn with_libs(mut self, libs: Vec<String>) -> Self {
        self.libs = libs;
        self
    }

    /// Compile `template` with `assignment` rendered as `-D` defines.
    ///
    /// Fails with a build error carrying the toolchain's stderr if it
    /// exits non-zero. A failing parameter combination is the caller's
    /// signal to skip that sample, not to retry.
    pub fn build(
        &self,
        template: &EnemyTemplate,
        assignment: &ParamAssignment,
        output: &Path,
    ) -> Result<Artifact> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.flags);
        for (name, value) in assignment {
            cmd.arg(format!("-D{}={}", name, value));
        }
        cmd.arg(&template.source).args(&self.libs).arg("-o").arg(output);

        tracing::debug!("compiling {}: {:?}", template.name, cmd);
        let result = cmd.output()?;
        if !result.status.success() {
            return Err(HavocError::Build {
                template: template.source.clone(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(Artifact {
            path: output.to_path_buf(),
        })
    }
}

/// Handle to a compiled enemy binary.
///
/// Disposal is explicit: the owning driver removes the artifact once
/// the trial oracle has consumed it. Keeping a best-found artifact is
/// just not calling `dispose`.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the artifact from disk
    pub fn dispose(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamSpec, ParamValue};

    fn make_template(dir: &Path) -> EnemyTemplate {
        let source = dir.join("template_cache_stress.c");
        let params = dir.join("parameters.json");
        fs::write(&source, "int main(void) { return 0; }\n").unwrap();
        fs::write(
            &params,
            r#"{"DEFINES": {"SIZE": {"type": "int", "range": [1, 64]}}}"#,
        )
        .unwrap();
        EnemyTemplate::new("cache", source, params)
    }

    /// Stub toolchain: sh walks its arguments, touches the last one
    /// (the `-o` output path) and exits 0.
    fn stub_compiler() -> Compiler {
        Compiler::new("sh")
            .with_flags(vec![
                "-c".to_string(),
                r#"for a; do last="$a"; done; : > "$last""#.to_string(),
            ])
            .with_libs(vec![])
    }

    #[test]
    fn test_build_produces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let template = make_template(dir.path());
        let output = dir.path().join("enemy.out");

        let assignment: ParamAssignment =
            [("SIZE".to_string(), ParamValue::Int(32))].into_iter().collect();
        let artifact = stub_compiler().build(&template, &assignment, &output).unwrap();

        assert_eq!(artifact.path(), output);
        assert!(output.exists());
        artifact.dispose().unwrap();
        assert!(!output.exists());
    }

    #[test]
    fn test_failed_build_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let template = make_template(dir.path());
        let output = dir.path().join("enemy.out");

        let failing = Compiler::new("sh")
            .with_flags(vec!["-c".to_string(), "echo boom >&2; exit 1".to_string()])
            .with_libs(vec![]);
        let err = failing.build(&template, &ParamAssignment::new(), &output).unwrap_err();

        match err {
            HavocError::Build { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("expected build error, got {other:?}"),
        }
    }

    #[test]
    fn test_dispose_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact {
            path: dir.path().join("never_built.out"),
        };
        artifact.dispose().unwrap();
    }

    #[test]
    fn test_known_templates_layout() {
        let templates = known_templates(Path::new("/opt/templates"));
        assert_eq!(templates.len(), 4);
        let cache = &templates[0];
        assert_eq!(cache.name, "cache");
        assert_eq!(
            cache.source,
            Path::new("/opt/templates/cache/template_cache_stress.c")
        );
        assert_eq!(
            cache.params_file,
            Path::new("/opt/templates/cache/parameters.json")
        );
    }

    #[test]
    fn test_template_parameter_space_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let template = make_template(dir.path());
        let space = template.parameter_space().unwrap();
        assert_eq!(space.defines()["SIZE"], ParamSpec::int(1, 64));
    }
}
