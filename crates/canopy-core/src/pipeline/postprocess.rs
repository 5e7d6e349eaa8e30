//! Post-processing of the compiled canister binary.
//!
//! Every step rewrites the same `.wasm` file in place, so the steps run
//! strictly one after another: optimize, extract the interface, embed the
//! interface and builder metadata, then compress.

use std::io::Read;
use std::path::Path;

use flate2::Compression;
use flate2::read::GzEncoder;

use crate::compile::{OutputCapture, Tool, ToolInvocation, ToolRunner, Toolchain};
use crate::error::{Error, Result};
use crate::fs::BuildFs;
use crate::paths::BuildPaths;

use super::runner::{invoke, prefixed};
use super::stage::{Diagnostic, FailureKind, Stage, StageFailure};

/// Visibility of embedded metadata sections.
const METADATA_VISIBILITY: &str = "public";

/// Metadata section holding the Candid service description.
const CANDID_SECTION: &str = "candid:service";

/// Metadata section naming the canister development kit that built the binary.
const BUILDER_SECTION: &str = "cdk";

/// Runs the steps that turn the raw compiler output into the final artifacts.
pub struct ArtifactPostProcessor<'a, F: BuildFs + ?Sized, R: ToolRunner + ?Sized> {
    paths: &'a BuildPaths,
    fs: &'a F,
    runner: &'a R,
    toolchain: &'a Toolchain,
    capture: OutputCapture,
}

impl<'a, F: BuildFs + ?Sized, R: ToolRunner + ?Sized> ArtifactPostProcessor<'a, F, R> {
    pub fn new(
        paths: &'a BuildPaths,
        fs: &'a F,
        runner: &'a R,
        toolchain: &'a Toolchain,
        capture: OutputCapture,
    ) -> Self {
        Self {
            paths,
            fs,
            runner,
            toolchain,
            capture,
        }
    }

    /// Copy the binary out of the shared target directory and shrink it.
    pub fn optimize(&self) -> std::result::Result<(), StageFailure> {
        let paths = self.paths;
        self.fs.copy_file(&paths.built_wasm, &paths.wasm).map_err(|e| {
            StageFailure::from_error(Stage::Optimize, &Error::fs(&paths.built_wasm, e))
        })?;

        let invocation = self
            .tool(Tool::Optimizer)
            .arg(&paths.wasm)
            .arg(prefixed("-o=", &paths.wasm))
            .capture(self.capture);
        invoke(self.runner, &invocation, Stage::Optimize, FailureKind::PostProcess)?;
        Ok(())
    }

    /// Extract the Candid interface and write it to the build tree and to
    /// the user's interface path.
    ///
    /// The extractor's stdout is the result, so it is captured even in
    /// verbose mode.
    pub fn extract_interface(&self) -> std::result::Result<String, StageFailure> {
        let capture = match self.capture {
            OutputCapture::Captured => OutputCapture::Captured,
            _ => OutputCapture::StdoutOnly,
        };
        let invocation = self
            .tool(Tool::CandidExtractor)
            .arg(&self.paths.wasm)
            .capture(capture);
        let output = invoke(self.runner, &invocation, Stage::Interface, FailureKind::PostProcess)?;

        let candid = String::from_utf8(output.stdout).map_err(|e| {
            StageFailure::new(
                Stage::Interface,
                FailureKind::PostProcess,
                Diagnostic::Raw(format!("interface description is not valid UTF-8: {e}")),
            )
        })?;

        for path in [&self.paths.generated_did, &self.paths.did_path] {
            self.fs
                .write(path, candid.as_bytes())
                .map_err(|e| StageFailure::from_error(Stage::Interface, &Error::fs(path, e)))?;
        }
        Ok(candid)
    }

    /// Embed the interface description as a public metadata section.
    pub fn embed_interface(&self) -> std::result::Result<(), StageFailure> {
        let invocation = self
            .metadata(CANDID_SECTION)
            .arg("-f")
            .arg(&self.paths.did_path)
            .args(["-v", METADATA_VISIBILITY]);
        invoke(self.runner, &invocation, Stage::EmbedInterface, FailureKind::PostProcess)?;
        Ok(())
    }

    /// Embed `"<name> <version>"` of the builder as a public metadata section.
    pub fn embed_builder_info(&self, builder: &str) -> std::result::Result<(), StageFailure> {
        let invocation = self
            .metadata(BUILDER_SECTION)
            .args(["-d", builder, "-v", METADATA_VISIBILITY]);
        invoke(self.runner, &invocation, Stage::EmbedBuilderInfo, FailureKind::PostProcess)?;
        Ok(())
    }

    /// Gzip the binary next to itself, keeping the original.
    pub fn compress(&self) -> std::result::Result<(), StageFailure> {
        gzip_file(self.fs, &self.paths.wasm, &self.paths.gzipped_wasm).map_err(|e| {
            StageFailure::new(
                Stage::Compress,
                FailureKind::PostProcess,
                Diagnostic::Raw(e.to_string()),
            )
        })
    }

    fn tool(&self, tool: Tool) -> ToolInvocation {
        ToolInvocation::new(self.toolchain.program(tool)).envs(self.toolchain.env())
    }

    /// `ic-wasm <wasm> -o <wasm> metadata <section>`
    fn metadata(&self, section: &str) -> ToolInvocation {
        let wasm = &self.paths.wasm;
        self.tool(Tool::IcWasm)
            .arg(wasm)
            .arg("-o")
            .arg(wasm)
            .args(["metadata", section])
            .capture(self.capture)
    }
}

/// Gzip `source` into `dest`.
///
/// The compressed bytes are written to a temporary sibling first and renamed
/// into place, so `dest` never holds a partial archive.
pub fn gzip_file<F: BuildFs + ?Sized>(fs: &F, source: &Path, dest: &Path) -> Result<()> {
    let data = fs.read(source).map_err(|e| Error::fs(source, e))?;

    let mut encoder = GzEncoder::new(data.as_slice(), Compression::default());
    let mut compressed = Vec::new();
    encoder
        .read_to_end(&mut compressed)
        .map_err(|e| Error::fs(source, e))?;

    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    fs.write(tmp, &compressed).map_err(|e| Error::fs(tmp, e))?;
    fs.rename(tmp, dest).map_err(|e| Error::fs(dest, e))?;

    tracing::debug!(
        original = data.len(),
        compressed = compressed.len(),
        "compressed {}",
        dest.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use flate2::read::GzDecoder;

    #[test]
    fn test_gzip_roundtrip_keeps_original() {
        let fs = MemoryFs::new().with_file("/out/app.wasm", b"\0asm\x01\0\0\0 canister body");

        gzip_file(&fs, Path::new("/out/app.wasm"), Path::new("/out/app.wasm.gz")).unwrap();

        assert!(fs.exists(Path::new("/out/app.wasm")));
        assert!(!fs.exists(Path::new("/out/app.wasm.gz.tmp")));

        let compressed = fs.read(Path::new("/out/app.wasm.gz")).unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, b"\0asm\x01\0\0\0 canister body");
    }

    #[test]
    fn test_gzip_missing_source() {
        let fs = MemoryFs::new();
        let err = gzip_file(&fs, Path::new("/out/app.wasm"), Path::new("/out/app.wasm.gz"))
            .unwrap_err();

        assert!(matches!(err, Error::Fs { .. }));
        assert!(!fs.exists(Path::new("/out/app.wasm.gz")));
    }
}
