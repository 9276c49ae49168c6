//! Archive repacking: native zip/tar/gzip and the 7-Zip command line.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{require_source, require_tools, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::{source_stem, SourceFormat, TargetFormat};
use crate::host::{ConcurrencyHost, TimeoutTier, Tool};

const NATIVE_SOURCES: &[&str] = &["zip", "tar", "tar.gz", "tgz", "gz"];

const SEVEN_ZIP_SOURCES: &[&str] = &[
    "zip", "tar", "tar.gz", "tgz", "gz", "7z", "bz2", "tar.bz2",
];

/// Extracts with `zip`/`tar`/`flate2` and repacks in the target container.
pub struct NativeArchiveBackend {
    descriptor: BackendDescriptor,
}

impl NativeArchiveBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::library("native-archive", "archive library"),
        }
    }
}

impl Default for NativeArchiveBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for NativeArchiveBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, _host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, NATIVE_SOURCES)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let input = ctx.input.clone();
        let extension = ctx.source.extension.clone();
        let target = ctx.target;
        let extracted = ctx.attempt_dir.join("extracted");
        let output = ctx.output_path();
        let written = output.clone();

        let count = ctx
            .host
            .run_blocking(move || -> Result<usize, ConversionError> {
                std::fs::create_dir_all(&extracted)?;
                extract(&input, &extension, &extracted)?;
                let files = collect_files(&extracted)?;
                if files.is_empty() {
                    return Err(ConversionError::execution("archive contains no files"));
                }
                pack(&files, &written, target)?;
                Ok(files.len())
            })
            .await??;

        debug!("Repacked {} entries from {:?}", count, ctx.input);
        Ok(BackendOutput::single(output))
    }
}

/// Extracts `input` into `dest`, rejecting entries that would land outside it.
pub fn extract(input: &Path, extension: &str, dest: &Path) -> Result<(), ConversionError> {
    match extension {
        "zip" => extract_zip(input, dest),
        "tar" => extract_tar(BufReader::new(File::open(input)?), dest),
        "tar.gz" | "tgz" => extract_tar(GzDecoder::new(BufReader::new(File::open(input)?)), dest),
        "gz" => {
            // A lone gzip stream holds one file named after the archive.
            let mut decoder = GzDecoder::new(BufReader::new(File::open(input)?));
            let mut name = source_stem(input);
            if name.is_empty() {
                name = "data".to_string();
            }
            let mut out = File::create(dest.join(name))?;
            std::io::copy(&mut decoder, &mut out)
                .map_err(|e| ConversionError::corrupt(format!("invalid gzip stream: {}", e)))?;
            Ok(())
        }
        other => Err(ConversionError::incompatible(format!(
            ".{} archives cannot be read natively",
            other
        ))),
    }
}

fn extract_zip(input: &Path, dest: &Path) -> Result<(), ConversionError> {
    let file = File::open(input)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| ConversionError::corrupt(format!("invalid zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ConversionError::corrupt(format!("failed to read zip entry {}: {}", i, e)))?;

        let outpath = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                return Err(ConversionError::corrupt(format!(
                    "zip entry '{}' escapes the extraction directory",
                    entry.name()
                )))
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| ConversionError::corrupt(format!("failed to extract {}: {}", entry.name(), e)))?;
    }
    Ok(())
}

fn extract_tar<R: std::io::Read>(reader: R, dest: &Path) -> Result<(), ConversionError> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| ConversionError::corrupt(format!("invalid tar archive: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| ConversionError::corrupt(format!("invalid tar entry: {}", e)))?;
        let name = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| ConversionError::corrupt(format!("failed to extract {}: {}", name, e)))?;
        if !unpacked {
            return Err(ConversionError::corrupt(format!(
                "tar entry '{}' escapes the extraction directory",
                name
            )));
        }
    }
    Ok(())
}

/// Regular files under `root` with their `/`-separated relative names, sorted.
fn collect_files(root: &Path) -> Result<Vec<(PathBuf, String)>, ConversionError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| ConversionError::Internal(e.to_string()))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, relative));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Writes `files` into a new archive at `output`.
fn pack(files: &[(PathBuf, String)], output: &Path, target: TargetFormat) -> Result<(), ConversionError> {
    let writer = BufWriter::new(File::create(output)?);
    match target {
        TargetFormat::Zip => {
            let mut zip = ZipWriter::new(writer);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for (path, name) in files {
                zip.start_file(name.as_str(), options)
                    .map_err(|e| ConversionError::execution(format!("failed to add {}: {}", name, e)))?;
                std::io::copy(&mut File::open(path)?, &mut zip)?;
            }
            zip.finish()
                .map_err(|e| ConversionError::execution(format!("failed to finish zip: {}", e)))?
                .flush()?;
        }
        TargetFormat::Tar => {
            let mut out = write_tar(writer, files)?;
            out.flush()?;
        }
        t if t.is_gzipped_tar() => {
            let encoder = write_tar(GzEncoder::new(writer, Compression::default()), files)?;
            encoder.finish()?.flush()?;
        }
        other => {
            return Err(ConversionError::incompatible(format!(
                "cannot write {} archives natively",
                other
            )))
        }
    }
    Ok(())
}

fn write_tar<W: Write>(writer: W, files: &[(PathBuf, String)]) -> Result<W, ConversionError> {
    let mut builder = tar::Builder::new(writer);
    for (path, name) in files {
        builder.append_path_with_name(path, name)?;
    }
    Ok(builder.into_inner()?)
}

/// Extracts and repacks with `7z`.
pub struct SevenZipBackend {
    descriptor: BackendDescriptor,
}

impl SevenZipBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::subprocess("7zip", "7-Zip", Tool::SevenZip),
        }
    }
}

impl Default for SevenZipBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// `-t` switch for a target container, or `None` when gzip wraps a tar.
fn seven_zip_type(target: TargetFormat) -> Result<Option<&'static str>, ConversionError> {
    match target {
        TargetFormat::SevenZ => Ok(Some("-t7z")),
        TargetFormat::Zip => Ok(Some("-tzip")),
        TargetFormat::Tar => Ok(Some("-ttar")),
        t if t.is_gzipped_tar() => Ok(None),
        other => Err(ConversionError::incompatible(format!(
            "7-Zip cannot write {} archives",
            other
        ))),
    }
}

#[async_trait]
impl Backend for SevenZipBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, SEVEN_ZIP_SOURCES)?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let archive_type = seven_zip_type(ctx.target)?;
        let program = ctx.tool(Tool::SevenZip)?;

        let mut extracted = ctx.attempt_dir.join("extracted");
        self.unpack(ctx, &program, &ctx.input, &extracted).await?;

        // Compressed tarballs come out as a single .tar; unwrap it too.
        if let Some(inner) = single_tar(&extracted).await? {
            let nested = ctx.attempt_dir.join("extracted-tar");
            self.unpack(ctx, &program, &inner, &nested).await?;
            extracted = nested;
        }

        let output = ctx.output_path();
        match archive_type {
            Some(switch) => self.add(ctx, &program, switch, &output, &extracted).await?,
            None => {
                let tarball = ctx.attempt_dir.join("repack.tar");
                self.add(ctx, &program, "-ttar", &tarball, &extracted).await?;
                let spec = ctx
                    .process(program.clone(), TimeoutTier::Document)
                    .args(["a", "-y", "-tgzip"])
                    .arg(&output)
                    .arg(&tarball);
                ctx.run_tool("7-Zip", spec).await?;
            }
        }

        Ok(BackendOutput::single(output))
    }
}

impl SevenZipBackend {
    async fn unpack(
        &self,
        ctx: &AttemptContext,
        program: &Path,
        archive: &Path,
        dest: &Path,
    ) -> Result<(), ConversionError> {
        tokio::fs::create_dir_all(dest).await?;
        let mut out_switch = std::ffi::OsString::from("-o");
        out_switch.push(dest);

        let spec = ctx
            .process(program.to_path_buf(), TimeoutTier::Document)
            .args(["x", "-y"])
            .arg(out_switch)
            .arg(archive);
        ctx.run_tool("7-Zip", spec).await?;
        Ok(())
    }

    async fn add(
        &self,
        ctx: &AttemptContext,
        program: &Path,
        switch: &str,
        archive: &Path,
        contents: &Path,
    ) -> Result<(), ConversionError> {
        // 7z expands the wildcard itself, relative to the working directory.
        let spec = ctx
            .process(program.to_path_buf(), TimeoutTier::Document)
            .args(["a", "-y", switch])
            .arg(archive)
            .arg("*")
            .current_dir(contents);
        ctx.run_tool("7-Zip", spec).await?;
        Ok(())
    }
}

/// The only entry of `dir` when it is a `.tar` file.
async fn single_tar(dir: &Path) -> Result<Option<PathBuf>, ConversionError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        found.push(entry.path());
        if found.len() > 1 {
            return Ok(None);
        }
    }
    Ok(found
        .pop()
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e.eq_ignore_ascii_case("tar"))))
}
