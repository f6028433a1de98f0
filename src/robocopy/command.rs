//! Robocopy command construction.
//!
//! This module provides a builder that validates user-supplied source and
//! destination paths and produces the ordered argument vector for a
//! robocopy invocation. The builder applies the "Fast Copy" preset
//! (`/E /MT:32 /R:1 /W:1`) unless overridden.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Error type for command construction.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// No source path was provided.
    #[error("Source and destination folder must be set")]
    MissingSource,
    /// No destination path was provided.
    #[error("Source and destination folder must be set")]
    MissingDestination,
    /// Source files come from more than one parent directory.
    #[error("Selected source files must be from the same folder")]
    MixedSourceParents,
    /// A source path has no final component to use as a file filter.
    #[error("Source path has no file name: {0}")]
    NoFileName(PathBuf),
}

/// A validated robocopy invocation ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    /// Ordered argument vector; the first element names the executable.
    pub args: Vec<String>,
    /// Final destination folder, for user-facing messages.
    pub destination_dir: PathBuf,
    /// Human-readable notes produced during validation (e.g. a destination
    /// filename that was replaced by its parent folder).
    pub notes: Vec<String>,
}

impl BuiltCommand {
    /// Whether the argument vector contains the destructive `/MIR` switch.
    ///
    /// The builder never emits `/MIR` itself; it can only arrive through
    /// extra passthrough arguments.
    #[must_use]
    pub fn contains_mir(&self) -> bool {
        self.args.iter().any(|a| a.eq_ignore_ascii_case("/mir"))
    }

    /// Render the command for display, quoting arguments with whitespace.
    #[must_use]
    pub fn preview(&self) -> String {
        render_command(&self.args)
    }
}

/// Quote a single argument for display if it contains spaces or tabs.
#[must_use]
pub fn quote_for_display(arg: &str) -> String {
    if arg.contains(' ') || arg.contains('\t') {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

/// Render an argument vector as a displayable command line.
#[must_use]
pub fn render_command(args: &[String]) -> String {
    args.iter()
        .map(|a| quote_for_display(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builder for a robocopy argument vector.
#[derive(Debug, Clone)]
pub struct RobocopyCommandBuilder {
    binary: String,
    sources: Vec<PathBuf>,
    destination: Option<PathBuf>,
    retries: u32,
    wait_secs: u32,
    threads: u32,
    extra_args: Vec<String>,
}

impl Default for RobocopyCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RobocopyCommandBuilder {
    /// Create a builder with the default preset (`/E /MT:32 /R:1 /W:1`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "robocopy".to_string(),
            sources: Vec::new(),
            destination: None,
            retries: 1,
            wait_secs: 1,
            threads: 32,
            extra_args: Vec::new(),
        }
    }

    /// Override the executable name or path.
    #[must_use]
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Add a source path (a file, or a single directory).
    #[must_use]
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(path.into());
        self
    }

    /// Set all source paths at once.
    #[must_use]
    pub fn sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sources = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Set the destination folder.
    #[must_use]
    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }

    /// Set the retry count (`/R`).
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the wait time between retries in seconds (`/W`).
    #[must_use]
    pub fn wait_secs(mut self, wait_secs: u32) -> Self {
        self.wait_secs = wait_secs;
        self
    }

    /// Set the multithreaded copy width (`/MT`).
    #[must_use]
    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    /// Append extra robocopy switches verbatim, after the preset.
    #[must_use]
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the inputs and build the argument vector.
    ///
    /// Sources that are files (or non-existing paths with an extension) are
    /// copied from their common parent folder with the file names as
    /// filters; a single directory source copies `*.*`. A destination that
    /// names an existing file, or a non-existing path with an extension, is
    /// replaced by its parent folder and a note is recorded.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if the source or destination is missing, the
    /// source files span multiple parent folders, or a source path has no
    /// usable file name.
    pub fn build(&self) -> Result<BuiltCommand, CommandError> {
        let mut notes = Vec::new();

        let dst = self
            .destination
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(CommandError::MissingDestination)?;
        let dst_dir = resolve_destination_dir(dst, &mut notes);

        if self.sources.is_empty() {
            return Err(CommandError::MissingSource);
        }
        let (src_dir, filters) = resolve_sources(&self.sources)?;

        let mut args = vec![
            self.binary.clone(),
            src_dir.to_string_lossy().into_owned(),
            dst_dir.to_string_lossy().into_owned(),
        ];
        args.extend(filters);
        args.push("/E".to_string());
        args.push(format!("/MT:{}", self.threads));
        args.push(format!("/R:{}", self.retries));
        args.push(format!("/W:{}", self.wait_secs));
        args.extend(self.extra_args.iter().cloned());

        Ok(BuiltCommand {
            args,
            destination_dir: dst_dir,
            notes,
        })
    }
}

/// Resolve the destination to a folder, recording a note when a filename
/// component is dropped.
fn resolve_destination_dir(dst: &Path, notes: &mut Vec<String>) -> PathBuf {
    let treat_as_file =
        (dst.exists() && dst.is_file()) || (!dst.exists() && dst.extension().is_some());
    if treat_as_file {
        let folder = nonempty_parent(dst);
        notes.push(format!(
            "Note: Destination filename ignored - using folder: {}",
            folder.display()
        ));
        folder
    } else {
        dst.to_path_buf()
    }
}

/// Resolve sources to a single robocopy source folder plus file filters.
fn resolve_sources(sources: &[PathBuf]) -> Result<(PathBuf, Vec<String>), CommandError> {
    if let [single] = sources {
        let is_file_like = single.is_file() || (!single.exists() && single.extension().is_some());
        if !is_file_like {
            return Ok((single.clone(), vec!["*.*".to_string()]));
        }
    }

    // One or more files: all must share a parent folder.
    let parents: BTreeSet<PathBuf> = sources.iter().map(|p| nonempty_parent(p)).collect();
    if parents.len() != 1 {
        return Err(CommandError::MixedSourceParents);
    }
    let mut filters = Vec::with_capacity(sources.len());
    for source in sources {
        let name = source
            .file_name()
            .ok_or_else(|| CommandError::NoFileName(source.clone()))?;
        filters.push(name.to_string_lossy().into_owned());
    }
    let parent = parents
        .into_iter()
        .next()
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((parent, filters))
}

/// Parent of a path, falling back to `.` for bare file names.
fn nonempty_parent(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
