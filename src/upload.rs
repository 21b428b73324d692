//! Directory upload helper: walk a tree, filter it with exclude globs, and push every file to
//! the configured bucket through an [`ObjectSink`].

// std
use std::fs;
// self
use crate::{_prelude::*, auth::StorageSession, error::UploadError};

/// Object store operations the upload helper needs.
///
/// Every call receives the storage session current at the time of the call; signing and
/// transport belong to the implementation.
pub trait ObjectSink {
	/// Returns whether `bucket/key` already exists.
	fn exists(&self, session: &StorageSession, bucket: &str, key: &str) -> Result<bool>;

	/// Uploads `file` to `bucket/key`, replacing any existing object.
	fn put_file(
		&self,
		session: &StorageSession,
		file: &Path,
		bucket: &str,
		key: &str,
	) -> Result<()>;
}

/// Upload tuning knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOptions {
	/// Glob patterns; files whose path matches any of them are skipped.
	pub exclude: Vec<String>,
	/// Replace objects that already exist. When `false`, existing keys are skipped.
	pub overwrite: bool,
}
impl UploadOptions {
	/// Adds an exclude pattern.
	pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
		self.exclude.push(pattern.into());

		self
	}

	/// Sets the overwrite policy.
	pub fn overwrite(mut self, overwrite: bool) -> Self {
		self.overwrite = overwrite;

		self
	}
}
impl Default for UploadOptions {
	fn default() -> Self {
		Self { exclude: Vec::new(), overwrite: true }
	}
}

/// Keys touched by one upload run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
	/// Keys written to the bucket.
	pub uploaded: Vec<String>,
	/// Keys left alone because they already existed.
	pub skipped: Vec<String>,
}

/// Lists every regular file below `dir`, skipping paths matched by any `exclude` pattern.
///
/// Results are sorted so uploads run in a stable order.
pub fn iter_files(dir: &Path, exclude: &[String]) -> Result<Vec<PathBuf>> {
	let mut files = Vec::new();

	walk(dir, &mut files)?;
	files.retain(|path| !exclude.iter().any(|pattern| path_matches(path, pattern)));
	files.sort();

	Ok(files)
}

/// Object key for `file`: the name of `root` followed by the file's `/`-separated path
/// relative to `root`.
pub fn object_key(file: &Path, root: &Path) -> Result<String> {
	let relative = file.strip_prefix(root).map_err(|_| UploadError::Walk {
		path: file.to_path_buf(),
		source: std::io::Error::other("file is outside the upload root"),
	})?;
	let root_name = match root.file_name() {
		Some(name) => name.to_string_lossy().into_owned(),
		None => root
			.canonicalize()
			.map_err(|source| UploadError::Walk { path: root.to_path_buf(), source })?
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_default(),
	};
	let relative = relative
		.components()
		.map(|component| component.as_os_str().to_string_lossy())
		.collect::<Vec<_>>()
		.join("/");

	Ok(format!("{root_name}/{relative}"))
}

/// Uploads `files` below `root` into `bucket`, asking `session` for credentials before each
/// file.
pub fn upload_files<S, F>(
	files: &[PathBuf],
	root: &Path,
	bucket: &str,
	sink: &S,
	options: &UploadOptions,
	mut session: F,
) -> Result<UploadReport>
where
	S: ?Sized + ObjectSink,
	F: FnMut() -> Result<StorageSession>,
{
	let mut report = UploadReport::default();

	for file in files {
		let key = object_key(file, root)?;
		let session = session()?;

		if !options.overwrite && sink.exists(&session, bucket, &key)? {
			#[cfg(feature = "tracing")]
			tracing::info!(file = %file.display(), bucket, key = %key, "object exists, skipping");

			report.skipped.push(key);

			continue;
		}

		#[cfg(feature = "tracing")]
		tracing::info!(file = %file.display(), bucket, key = %key, "uploading");

		sink.put_file(&session, file, bucket, &key)?;
		report.uploaded.push(key);
	}

	Ok(report)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
	let entries =
		fs::read_dir(dir).map_err(|source| UploadError::Walk { path: dir.to_path_buf(), source })?;

	for entry in entries {
		let entry = entry.map_err(|source| UploadError::Walk { path: dir.to_path_buf(), source })?;
		let path = entry.path();
		let file_type =
			entry.file_type().map_err(|source| UploadError::Walk { path: path.clone(), source })?;

		if file_type.is_dir() {
			walk(&path, files)?;
		} else if !path.is_dir() {
			files.push(path);
		}
	}

	Ok(())
}

/// Right-anchored path matching: a relative pattern matches the trailing components of the
/// path, an absolute pattern must match the whole path.
fn path_matches(path: &Path, pattern: &str) -> bool {
	let pattern_parts = pattern.split('/').filter(|part| !part.is_empty()).collect::<Vec<_>>();

	if pattern_parts.is_empty() {
		return false;
	}

	let path_parts = path
		.components()
		.filter_map(|component| match component {
			std::path::Component::Normal(part) => Some(part.to_string_lossy()),
			_ => None,
		})
		.collect::<Vec<_>>();

	if pattern.starts_with('/') {
		if !path.is_absolute() || path_parts.len() != pattern_parts.len() {
			return false;
		}
	} else if path_parts.len() < pattern_parts.len() {
		return false;
	}

	path_parts
		.iter()
		.rev()
		.zip(pattern_parts.iter().rev())
		.all(|(part, pattern)| fnmatch(part, pattern))
}

/// Shell-style matching of one path component: `*`, `?`, `[seq]`, and `[!seq]`.
fn fnmatch(name: &str, pattern: &str) -> bool {
	let name = name.chars().collect::<Vec<_>>();
	let pattern = pattern.chars().collect::<Vec<_>>();
	let (mut n, mut p) = (0, 0);
	// Last `*` position in the pattern and the name index it resumes from.
	let mut backtrack = None;

	while n < name.len() {
		match pattern.get(p) {
			Some('*') => {
				backtrack = Some((p, n));
				p += 1;

				continue;
			},
			Some('?') => {
				n += 1;
				p += 1;

				continue;
			},
			Some('[') =>
				if let Some((matched, next)) = match_class(&pattern, p, name[n]) {
					if matched {
						n += 1;
						p = next;

						continue;
					}
				} else if name[n] == '[' {
					n += 1;
					p += 1;

					continue;
				},
			Some(c) if *c == name[n] => {
				n += 1;
				p += 1;

				continue;
			},
			_ => {},
		}

		match backtrack {
			Some((star, resume)) => {
				p = star + 1;
				n = resume + 1;
				backtrack = Some((star, resume + 1));
			},
			None => return false,
		}
	}

	pattern[p..].iter().all(|c| *c == '*')
}

/// Matches `c` against the bracket expression opening at `pattern[start]`.
///
/// Returns the match result and the index after the closing `]`, or `None` when the bracket is
/// unterminated and must be read literally.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
	let mut i = start + 1;
	let negated = matches!(pattern.get(i), Some('!'));

	if negated {
		i += 1;
	}

	let mut matched = false;
	let mut first = true;

	loop {
		let current = *pattern.get(i)?;

		if current == ']' && !first {
			return Some((matched != negated, i + 1));
		}

		first = false;

		if pattern.get(i + 1) == Some(&'-') && pattern.get(i + 2).is_some_and(|end| *end != ']') {
			let end = pattern[i + 2];

			matched |= current <= c && c <= end;
			i += 3;
		} else {
			matched |= current == c;
			i += 1;
		}
	}
}
