//! Media discovery and the duration table.
//!
//! These are the only parts of the crate that touch the filesystem. Pools and the interpreter
//! consume plain path strings and a [`DurationTable`], so a schedule can be evaluated entirely
//! in memory (see [`StaticCatalog`]).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::foundation::error::{TelecastError, TelecastResult};

/// Extensions (lowercase, without the dot) considered playable.
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "webm", "mov", "png", "jpg", "jpeg"];

/// Duration assumed for items the table does not know (stills, bumpers).
pub const DEFAULT_ITEM_SECS: u64 = 60;

/// Resolves a pool's source reference to its candidate media paths.
pub trait MediaCatalog {
    fn candidates(&self, source: &str) -> TelecastResult<Vec<String>>;

    /// Directory that relative `file` statements are resolved against, if any.
    fn media_root(&self) -> Option<&Path> {
        None
    }
}

/// `path` joined onto `root`, unless it is absolute or there is no root.
pub fn resolve_file(root: Option<&Path>, path: &str) -> String {
    match root {
        Some(root) if !Path::new(path).is_absolute() => {
            root.join(path).to_string_lossy().into_owned()
        }
        _ => path.to_owned(),
    }
}

/// Walks `root/<source>` recursively for files with a [`MEDIA_EXTENSIONS`] extension.
#[derive(Clone, Debug)]
pub struct FsCatalog {
    root: PathBuf,
}

impl FsCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

impl MediaCatalog for FsCatalog {
    fn candidates(&self, source: &str) -> TelecastResult<Vec<String>> {
        let dir = self.root.join(source);
        if !dir.is_dir() {
            return Err(TelecastError::catalog(format!(
                "media source '{}' is not a directory",
                dir.display()
            )));
        }
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&dir).follow_links(true) {
            let entry = entry.map_err(|e| {
                TelecastError::catalog(format!("walk '{}': {e}", dir.display()))
            })?;
            if entry.file_type().is_file() && is_media_file(entry.path()) {
                out.push(entry.path().to_string_lossy().into_owned());
            }
        }
        out.sort();
        tracing::debug!(source, found = out.len(), "scanned media source");
        Ok(out)
    }

    fn media_root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// In-memory catalog keyed by source reference.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    sources: BTreeMap<String, Vec<String>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source<I, S>(mut self, source: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources
            .insert(source.into(), items.into_iter().map(Into::into).collect());
        self
    }
}

impl MediaCatalog for StaticCatalog {
    fn candidates(&self, source: &str) -> TelecastResult<Vec<String>> {
        Ok(self.sources.get(source).cloned().unwrap_or_default())
    }
}

/// Media path → duration in whole seconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DurationTable {
    secs: BTreeMap<String, u64>,
}

impl DurationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, secs: u64) {
        self.secs.insert(path.into(), secs);
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.secs.get(path).copied()
    }

    /// Known duration, or [`DEFAULT_ITEM_SECS`].
    pub fn duration_of(&self, path: &str) -> u64 {
        match self.get(path) {
            Some(secs) => secs,
            None => {
                tracing::debug!(path, default = DEFAULT_ITEM_SECS, "no duration; using default");
                DEFAULT_ITEM_SECS
            }
        }
    }

    pub fn len(&self) -> usize {
        self.secs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secs.is_empty()
    }

    /// Read a `file,duration` CSV. File names are joined onto `root` so keys match the paths
    /// produced by [`FsCatalog`].
    pub fn from_csv_reader<R: Read>(r: R, root: &Path) -> TelecastResult<Self> {
        let mut table = Self::new();
        let mut file_col = 0usize;
        let mut duration_col = 1usize;
        for (idx, line) in BufReader::new(r).lines().enumerate() {
            let line_no = idx + 1;
            let line =
                line.map_err(|e| TelecastError::catalog(format!("read durations: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_record(&line)
                .ok_or_else(|| TelecastError::catalog(format!("line {line_no}: bad quoting")))?;
            if idx == 0 {
                let pos = |name: &str| fields.iter().position(|f| f.trim() == name);
                if let (Some(f), Some(d)) = (pos("file"), pos("duration")) {
                    file_col = f;
                    duration_col = d;
                    continue;
                }
            }
            let (Some(file), Some(dur)) = (fields.get(file_col), fields.get(duration_col)) else {
                return Err(TelecastError::catalog(format!(
                    "line {line_no}: expected file and duration columns"
                )));
            };
            let secs = parse_secs(dur.trim()).ok_or_else(|| {
                TelecastError::catalog(format!("line {line_no}: invalid duration '{dur}'"))
            })?;
            table.insert(root.join(file).to_string_lossy().into_owned(), secs);
        }
        Ok(table)
    }

    pub fn from_csv_path(path: impl AsRef<Path>, root: &Path) -> TelecastResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            TelecastError::catalog(format!("open durations '{}': {e}", path.display()))
        })?;
        Self::from_csv_reader(f, root)
    }
}

impl FromIterator<(String, u64)> for DurationTable {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        Self {
            secs: iter.into_iter().collect(),
        }
    }
}

/// Whole seconds; fractional values (some probes emit them) are truncated.
fn parse_secs(s: &str) -> Option<u64> {
    if let Ok(v) = s.parse::<u64>() {
        return Some(v);
    }
    let v: f64 = s.parse().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v as u64)
}

/// RFC 4180-style field split (quoted fields, `""` escapes). `None` on an unterminated quote.
fn split_csv_record(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') => {
                if chars.peek() == Some(&'"') {
                    cur.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            }
            (false, '"') if cur.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    if quoted {
        return None;
    }
    fields.push(cur);
    Some(fields)
}
