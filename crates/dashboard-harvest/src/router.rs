//! File router: match settled downloads to widgets and file them.
//!
//! Each accepted file is re-fingerprinted from its own header row with the
//! same normalizer the snapshot used. Matches move to
//! `<output_root>/<dashboard>/<widget>.<ext>`; anything unmatched is deleted
//! so unidentified data never piles up. A file that cannot be read is left
//! where it is and the rest of the batch carries on.

use crate::snapshot::SchemaMap;
use crate::signature::{Signature, SignatureNormalizer};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// A file moved into the output tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub widget: String,
}

/// A file whose signature matched no widget; it has been deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedFile {
    pub path: PathBuf,
    pub signature: Option<Signature>,
}

/// A file that could not be processed; it was left in staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// What happened to each file of one routing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteReport {
    pub matched: Vec<MatchedFile>,
    pub unmatched: Vec<UnmatchedFile>,
    pub failed: Vec<FailedFile>,
}

impl RouteReport {
    pub fn considered(&self) -> usize {
        self.matched.len() + self.unmatched.len() + self.failed.len()
    }
}

/// Routes staged downloads into the output tree.
#[derive(Debug, Clone)]
pub struct FileRouter {
    output_root: PathBuf,
    accepted_extensions: Vec<String>,
    normalizer: SignatureNormalizer,
}

impl FileRouter {
    pub fn new(
        output_root: PathBuf,
        accepted_extensions: &[String],
        normalizer: SignatureNormalizer,
    ) -> Self {
        Self {
            output_root,
            accepted_extensions: accepted_extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            normalizer,
        }
    }

    /// The lower-cased extension of `path` if the router accepts it.
    fn accepted_extension(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.accepted_extensions.contains(&ext).then_some(ext)
    }

    /// Route every accepted file in `staging` against `schema`.
    ///
    /// Files are handled in name order so that last-write-wins collisions are
    /// deterministic. Only a failure to list `staging` itself is an error.
    pub fn route(&self, staging: &Path, schema: &SchemaMap, dashboard: &str) -> io::Result<RouteReport> {
        let mut files: Vec<PathBuf> = fs::read_dir(staging)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        files.sort();

        let mut report = RouteReport::default();
        for path in files {
            let Some(ext) = self.accepted_extension(&path) else {
                continue;
            };
            match self.route_file(&path, &ext, schema, dashboard) {
                Ok(Routed::Matched(m)) => {
                    info!("{} -> {}", path.display(), m.destination.display());
                    report.matched.push(m);
                }
                Ok(Routed::Unmatched(u)) => {
                    warn!(
                        "no widget on {dashboard} matches {} (signature: {}); deleted",
                        path.display(),
                        u.signature.as_ref().map(Signature::as_str).unwrap_or("<empty>")
                    );
                    report.unmatched.push(u);
                }
                Err(e) => {
                    error!("skipping {}: {e:#}", path.display());
                    report.failed.push(FailedFile {
                        path,
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        info!(
            "routed {dashboard}: {} matched, {} unmatched, {} failed",
            report.matched.len(),
            report.unmatched.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn route_file(&self, path: &Path, ext: &str, schema: &SchemaMap, dashboard: &str) -> Result<Routed> {
        let headers = read_header_row(path, ext)?;
        let signature = headers.and_then(|h| self.normalizer.signature(&h));

        let Some(widget) = signature.as_ref().and_then(|s| schema.get(s)) else {
            fs::remove_file(path).with_context(|| format!("failed to delete {}", path.display()))?;
            return Ok(Routed::Unmatched(UnmatchedFile {
                path: path.to_path_buf(),
                signature,
            }));
        };

        let dir = self.output_root.join(dashboard);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let destination = dir.join(format!("{widget}.{ext}"));
        move_file(path, &destination)?;

        Ok(Routed::Matched(MatchedFile {
            source: path.to_path_buf(),
            destination,
            widget: widget.to_string(),
        }))
    }
}

enum Routed {
    Matched(MatchedFile),
    Unmatched(UnmatchedFile),
}

/// Read just the first record of a delimited file.
///
/// Returns `Ok(None)` for an empty file.
pub fn read_header_row(path: &Path, ext: &str) -> Result<Option<Vec<String>>> {
    let delimiter = if ext == "tsv" { b'\t' } else { b',' };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut record = csv::StringRecord::new();
    let found = reader
        .read_record(&mut record)
        .with_context(|| format!("failed to read header row of {}", path.display()))?;
    Ok(found.then(|| record.iter().map(str::to_string).collect()))
}

/// Move `from` to `to`, replacing whatever is at `to`.
///
/// An existing destination survives any failure.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems; copy next to the target, then swap.
    let name = to.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let partial = to.with_file_name(format!(".{name}.partial"));
    let swapped = fs::copy(from, &partial)
        .with_context(|| format!("failed to copy {} to {}", from.display(), partial.display()))
        .and_then(|_| {
            fs::rename(&partial, to).with_context(|| format!("failed to replace {}", to.display()))
        });
    if let Err(e) = swapped {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::remove_file(from).with_context(|| format!("failed to delete {}", from.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Schema map from `("Col,Col", "Widget")` pairs.
    fn schema(n: &SignatureNormalizer, entries: &[(&str, &str)]) -> SchemaMap {
        let mut map = SchemaMap::new();
        for (headers, widget) in entries {
            map.insert(n.signature(headers.split(',')).unwrap(), widget.to_string());
        }
        map
    }

    fn router(out: &Path) -> FileRouter {
        FileRouter::new(
            out.to_path_buf(),
            &["csv".to_string(), "TSV".to_string()],
            SignatureNormalizer::default(),
        )
    }

    #[test]
    fn test_read_header_row_handles_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        fs::write(&path, "\"Name, Full\",Price\nx,1\n").unwrap();
        let headers = read_header_row(&path, "csv").unwrap().unwrap();
        assert_eq!(headers, vec!["Name, Full", "Price"]);
    }

    #[test]
    fn test_read_header_row_tsv_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("a.tsv");
        fs::write(&tsv, "A\tB\n1\t2\n").unwrap();
        assert_eq!(read_header_row(&tsv, "tsv").unwrap().unwrap(), vec!["A", "B"]);
        let empty = dir.path().join("e.csv");
        fs::write(&empty, "").unwrap();
        assert_eq!(read_header_row(&empty, "csv").unwrap(), None);
    }

    #[test]
    fn test_routes_two_matches_and_empties_staging() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let n = SignatureNormalizer::default();
        let map = schema(&n, &[("Symbol,Price", "Gainers"), ("Symbol,Volume", "Volume")]);
        fs::write(staging.path().join("dl (1).csv"), "Symbol,Price\nABC,10\n").unwrap();
        fs::write(staging.path().join("dl (2).csv"), "Symbol,Volume\nABC,900\n").unwrap();

        let report = router(out.path()).route(staging.path(), &map, "Board").unwrap();

        assert_eq!(report.matched.len(), 2);
        assert!(out.path().join("Board/Gainers.csv").is_file());
        assert!(out.path().join("Board/Volume.csv").is_file());
        assert_eq!(fs::read_dir(out.path().join("Board")).unwrap().count(), 2);
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unmatched_file_is_deleted() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let n = SignatureNormalizer::default();
        let map = schema(&n, &[("Symbol,Price", "Gainers")]);
        fs::write(staging.path().join("mystery.csv"), "Foo,Bar\n1,2\n").unwrap();

        let report = router(out.path()).route(staging.path(), &map, "Board").unwrap();

        assert!(report.matched.is_empty());
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].signature.as_ref().unwrap().as_str(), "Foo,Bar");
        assert!(!staging.path().join("mystery.csv").exists());
        assert!(!out.path().join("Board").exists());
    }

    #[test]
    fn test_empty_file_is_unmatched() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(staging.path().join("empty.csv"), "").unwrap();
        let report = router(out.path())
            .route(staging.path(), &SchemaMap::new(), "Board")
            .unwrap();
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].signature, None);
    }

    #[test]
    fn test_other_extensions_untouched() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(staging.path().join("chart.png"), "png").unwrap();
        fs::write(staging.path().join("half.csv.crdownload"), "Symbol").unwrap();
        let report = router(out.path())
            .route(staging.path(), &SchemaMap::new(), "Board")
            .unwrap();
        assert_eq!(report.considered(), 0);
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_same_signature_last_file_wins() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let n = SignatureNormalizer::default();
        let map = schema(&n, &[("Symbol", "List")]);
        fs::write(staging.path().join("a.csv"), "Symbol\nFIRST\n").unwrap();
        fs::write(staging.path().join("b.csv"), "Symbol\nSECOND\n").unwrap();

        let report = router(out.path()).route(staging.path(), &map, "Board").unwrap();

        assert_eq!(report.matched.len(), 2);
        let content = fs::read_to_string(out.path().join("Board/List.csv")).unwrap();
        assert!(content.contains("SECOND"));
    }

    #[test]
    fn test_failed_move_keeps_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let previous = dir.path().join("List.csv");
        fs::write(&previous, "Symbol\nGOOD\n").unwrap();

        let result = move_file(&dir.path().join("vanished.csv"), &previous);

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&previous).unwrap(), "Symbol\nGOOD\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_uppercase_extension_is_lowercased() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let n = SignatureNormalizer::default();
        let map = schema(&n, &[("A,B", "Tab")]);
        fs::write(staging.path().join("x.TSV"), "A\tB\n").unwrap();
        let report = router(out.path()).route(staging.path(), &map, "Board").unwrap();
        assert_eq!(report.matched[0].destination, out.path().join("Board/Tab.tsv"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_isolated() {
        use std::os::unix::fs::PermissionsExt;

        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let n = SignatureNormalizer::default();
        let map = schema(&n, &[("Symbol", "List")]);
        let locked = staging.path().join("a.csv");
        fs::write(&locked, "Symbol\n").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        fs::write(staging.path().join("b.csv"), "Symbol\nOK\n").unwrap();

        let report = router(out.path()).route(staging.path(), &map, "Board").unwrap();

        // Root can read anything; only assert isolation when the open failed.
        if !report.failed.is_empty() {
            assert_eq!(report.failed[0].path, locked);
            assert!(locked.exists());
        }
        assert!(out.path().join("Board/List.csv").is_file());
        assert!(report.matched.iter().any(|m| m.source.ends_with("b.csv")));
    }
}
