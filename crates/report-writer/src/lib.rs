//! Writes a rendered report to a fresh file. An existing file at the
//! target is never touched, and a failed write leaves nothing behind.

use report::{Report, ReportFormat};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("report target already exists: {}", .0.display())]
    TargetAlreadyExists(PathBuf),
    #[error("could not write report to {}: {source}", .path.display())]
    WriteIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Cheap early check so a run can refuse before doing any probing. The
/// exclusive create in `write_with` is still what guarantees no overwrite.
pub fn preflight(target: &Path) -> Result<(), WriteError> {
    match fs::symlink_metadata(target) {
        Ok(_) => Err(WriteError::TargetAlreadyExists(target.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(WriteError::WriteIo { path: target.to_path_buf(), source }),
    }
}

pub fn write_report(report: &Report, format: ReportFormat, target: &Path) -> Result<(), WriteError> {
    write_with(target, |w| report.render(format, w))?;
    tracing::info!(path = %target.display(), ?format, facts = report.facts().len(), "report written");
    Ok(())
}

pub fn write_with<F>(target: &Path, body: F) -> Result<(), WriteError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let file = match OpenOptions::new().write(true).create_new(true).open(target) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(WriteError::TargetAlreadyExists(target.to_path_buf()));
        }
        Err(source) => return Err(WriteError::WriteIo { path: target.to_path_buf(), source }),
    };

    if let Err(source) = fill(file, body) {
        // the file is ours; don't leave a truncated report behind
        if let Err(e) = fs::remove_file(target) {
            tracing::warn!(path = %target.display(), error = %e, "could not remove partial report");
        }
        return Err(WriteError::WriteIo { path: target.to_path_buf(), source });
    }
    Ok(())
}

fn fill<F>(file: File, body: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let mut w = BufWriter::new(file);
    body(&mut w)?;
    let file = w.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mididiag_core::{Fact, FactCategory, LoopbackVerdict};
    use redaction::RedactionFilter;
    use report::{ReportAssembler, ReportHeader};

    fn sample() -> Report {
        let f = RedactionFilter::new([1u8; 16]);
        let header = ReportHeader { tool: "mididiag".into(), version: "0.1.0".into(), generated_at: "t".into() };
        ReportAssembler::new(&f, header).assemble(
            vec![Fact::public(FactCategory::OsInfo, "os.name", "linux")],
            vec![],
            vec![],
            vec![LoopbackVerdict::skipped("a")],
        )
    }

    #[test]
    fn writes_a_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.json");
        preflight(&target).unwrap();
        write_report(&sample(), ReportFormat::Json, &target).unwrap();
        let body = fs::read_to_string(&target).unwrap();
        assert!(body.contains("\"os.name\""));
    }

    #[test]
    fn never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.txt");
        fs::write(&target, "keep me").unwrap();

        assert!(matches!(preflight(&target), Err(WriteError::TargetAlreadyExists(_))));
        let err = write_report(&sample(), ReportFormat::Text, &target).unwrap_err();
        assert!(matches!(err, WriteError::TargetAlreadyExists(p) if p == target));
        assert_eq!(fs::read_to_string(&target).unwrap(), "keep me");
    }

    #[test]
    fn second_write_to_same_target_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("r.txt");
        write_report(&sample(), ReportFormat::Text, &target).unwrap();
        let first = fs::read_to_string(&target).unwrap();
        assert!(write_report(&sample(), ReportFormat::Json, &target).is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), first);
    }

    #[test]
    fn failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("r.txt");
        let err = write_with(&target, |w| {
            w.write_all(b"half a rep")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk went away"))
        })
        .unwrap_err();
        assert!(matches!(err, WriteError::WriteIo { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nope").join("r.txt");
        assert!(preflight(&target).is_ok());
        let err = write_report(&sample(), ReportFormat::Text, &target).unwrap_err();
        assert!(matches!(err, WriteError::WriteIo { .. }));
    }
}
