//! Metadata relocation inside the staging tree.
//!
//! Each release ships a manifest and a readme at the top of the download
//! area. Consumers expect them under `docs/<family>/`, so they are renamed
//! into place once archives have been expanded.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::io::Write;

use crate::output::write_stderr_line;
use crate::release::Release;

/// Errors raised while relocating metadata files.
#[derive(Debug, thiserror::Error)]
pub enum RelocationError {
    /// One or more required files are absent; nothing was moved.
    #[error("release is missing required metadata: {}", .files.join(", "))]
    Missing {
        /// Names of the missing files.
        files: Vec<String>,
    },

    /// A rename failed.
    #[error("could not move {from} to {to}: {source}{}", moved_note(.already_moved))]
    Move {
        /// Source path.
        from: Utf8PathBuf,
        /// Destination path.
        to: Utf8PathBuf,
        /// Files relocated before the failure.
        already_moved: Vec<String>,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn moved_note(already_moved: &[String]) -> String {
    if already_moved.is_empty() {
        String::new()
    } else {
        format!(" (already moved: {})", already_moved.join(", "))
    }
}

/// One file to move: its name at the staging root and its destination
/// directory relative to the staging root.
struct Relocation {
    filename: String,
    dest_dir: Utf8PathBuf,
}

fn relocations(release: &Release) -> [Relocation; 2] {
    [
        Relocation {
            filename: release.manifest_filename(),
            dest_dir: release.manifests_dir(),
        },
        Relocation {
            filename: release.readme_filename(),
            dest_dir: release.docs_dir(),
        },
    ]
}

/// Move the manifest and readme into their canonical subdirectories.
///
/// Both files are checked before either moves, so a missing file leaves the
/// tree untouched. Destination directories are created when absent.
///
/// # Errors
///
/// Returns [`RelocationError::Missing`] listing every absent file, or
/// [`RelocationError::Move`] when a rename fails, naming any file already
/// moved.
pub fn relocate_metadata(
    staging_dir: &Utf8Path,
    release: &Release,
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<Vec<Utf8PathBuf>, RelocationError> {
    let plan = relocations(release);

    let missing: Vec<String> = plan
        .iter()
        .filter(|r| !staging_dir.join(&r.filename).is_file())
        .map(|r| r.filename.clone())
        .collect();
    if !missing.is_empty() {
        return Err(RelocationError::Missing { files: missing });
    }

    let mut moved = Vec::with_capacity(plan.len());
    let mut moved_names = Vec::with_capacity(plan.len());
    for relocation in &plan {
        let from = staging_dir.join(&relocation.filename);
        let dest_dir = staging_dir.join(&relocation.dest_dir);
        let to = dest_dir.join(&relocation.filename);
        if !quiet {
            write_stderr_line(stderr, format!("Moving {} into {dest_dir}", relocation.filename));
        }

        let result = std::fs::create_dir_all(&dest_dir).and_then(|()| std::fs::rename(&from, &to));
        if let Err(source) = result {
            return Err(RelocationError::Move {
                from,
                to,
                already_moved: moved_names,
                source,
            });
        }
        debug!("relocated {from} to {to}");
        moved_names.push(relocation.filename.clone());
        moved.push(to);
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::{ArchiveFamily, ReleaseLayout, ReleaseVersion};
    use rstest::{fixture, rstest};

    struct Staging {
        _temp: tempfile::TempDir,
        dir: Utf8PathBuf,
        release: Release,
    }

    #[fixture]
    fn staging() -> Staging {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        let layout = ReleaseLayout {
            family: ArchiveFamily::try_from("fam").expect("family"),
            staging_root: root.join("staging"),
            public_root: root.join("public"),
            data_subdir: "data".to_owned(),
            readme_prefix: "caldb".to_owned(),
        };
        let release = layout.release(ReleaseVersion::try_from("1.0").expect("version"));
        let dir = release.staging_path();
        std::fs::create_dir_all(&dir).expect("staging dir");
        Staging {
            _temp: temp,
            dir,
            release,
        }
    }

    fn touch(path: &Utf8Path) {
        std::fs::write(path, path.as_str()).expect("write");
    }

    #[rstest]
    fn moves_both_files_into_docs_tree(staging: Staging) {
        touch(&staging.dir.join("MANIFEST_1.0_main.txt"));
        touch(&staging.dir.join("README_caldb1.0.txt"));

        let mut stderr = Vec::new();
        let moved = relocate_metadata(&staging.dir, &staging.release, true, &mut stderr)
            .expect("relocate");

        assert_eq!(
            moved,
            vec![
                staging.dir.join("docs/fam/manifests/MANIFEST_1.0_main.txt"),
                staging.dir.join("docs/fam/README_caldb1.0.txt"),
            ]
        );
        assert!(moved.iter().all(|p| p.is_file()));
        assert!(!staging.dir.join("MANIFEST_1.0_main.txt").exists());
        assert!(!staging.dir.join("README_caldb1.0.txt").exists());
    }

    #[rstest]
    fn missing_readme_moves_nothing(staging: Staging) {
        touch(&staging.dir.join("MANIFEST_1.0_main.txt"));

        let mut stderr = Vec::new();
        let err = relocate_metadata(&staging.dir, &staging.release, true, &mut stderr)
            .expect_err("readme missing");

        match err {
            RelocationError::Missing { files } => assert_eq!(files, vec!["README_caldb1.0.txt"]),
            other => panic!("expected Missing, got {other:?}"),
        }
        assert!(staging.dir.join("MANIFEST_1.0_main.txt").is_file());
        assert!(!staging.dir.join("docs").exists());
    }

    #[rstest]
    fn missing_both_lists_both(staging: Staging) {
        let mut stderr = Vec::new();
        let err = relocate_metadata(&staging.dir, &staging.release, true, &mut stderr)
            .expect_err("both missing");
        let message = err.to_string();
        assert!(message.contains("MANIFEST_1.0_main.txt"));
        assert!(message.contains("README_caldb1.0.txt"));
    }

    #[rstest]
    fn failed_second_move_reports_the_first(staging: Staging) {
        touch(&staging.dir.join("MANIFEST_1.0_main.txt"));
        touch(&staging.dir.join("README_caldb1.0.txt"));
        // A non-empty directory at the readme destination makes its rename fail.
        std::fs::create_dir_all(staging.dir.join("docs/fam/README_caldb1.0.txt/occupied"))
            .expect("blocker");

        let mut stderr = Vec::new();
        let err = relocate_metadata(&staging.dir, &staging.release, true, &mut stderr)
            .expect_err("second move fails");

        match err {
            RelocationError::Move { already_moved, .. } => {
                assert_eq!(already_moved, vec!["MANIFEST_1.0_main.txt"]);
            }
            other => panic!("expected Move, got {other:?}"),
        }
    }
}
