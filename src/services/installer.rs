use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::errors::{LauncherError, Result};
use crate::services::downloader::ProgressSink;

#[cfg(unix)]
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Joins `name` onto `root` lexically, refusing anything that would land
/// outside of `root`.
pub fn resolve_entry_path(root: &Path, name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(LauncherError::InvalidArchive(format!(
                        "entry escapes destination: {name}"
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(LauncherError::InvalidArchive(format!(
                    "absolute entry path: {name}"
                )));
            }
        }
    }
    if parts.is_empty() {
        return Err(LauncherError::InvalidArchive(format!("empty entry path: {name:?}")));
    }
    let mut out = root.to_path_buf();
    out.extend(parts);
    Ok(out)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>, is_dir: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permission_bits = mode.map(|value| value & 0o7777);
    let resolved = if is_dir {
        match permission_bits {
            // An owner who cannot enter the directory makes it useless.
            Some(bits) if bits & 0o700 == 0o700 => bits,
            _ => DEFAULT_DIR_MODE,
        }
    } else {
        match permission_bits {
            Some(bits) if bits != 0 => bits,
            _ => return Ok(()),
        }
    };
    fs::set_permissions(path, fs::Permissions::from_mode(resolved)).map_err(|err| {
        LauncherError::Filesystem(format!(
            "failed to set permissions {:o} on {}: {}",
            resolved,
            path.display(),
            err
        ))
    })
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>, _is_dir: bool) -> Result<()> {
    Ok(())
}

/// Extracts every entry of `archive_path` below `dest_root`.
///
/// All entry names are validated before anything is written; the first I/O
/// failure aborts the rest. Returns the number of entries processed.
pub fn extract_zip(
    archive_path: &Path,
    dest_root: &Path,
    label: &str,
    sink: &dyn ProgressSink,
) -> Result<usize> {
    let file = File::open(archive_path).map_err(|err| {
        LauncherError::Filesystem(format!("cannot open {}: {}", archive_path.display(), err))
    })?;
    let mut archive = ZipArchive::new(file)?;
    let total = archive.len();

    let mut targets = Vec::with_capacity(total);
    for index in 0..total {
        let entry = archive.by_index(index)?;
        targets.push(resolve_entry_path(dest_root, entry.name())?);
    }

    fs::create_dir_all(dest_root).map_err(|err| {
        LauncherError::Filesystem(format!("cannot create {}: {}", dest_root.display(), err))
    })?;

    let mut last_percent = None;
    for (index, out_path) in targets.into_iter().enumerate() {
        let mut entry = archive.by_index(index)?;
        let mode = entry.unix_mode();

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            apply_mode(&out_path, mode, true)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            // A previous install may have left a read-only file here.
            match fs::remove_file(&out_path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(LauncherError::Filesystem(format!(
                        "cannot replace {}: {}",
                        out_path.display(),
                        err
                    )))
                }
            }
            let mut out_file = File::create(&out_path)?;
            io::copy(&mut entry, &mut out_file)?;
            drop(out_file);
            apply_mode(&out_path, mode, false)?;
        }

        let percent = (index + 1) * 100 / total.max(1);
        if last_percent != Some(percent) {
            last_percent = Some(percent);
            sink.report(format!("Installing {label}: {percent}%"));
        }
    }

    tracing::info!(
        "extracted {} entries from {} into {}",
        total,
        archive_path.display(),
        dest_root.display()
    );
    Ok(total)
}
