use anyhow::{anyhow, Context, Result};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved(PathBuf),
    Vanished,
}

/// Moves `source` into `target_dir`, keeping its file name.
///
/// The destination is claimed with a hard link, which fails if the name is
/// taken, so two files with the same name never replace each other. Falls
/// back to copy and delete when linking is not possible, e.g. across
/// filesystems.
pub async fn move_into_dir(source: &Path, target_dir: &Path) -> Result<MoveOutcome> {
    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow!("Cannot move {}: no file name", source.display()))?;
    let destination = target_dir.join(file_name);

    match fs::hard_link(source, &destination).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            if is_same_file(source, &destination).await {
                return Ok(MoveOutcome::Moved(destination));
            }
            return Err(anyhow!(
                "Destination path {} already exists",
                destination.display()
            ));
        }
        Err(e) if needs_copy(&e) => {
            log::debug!(
                "Cannot link {} into {} ({e}), copying",
                source.display(),
                target_dir.display()
            );
            return copy_then_remove(source, &destination).await;
        }
        Err(e) if e.kind() == ErrorKind::NotFound && !source_exists(source).await => {
            return Ok(MoveOutcome::Vanished);
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!(
                    "Failed to move {} to {}",
                    source.display(),
                    destination.display()
                )
            })
        }
    }

    remove_source(source).await?;
    Ok(MoveOutcome::Moved(destination))
}

/// Link failures that a plain copy can work around.
fn needs_copy(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EXDEV) | Some(libc::EPERM) | Some(libc::EOPNOTSUPP) | Some(libc::EMLINK)
    )
}

async fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn source_exists(source: &Path) -> bool {
    fs::try_exists(source).await.unwrap_or(true)
}

async fn remove_source(source: &Path) -> Result<()> {
    match fs::remove_file(source).await {
        Ok(()) => Ok(()),
        // Someone else already removed it; the new name is in place.
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => {
            Err(e).with_context(|| format!("Moved but failed to remove {}", source.display()))
        }
    }
}

/// Copies into a uniquely named staging file next to `destination`, puts
/// it in place without replacing anything and then removes `source`.
pub async fn copy_then_remove(source: &Path, destination: &Path) -> Result<MoveOutcome> {
    let target_dir = destination
        .parent()
        .ok_or_else(|| anyhow!("Invalid destination {}", destination.display()))?
        .to_path_buf();

    let copied = {
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || copy_no_clobber(&source, &target_dir, &destination))
            .await
            .context("Copy task panicked")??
    };
    if !copied {
        return Ok(MoveOutcome::Vanished);
    }

    remove_source(source).await?;
    Ok(MoveOutcome::Moved(destination.to_path_buf()))
}

/// Returns `false` if `source` is gone.
fn copy_no_clobber(source: &Path, target_dir: &Path, destination: &Path) -> Result<bool> {
    let mut input = match std::fs::File::open(source) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", source.display())),
    };

    let mut staging = tempfile::Builder::new()
        .prefix(".rspamd-move")
        .tempfile_in(target_dir)
        .with_context(|| format!("Failed to create staging file in {}", target_dir.display()))?;
    io::copy(&mut input, staging.as_file_mut())
        .with_context(|| format!("Failed to copy {}", source.display()))?;
    let permissions = input.metadata()?.permissions();
    staging.as_file().set_permissions(permissions)?;
    staging.as_file().sync_all()?;

    // A dropped staging file removes itself.
    staging
        .persist_noclobber(destination)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    Ok(true)
}
