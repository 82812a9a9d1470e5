//! Path resolution.
//!
//! Walks `/`-separated components from the root or the caller's working
//! directory. Symlinks met as non-final components always expand; the
//! final component expands or not at the caller's choice. One traversal
//! budget of eight expansions covers the whole resolution, which
//! disposes of cycles and over-deep chains alike.

use crate::dir::Dir;
use crate::fs::FsContext;
use crate::inode::Inode;
use crate::prelude::*;

/// Symlink expansions allowed per resolution.
pub(crate) const SYMLINK_MAX_DEPTH: usize = 8;

/// Whether to expand a symlink in the final component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FollowFinal {
    Yes,
    No,
}

/// Resolves `path` to an inode.
pub(crate) fn resolve(
    ctx: &Arc<FsContext>,
    root: &Arc<Inode>,
    cwd: &Arc<Inode>,
    path: &str,
    follow_final: FollowFinal,
) -> Result<Arc<Inode>> {
    let mut budget = SYMLINK_MAX_DEPTH;
    resolve_bounded(ctx, root, cwd, path, follow_final, &mut budget)
}

/// Resolves everything but the last component of `path`, returning the
/// parent directory and the final name. The parent portion follows
/// symlinks; the final name is untouched.
pub(crate) fn resolve_parent(
    ctx: &Arc<FsContext>,
    root: &Arc<Inode>,
    cwd: &Arc<Inode>,
    path: &str,
) -> Result<(Dir, String)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return_errno_with_message!(Errno::InvalidArgs, "path has no final component");
    }
    let (dir_part, name) = match trimmed.rfind('/') {
        Some(split) => (&trimmed[..split + 1], &trimmed[split + 1..]),
        None => ("", trimmed),
    };
    if name == "." || name == ".." {
        return_errno_with_message!(Errno::InvalidArgs, "cannot target . or ..");
    }
    let parent = if dir_part.is_empty() {
        cwd.clone()
    } else {
        resolve(ctx, root, cwd, dir_part, FollowFinal::Yes)?
    };
    Ok((Dir::new(parent)?, name.to_string()))
}

fn resolve_bounded(
    ctx: &Arc<FsContext>,
    root: &Arc<Inode>,
    start: &Arc<Inode>,
    path: &str,
    follow_final: FollowFinal,
    budget: &mut usize,
) -> Result<Arc<Inode>> {
    if path.is_empty() {
        return_errno_with_message!(Errno::InvalidArgs, "empty path");
    }
    let mut current = if path.starts_with('/') {
        root.clone()
    } else {
        start.clone()
    };

    let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
    while let Some(name) = components.next() {
        let is_final = components.peek().is_none();
        if name == "." {
            if !current.is_dir() {
                return_errno!(Errno::NotDir);
            }
            continue;
        }
        let dir = Dir::new(current.clone())?;
        let sector = dir.lookup(name)?;
        let node = ctx.inodes.open(ctx, sector);

        if node.is_symlink() && (!is_final || follow_final == FollowFinal::Yes) {
            if *budget == 0 {
                return_errno_with_message!(Errno::SymlinkLoop, "too many symlink expansions");
            }
            *budget -= 1;
            let target = node.symlink_target()?;
            // The expansion itself always follows: a chain met mid-path
            // must land on a real inode before the walk continues.
            current = resolve_bounded(ctx, root, &current, &target, FollowFinal::Yes, budget)?;
        } else {
            current = node;
        }
    }
    Ok(current)
}
