//! Translates an absolute path to an inode number within the single-level
//! root directory namespace (§4.4).

use crate::disk::DirEntry;
use crate::error::{VsfsError, VsfsResult};
use crate::layout::{BLOCK_SIZE, ROOT_INO};
use crate::mount::MountContext;

/// Resolve `path` to an inode number.
///
/// `/` always resolves to [`ROOT_INO`]. `/name` resolves to whatever used
/// entry of the root directory block has that name. Every other shape
/// fails with [`VsfsError::NotAbsolute`] (missing leading `/`) or
/// [`VsfsError::NotFound`] (no matching entry).
pub fn resolve(ctx: &MountContext<'_>, path: &str) -> VsfsResult<u32> {
    if !path.starts_with('/') {
        return Err(VsfsError::NotAbsolute);
    }
    if path == "/" {
        return Ok(ROOT_INO);
    }

    let name = &path[1..];
    let root = ctx.read_inode(ROOT_INO);
    let block = ctx.data_block(root.direct[0]);
    let entries = BLOCK_SIZE / DirEntry::RECORD_SIZE;
    for i in 0..entries {
        let start = i * DirEntry::RECORD_SIZE;
        let entry = DirEntry::decode(&block[start..start + DirEntry::RECORD_SIZE]);
        if entry.is_used() && entry.name_str() == name {
            return Ok(entry.inode);
        }
    }
    Err(VsfsError::NotFound)
}

/// Find the data-block byte offset of the first unused slot in the root
/// directory, or `None` if every slot is in use.
pub fn first_free_slot(ctx: &MountContext<'_>) -> Option<usize> {
    let root = ctx.read_inode(ROOT_INO);
    let block = ctx.data_block(root.direct[0]);
    let entries = BLOCK_SIZE / DirEntry::RECORD_SIZE;
    (0..entries)
        .map(|i| i * DirEntry::RECORD_SIZE)
        .find(|&start| !DirEntry::decode(&block[start..start + DirEntry::RECORD_SIZE]).is_used())
}

/// Find the data-block byte offset of the entry named `name`, or `None`.
pub fn find_slot(ctx: &MountContext<'_>, name: &str) -> Option<usize> {
    let root = ctx.read_inode(ROOT_INO);
    let block = ctx.data_block(root.direct[0]);
    let entries = BLOCK_SIZE / DirEntry::RECORD_SIZE;
    (0..entries)
        .map(|i| i * DirEntry::RECORD_SIZE)
        .find(|&start| {
            let e = DirEntry::decode(&block[start..start + DirEntry::RECORD_SIZE]);
            e.is_used() && e.name_str() == name
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::{format, FormatOptions};

    fn mounted(blocks: u32, inodes: u32) -> Vec<u8> {
        let mut image = vec![0u8; blocks as usize * BLOCK_SIZE];
        format(
            &mut image,
            FormatOptions {
                num_inodes: inodes,
                force: false,
                zero: false,
            },
        )
        .unwrap();
        image
    }

    #[test]
    fn root_resolves_to_root_ino() {
        let mut image = mounted(64, 16);
        let ctx = MountContext::mount(&mut image).unwrap();
        assert_eq!(resolve(&ctx, "/").unwrap(), ROOT_INO);
    }

    #[test]
    fn relative_path_is_rejected() {
        let mut image = mounted(64, 16);
        let ctx = MountContext::mount(&mut image).unwrap();
        assert_eq!(resolve(&ctx, "hello").unwrap_err(), VsfsError::NotAbsolute);
    }

    #[test]
    fn missing_name_is_not_found() {
        let mut image = mounted(64, 16);
        let ctx = MountContext::mount(&mut image).unwrap();
        assert_eq!(
            resolve(&ctx, "/missing").unwrap_err(),
            VsfsError::NotFound
        );
    }

    #[test]
    fn first_free_slot_skips_dot_and_dotdot() {
        let mut image = mounted(64, 16);
        let ctx = MountContext::mount(&mut image).unwrap();
        let slot = first_free_slot(&ctx).unwrap();
        assert_eq!(slot / DirEntry::RECORD_SIZE, 2);
    }
}
