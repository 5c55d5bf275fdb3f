//! The operations engine (§4.5): translates POSIX-style calls into
//! block-level and bitmap-level mutations while preserving every structural
//! invariant in §3. Every operation here takes the mount context explicitly
//! as its first argument rather than reaching for an ambient "current
//! context" — the host adapter is responsible for handing the right context
//! to the right call.

use log::{debug, warn};

use crate::disk::{DirEntry, Inode, S_IFDIR, S_IFREG};
use crate::error::{VsfsError, VsfsResult};
use crate::layout::{self, BLOCK_SIZE, MAX_FILE_BLOCKS, NAME_MAX, NUM_DIRECT, PATH_MAX, ROOT_INO};
use crate::mount::MountContext;
use crate::path;

/// Result of `statfs`, matching the fields the spec requires (§4.5,
/// "statfs"). Never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u32,
    pub blocks: u32,
    pub blocks_free: u32,
    pub blocks_avail: u32,
    pub files: u32,
    pub files_free: u32,
    pub files_avail: u32,
    pub name_max: u32,
}

/// Result of `getattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    /// Block count expressed in 512-byte sectors, the unit `struct stat`
    /// uses for `st_blocks` regardless of the file system's own block size.
    pub blocks_512: u64,
}

/// The three ways `utimens` can be asked to set an inode's mtime (§4.5).
#[derive(Debug, Clone, Copy)]
pub enum MtimeUpdate {
    /// Nothing to do.
    Omit,
    /// Stamp with the current real-time clock reading.
    Now,
    /// Stamp with exactly this timestamp.
    Set(i64, i64),
}

fn now() -> (i64, i64) {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (dur.as_secs() as i64, dur.subsec_nanos() as i64)
}

fn touch_mtime(inode: &mut Inode) {
    let (s, ns) = now();
    inode.mtime_sec = s;
    inode.mtime_nsec = ns;
}

fn leaf_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn path_too_long(path: &str) -> bool {
    path.len() >= PATH_MAX || path.len() >= NAME_MAX + 1
}

/// Resolve the block number backing file-relative block index `block_idx`,
/// reading through the indirect block if needed. Returns `0` for a hole
/// (an index beyond every allocated pointer).
fn block_number_for(ctx: &MountContext<'_>, inode: &Inode, block_idx: u32) -> u32 {
    if (block_idx as usize) < NUM_DIRECT {
        inode.direct[block_idx as usize]
    } else if inode.indirect == 0 {
        0
    } else {
        ctx.indirect_ptr(inode.indirect, block_idx as usize - NUM_DIRECT)
    }
}

fn for_each_chunk(offset: u64, len: u64, mut visit: impl FnMut(u32, usize, usize, u64)) {
    let mut done = 0u64;
    while done < len {
        let cur = offset + done;
        let block_idx = (cur / BLOCK_SIZE as u64) as u32;
        let in_block = (cur % BLOCK_SIZE as u64) as usize;
        let chunk = ((BLOCK_SIZE - in_block) as u64).min(len - done) as usize;
        visit(block_idx, in_block, chunk, done);
        done += chunk as u64;
    }
}

/// Report file system statistics (§4.5, "statfs").
pub fn statfs(ctx: &MountContext<'_>) -> StatFs {
    let sb = ctx.superblock();
    StatFs {
        block_size: BLOCK_SIZE as u32,
        blocks: sb.num_blocks,
        blocks_free: sb.free_blocks,
        blocks_avail: sb.free_blocks,
        files: sb.num_inodes,
        files_free: sb.free_inodes,
        files_avail: sb.free_inodes,
        name_max: NAME_MAX as u32,
    }
}

/// Get file or directory attributes (§4.5, "getattr").
pub fn getattr(ctx: &MountContext<'_>, path: &str) -> VsfsResult<Attr> {
    if path_too_long(path) {
        return Err(VsfsError::NameTooLong);
    }
    let ino = path::resolve(ctx, path)?;
    let inode = ctx.read_inode(ino);
    Ok(Attr {
        mode: inode.mode,
        nlink: inode.nlink,
        size: inode.size,
        mtime_sec: inode.mtime_sec,
        mtime_nsec: inode.mtime_nsec,
        blocks_512: layout::div_round_up(inode.size as u32, 512) as u64,
    })
}

/// List the root directory (§4.5, "readdir"). `path` must be `/`; callers
/// (the adapter) are expected to have already verified this via `getattr`,
/// matching the teacher-adjacent FUSE convention that `readdir` only ever
/// runs against a path already known to be a directory.
///
/// `filler` is invoked once per used entry with its name; returning `true`
/// signals the caller's buffer is full, at which point `readdir` stops and
/// returns [`VsfsError::NoMem`].
pub fn readdir(
    ctx: &MountContext<'_>,
    path: &str,
    mut filler: impl FnMut(&str) -> bool,
) -> VsfsResult<()> {
    debug_assert_eq!(path, "/", "readdir only supports the root directory");
    let root = ctx.read_inode(ROOT_INO);
    let block = ctx.data_block(root.direct[0]);
    let entries = BLOCK_SIZE / DirEntry::RECORD_SIZE;
    for i in 0..entries {
        let start = i * DirEntry::RECORD_SIZE;
        let entry = DirEntry::decode(&block[start..start + DirEntry::RECORD_SIZE]);
        if entry.is_used() && filler(entry.name_str()) {
            return Err(VsfsError::NoMem);
        }
    }
    Ok(())
}

fn write_root_dir_entry(ctx: &mut MountContext<'_>, slot: usize, entry: &DirEntry) {
    let root = ctx.read_inode(ROOT_INO);
    let block = ctx.data_block_mut(root.direct[0]);
    entry.encode_into(&mut block[slot..slot + DirEntry::RECORD_SIZE]);
}

/// Create a regular file (§4.5, "create").
pub fn create(ctx: &mut MountContext<'_>, path: &str, mode: u32) -> VsfsResult<()> {
    debug_assert_eq!(mode & S_IFDIR, 0, "create requires a regular-file mode");
    let name = leaf_name(path);
    if name.len() > NAME_MAX {
        return Err(VsfsError::NameTooLong);
    }
    if ctx.superblock().free_inodes == 0 {
        return Err(VsfsError::NoSpace);
    }

    let ino = ctx.alloc_inode()?;

    let slot = match path::first_free_slot(ctx) {
        Some(slot) => slot,
        None => {
            warn!("create: no free directory slot for {name:?}, rolling back inode {ino}");
            ctx.free_inode(ino);
            return Err(VsfsError::NoSpace);
        }
    };

    let mut inode = Inode::zeroed();
    inode.mode = mode;
    inode.nlink = 1;
    touch_mtime(&mut inode);
    ctx.write_inode(ino, &inode);

    write_root_dir_entry(ctx, slot, &DirEntry::new(ino, name));

    let mut root = ctx.read_inode(ROOT_INO);
    touch_mtime(&mut root);
    ctx.write_inode(ROOT_INO, &root);

    debug!("create: {path} -> inode {ino}");
    Ok(())
}

/// Remove a file (§4.5, "unlink").
pub fn unlink(ctx: &mut MountContext<'_>, path: &str) -> VsfsResult<()> {
    let ino = path::resolve(ctx, path)?;
    let mut inode = ctx.read_inode(ino);
    inode.nlink = inode.nlink.saturating_sub(1);

    if inode.nlink == 0 {
        for block_idx in 0..inode.block_count {
            let b = block_number_for(ctx, &inode, block_idx);
            if b != 0 {
                ctx.free_block(b);
            }
        }
        if inode.block_count as usize > NUM_DIRECT && inode.indirect != 0 {
            ctx.free_block(inode.indirect);
        }
        ctx.free_inode(ino);
        inode = Inode::zeroed();
    }
    ctx.write_inode(ino, &inode);

    let name = leaf_name(path);
    if let Some(slot) = path::find_slot(ctx, name) {
        write_root_dir_entry(ctx, slot, &DirEntry::unused());
    }

    let mut root = ctx.read_inode(ROOT_INO);
    touch_mtime(&mut root);
    ctx.write_inode(ROOT_INO, &root);

    Ok(())
}

/// Update a file or directory's modification time (§4.5, "utimens").
pub fn utimens(ctx: &mut MountContext<'_>, path: &str, update: MtimeUpdate) -> VsfsResult<()> {
    let (sec, nsec) = match update {
        MtimeUpdate::Omit => return Ok(()),
        MtimeUpdate::Now => now(),
        MtimeUpdate::Set(s, ns) => (s, ns),
    };
    let ino = path::resolve(ctx, path)?;
    let mut inode = ctx.read_inode(ino);
    inode.mtime_sec = sec;
    inode.mtime_nsec = nsec;
    ctx.write_inode(ino, &inode);
    Ok(())
}

fn zero_fill(ctx: &mut MountContext<'_>, inode: &Inode, offset: u64, len: u64) {
    for_each_chunk(offset, len, |block_idx, in_block, chunk, _| {
        let b = block_number_for(ctx, inode, block_idx);
        if b != 0 {
            ctx.data_block_mut(b)[in_block..in_block + chunk].fill(0);
        }
    });
}

fn copy_from_blocks(ctx: &MountContext<'_>, inode: &Inode, offset: u64, out: &mut [u8]) {
    for_each_chunk(offset, out.len() as u64, |block_idx, in_block, chunk, done| {
        let b = block_number_for(ctx, inode, block_idx);
        let done = done as usize;
        if b == 0 {
            out[done..done + chunk].fill(0);
        } else {
            let src = ctx.data_block(b);
            out[done..done + chunk].copy_from_slice(&src[in_block..in_block + chunk]);
        }
    });
}

fn copy_into_blocks(ctx: &mut MountContext<'_>, inode: &Inode, offset: u64, data: &[u8]) {
    for_each_chunk(offset, data.len() as u64, |block_idx, in_block, chunk, done| {
        let done = done as usize;
        let b = block_number_for(ctx, inode, block_idx);
        debug_assert_ne!(b, 0, "write target block must already be allocated by truncate");
        ctx.data_block_mut(b)[in_block..in_block + chunk].copy_from_slice(&data[done..done + chunk]);
    });
}

/// Change a file's size (§4.5, "truncate"). Handles both extension (with
/// zero-fill of the grown range) and shrinking.
pub fn truncate(ctx: &mut MountContext<'_>, path: &str, new_size: u64) -> VsfsResult<()> {
    let new_blocks = layout::blocks_for_size(new_size);
    if new_blocks as usize > MAX_FILE_BLOCKS {
        return Err(VsfsError::TooBig);
    }

    let ino = path::resolve(ctx, path)?;
    let mut inode = ctx.read_inode(ino);
    if new_size == inode.size {
        return Ok(());
    }

    if new_size > inode.size {
        let already_allocated_bytes = inode.block_count as u64 * BLOCK_SIZE as u64;
        let zero_end = new_size.min(already_allocated_bytes);
        if zero_end > inode.size {
            zero_fill(ctx, &inode, inode.size, zero_end - inode.size);
        }

        let mut allocated_data_blocks: Vec<u32> = Vec::new();
        let mut allocated_indirect = false;
        let mut failure = None;

        for block_idx in inode.block_count..new_blocks {
            let block_num = match ctx.alloc_block() {
                Ok(b) => b,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            if (block_idx as usize) < NUM_DIRECT {
                inode.direct[block_idx as usize] = block_num;
                allocated_data_blocks.push(block_num);
            } else if inode.indirect != 0 {
                ctx.set_indirect_ptr(inode.indirect, block_idx as usize - NUM_DIRECT, block_num);
                allocated_data_blocks.push(block_num);
            } else {
                match ctx.alloc_block() {
                    Ok(iblock) => {
                        inode.indirect = iblock;
                        allocated_indirect = true;
                        ctx.set_indirect_ptr(iblock, block_idx as usize - NUM_DIRECT, block_num);
                        allocated_data_blocks.push(block_num);
                    }
                    Err(e) => {
                        ctx.free_block(block_num);
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        if let Some(e) = failure {
            warn!("truncate: rolling back {} block(s) after {:?}", allocated_data_blocks.len(), e);
            for b in allocated_data_blocks {
                ctx.free_block(b);
            }
            if allocated_indirect {
                ctx.free_block(inode.indirect);
                inode.indirect = 0;
            }
            return Err(e);
        }
    } else {
        for block_idx in (new_blocks..inode.block_count).rev() {
            let b = block_number_for(ctx, &inode, block_idx);
            if b != 0 {
                ctx.free_block(b);
            }
            if (block_idx as usize) < NUM_DIRECT {
                inode.direct[block_idx as usize] = 0;
            } else if inode.indirect != 0 {
                ctx.set_indirect_ptr(inode.indirect, block_idx as usize - NUM_DIRECT, 0);
            }
        }
        if new_blocks as usize <= NUM_DIRECT && inode.indirect != 0 {
            ctx.free_block(inode.indirect);
            inode.indirect = 0;
        }
    }

    inode.size = new_size;
    inode.block_count = new_blocks;
    touch_mtime(&mut inode);
    ctx.write_inode(ino, &inode);
    Ok(())
}

/// Read from a file (§4.5, "read"). Reads past EOF return `0`; reads over
/// holes return zeros.
pub fn read(ctx: &mut MountContext<'_>, path: &str, buf: &mut [u8], offset: u64) -> VsfsResult<usize> {
    let ino = path::resolve(ctx, path)?;
    let inode = ctx.read_inode(ino);
    if offset >= inode.size {
        return Ok(0);
    }
    let avail = inode.size - offset;
    let n = (buf.len() as u64).min(avail) as usize;
    copy_from_blocks(ctx, &inode, offset, &mut buf[..n]);
    Ok(n)
}

/// Write to a file (§4.5, "write"). A write that would extend the file
/// delegates to [`truncate`] first, which performs any necessary
/// allocation and zero-fill.
pub fn write(ctx: &mut MountContext<'_>, path: &str, buf: &[u8], offset: u64) -> VsfsResult<usize> {
    let ino = path::resolve(ctx, path)?;
    let inode = ctx.read_inode(ino);
    let end = offset + buf.len() as u64;

    let mut inode = if end > inode.size {
        truncate(ctx, path, end)?;
        ctx.read_inode(ino)
    } else {
        inode
    };

    copy_into_blocks(ctx, &inode, offset, buf);

    touch_mtime(&mut inode);
    ctx.write_inode(ino, &inode);

    Ok(buf.len())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::{format, FormatOptions};
    use crate::layout::BLOCK_SIZE;

    fn mounted_image(blocks: u32, inodes: u32) -> Vec<u8> {
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
    fn statfs_reports_fixed_scenario() {
        let mut image = mounted_image(256, 32);
        let ctx = MountContext::mount(&mut image).unwrap();
        let st = statfs(&ctx);
        assert_eq!(st.block_size, 4096);
        assert_eq!(st.blocks, 256);
        assert_eq!(st.files, 32);
        assert_eq!(st.files_free, 31);
    }

    #[test]
    fn create_write_read_round_trip() {
        let mut image = mounted_image(256, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        create(&mut ctx, "/hello", S_IFREG | 0o644).unwrap();

        let n = write(&mut ctx, "/hello", b"hi", 0).unwrap();
        assert_eq!(n, 2);

        let mut out = [0u8; 2];
        let read_n = read(&mut ctx, "/hello", &mut out, 0).unwrap();
        assert_eq!(read_n, 2);
        assert_eq!(&out, b"hi");

        let attr = getattr(&ctx, "/hello").unwrap();
        assert_eq!(attr.size, 2);
    }

    #[test]
    fn truncate_extends_with_zero_fill_and_updates_block_count() {
        let mut image = mounted_image(256, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        create(&mut ctx, "/hello", S_IFREG | 0o644).unwrap();

        truncate(&mut ctx, "/hello", 5000).unwrap();
        let attr = getattr(&ctx, "/hello").unwrap();
        assert_eq!(attr.size, 5000);

        let mut out = [0xAAu8; 3000];
        let n = read(&mut ctx, "/hello", &mut out, 2000).unwrap();
        assert_eq!(n, 3000);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn unlink_reclaims_inode_and_blocks() {
        let mut image = mounted_image(256, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        let before_inodes = ctx.superblock().free_inodes;
        let before_blocks = ctx.superblock().free_blocks;

        create(&mut ctx, "/hello", S_IFREG | 0o644).unwrap();
        truncate(&mut ctx, "/hello", 5000).unwrap();
        let used_blocks = before_blocks - ctx.superblock().free_blocks;
        assert_eq!(used_blocks, 2);

        unlink(&mut ctx, "/hello").unwrap();
        assert_eq!(ctx.superblock().free_inodes, before_inodes);
        assert_eq!(ctx.superblock().free_blocks, before_blocks);
        assert_eq!(getattr(&ctx, "/hello").unwrap_err(), VsfsError::NotFound);
    }

    #[test]
    fn create_fails_enospc_when_inodes_exhausted_and_does_not_mutate() {
        let mut image = mounted_image(256, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        for i in 0..31 {
            create(&mut ctx, &format!("/f{i}"), S_IFREG | 0o644).unwrap();
        }
        assert_eq!(ctx.superblock().free_inodes, 0);
        let before = ctx.superblock();
        let err = create(&mut ctx, "/overflow", S_IFREG | 0o644).unwrap_err();
        assert_eq!(err, VsfsError::NoSpace);
        assert_eq!(ctx.superblock(), before);
    }

    #[test]
    fn readdir_lists_created_files_and_respects_full_filler() {
        let mut image = mounted_image(256, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        create(&mut ctx, "/a", S_IFREG | 0o644).unwrap();
        create(&mut ctx, "/b", S_IFREG | 0o644).unwrap();

        let mut seen = Vec::new();
        readdir(&ctx, "/", |name| {
            seen.push(name.to_string());
            false
        })
        .unwrap();
        assert!(seen.contains(&".".to_string()));
        assert!(seen.contains(&"..".to_string()));
        assert!(seen.contains(&"a".to_string()));
        assert!(seen.contains(&"b".to_string()));

        let err = readdir(&ctx, "/", |_| true).unwrap_err();
        assert_eq!(err, VsfsError::NoMem);
    }

    #[test]
    fn getattr_name_too_long_is_rejected() {
        let mut image = mounted_image(256, 32);
        let ctx = MountContext::mount(&mut image).unwrap();
        let long = format!("/{}", "x".repeat(NAME_MAX + 1));
        assert_eq!(getattr(&ctx, &long).unwrap_err(), VsfsError::NameTooLong);
    }

    #[test]
    fn utimens_idempotent_with_explicit_timestamp() {
        let mut image = mounted_image(256, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        create(&mut ctx, "/hello", S_IFREG | 0o644).unwrap();
        utimens(&mut ctx, "/hello", MtimeUpdate::Set(123, 456)).unwrap();
        utimens(&mut ctx, "/hello", MtimeUpdate::Set(123, 456)).unwrap();
        let attr = getattr(&ctx, "/hello").unwrap();
        assert_eq!(attr.mtime_sec, 123);
        assert_eq!(attr.mtime_nsec, 456);
    }

    #[test]
    fn truncate_beyond_max_file_size_is_efbig() {
        let mut image = mounted_image(4096, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        create(&mut ctx, "/big", S_IFREG | 0o644).unwrap();
        let too_big = (MAX_FILE_BLOCKS as u64 + 1) * BLOCK_SIZE as u64;
        assert_eq!(
            truncate(&mut ctx, "/big", too_big).unwrap_err(),
            VsfsError::TooBig
        );
    }

    #[test]
    fn write_spanning_indirect_block_round_trips() {
        let mut image = mounted_image(4096, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        create(&mut ctx, "/big", S_IFREG | 0o644).unwrap();

        let offset = (NUM_DIRECT as u64 + 2) * BLOCK_SIZE as u64;
        let payload = vec![0x5Au8; 100];
        write(&mut ctx, "/big", &payload, offset).unwrap();

        let mut out = vec![0u8; 100];
        read(&mut ctx, "/big", &mut out, offset).unwrap();
        assert_eq!(out, payload);

        let attr = getattr(&ctx, "/big").unwrap();
        assert_eq!(attr.size, offset + 100);
    }

    #[test]
    fn shrink_truncate_frees_tail_blocks() {
        let mut image = mounted_image(256, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        create(&mut ctx, "/hello", S_IFREG | 0o644).unwrap();
        truncate(&mut ctx, "/hello", 9000).unwrap();
        let used = ctx.superblock().free_blocks;
        truncate(&mut ctx, "/hello", 10).unwrap();
        assert!(ctx.superblock().free_blocks > used);
        let attr = getattr(&ctx, "/hello").unwrap();
        assert_eq!(attr.size, 10);
    }

    #[test]
    fn create_and_unlink_conserve_free_counters() {
        let mut image = mounted_image(256, 32);
        let mut ctx = MountContext::mount(&mut image).unwrap();
        let before = ctx.superblock();
        create(&mut ctx, "/tmp", S_IFREG | 0o644).unwrap();
        unlink(&mut ctx, "/tmp").unwrap();
        assert_eq!(ctx.superblock(), before);
    }

    #[test]
    fn root_preconditions_use_s_ifdir() {
        let mut image = mounted_image(64, 16);
        let ctx = MountContext::mount(&mut image).unwrap();
        let attr = getattr(&ctx, "/").unwrap();
        assert_eq!(attr.mode & S_IFDIR, S_IFDIR);
        assert_eq!(attr.nlink, 2);
    }
}
