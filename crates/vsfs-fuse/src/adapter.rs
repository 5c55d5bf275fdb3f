//! The FUSE adapter glue named in §1 and §6: translates `fuser` callbacks
//! into calls against `vsfs_core::ops`, and maps [`VsfsError`] to the
//! negative-errno replies FUSE expects.

use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use log::{debug, warn};

use vsfs_core::disk::{S_IFDIR, S_IFREG};
use vsfs_core::error::VsfsError;
use vsfs_core::layout::ROOT_INO;
use vsfs_core::mount::MountContext;
use vsfs_core::ops::{self, Attr, MtimeUpdate};

const TTL: Duration = Duration::from_secs(1);

fn errno_of(e: VsfsError) -> i32 {
    -e.to_errno()
}

/// FUSE reserves inode 1 for the mount root; vsfs's own root inode is 0.
/// `fuse_ino = vsfs_ino + 1` everywhere at this boundary.
fn fuse_ino(vsfs_ino: u32) -> u64 {
    vsfs_ino as u64 + 1
}

fn vsfs_ino(fuse_ino: u64) -> u32 {
    (fuse_ino - 1) as u32
}

fn path_for(name: &OsStr) -> Option<String> {
    let name = name.to_str()?;
    Some(format!("/{name}"))
}

fn system_time_of(sec: i64, nsec: i64) -> SystemTime {
    if sec >= 0 {
        UNIX_EPOCH + Duration::new(sec as u64, nsec as u32)
    } else {
        UNIX_EPOCH - Duration::new((-sec) as u64, 0)
    }
}

fn file_attr_of(ino: u32, attr: Attr) -> FileAttr {
    let kind = if attr.mode & S_IFDIR == S_IFDIR {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    let mtime = system_time_of(attr.mtime_sec, attr.mtime_nsec);
    FileAttr {
        ino: fuse_ino(ino),
        size: attr.size,
        blocks: attr.blocks_512,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm: (attr.mode & 0o7777) as u16,
        nlink: attr.nlink,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: vsfs_core::layout::BLOCK_SIZE as u32,
        flags: 0,
    }
}

/// Owns the mount context for the lifetime of the FUSE session.
pub struct VsfsFilesystem<'a> {
    ctx: MountContext<'a>,
}

impl<'a> VsfsFilesystem<'a> {
    pub fn new(ctx: MountContext<'a>) -> Self {
        VsfsFilesystem { ctx }
    }

    fn attr_of_path(&self, path: &str) -> Result<(u32, Attr), VsfsError> {
        let attr = ops::getattr(&self.ctx, path)?;
        let ino = vsfs_core::path::resolve(&self.ctx, path)?;
        Ok((ino, attr))
    }
}

impl<'a> Filesystem for VsfsFilesystem<'a> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if vsfs_ino(parent) != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(path) = path_for(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.attr_of_path(&path) {
            Ok((ino, attr)) => reply.entry(&TTL, &file_attr_of(ino, attr), 0),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = if vsfs_ino(ino) == ROOT_INO {
            "/".to_string()
        } else {
            // Only the root directory resolves entries directly by inode;
            // everything else is looked up through lookup() first, which
            // caches the mapping on the FUSE side. For getattr on a plain
            // file ino, scan the root directory to recover its name.
            match self.name_for_ino(vsfs_ino(ino)) {
                Some(name) => format!("/{name}"),
                None => {
                    reply.error(libc::ENOENT);
                    return;
                }
            }
        };
        match ops::getattr(&self.ctx, &path) {
            Ok(attr) => reply.attr(&TTL, &file_attr_of(vsfs_ino(ino), attr)),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(name) = self.name_for_ino(vsfs_ino(ino)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = format!("/{name}");

        if let Some(new_size) = size {
            if let Err(e) = ops::truncate(&mut self.ctx, &path, new_size) {
                reply.error(errno_of(e));
                return;
            }
        }

        let update = match mtime.or(atime) {
            None => MtimeUpdate::Omit,
            Some(TimeOrNow::Now) => MtimeUpdate::Now,
            Some(TimeOrNow::SpecificTime(t)) => {
                let dur = t.duration_since(UNIX_EPOCH).unwrap_or_default();
                MtimeUpdate::Set(dur.as_secs() as i64, dur.subsec_nanos() as i64)
            }
        };
        if let Err(e) = ops::utimens(&mut self.ctx, &path, update) {
            reply.error(errno_of(e));
            return;
        }

        match ops::getattr(&self.ctx, &path) {
            Ok(attr) => reply.attr(&TTL, &file_attr_of(vsfs_ino(ino), attr)),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if vsfs_ino(ino) != ROOT_INO {
            reply.error(libc::ENOTDIR);
            return;
        }
        let mut index: i64 = 0;
        let result = ops::readdir(&self.ctx, "/", |name| {
            index += 1;
            if index <= offset {
                return false;
            }
            let entry_ino = vsfs_core::path::resolve(&self.ctx, &format!("/{name}"))
                .map(fuse_ino)
                .unwrap_or(fuse_ino(ROOT_INO));
            let kind = if name == "." || name == ".." {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            reply.add(entry_ino, index, kind, name)
        });
        match result {
            Ok(()) | Err(VsfsError::NoMem) => reply.ok(),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        if vsfs_ino(parent) != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(path) = path_for(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Err(e) = ops::create(&mut self.ctx, &path, S_IFREG | (mode & 0o7777)) {
            reply.error(errno_of(e));
            return;
        }
        match self.attr_of_path(&path) {
            Ok((ino, attr)) => reply.created(&TTL, &file_attr_of(ino, attr), 0, 0, 0),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if vsfs_ino(parent) != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(path) = path_for(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match ops::unlink(&mut self.ctx, &path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(name) = self.name_for_ino(vsfs_ino(ino)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = format!("/{name}");
        let mut buf = vec![0u8; size as usize];
        match ops::read(&mut self.ctx, &path, &mut buf, offset as u64) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(name) = self.name_for_ino(vsfs_ino(ino)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = format!("/{name}");
        match ops::write(&mut self.ctx, &path, data, offset as u64) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let st = ops::statfs(&self.ctx);
        reply.statfs(
            st.blocks as u64,
            st.blocks_free as u64,
            st.blocks_avail as u64,
            st.files as u64,
            st.files_free as u64,
            st.block_size,
            st.name_max,
            st.block_size,
        );
    }

    fn destroy(&mut self) {
        debug!("unmounting: no buffered state to flush beyond the mapped image itself");
    }
}

impl<'a> VsfsFilesystem<'a> {
    /// Recover a root-directory entry's name from its inode number. The
    /// namespace is flat and small enough that a linear scan on every
    /// by-inode call (`getattr`, `read`, `write`, `setattr`) is acceptable;
    /// see the design note on `O(files)` per-call cost.
    fn name_for_ino(&self, ino: u32) -> Option<String> {
        if ino == ROOT_INO {
            return Some(".".to_string());
        }
        let mut found = None;
        let _ = ops::readdir(&self.ctx, "/", |name| {
            if name != "." && name != ".." {
                if let Ok(candidate) = vsfs_core::path::resolve(&self.ctx, &format!("/{name}")) {
                    if candidate == ino {
                        found = Some(name.to_string());
                        return true;
                    }
                }
            }
            false
        });
        found
    }
}
