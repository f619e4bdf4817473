use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{
    disk::{block_offset, DiskObj},
    Disk, LFResult, BLOCK_SIZE,
};

/// A disk object stored in a file.
pub struct DiskFile {
    f:    File,
    size: u64,
}

impl DiskFile {
    /// Opens an image file, creating it with `blocks` blocks if it does not exist.
    #[cfg(feature = "stable")]
    pub fn open<P: AsRef<Path>>(path: P, blocks: u64) -> LFResult<Disk> {
        let path = path.as_ref();
        let file = if path.exists() {
            OpenOptions::new().read(true).write(true).open(path)?
        } else {
            let res = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?;
            res.set_len(block_offset(blocks))?;
            res
        };
        Self::open_file(file)
    }
    /// Creates a disk object using a file.
    #[cfg(feature = "stable")]
    pub fn open_file(file: File) -> LFResult<Disk> {
        let size = file.metadata()?.len();
        Ok(Disk::new(DiskFile { f: file, size }))
    }
}

impl DiskObj for DiskFile {
    fn read_at(&mut self, block: u64, buffer: &mut [u8]) -> std::io::Result<()> {
        assert_eq!(buffer.len(), BLOCK_SIZE);
        self.f.seek(SeekFrom::Start(block_offset(block)))?;
        self.f.read_exact(buffer)
    }
    fn write_at(&mut self, block: u64, buffer: &[u8]) -> std::io::Result<()> {
        assert_eq!(buffer.len(), BLOCK_SIZE);
        self.f.seek(SeekFrom::Start(block_offset(block)))?;
        self.f.write_all(buffer)
    }
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.size / (BLOCK_SIZE as u64))
    }
    fn sync(&mut self) -> std::io::Result<()> {
        self.f.sync_all()
    }
}

#[test]
#[allow(clippy::unwrap_used)]
fn file_rw() {
    let path = std::env::temp_dir().join(format!("layerfs-file-rw-{}.img", std::process::id()));
    let _ = std::fs::remove_file(&path);
    {
        let d = DiskFile::open(&path, 16).unwrap();
        assert_eq!(d.size().unwrap(), 16);
        let mut buf = crate::BlockBuf::zeroed();
        buf.as_mut()[0] = 7;
        d.write_block(15, &buf).unwrap();
        d.sync().unwrap();
    }
    let d = DiskFile::open(&path, 1).unwrap();
    assert_eq!(d.size().unwrap(), 16);
    let mut buf = crate::BlockBuf::zeroed();
    d.read_block(15, &mut buf).unwrap();
    assert_eq!(buf.as_ref()[0], 7);
    std::fs::remove_file(&path).unwrap();
}
