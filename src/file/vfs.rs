use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::*;
use crate::utils::FastHashMap;

/// Hint of how urgently a read is needed. Streaming reads are `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoPriority {
    Low,
    Normal,
    High,
}

impl Default for IoPriority {
    fn default() -> Self {
        IoPriority::Normal
    }
}

pub trait FileReader: Send + Sync + 'static {
    /// The size of the file in bytes.
    fn size(&self) -> Result<u64>;

    /// Reads up to `buf.len()` bytes at `offset`, returns the number of bytes read.
    fn read_at(&self, offset: u64, buf: &mut [u8], priority: IoPriority) -> Result<usize>;
}

pub trait FileSystem: Send + Sync + 'static {
    /// Opens a readable file at location.
    fn open(&self, location: &Path) -> Result<Box<dyn FileReader>>;

    /// Checks if the file exists.
    fn exists(&self, location: &Path) -> bool;
}

/// File system rooted at a directory of the disk.
pub struct Directory {
    root: PathBuf,
}

impl Directory {
    pub fn new<T: Into<PathBuf>>(root: T) -> Result<Self> {
        let root = root.into();
        info!("Creates directory based file system at {:?}.", root);

        let metadata = fs::metadata(&root)?;
        if metadata.is_dir() {
            Ok(Directory { root })
        } else {
            bail!("Disk file-system must be associated with a readable directory.");
        }
    }
}

impl FileSystem for Directory {
    fn open(&self, location: &Path) -> Result<Box<dyn FileReader>> {
        let path = self.root.join(location);
        if !path.is_file() {
            return Err(Error::FileNotFound(path).into());
        }

        let file = fs::File::open(&path)?;
        Ok(Box::new(DiskReader(Mutex::new(file))))
    }

    fn exists(&self, location: &Path) -> bool {
        self.root.join(location).is_file()
    }
}

struct DiskReader(Mutex<fs::File>);

impl FileReader for DiskReader {
    fn size(&self) -> Result<u64> {
        let file = self.0.lock().unwrap();
        Ok(file.metadata()?.len())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8], _: IoPriority) -> Result<usize> {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;

        let mut len = 0;
        while len < buf.len() {
            match file.read(&mut buf[len..])? {
                0 => break,
                n => len += n,
            }
        }

        Ok(len)
    }
}

/// File system kept entirely in memory.
#[derive(Default)]
pub struct Memory {
    files: Mutex<FastHashMap<PathBuf, Arc<Vec<u8>>>>,
}

impl Memory {
    pub fn new() -> Self {
        Memory::default()
    }

    pub fn insert<T: Into<PathBuf>>(&self, location: T, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(location.into(), Arc::new(bytes));
    }

    pub fn remove<T: AsRef<Path>>(&self, location: T) -> bool {
        self.files.lock().unwrap().remove(location.as_ref()).is_some()
    }
}

impl FileSystem for Memory {
    fn open(&self, location: &Path) -> Result<Box<dyn FileReader>> {
        match self.files.lock().unwrap().get(location) {
            Some(bytes) => Ok(Box::new(MemoryReader(bytes.clone()))),
            None => Err(Error::FileNotFound(location.to_owned()).into()),
        }
    }

    fn exists(&self, location: &Path) -> bool {
        self.files.lock().unwrap().contains_key(location)
    }
}

struct MemoryReader(Arc<Vec<u8>>);

impl FileReader for MemoryReader {
    fn size(&self) -> Result<u64> {
        Ok(self.0.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8], _: IoPriority) -> Result<usize> {
        let offset = offset as usize;
        if offset >= self.0.len() {
            return Ok(0);
        }

        let len = buf.len().min(self.0.len() - offset);
        buf[..len].copy_from_slice(&self.0[offset..offset + len]);
        Ok(len)
    }
}
