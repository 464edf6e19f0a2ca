//! Storage glue: where an origin finds the file to send and where a relay
//! drops the file it received.
use log::{debug, info};
use radio_relay::{Persistence, Storage};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the file written by a relay.
pub const RECEIVED_FILE_NAME: &str = "file_received";

/// How deep below the mount root removable media are looked for (`/media/<user>/<label>`).
const MOUNT_SEARCH_DEPTH: usize = 2;

/// Alphabetically first non-hidden `.txt` file directly inside `dir`.
pub fn find_text_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let is_txt = path.extension().map_or(false, |ext| ext == "txt");
        if !hidden && is_txt && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}

/// First mounted directory found below `root`, `root` itself included.
pub fn find_mount(root: &Path) -> io::Result<Option<PathBuf>> {
    if !root.is_dir() {
        return Ok(None);
    }
    find_mount_within(root, MOUNT_SEARCH_DEPTH)
}

fn find_mount_within(dir: &Path, depth: usize) -> io::Result<Option<PathBuf>> {
    if is_mount_point(dir)? {
        return Ok(Some(dir.to_path_buf()));
    }
    if depth == 0 {
        return Ok(None);
    }
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();
    for child in children {
        // Other users' mount points are not readable, skip them.
        match find_mount_within(&child, depth - 1) {
            Ok(Some(mount)) => return Ok(Some(mount)),
            Ok(None) => {}
            Err(err) => debug!("Skipping {}: {}", child.display(), err),
        }
    }
    Ok(None)
}

#[cfg(unix)]
fn is_mount_point(dir: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let Some(parent) = dir.parent() else {
        return Ok(true);
    };
    Ok(fs::metadata(dir)?.dev() != fs::metadata(parent)?.dev())
}

#[cfg(not(unix))]
fn is_mount_point(_dir: &Path) -> io::Result<bool> {
    Ok(false)
}

/// What the last look at the mount root found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaState {
    NoMedium,
    NoTextFile(PathBuf),
    Found(PathBuf),
}

/// Removable medium (USB stick) mounted somewhere below a mount root.
///
/// When no medium is mounted, received content is written once to a local
/// fallback file and persistence stays deferred until a medium shows up.
#[derive(Debug)]
pub struct RemovableMedia {
    root: PathBuf,
    fallback: Option<PathBuf>,
    fallback_written: bool,
    state: Option<MediaState>,
}

impl RemovableMedia {
    pub fn new(root: impl Into<PathBuf>, fallback: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fallback,
            fallback_written: false,
            state: None,
        }
    }

    pub fn state(&self) -> Option<&MediaState> {
        self.state.as_ref()
    }

    /// Logs `next` when it differs from the previous state.
    fn observe(&mut self, next: MediaState) {
        if self.state.as_ref() == Some(&next) {
            return;
        }
        match &next {
            MediaState::NoMedium => info!("No medium mounted below {}", self.root.display()),
            MediaState::NoTextFile(mount) => info!("No text file on {}", mount.display()),
            MediaState::Found(file) => info!("Found {}", file.display()),
        }
        self.state = Some(next);
    }
}

impl Storage for RemovableMedia {
    fn locate_content(&mut self) -> io::Result<Option<Vec<u8>>> {
        let Some(mount) = find_mount(&self.root)? else {
            self.observe(MediaState::NoMedium);
            return Ok(None);
        };
        match find_text_file(&mount)? {
            Some(file) => {
                self.observe(MediaState::Found(file.clone()));
                fs::read(file).map(Some)
            }
            None => {
                self.observe(MediaState::NoTextFile(mount));
                Ok(None)
            }
        }
    }

    fn persist(&mut self, content: &[u8]) -> io::Result<Persistence> {
        if let Some(mount) = find_mount(&self.root)? {
            let path = mount.join(RECEIVED_FILE_NAME);
            fs::write(&path, content)?;
            return Ok(Persistence::Stored(path));
        }
        if let (Some(fallback), false) = (&self.fallback, self.fallback_written) {
            if let Some(parent) = fallback.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(fallback, content)?;
            info!("No medium mounted, content kept at {}", fallback.display());
            self.fallback_written = true;
        }
        Ok(Persistence::Deferred)
    }
}

/// Plain directory standing for a node's medium.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn received_file(&self) -> PathBuf {
        self.path.join(RECEIVED_FILE_NAME)
    }
}

impl Storage for Directory {
    fn locate_content(&mut self) -> io::Result<Option<Vec<u8>>> {
        if !self.path.is_dir() {
            return Ok(None);
        }
        match find_text_file(&self.path)? {
            Some(file) => fs::read(file).map(Some),
            None => Ok(None),
        }
    }

    fn persist(&mut self, content: &[u8]) -> io::Result<Persistence> {
        fs::create_dir_all(&self.path)?;
        let path = self.received_file();
        fs::write(&path, content)?;
        Ok(Persistence::Stored(path))
    }
}
