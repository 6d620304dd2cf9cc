// Where source pictures come from.
// The core never lists directories or opens files itself; it asks an
// `ImageSource` for "picture number i" and gets decoded RGBA back.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use rand::Rng;

use crate::error::{Error, Result};
use crate::raster;

/// File extensions a directory source picks up (case-insensitive).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

pub trait ImageSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable label for logs.
    fn name(&self, index: usize) -> String;

    fn load(&mut self, index: usize) -> Result<RgbaImage>;
}

/// Every picture file directly inside one directory, sorted by path.
pub struct DirectorySource {
    files: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::info!("{} pictures in {}", files.len(), dir.display());
        Ok(Self { files })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

impl ImageSource for DirectorySource {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn name(&self, index: usize) -> String {
        self.files
            .get(index)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("#{index}"))
    }

    fn load(&mut self, index: usize) -> Result<RgbaImage> {
        let path = self
            .files
            .get(index)
            .ok_or_else(|| Error::image_load(format!("#{index}"), "no such picture"))?;
        raster::load_image(path)
    }
}

/// Already-decoded pictures held in memory.
#[derive(Default)]
pub struct MemorySource {
    images: Vec<(String, RgbaImage)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, image: RgbaImage) {
        self.images.push((name.into(), image));
    }
}

impl ImageSource for MemorySource {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn name(&self, index: usize) -> String {
        self.images
            .get(index)
            .map(|(n, _)| n.clone())
            .unwrap_or_else(|| format!("#{index}"))
    }

    fn load(&mut self, index: usize) -> Result<RgbaImage> {
        self.images
            .get(index)
            .map(|(_, img)| img.clone())
            .ok_or_else(|| Error::image_load(format!("#{index}"), "no such picture"))
    }
}

/// Uniform pick among `count` pictures, never `exclude` when there is any
/// alternative. `None` only when `count == 0`.
pub fn pick_next<R: Rng + ?Sized>(count: usize, exclude: Option<usize>, rng: &mut R) -> Option<usize> {
    match (count, exclude) {
        (0, _) => None,
        (1, _) => Some(0),
        (n, Some(e)) if e < n => {
            let i = rng.gen_range(0..n - 1);
            Some(if i >= e { i + 1 } else { i })
        }
        (n, _) => Some(rng.gen_range(0..n)),
    }
}
