//! Synthetic image fixtures shared by the integration tests.
#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use image_curator_core::{Config, Curator, ImageInput};
use rand::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SIZE: u32 = 128;

/// Diagonal colour gradient with a bright square in the upper left
pub fn gradient() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(SIZE, SIZE, |x, y| {
        if x < SIZE / 4 && y < SIZE / 4 {
            return Rgb([250, 250, 250]);
        }
        let fx = x as f32 / SIZE as f32;
        let fy = y as f32 / SIZE as f32;
        Rgb([
            (255.0 * fx) as u8,
            (255.0 * fy) as u8,
            (255.0 * (1.0 - fx) * fy) as u8,
        ])
    }))
}

pub fn checkerboard(cell: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(SIZE, SIZE, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgb([230, 40, 40])
        } else {
            Rgb([20, 20, 120])
        }
    }))
}

/// Uniform random pixels; different seeds give unrelated images
pub fn noise(seed: u64) -> DynamicImage {
    let mut rng = StdRng::seed_from_u64(seed);
    DynamicImage::ImageRgb8(RgbImage::from_fn(SIZE, SIZE, |_, _| {
        Rgb([rng.random(), rng.random(), rng.random()])
    }))
}

/// Same picture, different bytes: one pixel nudged
pub fn nudged(img: &DynamicImage) -> DynamicImage {
    let mut rgb = img.to_rgb8();
    let pixel = rgb.get_pixel_mut(SIZE / 2, SIZE / 2);
    pixel[0] = pixel[0].wrapping_add(3);
    DynamicImage::ImageRgb8(rgb)
}

pub fn save(img: &DynamicImage, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    img.save(&path).unwrap();
    path
}

/// Copy `source` byte for byte
pub fn copy(source: &Path, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::copy(source, &path).unwrap();
    path
}

/// Config with a private cache and no progress bars
pub fn test_config(workspace: &TempDir) -> Config {
    Config {
        cache_path: Some(workspace.path().join("cache")),
        show_progress: false,
        threads: 2,
        ..Config::default()
    }
}

pub fn curator(workspace: &TempDir) -> Curator {
    Curator::new(test_config(workspace)).unwrap()
}

pub fn inputs(paths: &[PathBuf]) -> Vec<ImageInput> {
    paths.iter().cloned().map(ImageInput::from).collect()
}

/// x.png and y.png byte-identical, z.png a nudged copy of x, plus two
/// unrelated images
pub fn scenario_a(dir: &Path) -> Vec<PathBuf> {
    let x = save(&gradient(), dir, "library/x.png");
    let y = copy(&x, dir, "library/y.png");
    let z = save(&nudged(&gradient()), dir, "library/z.png");
    let board = save(&checkerboard(16), dir, "library/board.png");
    let static_ = save(&noise(7), dir, "library/static.png");
    vec![x, y, z, board, static_]
}
