//! 画像を正規化してモデル入力グリッドを表示する確認用バイナリ
//!
//! 使い方: inspect_grid <image> [--whole-canvas]

use anyhow::{bail, Context, Result};
use doodle_guess_lib::init_tracing;
use doodle_guess_lib::preprocess::{CropMode, ImageNormalizer, NormalizerConfig};
use doodle_guess_lib::round::EMPTY_THRESHOLD;
use doodle_guess_lib::types::RasterSnapshot;

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(path) = args.first() else {
        bail!("使い方: inspect_grid <image> [--whole-canvas]");
    };

    let mut config = NormalizerConfig::default();
    if args.iter().any(|a| a == "--whole-canvas") {
        config.crop_mode = CropMode::WholeCanvas;
    }

    let bytes = std::fs::read(path).with_context(|| format!("画像ファイルの読み込みエラー: {}", path))?;
    let image = RasterSnapshot::from_bytes(bytes).decode()?;
    println!("入力画像: {}x{}", image.width(), image.height());

    let normalizer = ImageNormalizer::new(config);
    match normalizer.ink_bounds(&image) {
        Some(bounds) => println!(
            "インク範囲: ({}, {}) - ({}, {})  {}x{}",
            bounds.min_x,
            bounds.min_y,
            bounds.max_x,
            bounds.max_y,
            bounds.width(),
            bounds.height()
        ),
        None => println!("インク範囲: なし"),
    }

    let grid = normalizer.normalize_image(&image)?;
    println!("{}", grid.to_ascii());

    let mean = grid.mean();
    println!("平均: {:.4}", mean);
    if mean < EMPTY_THRESHOLD {
        println!("→ 空キャンバスと判定されます");
    }
    Ok(())
}
