//! 画像ファイルを描画として使い、お題当てラウンドを遊ぶ
//!
//! 使い方: doodle_guess [config.json] <image>...
//!
//! 正解するたびに次のお題へ進む。

#![recursion_limit = "256"]

use anyhow::{bail, Context, Result};
use doodle_guess_lib::ml::load_engine;
use doodle_guess_lib::{
    init_tracing, AppConfig, ModelSlot, ModelStatus, PredictOutcome, RoundController, StaticSurface,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, images) = match args.first() {
        Some(first) if first.ends_with(".json") => (PathBuf::from(first), &args[1..]),
        _ => (AppConfig::default_path(), &args[..]),
    };
    if images.is_empty() {
        bail!("使い方: doodle_guess [config.json] <image>...");
    }

    let config = AppConfig::load_or_default(&config_path);
    config.log_summary();
    let labels = config.labels.to_table().context("ラベル設定が不正です")?;

    let slot = {
        let config = config.clone();
        let labels = labels.clone();
        Arc::new(ModelSlot::spawn_load(move || load_engine(&config, &labels)))
    };
    if let ModelStatus::Failed(message) = slot.wait_until_settled().await {
        bail!("モデルを読み込めませんでした: {}", message);
    }

    let surface = Arc::new(StaticSurface::new(config.canvas.size));
    let controller = RoundController::from_config(Arc::clone(&surface), slot, &config)?;

    controller.start_round()?;
    println!("お題: {}", controller.target_display().unwrap_or_default());

    for image in images {
        surface.load_file(Path::new(image))?;

        match controller.predict().await {
            Ok(PredictOutcome::Completed(result)) => {
                println!("[{}] {}", image, controller.guess_text());
                if result.success {
                    println!("✓ 正解！ スコア: {}", controller.score());
                    controller.start_round()?;
                    println!("次のお題: {}", controller.target_display().unwrap_or_default());
                }
            }
            Ok(other) => println!("[{}] {:?}", image, other),
            Err(e) if e.is_recoverable() => eprintln!("✗ [{}] エラー: {}", image, e),
            Err(e) => return Err(e.into()),
        }
    }

    println!("最終スコア: {}", controller.score());
    controller.close();
    Ok(())
}
