//! 描画面（外部コンポーネント）のインターフェース

pub mod sketch_canvas;

pub use sketch_canvas::{CanvasConfig, SketchCanvas, Stroke};

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use image::{Rgba, RgbaImage};

use crate::error::SnapshotError;
use crate::types::RasterSnapshot;

/// ラウンド制御から操作される描画面
pub trait DrawingSurface: Send + Sync {
    /// すべてのストロークを消去
    fn reset_all(&self);

    /// 最後のストロークを取り消す
    fn undo_last_stroke(&self);

    /// 現在の表示内容をラスタ画像として書き出す
    fn export_raster(&self) -> impl Future<Output = Result<RasterSnapshot, SnapshotError>> + Send;
}

/// 固定のスナップショットを返す描画面
///
/// 画像ファイルを1枚の絵として扱う場合に使う。消去・取り消し後は白紙を返す。
#[derive(Debug)]
pub struct StaticSurface {
    size: u32,
    snapshot: Mutex<Option<RasterSnapshot>>,
}

impl StaticSurface {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            snapshot: Mutex::new(None),
        }
    }

    pub fn set_snapshot(&self, snapshot: RasterSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// 画像ファイルを読み込んで表示内容にする
    pub fn load_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let bytes = std::fs::read(path)
            .with_context(|| format!("画像ファイルの読み込みエラー: {:?}", path))?;
        self.set_snapshot(RasterSnapshot::from_bytes(bytes));
        Ok(())
    }

    fn clear(&self) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn current(&self) -> Result<RasterSnapshot, SnapshotError> {
        let snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match snapshot {
            Some(snapshot) => Ok(snapshot),
            None => RasterSnapshot::from_rgba(&RgbaImage::from_pixel(
                self.size,
                self.size,
                Rgba([255, 255, 255, 255]),
            )),
        }
    }
}

impl DrawingSurface for StaticSurface {
    fn reset_all(&self) {
        self.clear();
    }

    fn undo_last_stroke(&self) {
        self.clear();
    }

    fn export_raster(&self) -> impl Future<Output = Result<RasterSnapshot, SnapshotError>> + Send {
        let snapshot = self.current();
        async move { snapshot }
    }
}
