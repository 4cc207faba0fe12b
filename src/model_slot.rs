//! 推論エンジンの非同期読み込みと状態管理
//!
//! 読み込みはブロッキングスレッドで1度だけ行い、状態を `Loading → Ready | Failed`
//! と遷移させる。推論もブロッキングスレッドで実行する。

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::classifier::{Classifier, ModelStatus};
use crate::error::InferenceError;
use crate::types::{ClassProbabilities, NormalizedGrid};

/// 同期的な推論エンジン
pub trait InferenceBackend: Send + 'static {
    /// 1件バッチ [1, 28, 28, 1] を推論してクラスごとの確率を返す
    fn infer(&mut self, batch: &[f32]) -> anyhow::Result<Vec<f32>>;
}

type Loader<E> = dyn Fn() -> anyhow::Result<E> + Send + Sync;

/// 読み込み状態付きの推論エンジン置き場
pub struct ModelSlot<E> {
    status: Arc<watch::Sender<ModelStatus>>,
    engine: Arc<Mutex<Option<E>>>,
    loader: Option<Arc<Loader<E>>>,
}

impl<E: InferenceBackend> ModelSlot<E> {
    /// 読み込み済みのエンジンから作成
    pub fn ready(engine: E) -> Self {
        let (status, _) = watch::channel(ModelStatus::Ready);
        Self {
            status: Arc::new(status),
            engine: Arc::new(Mutex::new(Some(engine))),
            loader: None,
        }
    }

    /// バックグラウンドで読み込みを開始する（tokioランタイム内で呼ぶこと）
    pub fn spawn_load<F>(loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<E> + Send + Sync + 'static,
    {
        let (status, _) = watch::channel(ModelStatus::Loading);
        let slot = Self {
            status: Arc::new(status),
            engine: Arc::new(Mutex::new(None)),
            loader: Some(Arc::new(loader)),
        };
        slot.start_load();
        slot
    }

    /// 読み込みをやり直す（読み込み失敗後の再試行）
    ///
    /// ローダーを持たない場合は何もしない。
    pub fn reload(&self) -> Option<JoinHandle<()>> {
        if self.loader.is_none() {
            return None;
        }
        Some(self.start_load())
    }

    fn start_load(&self) -> JoinHandle<()> {
        self.status.send_replace(ModelStatus::Loading);
        *self.engine.lock().unwrap_or_else(PoisonError::into_inner) = None;

        let status = Arc::clone(&self.status);
        let engine = Arc::clone(&self.engine);
        let loader = self.loader.clone();

        tokio::task::spawn_blocking(move || {
            let Some(loader) = loader else {
                return;
            };
            info!("モデルを読み込んでいます...");
            match loader() {
                Ok(loaded) => {
                    *engine.lock().unwrap_or_else(PoisonError::into_inner) = Some(loaded);
                    status.send_replace(ModelStatus::Ready);
                    info!("モデルの読み込みが完了しました");
                }
                Err(e) => {
                    error!(error = %format!("{:#}", e), "モデルの読み込みに失敗しました");
                    status.send_replace(ModelStatus::Failed(format!("{:#}", e)));
                }
            }
        })
    }

    /// 読み込みが終わる（Ready または Failed になる）まで待つ
    pub async fn wait_until_settled(&self) -> ModelStatus {
        let mut rx = self.status.subscribe();
        let settled = match rx
            .wait_for(|status| !matches!(status, ModelStatus::Loading))
            .await
        {
            Ok(status) => status.clone(),
            // 送信側は self が保持しているため閉じることはない
            Err(_) => self.status.borrow().clone(),
        };
        settled
    }

    /// 状態の変化を購読する
    pub fn subscribe(&self) -> watch::Receiver<ModelStatus> {
        self.status.subscribe()
    }
}

impl<E: InferenceBackend> Classifier for ModelSlot<E> {
    fn status(&self) -> ModelStatus {
        self.status.borrow().clone()
    }

    fn infer(
        &self,
        grid: NormalizedGrid,
    ) -> impl Future<Output = Result<ClassProbabilities, InferenceError>> + Send {
        let status = self.status();
        let engine = Arc::clone(&self.engine);

        async move {
            if !status.is_ready() {
                return Err(InferenceError::NotReady(status));
            }

            let batch = grid.to_batch();
            let output = tokio::task::spawn_blocking(move || {
                let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
                let engine = guard
                    .as_mut()
                    .ok_or(InferenceError::NotReady(ModelStatus::Loading))?;
                engine
                    .infer(&batch)
                    .map_err(|e| InferenceError::Backend(format!("{:#}", e)))
            })
            .await
            .map_err(|e| InferenceError::Backend(format!("推論タスクが異常終了しました: {}", e)))??;

            Ok(ClassProbabilities::new(output))
        }
    }
}
