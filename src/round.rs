//! ラウンド制御
//!
//! お題の提示 → 描画 → 予測 → 採点 の流れを管理する。
//!
//! 状態遷移:
//! ```text
//! Idle ──start_round──▶ Prompted ──predict──▶ Predicting ──完了/失敗──▶ Prompted
//! ```
//! 予測は同時に1件まで。判定とフラグ設定はセッションのロック内で行い、
//! ロックを保持したまま await しない。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::canvas::DrawingSurface;
use crate::classifier::{Classifier, ModelStatus};
use crate::error::{LabelTableError, RoundError};
use crate::model::{AppConfig, LabelTable};
use crate::preprocess::ImageNormalizer;
use crate::prompt::PromptSampler;
use crate::types::{GameState, PredictionResult, RoundReason, RoundResult};

/// グリッド平均がこれ未満なら何も描かれていないとみなす
pub const EMPTY_THRESHOLD: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RoundPhase {
    /// お題なし
    Idle,
    /// お題提示中（描画・予測待ち）
    Prompted { target: String },
    /// 予測処理中
    Predicting { target: String },
}

impl RoundPhase {
    pub fn target(&self) -> Option<&str> {
        match self {
            RoundPhase::Idle => None,
            RoundPhase::Prompted { target } | RoundPhase::Predicting { target } => Some(target),
        }
    }

    pub fn is_predicting(&self) -> bool {
        matches!(self, RoundPhase::Predicting { .. })
    }
}

/// ラウンド設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundSettings {
    /// 空キャンバス判定のしきい値（グリッド平均）
    pub empty_threshold: f32,
    /// お題順序のシード（指定時は再現可能）
    pub prompt_seed: Option<u64>,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            empty_threshold: EMPTY_THRESHOLD,
            prompt_seed: None,
        }
    }
}

/// `predict()` の結果
#[derive(Debug, Clone, PartialEq)]
pub enum PredictOutcome {
    /// 予測して採点した
    Completed(RoundResult),
    /// お題が無かったので新しいラウンドを開始した
    RoundStarted(String),
    /// 予測処理中のため何もしなかった
    Busy,
    /// モデルが読み込み中または読み込み失敗のため何もしなかった
    NotReady(ModelStatus),
    /// 予測中にキャンバス消去またはセッション終了があったため結果を捨てた
    Discarded,
}

struct Session {
    phase: RoundPhase,
    score: u32,
    sampler: PromptSampler,
    prediction: Option<PredictionResult>,
    result: Option<RoundResult>,
    /// キャンバスを消去するたびに進む
    epoch: u64,
}

impl Session {
    /// Predicting を Prompted に戻す
    fn settle(&mut self) {
        let phase = std::mem::replace(&mut self.phase, RoundPhase::Idle);
        self.phase = match phase {
            RoundPhase::Predicting { target } => RoundPhase::Prompted { target },
            other => other,
        };
    }
}

fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 予測中に future が破棄された場合に Predicting を解除する
struct InFlight<'a> {
    session: &'a Mutex<Session>,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("予測処理が中断されました");
            lock_session(self.session).settle();
        }
    }
}

pub struct RoundController<S, C> {
    surface: Arc<S>,
    classifier: Arc<C>,
    normalizer: ImageNormalizer,
    labels: LabelTable,
    settings: RoundSettings,
    session: Mutex<Session>,
    alive: AtomicBool,
}

impl<S: DrawingSurface, C: Classifier> RoundController<S, C> {
    pub fn new(
        surface: Arc<S>,
        classifier: Arc<C>,
        labels: LabelTable,
        normalizer: ImageNormalizer,
        settings: RoundSettings,
    ) -> Result<Self, LabelTableError> {
        let sampler = match settings.prompt_seed {
            Some(seed) => PromptSampler::with_seed(&labels, seed)?,
            None => PromptSampler::new(&labels)?,
        };

        Ok(Self {
            surface,
            classifier,
            normalizer,
            labels,
            settings,
            session: Mutex::new(Session {
                phase: RoundPhase::Idle,
                score: 0,
                sampler,
                prediction: None,
                result: None,
                epoch: 0,
            }),
            alive: AtomicBool::new(true),
        })
    }

    /// 設定ファイルの内容から作成
    pub fn from_config(surface: Arc<S>, classifier: Arc<C>, config: &AppConfig) -> anyhow::Result<Self> {
        let labels = config.labels.to_table()?;
        let controller = Self::new(
            surface,
            classifier,
            labels,
            ImageNormalizer::new(config.preprocess.clone()),
            config.round.clone(),
        )?;
        Ok(controller)
    }

    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn ensure_alive(&self) -> Result<(), RoundError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RoundError::SessionClosed)
        }
    }

    /// 新しいラウンドを開始してお題を返す
    ///
    /// モデルが使えない間は `ModelUnavailable` を返す（再試行可能）。
    pub fn start_round(&self) -> Result<String, RoundError> {
        self.ensure_alive()?;
        let status = self.classifier.status();
        if !status.is_ready() {
            return Err(RoundError::ModelUnavailable(status));
        }

        let mut session = lock_session(&self.session);
        if session.phase.is_predicting() {
            return Err(RoundError::PredictionInFlight);
        }

        let Some(target) = session.sampler.next() else {
            return Err(LabelTableError::NoPromptableLabels.into());
        };
        session.prediction = None;
        session.result = None;
        session.epoch += 1;
        session.phase = RoundPhase::Prompted {
            target: target.clone(),
        };
        self.surface.reset_all();

        info!(target = %target, score = session.score, "ラウンドを開始しました");
        Ok(target)
    }

    /// 現在の描画を予測して採点する
    pub async fn predict(&self) -> Result<PredictOutcome, RoundError> {
        self.ensure_alive()?;
        let status = self.classifier.status();
        if !status.is_ready() {
            debug!(status = %status, "モデルが使えないため予測しません");
            return Ok(PredictOutcome::NotReady(status));
        }

        let claimed = {
            let mut session = lock_session(&self.session);
            match &session.phase {
                RoundPhase::Predicting { .. } => {
                    debug!("予測処理中のため無視します");
                    return Ok(PredictOutcome::Busy);
                }
                RoundPhase::Idle => None,
                RoundPhase::Prompted { target } => {
                    let target = target.clone();
                    session.phase = RoundPhase::Predicting {
                        target: target.clone(),
                    };
                    Some((target, session.epoch))
                }
            }
        };

        let Some((target, epoch)) = claimed else {
            let target = self.start_round()?;
            return Ok(PredictOutcome::RoundStarted(target));
        };

        let in_flight = InFlight {
            session: &self.session,
            armed: true,
        };
        let attempt = self.run_attempt().await;
        let outcome = self.finish_attempt(&target, epoch, attempt);
        in_flight.disarm();
        outcome
    }

    /// 書き出し → 正規化 → 推論。空キャンバスの場合は `None`
    async fn run_attempt(&self) -> Result<Option<PredictionResult>, RoundError> {
        let snapshot = self.surface.export_raster().await?;
        let grid = self.normalizer.normalize(&snapshot)?;

        let mean = grid.mean();
        if mean < self.settings.empty_threshold {
            debug!(mean, "空キャンバスと判定しました");
            return Ok(None);
        }

        let raw = self.classifier.infer(grid).await?;
        Ok(Some(PredictionResult::select(&self.labels, raw)?))
    }

    fn finish_attempt(
        &self,
        target: &str,
        epoch: u64,
        attempt: Result<Option<PredictionResult>, RoundError>,
    ) -> Result<PredictOutcome, RoundError> {
        let mut session = lock_session(&self.session);
        session.settle();

        if !self.alive.load(Ordering::SeqCst) {
            info!("セッション終了済みのため予測結果を破棄しました");
            return Ok(PredictOutcome::Discarded);
        }
        if session.epoch != epoch {
            info!("予測中にキャンバスが消去されたため結果を破棄しました");
            return Ok(PredictOutcome::Discarded);
        }

        let result = match attempt {
            Err(e) => {
                warn!(error = %e, "予測に失敗しました");
                return Err(e);
            }
            Ok(None) => {
                session.prediction = None;
                RoundResult::no_drawing(target)
            }
            Ok(Some(prediction)) => {
                let result = RoundResult::from_prediction(target, &prediction);
                if result.success {
                    session.score += 1;
                }
                info!(
                    target = %target,
                    predicted = %prediction.label,
                    confidence = prediction.confidence,
                    success = result.success,
                    score = session.score,
                    "予測が完了しました"
                );
                session.prediction = Some(prediction);
                result
            }
        };

        session.result = Some(result.clone());
        Ok(PredictOutcome::Completed(result))
    }

    /// キャンバスを消去して直前の予測結果を破棄する（お題とスコアは維持）
    pub fn clear(&self) -> Result<(), RoundError> {
        self.ensure_alive()?;
        let mut session = lock_session(&self.session);
        session.epoch += 1;
        session.prediction = None;
        session.result = None;
        self.surface.reset_all();
        debug!("キャンバスを消去しました");
        Ok(())
    }

    /// 最後のストロークを取り消す
    pub fn undo(&self) -> Result<(), RoundError> {
        self.ensure_alive()?;
        self.surface.undo_last_stroke();
        Ok(())
    }

    /// セッションを終了する。処理中の予測結果は反映されない
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            info!("セッションを終了しました");
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> GameState {
        let session = lock_session(&self.session);
        GameState {
            target_label: session.phase.target().map(str::to_string),
            score: session.score,
            is_predicting: session.phase.is_predicting(),
        }
    }

    pub fn phase(&self) -> RoundPhase {
        lock_session(&self.session).phase.clone()
    }

    pub fn score(&self) -> u32 {
        lock_session(&self.session).score
    }

    pub fn last_prediction(&self) -> Option<PredictionResult> {
        lock_session(&self.session).prediction.clone()
    }

    pub fn last_result(&self) -> Option<RoundResult> {
        lock_session(&self.session).result.clone()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.classifier.status()
    }

    /// 予測ボタンを押せるか（モデル準備完了・予測中でない・お題あり）
    pub fn can_predict(&self) -> bool {
        !self.is_closed()
            && self.classifier.status().is_ready()
            && matches!(self.phase(), RoundPhase::Prompted { .. })
    }

    /// 表示用のお題（先頭を大文字に）
    pub fn target_display(&self) -> Option<String> {
        self.phase().target().map(capitalize)
    }

    /// 予測結果の表示文
    pub fn guess_text(&self) -> String {
        let session = lock_session(&self.session);
        if let Some(RoundResult {
            reason: Some(RoundReason::NoDrawing),
            ..
        }) = &session.result
        {
            return "I don't see anything yet — try drawing first.".to_string();
        }
        match &session.prediction {
            Some(prediction) => format!(
                "{} ({:.1}%)",
                prediction.label,
                prediction.confidence * 100.0
            ),
            None => "Draw something, then let the AI guess!".to_string(),
        }
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
