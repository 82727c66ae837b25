//! バックグラウンド推論ワーカー
//!
//! 分類器を専用スレッドに閉じ込め、要求をチャネル経由で1件ずつ処理します。
//! 画面側のスレッドを推論で止めないための仕組みで、分類器自体は
//! ワーカースレッドの外に出ません。

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use burn::tensor::backend::Backend;
use image::RgbaImage;
use tokio::sync::{mpsc, oneshot};

use crate::classifier::{Classifier, Prediction};
use crate::error::{ClassifierError, Result};

/// ワーカーへの分類要求
struct ClassifyRequest {
    image: RgbaImage,
    reply: oneshot::Sender<Result<Prediction>>,
}

/// 推論ワーカーのハンドル
///
/// 破棄するとチャネルを閉じ、処理中の要求を終えてからスレッドを合流させる。
pub struct InferenceWorker {
    tx: Option<mpsc::Sender<ClassifyRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    /// ワーカースレッドを起動
    ///
    /// `factory` はワーカースレッド上で呼ばれ、分類器（モデル）を構築する。
    /// 構築に失敗した場合はそのエラーを返す。
    pub fn spawn<B, F>(capacity: usize, factory: F) -> Result<Self>
    where
        B: Backend,
        F: FnOnce() -> Result<Classifier<B>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<ClassifyRequest>(capacity.max(1));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();

        let handle = std::thread::Builder::new()
            .name("inference-worker".to_string())
            .spawn(move || {
                let classifier = match factory() {
                    Ok(classifier) => {
                        let _ = ready_tx.send(Ok(()));
                        classifier
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                tracing::info!("推論ワーカーを開始しました");
                while let Some(request) = rx.blocking_recv() {
                    let result = classifier.classify(&request.image);
                    if let Err(ref e) = result {
                        tracing::warn!("分類に失敗しました: {}", e);
                    }
                    // 呼び出し側が待つのをやめていても処理は続ける
                    let _ = request.reply.send(result);
                }
                tracing::info!("推論ワーカーを終了しました");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                tx: Some(tx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(ClassifierError::WorkerClosed)
            }
        }
    }

    fn sender(&self) -> Result<&mpsc::Sender<ClassifyRequest>> {
        self.tx.as_ref().ok_or(ClassifierError::WorkerClosed)
    }

    /// 画像を分類（非同期）
    ///
    /// 待ち行列が満杯の間は空きが出るまで待つ。
    pub async fn classify(&self, image: RgbaImage) -> Result<Prediction> {
        let (reply, response) = oneshot::channel();
        self.sender()?
            .send(ClassifyRequest { image, reply })
            .await
            .map_err(|_| ClassifierError::WorkerClosed)?;
        response.await.map_err(|_| ClassifierError::WorkerClosed)?
    }

    /// 画像を分類（ブロッキング）
    ///
    /// 非同期ランタイムの外から呼ぶこと。
    pub fn blocking_classify(&self, image: RgbaImage) -> Result<Prediction> {
        let (reply, response) = oneshot::channel();
        self.sender()?
            .blocking_send(ClassifyRequest { image, reply })
            .map_err(|_| ClassifierError::WorkerClosed)?;
        response
            .blocking_recv()
            .map_err(|_| ClassifierError::WorkerClosed)?
    }

    /// ワーカーが要求を受け付けられるか
    pub fn is_running(&self) -> bool {
        self.tx.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false)
    }

    /// チャネルを閉じてスレッドの終了を待つ
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("推論ワーカーが異常終了しました");
            }
        }
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
