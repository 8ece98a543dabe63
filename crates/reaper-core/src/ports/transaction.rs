//! TransactionHandle port - in-flight な処理単位への cancel 口
//!
//! handle が公開する能力は `cancel()` ひとつだけです。

use crate::domain::CancelError;

/// TransactionHandle は実行中の transaction を止めるための handle
///
/// # 契約
/// - 冪等: 2 回目以降の呼び出しは何もしない
/// - すでに終わった transaction に対しても Err を返さない
/// - 戻った時点で、その transaction はもう状態を変更しない
/// - すぐに戻る（cancel は「要求」であり「完了確認」ではない）
pub trait TransactionHandle: Send + Sync {
    fn cancel(&self) -> Result<(), CancelError>;
}
