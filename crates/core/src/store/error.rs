use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理令牌文件读写失败等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 文件系统读写失败
    #[error("Io error: {0}")]
    Io(String),
    /// 令牌文件存在但内容为空白
    #[error("Corrupted token file: {0}")]
    Corrupted(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
