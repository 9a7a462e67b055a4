use tracing::debug;

/// # Summary
/// 为进程安装 rustls 的 ring 加密后端。
///
/// # Logic
/// 1. reqwest 与 tokio-tungstenite 均以 `rustls-no-provider` 方式构建，必须先安装全局 Provider。
/// 2. 重复安装返回 Err，视为已安装，直接忽略。
pub fn ensure_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}
