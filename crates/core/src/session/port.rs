/// # Summary
/// 外部浏览器拉起接口。登录 URL 需要在操作员的浏览器中打开。
///
/// # Invariants
/// - 拉起失败只影响便利性，调用方必须仅记录日志而不中断流程。
pub trait BrowserLauncher: Send + Sync {
    /// 在外部浏览器中打开指定 URL
    fn open(&self, url: &str) -> std::io::Result<()>;
}
