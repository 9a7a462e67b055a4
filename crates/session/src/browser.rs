use qiab_core::session::port::BrowserLauncher;
use std::process::{Command, Stdio};
use tracing::debug;

/// # Summary
/// 调用操作系统默认浏览器打开 URL。
///
/// # Logic
/// - Linux/BSD 使用 `xdg-open`，macOS 使用 `open`，Windows 使用 `cmd /C start`。
/// - 子进程在后台线程回收，调用方不等待浏览器退出。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl SystemBrowser {
    fn command(url: &str) -> Command {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        let mut child = Self::command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        std::thread::spawn(move || match child.wait() {
            Ok(status) => debug!("Browser launcher exited with {}", status),
            Err(e) => debug!("Browser launcher wait failed: {}", e),
        });
        Ok(())
    }
}
