use async_trait::async_trait;
use chrono::{DateTime, Local};
use qiab_core::config::StoreConfig;
use qiab_core::session::entity::{AccessToken, StoredToken};
use qiab_core::store::error::StoreError;
use qiab_core::store::port::TokenStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// TokenStore 的文件实现。
///
/// # Summary
/// 文件中只保存原始令牌字符串，不含换行或其它元数据；
/// 文件修改时间即令牌的签发时间。
///
/// # Invariants
/// * 写入先落临时文件再原子重命名，读者不会看到写了一半的令牌。
/// * 在 unix 平台上文件权限为 0600。
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// 使用指定的令牌文件路径创建存储实例。
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 根据存储配置拼接 `data_dir/token_file`。
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(Path::new(&config.data_dir).join(&config.token_file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    /// # Logic
    /// 1. 文件不存在视为从未登录，返回 `None`。
    /// 2. 读取修改时间并转换为本地时区。
    /// 3. 读取内容并去除首尾空白，只有空白的文件返回 `Corrupted`。
    async fn load(&self) -> Result<Option<StoredToken>, StoreError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Token file {} does not exist", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let issued_at: DateTime<Local> = meta.modified()?.into();
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(StoreError::Corrupted(format!(
                "{} contains no token",
                self.path.display()
            )));
        }

        Ok(Some(StoredToken {
            token: AccessToken(token.to_string()),
            issued_at,
        }))
    }

    /// # Logic
    /// 1. 确保父目录存在。
    /// 2. 写入临时文件并收紧权限。
    /// 3. 重命名覆盖正式文件。
    async fn save(&self, token: &AccessToken) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, token.as_str()).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        info!("Access token persisted to {}", self.path.display());
        Ok(())
    }
}
