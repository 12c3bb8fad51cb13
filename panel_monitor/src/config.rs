use log::{info, warn};
use realtime_ws_utils::{build_socket_url, ActivationPolicy, EndpointParams, ProtectionPolicy, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::AppError;

/// 默认配置文件名
pub const CONFIG_FILE_NAME: &str = "panel_monitor.json";
/// 用于覆盖配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "PANEL_MONITOR_CONFIG";
/// 队列后端实时通道的默认地址
pub const DEFAULT_BASE_URL: &str = "ws://127.0.0.1:8088/ws";

/// 实时通道相关配置
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MonitorWsConfig {
    /// 实时通道的基础地址，`http(s)://` 会被转换为 `ws(s)://`
    pub base_url: String,
    /// 附加在地址上的租户 / 客户端标识
    pub endpoint: EndpointParams,
    pub reconnect: ReconnectPolicy,
    pub activation: ActivationPolicy,
    pub protection: ProtectionPolicy,
    /// 握手超时（单位：毫秒）
    pub connect_timeout_ms: u64,
}

impl Default for MonitorWsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint: EndpointParams {
                tenant: "default".to_string(),
                client: "panel-monitor".to_string(),
                token: None,
            },
            reconnect: ReconnectPolicy::default(),
            // 启动后稍等片刻，并等待首屏数据就绪再建立连接
            activation: ActivationPolicy {
                enable_after_delay_ms: Some(1_000),
                require_data_ready: true,
            },
            protection: ProtectionPolicy::default(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl MonitorWsConfig {
    /// 构造完整的实时通道地址
    pub fn socket_url(&self) -> Result<Url, AppError> {
        Ok(build_socket_url(&self.base_url, &self.endpoint)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<(), AppError> {
        self.reconnect
            .validate()
            .map_err(|e| AppError::ConfigError(format!("重连策略无效: {}", e)))?;
        if self.connect_timeout_ms == 0 {
            return Err(AppError::ConfigError("握手超时必须大于 0".to_string()));
        }
        Ok(())
    }
}

/// 监视器的主配置结构体
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 实时通道的相关配置
    pub websocket: MonitorWsConfig,
}

/// 获取配置文件路径：优先使用环境变量，其次为当前目录下的 `panel_monitor.json`
pub fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

/// 加载配置文件；文件不存在或已损坏时使用默认配置并写回文件
pub fn load_or_create_config(path: &Path) -> Result<AppConfig, AppError> {
    let config = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("[配置模块] 已成功从配置文件 {:?} 加载应用配置。", path);
                config
            }
            Err(e) => {
                warn!(
                    "[配置模块] 警告：从 {:?} 反序列化配置失败: {}. 文件可能已损坏。将使用默认配置并尝试覆盖。",
                    path, e
                );
                let default_config = AppConfig::default();
                persist_default(&default_config, path);
                default_config
            }
        },
        Err(e) => {
            info!(
                "[配置模块] 未在 {:?} 找到配置文件或读取时发生错误 (错误: {}). 将使用默认配置并尝试创建新文件。",
                path, e
            );
            let default_config = AppConfig::default();
            persist_default(&default_config, path);
            default_config
        }
    };
    config.websocket.validate()?;
    Ok(config)
}

/// 写回默认配置。写入失败不影响本次启动。
fn persist_default(config: &AppConfig, path: &Path) {
    if let Err(e) = save_config(config, path) {
        warn!("[配置模块] 错误：将配置写入文件 {:?} 时失败: {}", path, e);
    }
}

/// 保存配置到文件
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::ConfigError(format!("序列化配置信息失败: {}", e)))?;
    fs::write(path, content)?;
    info!("[配置模块] 已成功将当前配置保存到 {:?}.", path);
    Ok(())
}
