// realtime_ws_utils/src/config.rs

//! 连接管理的策略配置。
//!
//! 三个结构体都可以直接从 JSON 配置文件反序列化（时间以毫秒表示），
//! 缺失的字段使用 `Default` 中的取值。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::WsError;

/// 默认的首次重连间隔（毫秒）。
pub const DEFAULT_BASE_INTERVAL_MS: u64 = 1_000;
/// 默认的退避增长倍数。
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;
/// 默认的最大重连次数。
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// 默认的单次重连等待上限（毫秒）。
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// 默认的重连通知防抖间隔（毫秒）。
pub const DEFAULT_RECONNECT_NOTICE_DEBOUNCE_MS: u64 = 1_000;

/// 重连退避策略。
///
/// 第 `n` 次重连（`n` 从 0 开始计，即递增前的计数值）前的等待时间为
/// `base_interval × growth_factor^n`，若设置了 `max_delay_ms` 则再截断到该上限。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// 首次重连的等待时间（毫秒）。
    pub base_interval_ms: u64,
    /// 每次重连后等待时间的增长倍数，必须大于 1。
    pub growth_factor: f64,
    /// 最大重连次数。达到后状态停留在 `Error`，不再自动重连。
    pub max_attempts: u32,
    /// 单次等待时间的上限（毫秒）；`None` 表示不截断。
    pub max_delay_ms: Option<u64>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_interval_ms: DEFAULT_BASE_INTERVAL_MS,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay_ms: Some(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl ReconnectPolicy {
    /// 首次重连间隔。
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    /// 计算第 `attempt` 次重连前的等待时间（`attempt` 为递增前的计数值）。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let growth = if self.growth_factor.is_finite() && self.growth_factor >= 1.0 {
            self.growth_factor
        } else {
            DEFAULT_GROWTH_FACTOR
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        // f64 -> u64 的 as 转换在溢出时饱和为 u64::MAX
        let millis = (self.base_interval_ms as f64 * growth.powi(exponent)).round() as u64;
        let millis = match self.max_delay_ms {
            Some(max) => millis.min(max),
            None => millis,
        };
        Duration::from_millis(millis)
    }

    /// 校验配置取值是否合理。
    pub fn validate(&self) -> Result<(), WsError> {
        if !(self.growth_factor.is_finite() && self.growth_factor > 1.0) {
            return Err(WsError::Message(format!(
                "重连增长倍数必须是大于 1 的有限数，当前为 {}",
                self.growth_factor
            )));
        }
        if let Some(max) = self.max_delay_ms {
            if max < self.base_interval_ms {
                return Err(WsError::Message(format!(
                    "重连等待上限 {}ms 小于首次重连间隔 {}ms",
                    max, self.base_interval_ms
                )));
            }
        }
        Ok(())
    }
}

/// 渐进激活策略。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ActivationPolicy {
    /// 构造后延迟多久才允许建立连接（毫秒）；`None` 表示不等待。
    pub enable_after_delay_ms: Option<u64>,
    /// 是否必须等待使用方调用 `mark_data_ready()` 后才建立连接。
    pub require_data_ready: bool,
}

impl ActivationPolicy {
    pub fn enable_after_delay(&self) -> Option<Duration> {
        self.enable_after_delay_ms.map(Duration::from_millis)
    }
}

/// 防护封装策略。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProtectionPolicy {
    /// 重连通知的防抖间隔（毫秒）。连接反复抖动时，此窗口内只通知最后一次重连尝试。
    pub reconnect_notice_debounce_ms: u64,
}

impl Default for ProtectionPolicy {
    fn default() -> Self {
        Self {
            reconnect_notice_debounce_ms: DEFAULT_RECONNECT_NOTICE_DEBOUNCE_MS,
        }
    }
}

impl ProtectionPolicy {
    pub fn reconnect_notice_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect_notice_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 测试退避时间按 base × growth^attempt 增长。
    fn test_delay_grows_exponentially() {
        let policy = ReconnectPolicy {
            base_interval_ms: 100,
            growth_factor: 2.0,
            max_attempts: 3,
            max_delay_ms: None,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(102_400));
    }

    #[test]
    fn test_delay_is_clamped_by_max_delay() {
        let policy = ReconnectPolicy {
            base_interval_ms: 1_000,
            growth_factor: 3.0,
            max_attempts: 50,
            max_delay_ms: Some(5_000),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(5_000));
    }

    #[test]
    /// 无上限时极大的指数不会溢出 panic。
    fn test_unclamped_delay_saturates() {
        let policy = ReconnectPolicy {
            max_delay_ms: None,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_validate_rejects_bad_growth_factor() {
        let policy = ReconnectPolicy {
            growth_factor: 1.0,
            ..ReconnectPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(ReconnectPolicy::default().validate().is_ok());
    }

    #[test]
    /// 测试部分字段缺失的 JSON 使用默认值补齐。
    fn test_policies_deserialize_with_defaults() {
        let policy: ReconnectPolicy = serde_json::from_str(r#"{"max_attempts": 10}"#).unwrap();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.base_interval_ms, DEFAULT_BASE_INTERVAL_MS);
        assert_eq!(policy.max_delay_ms, Some(DEFAULT_MAX_DELAY_MS));

        let activation: ActivationPolicy =
            serde_json::from_str(r#"{"enable_after_delay_ms": 1500}"#).unwrap();
        assert_eq!(activation.enable_after_delay(), Some(Duration::from_millis(1_500)));
        assert!(!activation.require_data_ready);
    }
}
