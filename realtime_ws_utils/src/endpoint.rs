// realtime_ws_utils/src/endpoint.rs

//! 实时通道地址的构造。

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::WsError;

/// 连接实时通道时附加在地址上的查询参数。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct EndpointParams {
    /// 租户（机构）标识。
    pub tenant: String,
    /// 客户端标识，例如叫号屏编号。
    pub client: String,
    /// 可选的访问令牌。
    pub token: Option<String>,
}

/// 由基础地址和查询参数构造 WebSocket 地址。
///
/// `http` / `https` 会分别被替换为 `ws` / `wss`；其他非 WebSocket 协议返回 `InvalidUrl`。
/// 为空的参数不会被附加。
pub fn build_socket_url(base: &str, params: &EndpointParams) -> Result<Url, WsError> {
    let mut url = Url::parse(base.trim()).map_err(|e| WsError::InvalidUrl(format!("{}: {}", base, e)))?;

    let scheme = match url.scheme() {
        "ws" | "wss" => None,
        "http" => Some("ws"),
        "https" => Some("wss"),
        other => {
            return Err(WsError::InvalidUrl(format!(
                "不支持的协议 '{}'，实时通道地址必须以 ws:// 或 wss:// 开头",
                other
            )))
        }
    };
    if let Some(scheme) = scheme {
        url.set_scheme(scheme)
            .map_err(|_| WsError::InvalidUrl(format!("无法将 {} 转换为 {} 协议", base, scheme)))?;
    }

    {
        let mut query = url.query_pairs_mut();
        if !params.tenant.is_empty() {
            query.append_pair("tenant", &params.tenant);
        }
        if !params.client.is_empty() {
            query.append_pair("client", &params.client);
        }
        if let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) {
            query.append_pair("token", token);
        }
    }
    // 没有附加任何参数时去掉多余的 '?'
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EndpointParams {
        EndpointParams {
            tenant: "clinica-norte".to_string(),
            client: "painel 01".to_string(),
            token: Some("s3cr3t".to_string()),
        }
    }

    #[test]
    fn test_appends_query_parameters() {
        let url = build_socket_url("wss://queue.example.com/ws", &params()).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://queue.example.com/ws?tenant=clinica-norte&client=painel+01&token=s3cr3t"
        );
    }

    #[test]
    fn test_http_schemes_are_upgraded() {
        let url = build_socket_url("http://localhost:8088/ws", &EndpointParams::default()).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8088/ws");

        let url = build_socket_url("https://queue.example.com/ws", &EndpointParams::default()).unwrap();
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn test_empty_parameters_are_skipped() {
        let url = build_socket_url(
            "ws://localhost/ws",
            &EndpointParams {
                tenant: "t1".to_string(),
                client: String::new(),
                token: Some(String::new()),
            },
        )
        .unwrap();
        assert_eq!(url.as_str(), "ws://localhost/ws?tenant=t1");
    }

    #[test]
    fn test_rejects_invalid_urls() {
        assert!(matches!(
            build_socket_url("ftp://queue.example.com/ws", &params()),
            Err(WsError::InvalidUrl(_))
        ));
        assert!(matches!(build_socket_url("", &params()), Err(WsError::InvalidUrl(_))));
        assert!(matches!(build_socket_url("not a url", &params()), Err(WsError::InvalidUrl(_))));
    }
}
