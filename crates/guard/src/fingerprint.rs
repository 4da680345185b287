//! 请求指纹计算
//!
//! 指纹 = SHA-256(nonce \n timestamp \n METHOD \n path \n query \n SHA-256(body))
//!
//! - method 转大写，path 和 query 转小写
//! - nonce 按原始字节参与计算，非 UTF-8 字节不做替换
//! - 没有请求体时 body 摘要为空字符串
//! - 分隔符 `\n` 不会出现在合法的请求头值、请求目标或方法名中
//! - 结果为 64 位大写十六进制字符串
//!
//! 原始请求数据不会被保存，只保留摘要。

use crate::error::{GuardError, GuardResult};
use axum::body::Body;
use axum::http::Request;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::trace;

const DELIMITER: &[u8] = b"\n";

/// 请求指纹，作为 Nonce 存储的 key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 指纹构建器（无状态）
pub struct FingerprintBuilder;

impl FingerprintBuilder {
    /// 根据请求身份字段计算指纹
    ///
    /// `body` 为 `None` 或空切片时视为没有请求体
    pub fn build(
        method: &str,
        path: &str,
        query: &str,
        nonce: &[u8],
        timestamp: &str,
        body: Option<&[u8]>,
    ) -> Fingerprint {
        let body_digest = body
            .filter(|b| !b.is_empty())
            .map(sha256_hex)
            .unwrap_or_default();

        let method = method.to_uppercase();
        let path = path.to_lowercase();
        let query = query.to_lowercase();

        let canonical = [
            nonce,
            timestamp.as_bytes(),
            method.as_bytes(),
            path.as_bytes(),
            query.as_bytes(),
            body_digest.as_bytes(),
        ]
        .join(DELIMITER);

        Fingerprint(sha256_hex(&canonical))
    }

    /// 从 HTTP 请求计算指纹
    ///
    /// 请求体会被完整读取，然后以相同内容放回请求中，下游处理器仍然可以读取。
    /// 请求体超过 `max_body_bytes` 时返回 `GuardError::BodyTooLarge`。
    pub async fn from_request(
        request: &mut Request<Body>,
        nonce: &[u8],
        timestamp: &str,
        max_body_bytes: usize,
    ) -> GuardResult<Fingerprint> {
        let body = read_body(request, max_body_bytes).await?;

        let query = request.uri().query().unwrap_or_default();
        let fingerprint = Self::build(
            request.method().as_str(),
            request.uri().path(),
            query,
            nonce,
            timestamp,
            Some(body.as_slice()),
        );

        // 放回请求体
        *request.body_mut() = Body::from(body);

        trace!("Computed request fingerprint: {}", fingerprint);
        Ok(fingerprint)
    }
}

async fn read_body(request: &mut Request<Body>, limit: usize) -> GuardResult<Vec<u8>> {
    if let Some(length) = request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        && length > limit
    {
        return Err(GuardError::BodyTooLarge { limit });
    }

    let mut stream = std::mem::take(request.body_mut()).into_data_stream();
    let mut collected = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GuardError::Body(e.to_string()))?;
        if collected.len() + chunk.len() > limit {
            return Err(GuardError::BodyTooLarge { limit });
        }
        collected.extend_from_slice(&chunk);
    }

    Ok(collected)
}

fn sha256_hex(input: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Fingerprint {
        FingerprintBuilder::build(
            "POST",
            "/api/orders",
            "page=1",
            b"abc",
            "1700000000",
            Some(b"{\"amount\":10}"),
        )
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(base(), base());
        assert_eq!(base().as_str().len(), 64);
        assert!(
            base()
                .as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_fingerprint_matches_canonical_form() {
        let body_digest = hex::encode_upper(Sha256::digest(b"{\"amount\":10}"));
        let canonical = format!("abc\n1700000000\nPOST\n/api/orders\npage=1\n{body_digest}");
        let expected = hex::encode_upper(Sha256::digest(canonical.as_bytes()));

        assert_eq!(base().as_str(), expected);
    }

    #[test]
    fn test_fingerprint_changes_with_every_field() {
        let reference = base();
        let body: &[u8] = b"{\"amount\":10}";

        let fp = FingerprintBuilder::build;
        let variants = [
            fp("PUT", "/api/orders", "page=1", b"abc", "1700000000", Some(body)),
            fp("POST", "/api/order", "page=1", b"abc", "1700000000", Some(body)),
            fp("POST", "/api/orders", "page=2", b"abc", "1700000000", Some(body)),
            fp("POST", "/api/orders", "page=1", b"abd", "1700000000", Some(body)),
            fp("POST", "/api/orders", "page=1", b"abc", "1700000001", Some(body)),
            fp("POST", "/api/orders", "page=1", b"abc", "1700000000", Some(b"{}")),
            fp("POST", "/api/orders", "page=1", b"abc", "1700000000", None),
        ];

        for variant in &variants {
            assert_ne!(variant, &reference);
        }
    }

    #[test]
    fn test_fingerprint_normalizes_case() {
        let lower = FingerprintBuilder::build("post", "/API/Orders", "Page=1", b"abc", "1", None);
        let upper = FingerprintBuilder::build("POST", "/api/orders", "page=1", b"abc", "1", None);
        assert_eq!(lower, upper);

        // nonce 保持原样
        let other_nonce =
            FingerprintBuilder::build("POST", "/api/orders", "page=1", b"ABC", "1", None);
        assert_ne!(other_nonce, upper);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let a = FingerprintBuilder::build("POST", "/x", "", b"ab", "c", None);
        let b = FingerprintBuilder::build("POST", "/x", "", b"a", "bc", None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_non_utf8_nonces_stay_distinct() {
        let a = FingerprintBuilder::build("POST", "/x", "", b"tx-\xff", "1", None);
        let b = FingerprintBuilder::build("POST", "/x", "", b"tx-\xfe", "1", None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_body_equals_no_body() {
        let empty = FingerprintBuilder::build("POST", "/x", "", b"n", "1", Some(b""));
        let none = FingerprintBuilder::build("POST", "/x", "", b"n", "1", None);
        assert_eq!(empty, none);
    }

    #[tokio::test]
    async fn test_body_is_still_readable_after_fingerprint() {
        let payload = "{\"transfer\":42}";
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/transfer?Dry=true")
            .body(Body::from(payload))
            .unwrap();

        let fingerprint =
            FingerprintBuilder::from_request(&mut request, b"n-1", "1700000000", 1024)
                .await
                .unwrap();

        let expected = FingerprintBuilder::build(
            "POST",
            "/api/transfer",
            "dry=true",
            b"n-1",
            "1700000000",
            Some(payload.as_bytes()),
        );
        assert_eq!(fingerprint, expected);

        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], payload.as_bytes());
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let mut request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();

        let result = FingerprintBuilder::from_request(&mut request, b"n", "1", 16).await;
        assert!(matches!(result, Err(GuardError::BodyTooLarge { limit: 16 })));
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_rejected() {
        let mut request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-length", "4096")
            .body(Body::empty())
            .unwrap();

        let result = FingerprintBuilder::from_request(&mut request, b"n", "1", 1024).await;
        assert!(matches!(result, Err(GuardError::BodyTooLarge { .. })));
    }
}
