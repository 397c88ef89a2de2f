//! Token 加密编解码
//!
//! 使用 AES-256-GCM 对 `TokenPayload` 进行认证加密
//! 编码格式: base64url_nopad(iv[12] || ciphertext || tag[16])

// Allow deprecated generic-array::from_slice until aes-gcm upgrades
#![allow(deprecated)]

use crate::error::{DecodeError, EncodeError, KeyError};
use crate::payload::{Token, TokenPayload};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use base64::prelude::*;
use rand::RngCore;
use tracing::{debug, info};

/// AES-GCM 初始化向量长度
const IV_LEN: usize = 12;
/// AES-GCM 认证 tag 长度
const TAG_LEN: usize = 16;
/// 密钥长度 (AES-256)
pub const KEY_LEN: usize = 32;

/// 对称密钥来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// 直接从配置文件读取
    Direct(String),
    /// 从环境变量读取
    Environment(String),
    /// 从文件路径读取
    File(String),
}

impl KeySource {
    /// 读取原始密钥字符串
    pub fn load(&self) -> Result<String, KeyError> {
        match self {
            KeySource::Direct(key) => {
                debug!("Loading token secret from direct configuration");
                Ok(key.clone())
            }
            KeySource::Environment(env_var) => {
                debug!("Loading token secret from environment variable: {}", env_var);
                std::env::var(env_var).map_err(|e| KeyError::Unreadable {
                    source_name: format!("environment variable {env_var}"),
                    reason: e.to_string(),
                })
            }
            KeySource::File(path) => {
                debug!("Loading token secret from file: {}", path);
                std::fs::read_to_string(path).map_err(|e| KeyError::Unreadable {
                    source_name: format!("file {path}"),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Token 编解码器
///
/// 不感知时间与使用状态，只负责可逆、防篡改的变换
#[derive(Clone)]
pub struct TokenCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &"AES-256-GCM")
            .finish()
    }
}

impl TokenCodec {
    /// 从密钥来源创建编解码器
    pub fn from_key_source(source: &KeySource) -> Result<Self, KeyError> {
        let key = source.load()?;
        Self::from_key_str(&key)
    }

    /// 从密钥字符串创建编解码器
    ///
    /// 支持:
    /// - 64 字符的十六进制字符串 (32 字节)
    /// - 44 字符（或去掉填充后 43 字符）的 Base64 字符串 (32 字节)
    pub fn from_key_str(key: &str) -> Result<Self, KeyError> {
        let key = key.trim();

        let key_bytes = match key.len() {
            64 => hex::decode(key)?,
            44 => BASE64_STANDARD.decode(key)?,
            43 => BASE64_STANDARD_NO_PAD.decode(key)?,
            other => return Err(KeyError::InvalidLength(other)),
        };

        let key_bytes: [u8; KEY_LEN] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSize(key_bytes.len()))?;

        info!("Token secret loaded successfully");
        Ok(Self::from_bytes(&key_bytes))
    }

    pub fn from_bytes(key: &[u8; KEY_LEN]) -> Self {
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// 生成新的密钥（十六进制格式的 32 字节随机数）
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }

    /// 加密 payload 为 URL 安全的 Token
    ///
    /// 每次调用使用新的随机 IV，相同 payload 产生不同的 Token
    pub fn encode(&self, payload: &TokenPayload) -> Result<Token, EncodeError> {
        let plaintext = serde_json::to_vec(payload)?;

        let mut iv_bytes = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv_bytes);
        let iv = Nonce::from_slice(&iv_bytes);

        let ciphertext = self
            .cipher
            .encrypt(iv, plaintext.as_slice())
            .map_err(|e| EncodeError::Encryption(e.to_string()))?;

        // 组合: iv || ciphertext (包含 tag)
        let mut packed = Vec::with_capacity(IV_LEN + ciphertext.len());
        packed.extend_from_slice(&iv_bytes);
        packed.extend_from_slice(&ciphertext);

        Ok(Token::from(BASE64_URL_SAFE_NO_PAD.encode(&packed)))
    }

    /// 解密并校验 Token
    pub fn decode(&self, token: &str) -> Result<TokenPayload, DecodeError> {
        let packed = BASE64_URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| DecodeError::Malformed(format!("invalid base64url: {e}")))?;

        if packed.len() < IV_LEN + TAG_LEN {
            return Err(DecodeError::Malformed(format!(
                "expected at least {} bytes, got {}",
                IV_LEN + TAG_LEN,
                packed.len()
            )));
        }

        let (iv_bytes, ciphertext) = packed.split_at(IV_LEN);
        let iv = Nonce::from_slice(iv_bytes);

        let plaintext = self
            .cipher
            .decrypt(iv, ciphertext)
            .map_err(|_| DecodeError::AuthenticationFailed)?;

        // 只有持有同一密钥的生产方才能走到这里
        serde_json::from_slice(&plaintext).map_err(|e| {
            DecodeError::Malformed(format!("authenticated plaintext is not a token payload: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::from_key_str(&TokenCodec::generate_key()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let payload = TokenPayload::new("event-🎉-A/B?c=d", 1_700_000_000_000, 1_700_000_060_000);

        let token = codec.encode(&payload).unwrap();
        let decoded = codec.decode(token.as_str()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_encode_is_non_deterministic() {
        let codec = codec();
        let payload = TokenPayload::new("event-A", 0, 1_000);

        let t1 = codec.encode(&payload).unwrap();
        let t2 = codec.encode(&payload).unwrap();
        assert_ne!(t1, t2);
        assert_eq!(codec.decode(t1.as_str()).unwrap(), payload);
        assert_eq!(codec.decode(t2.as_str()).unwrap(), payload);
    }

    #[test]
    fn test_token_is_url_safe() {
        let codec = codec();
        for _ in 0..32 {
            let token = codec.encode(&TokenPayload::new("e", 0, 1)).unwrap();
            assert!(
                token
                    .as_str()
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );
        }
    }

    #[test]
    fn test_every_byte_flip_is_detected() {
        let codec = codec();
        let token = codec.encode(&TokenPayload::new("event-A", 0, 1_000)).unwrap();
        let packed = BASE64_URL_SAFE_NO_PAD.decode(token.as_str()).unwrap();

        for i in 0..packed.len() {
            let mut tampered = packed.clone();
            tampered[i] ^= 0x01;
            let tampered = BASE64_URL_SAFE_NO_PAD.encode(&tampered);
            assert_eq!(
                codec.decode(&tampered),
                Err(DecodeError::AuthenticationFailed),
                "flip at byte {i} not detected"
            );
        }
    }

    #[test]
    fn test_decode_with_wrong_key() {
        let token = codec().encode(&TokenPayload::new("event-A", 0, 1)).unwrap();
        assert_eq!(
            codec().decode(token.as_str()),
            Err(DecodeError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_decode_malformed() {
        let codec = codec();
        assert!(matches!(codec.decode(""), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            codec.decode("not valid base64!!"),
            Err(DecodeError::Malformed(_))
        ));

        let short = BASE64_URL_SAFE_NO_PAD.encode([0u8; 27]);
        assert!(matches!(codec.decode(&short), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_minimum_length_garbage_is_forged() {
        let codec = codec();
        let garbage = BASE64_URL_SAFE_NO_PAD.encode([7u8; 28]);
        assert_eq!(codec.decode(&garbage), Err(DecodeError::AuthenticationFailed));
    }

    #[test]
    fn test_key_formats() {
        let hex_key = TokenCodec::generate_key();
        assert_eq!(hex_key.len(), 64);
        assert!(TokenCodec::from_key_str(&hex_key).is_ok());

        let mut raw = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut raw);
        assert!(TokenCodec::from_key_str(&BASE64_STANDARD.encode(raw)).is_ok());
        assert!(TokenCodec::from_key_str(&BASE64_STANDARD_NO_PAD.encode(raw)).is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            TokenCodec::from_key_str("too-short"),
            Err(KeyError::InvalidLength(9))
        ));

        let invalid_hex = "z".repeat(64);
        assert!(matches!(
            TokenCodec::from_key_str(&invalid_hex),
            Err(KeyError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_key_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let key = TokenCodec::generate_key();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{key}").unwrap();
        file.flush().unwrap();

        let source = KeySource::File(file.path().to_string_lossy().to_string());
        assert!(TokenCodec::from_key_source(&source).is_ok());
    }

    #[test]
    fn test_key_from_missing_env() {
        let source = KeySource::Environment("QRPASS_TEST_SECRET_THAT_IS_NOT_SET".to_string());
        assert!(matches!(
            TokenCodec::from_key_source(&source),
            Err(KeyError::Unreadable { .. })
        ));
    }

    #[test]
    #[serial_test::serial]
    fn test_key_from_environment() {
        let key = TokenCodec::generate_key();
        // SAFETY: serialized test, no other thread reads this variable
        unsafe { std::env::set_var("QRPASS_TEST_SECRET_KEY", &key) };

        let source = KeySource::Environment("QRPASS_TEST_SECRET_KEY".to_string());
        assert_eq!(source.load().unwrap(), key);
        assert!(TokenCodec::from_key_source(&source).is_ok());

        unsafe { std::env::remove_var("QRPASS_TEST_SECRET_KEY") };
        assert!(matches!(
            source.load(),
            Err(KeyError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_surrounding_whitespace_is_malformed() {
        let codec = codec();
        let token = codec
            .encode(&TokenPayload::new("event-A", 0, 60_000))
            .unwrap();

        for padded in [
            format!(" {}", token.as_str()),
            format!("{}\n", token.as_str()),
            format!("\t{} ", token.as_str()),
        ] {
            assert!(matches!(
                codec.decode(&padded),
                Err(DecodeError::Malformed(_))
            ));
        }
        assert!(codec.decode(token.as_str()).is_ok());
    }
}
