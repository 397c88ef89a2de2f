//! 图像渲染边界
//!
//! 渲染器把 Token 字符串变成可扫描的内容；核心逻辑从不依赖渲染结果。

use crate::payload::Token;
use thiserror::Error;
use url::Url;

/// 渲染产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// 位图等二进制图像
    Image {
        content_type: String,
        bytes: Vec<u8>,
    },
    /// 文本标记（SVG、链接等）
    Markup(String),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("Render failed: {0}")]
    Failed(String),
}

/// Token 渲染器
pub trait TokenRenderer: Send + Sync {
    fn render(&self, token: &Token) -> Result<Rendered, RenderError>;
}

/// 签到链接渲染器
///
/// 生成 `<base>?token=<token>` 形式的链接，交给外部二维码绘制工具编码
#[derive(Debug, Clone)]
pub struct LinkRenderer {
    base: Url,
}

impl LinkRenderer {
    pub fn new(base_url: &str) -> Result<Self, RenderError> {
        Ok(Self {
            base: Url::parse(base_url)?,
        })
    }

    pub fn link(&self, token: &Token) -> String {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("token", token.as_str());
        url.to_string()
    }
}

impl TokenRenderer for LinkRenderer {
    fn render(&self, token: &Token) -> Result<Rendered, RenderError> {
        Ok(Rendered::Markup(self.link(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_renderer() {
        let renderer = LinkRenderer::new("https://checkin.example.com/scan").unwrap();
        let token = Token::from("abc_DEF-123".to_string());

        assert_eq!(
            renderer.render(&token).unwrap(),
            Rendered::Markup("https://checkin.example.com/scan?token=abc_DEF-123".to_string())
        );
    }

    #[test]
    fn test_link_renderer_keeps_existing_query() {
        let renderer = LinkRenderer::new("https://checkin.example.com/scan?lang=en").unwrap();
        let link = renderer.link(&Token::from("t".to_string()));
        assert_eq!(link, "https://checkin.example.com/scan?lang=en&token=t");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            LinkRenderer::new("not a url"),
            Err(RenderError::InvalidBaseUrl(_))
        ));
    }
}
