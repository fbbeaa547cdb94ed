//! Document - 문서 타입
//!
//! 서버가 반환하는 문서와 재개 토큰

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Document - 문서
// ============================================================================

/// 문서 (키-값 맵)
///
/// 와이어 인코딩은 전송 계층의 책임이므로, 드라이버 코어는
/// 디코딩이 끝난 JSON 맵만 다룹니다.
pub type Document = serde_json::Map<String, Value>;

/// 문서의 `_id` 필드 조회
pub fn document_id(doc: &Document) -> Option<&Value> {
    doc.get("_id")
}

// ============================================================================
// ResumeToken - 재개 토큰
// ============================================================================

/// 재개 토큰
///
/// 결과 스트림 내 위치를 나타내는 불투명 값입니다. 끊어진 스트림을
/// 다시 열 때 서버에 전달됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeToken(Value);

impl ResumeToken {
    /// 새 재개 토큰 생성
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// 문서의 `_id`에서 토큰 생성
    pub fn from_document(doc: &Document) -> Option<Self> {
        document_id(doc).cloned().map(Self)
    }

    /// 토큰 값
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// 토큰 값 소유권 반환
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ResumeToken {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_document_id() {
        let doc = doc! { "_id" => 7, "name" => "Alice" };
        assert_eq!(document_id(&doc), Some(&Value::from(7)));

        let doc = doc! { "name" => "Bob" };
        assert!(document_id(&doc).is_none());
    }

    #[test]
    fn test_resume_token_from_document() {
        let doc = doc! { "_id" => "token-1", "payload" => true };
        let token = ResumeToken::from_document(&doc).unwrap();
        assert_eq!(token.value(), &Value::from("token-1"));

        // _id가 없으면 토큰 없음
        let doc = doc! { "payload" => true };
        assert!(ResumeToken::from_document(&doc).is_none());
    }

    #[test]
    fn test_resume_token_display() {
        let token = ResumeToken::new(Value::from("abc"));
        assert_eq!(token.to_string(), "\"abc\"");
    }

    #[test]
    fn test_doc_macro() {
        let empty = doc! {};
        assert!(empty.is_empty());

        let doc = doc! { "a" => 1, "b" => "two" };
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("b"), Some(&Value::from("two")));
    }
}
