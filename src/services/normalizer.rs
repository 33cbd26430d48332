//! Colloquial-to-statutory legal vocabulary

use crate::error::{LeaseRagError, Result};
use crate::services::{QueryNormalizer, ServiceError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Built-in term table: everyday wording on the left, statutory term on the right
const BUILTIN_TERMS: &[(&str, &str)] = &[
    // Parties and premises
    ("집주인", "임대인"),
    ("건물주", "임대인"),
    ("주인집", "임대인"),
    ("임대업자", "임대인"),
    ("새주인", "임대인"),
    ("세입자", "임차인"),
    ("월세입자", "임차인"),
    ("세들어사는사람", "임차인"),
    ("임차자", "임차인"),
    ("입주자", "임차인"),
    ("부동산", "공인중개사"),
    ("중개인", "공인중개사"),
    ("중개소", "공인중개사"),
    ("빌라", "임차주택"),
    ("아파트", "임차주택"),
    ("오피스텔", "임차주택"),
    ("우리집", "임차주택"),
    ("거주지", "임차주택"),
    ("계약서", "임대차계약증서"),
    ("집문서", "임대차계약증서"),
    // Deposits and money
    ("보증금", "임대차보증금"),
    ("전세금", "임대차보증금"),
    ("보증보험", "보증금반환보증"),
    ("돈못받음", "보증금미반환"),
    ("안돌려줌", "보증금미반환"),
    ("못돌려받음", "보증금미반환"),
    ("월세", "차임"),
    ("연체", "차임연체"),
    ("밀림", "차임연체"),
    ("복비", "중개보수"),
    ("수수료", "중개보수"),
    ("중개비", "중개보수"),
    ("월세올리기", "차임증액"),
    ("인상", "증액"),
    ("더달라고함", "증액"),
    ("월세깎기", "차임감액"),
    ("할인", "감액"),
    ("내리기", "감액"),
    ("돈먼저받기", "우선변제권"),
    ("순위", "우선변제권"),
    ("안전장치", "대항력"),
    ("돌려받기", "보증금반환"),
    // Term, termination and renewal
    ("재계약", "계약갱신"),
    ("연장", "계약갱신"),
    ("갱신", "계약갱신"),
    ("갱신청구", "계약갱신요구권"),
    ("2년더", "계약갱신요구권"),
    ("2플러스2", "계약갱신요구권"),
    ("자동연장", "묵시적갱신"),
    ("묵시", "묵시적갱신"),
    ("연락없음", "묵시적갱신"),
    ("이사", "주택의인도"),
    ("짐빼기", "주택의인도"),
    ("퇴거", "주택의인도"),
    ("방빼", "계약해지"),
    ("중도해지", "계약해지"),
    ("주소옮기기", "주민등록"),
    ("전입신고", "주민등록"),
    ("주소지이전", "주민등록"),
    ("집주인바뀜", "임대인지위승계"),
    ("주인바뀜", "임대인지위승계"),
    ("매매", "임대인지위승계"),
    ("나가라고함", "계약갱신거절"),
    ("쫓겨남", "명도"),
    ("비워달라", "명도"),
    // Repairs and living conditions
    ("집고치기", "수선의무"),
    ("수리", "수선의무"),
    ("고쳐줘", "수선의무"),
    ("안고쳐줌", "수선의무위반"),
    ("곰팡이", "하자"),
    ("물샘", "누수"),
    ("보일러고장", "하자"),
    ("파손", "훼손"),
    ("깨끗이치우기", "원상회복의무"),
    ("원래대로해놓기", "원상회복"),
    ("청소비", "원상회복비용"),
    ("청소", "원상회복"),
    ("층간소음", "공동생활평온"),
    ("옆집소음", "방음"),
    ("개키우기", "반려동물특약"),
    ("담배", "흡연금지특약"),
    // Priority rights and registration
    ("전입", "주민등록"),
    ("우선변제", "우선변제권"),
    ("최우선", "최우선변제권"),
    ("경매", "경매절차"),
    ("공매", "공매절차"),
    ("등기", "등기부등본"),
    ("등본", "등기부등본"),
    ("근저당", "근저당권"),
    ("깡통전세", "전세피해"),
    ("사기", "전세사기"),
    ("경매넘어감", "권리리스크"),
    // Dispute resolution
    ("민사", "민사소송"),
    ("조정위", "주택임대차분쟁조정위원회"),
    ("소송말고", "분쟁조정"),
    ("법원가기싫음", "분쟁조정"),
    ("집주인사망", "임차권승계"),
    ("자식상속", "임차권승계"),
];

#[derive(Debug, Deserialize)]
struct DictionaryFile {
    terms: BTreeMap<String, String>,
}

/// Immutable mapping from colloquial wording to statutory terms
#[derive(Debug, Clone, PartialEq)]
pub struct LegalDictionary {
    terms: BTreeMap<String, String>,
}

impl Default for LegalDictionary {
    fn default() -> Self {
        Self::from_pairs(BUILTIN_TERMS.iter().copied())
    }
}

impl LegalDictionary {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            terms: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Load a replacement table from a TOML file with a `[terms]` table
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LeaseRagError::Io {
            source: e,
            context: format!("Failed to read dictionary file: {:?}", path),
        })?;
        let file: DictionaryFile = toml::from_str(&content)?;

        if file.terms.is_empty() {
            return Err(LeaseRagError::Dictionary {
                path: path.to_path_buf(),
                message: "no entries under [terms]".to_string(),
            });
        }

        Ok(Self { terms: file.terms })
    }

    pub fn get(&self, word: &str) -> Option<&str> {
        self.terms.get(word).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.terms.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Longest entry that `text` starts with
    fn longest_prefix<'a>(&'a self, text: &str) -> Option<(&'a str, &'a str)> {
        self.terms
            .iter()
            .filter(|(word, _)| !word.is_empty() && text.starts_with(word.as_str()))
            .max_by_key(|(word, _)| word.len())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Offline normalizer: annotates every dictionary hit as `word(term)`
///
/// Matching is greedy and left to right, preferring the longest entry at each
/// position. Entries that map a word onto itself are left untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct DictionaryNormalizer;

impl DictionaryNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn annotate(dictionary: &LegalDictionary, question: &str) -> String {
        let mut out = String::with_capacity(question.len() * 2);
        let mut rest = question;

        while let Some(ch) = rest.chars().next() {
            match dictionary.longest_prefix(rest) {
                Some((word, term)) => {
                    if word == term {
                        out.push_str(word);
                    } else {
                        out.push_str(word);
                        out.push('(');
                        out.push_str(term);
                        out.push(')');
                    }
                    rest = &rest[word.len()..];
                }
                None => {
                    out.push(ch);
                    rest = &rest[ch.len_utf8()..];
                }
            }
        }

        out
    }
}

impl QueryNormalizer for DictionaryNormalizer {
    fn normalize(&self, dictionary: &LegalDictionary, question: &str) -> std::result::Result<String, ServiceError> {
        Ok(Self::annotate(dictionary, question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_dictionary() {
        let dict = LegalDictionary::default();
        assert_eq!(dict.get("집주인"), Some("임대인"));
        assert_eq!(dict.get("보증금"), Some("임대차보증금"));
        assert!(dict.len() > 50);
    }

    #[test]
    fn test_annotates_colloquial_terms() {
        let dict = LegalDictionary::default();
        let normalized = DictionaryNormalizer::annotate(&dict, "집주인이 보증금을 안 돌려줘요");
        assert_eq!(normalized, "집주인(임대인)이 보증금(임대차보증금)을 안 돌려줘요");
    }

    #[test]
    fn test_longest_match_wins() {
        let dict = LegalDictionary::from_pairs([("집주인", "임대인"), ("집주인바뀜", "임대인지위승계")]);
        assert_eq!(
            DictionaryNormalizer::annotate(&dict, "집주인바뀜 문의"),
            "집주인바뀜(임대인지위승계) 문의"
        );
    }

    #[test]
    fn test_identity_entries_are_not_annotated() {
        let dict = LegalDictionary::from_pairs([("확정일자", "확정일자")]);
        assert_eq!(DictionaryNormalizer::annotate(&dict, "확정일자 받기"), "확정일자 받기");
    }

    #[test]
    fn test_no_hits_returns_input() {
        let dict = LegalDictionary::default();
        let question = "hello world";
        assert_eq!(DictionaryNormalizer.normalize(&dict, question).unwrap(), question);
    }

    #[test]
    fn test_from_toml_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("terms.toml");
        std::fs::write(&path, "[terms]\n\"월세\" = \"차임\"\n").unwrap();

        let dict = LegalDictionary::from_toml_file(&path).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get("월세"), Some("차임"));

        std::fs::write(&path, "[terms]\n").unwrap();
        assert!(matches!(
            LegalDictionary::from_toml_file(&path),
            Err(LeaseRagError::Dictionary { .. })
        ));
    }
}
