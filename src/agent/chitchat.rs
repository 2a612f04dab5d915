//! Chit-chat short-circuit
//!
//! Pattern-based classifier that keeps greetings, thanks and meta questions
//! out of the retrieval pipeline. No LLM call is made to classify.
//!
//! Precedence:
//! 1. exact phrase match (answered with a fixed template)
//! 2. short message starting with a greeting prefix
//! 3. any business keyword overrides 1-2 and forces retrieval
//! 4. very short messages without business keywords are chit-chat;
//!    anything longer goes through the full pipeline

use serde::Serialize;

/// Longest message the greeting-prefix rule applies to (characters)
pub const SHORT_PREFIX_MAX_CHARS: usize = 12;

/// Longest message treated as chit-chat by length alone (characters)
pub const SHORT_MESSAGE_MAX_CHARS: usize = 4;

/// Kind of conversational message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChitchatKind {
    Greeting,
    Thanks,
    Farewell,
    Identity,
    Acknowledgement,
    SmallTalk,
}

impl ChitchatKind {
    /// Fixed reply used for exact-phrase matches
    pub fn template(&self) -> &'static str {
        match self {
            ChitchatKind::Greeting => "您好！我是公文檢索助理，可以幫您查詢公文、派工單與相關統計，請問需要什麼協助？",
            ChitchatKind::Thanks => "不客氣！還有其他需要查詢的公文或資料嗎？",
            ChitchatKind::Farewell => "再見，祝您順利！有需要隨時再來查詢。",
            ChitchatKind::Identity => {
                "我是公文檢索助理，可以依主旨、發文單位、日期搜尋公文，查詢派工單、機關與人員關係，以及統計案件數量。"
            }
            ChitchatKind::Acknowledgement => "好的，有需要查詢的內容請直接告訴我。",
            ChitchatKind::SmallTalk => "我主要協助查詢公文與派工資料，請問有什麼想查的嗎？",
        }
    }
}

/// Which rule produced the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChitchatRule {
    ExactPhrase,
    GreetingPrefix,
    BusinessKeyword,
    ShortMessage,
    Default,
}

/// Classifier verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChitchatDecision {
    pub is_chitchat: bool,
    pub rule: ChitchatRule,
    pub kind: Option<ChitchatKind>,
}

impl ChitchatDecision {
    fn chitchat(rule: ChitchatRule, kind: ChitchatKind) -> Self {
        Self {
            is_chitchat: true,
            rule,
            kind: Some(kind),
        }
    }

    fn retrieval(rule: ChitchatRule) -> Self {
        Self {
            is_chitchat: false,
            rule,
            kind: None,
        }
    }

    /// Fixed reply, only for exact-phrase matches
    pub fn template(&self) -> Option<&'static str> {
        match (self.rule, self.kind) {
            (ChitchatRule::ExactPhrase, Some(kind)) => Some(kind.template()),
            _ => None,
        }
    }
}

const EXACT_PHRASES: &[(&str, ChitchatKind)] = &[
    ("你好", ChitchatKind::Greeting),
    ("您好", ChitchatKind::Greeting),
    ("哈囉", ChitchatKind::Greeting),
    ("嗨", ChitchatKind::Greeting),
    ("安安", ChitchatKind::Greeting),
    ("早", ChitchatKind::Greeting),
    ("早安", ChitchatKind::Greeting),
    ("午安", ChitchatKind::Greeting),
    ("晚安", ChitchatKind::Greeting),
    ("hi", ChitchatKind::Greeting),
    ("hello", ChitchatKind::Greeting),
    ("hey", ChitchatKind::Greeting),
    ("謝謝", ChitchatKind::Thanks),
    ("謝謝你", ChitchatKind::Thanks),
    ("感謝", ChitchatKind::Thanks),
    ("多謝", ChitchatKind::Thanks),
    ("謝啦", ChitchatKind::Thanks),
    ("thanks", ChitchatKind::Thanks),
    ("thank you", ChitchatKind::Thanks),
    ("再見", ChitchatKind::Farewell),
    ("掰掰", ChitchatKind::Farewell),
    ("拜拜", ChitchatKind::Farewell),
    ("bye", ChitchatKind::Farewell),
    ("你是誰", ChitchatKind::Identity),
    ("你叫什麼名字", ChitchatKind::Identity),
    ("你會做什麼", ChitchatKind::Identity),
    ("你能做什麼", ChitchatKind::Identity),
    ("你可以做什麼", ChitchatKind::Identity),
    ("who are you", ChitchatKind::Identity),
    ("好", ChitchatKind::Acknowledgement),
    ("好的", ChitchatKind::Acknowledgement),
    ("ok", ChitchatKind::Acknowledgement),
    ("收到", ChitchatKind::Acknowledgement),
    ("了解", ChitchatKind::Acknowledgement),
    ("嗯", ChitchatKind::Acknowledgement),
];

const GREETING_PREFIXES: &[(&str, ChitchatKind)] = &[
    ("你好", ChitchatKind::Greeting),
    ("您好", ChitchatKind::Greeting),
    ("哈囉", ChitchatKind::Greeting),
    ("嗨", ChitchatKind::Greeting),
    ("早安", ChitchatKind::Greeting),
    ("午安", ChitchatKind::Greeting),
    ("晚安", ChitchatKind::Greeting),
    ("hi ", ChitchatKind::Greeting),
    ("hello", ChitchatKind::Greeting),
    ("hey", ChitchatKind::Greeting),
    ("謝謝", ChitchatKind::Thanks),
    ("感謝", ChitchatKind::Thanks),
    ("辛苦了", ChitchatKind::Thanks),
    ("再見", ChitchatKind::Farewell),
    ("你是", ChitchatKind::Identity),
];

const BUSINESS_KEYWORDS: &[&str] = &[
    "公文", "來文", "發文", "收文", "文號", "函", "公告", "簽呈", "文件", "資料",
    "查", "搜尋", "找", "派工", "工單", "案件", "承辦", "進度", "統計", "幾件",
    "多少", "局", "會議", "單位",
];

/// Trim, lowercase and drop trailing punctuation
fn normalize(message: &str) -> String {
    message
        .trim()
        .trim_end_matches(|c: char| c.is_whitespace() || "!！。.~～?？,，、…".contains(c))
        .to_lowercase()
}

pub fn has_business_keyword(text: &str) -> bool {
    BUSINESS_KEYWORDS.iter().any(|k| text.contains(k))
}

/// Decide whether a message can skip retrieval
pub fn classify(message: &str) -> ChitchatDecision {
    let text = normalize(message);
    let chars = text.chars().count();

    if text.is_empty() {
        return ChitchatDecision::chitchat(ChitchatRule::ShortMessage, ChitchatKind::SmallTalk);
    }

    if let Some((_, kind)) = EXACT_PHRASES.iter().find(|(phrase, _)| *phrase == text) {
        return ChitchatDecision::chitchat(ChitchatRule::ExactPhrase, *kind);
    }

    let prefix_match = if chars <= SHORT_PREFIX_MAX_CHARS {
        GREETING_PREFIXES
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix))
            .map(|(_, kind)| *kind)
    } else {
        None
    };

    if has_business_keyword(&text) {
        return ChitchatDecision::retrieval(ChitchatRule::BusinessKeyword);
    }

    if let Some(kind) = prefix_match {
        return ChitchatDecision::chitchat(ChitchatRule::GreetingPrefix, kind);
    }

    if chars <= SHORT_MESSAGE_MAX_CHARS {
        return ChitchatDecision::chitchat(ChitchatRule::ShortMessage, ChitchatKind::SmallTalk);
    }

    ChitchatDecision::retrieval(ChitchatRule::Default)
}

/// System prompt for the single LLM reply to non-template chit-chat
pub fn chitchat_system_prompt() -> &'static str {
    "你是公文檢索助理。使用者現在只是在閒聊，請用繁體中文簡短、友善地回應（兩句以內），\
     必要時提醒你可以協助查詢公文、派工單與統計資料。不要編造任何公文內容。"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_phrase() {
        let decision = classify("你好");
        assert!(decision.is_chitchat);
        assert_eq!(decision.rule, ChitchatRule::ExactPhrase);
        assert_eq!(decision.kind, Some(ChitchatKind::Greeting));
        assert!(decision.template().is_some());

        assert_eq!(classify("謝謝！").kind, Some(ChitchatKind::Thanks));
        assert_eq!(classify("  Hello!! ").rule, ChitchatRule::ExactPhrase);
    }

    #[test]
    fn test_greeting_prefix() {
        let decision = classify("你好啊，今天天氣不錯");
        assert!(decision.is_chitchat);
        assert_eq!(decision.rule, ChitchatRule::GreetingPrefix);
        assert!(decision.template().is_none());
    }

    #[test]
    fn test_business_keyword_overrides_greeting() {
        let decision = classify("早安，幫我查公文");
        assert!(!decision.is_chitchat);
        assert_eq!(decision.rule, ChitchatRule::BusinessKeyword);

        assert!(!classify("你好，工務局").is_chitchat);
        assert!(!classify("派工").is_chitchat);
    }

    #[test]
    fn test_length_fallback() {
        assert_eq!(classify("哈哈哈").rule, ChitchatRule::ShortMessage);
        assert!(classify("哈哈哈").is_chitchat);
        assert!(!classify("最近道路養護的進展如何").is_chitchat);
        assert_eq!(classify("最近道路養護的情況如何").rule, ChitchatRule::Default);
    }

    #[test]
    fn test_long_greeting_is_not_prefix_matched() {
        let decision = classify("你好，我想了解一下最近道路養護工程的執行情況");
        assert!(!decision.is_chitchat);
    }

    #[test]
    fn test_blank_message() {
        assert!(classify("   ").is_chitchat);
    }
}
