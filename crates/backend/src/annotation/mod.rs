//! LLM-backed annotation of emails.
//!
//! Each operation is one chat-completion round trip. Results carry how they
//! were obtained: [`Annotation::Structured`] when the model answered in the
//! requested shape, [`Annotation::Degraded`] when a fallback value was used,
//! and [`Annotation::Unavailable`] when the model could not be reached.

mod prompts;

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use shared_types::{
    ClassificationMethod, ExtractedInterviewInfo, ExtractionStatus, InterviewType, Language, Tone,
};

use crate::llm::ChatCompletion;

const ANALYSIS_TEMPERATURE: f32 = 0.1;
const REPLY_TEMPERATURE: f32 = 0.3;

/// Confidence used when the model answered but the extraction could not be parsed
pub const DEGRADED_EXTRACTION_CONFIDENCE: u8 = 50;

const KEYWORDS: &[&str] = &[
    "interview", "面試", "面談", "會面", "meeting", "討論", "chat", "talk",
];
const OFFLINE_KEYWORDS: &[&str] = &["interview", "面試", "面談", "會面"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation<T> {
    Structured(T),
    Degraded(T),
    Unavailable,
}

impl<T> Annotation<T> {
    /// The value together with how it was obtained; `None` when unavailable.
    pub fn into_parts(self) -> Option<(T, ExtractionStatus)> {
        match self {
            Annotation::Structured(v) => Some((v, ExtractionStatus::Structured)),
            Annotation::Degraded(v) => Some((v, ExtractionStatus::Degraded)),
            Annotation::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_interview: bool,
    pub confidence: u8,
    pub method: ClassificationMethod,
}

#[derive(Clone)]
pub struct AnnotationEngine {
    chat: Arc<dyn ChatCompletion>,
}

impl AnnotationEngine {
    pub fn new(chat: Arc<dyn ChatCompletion>) -> Self {
        Self { chat }
    }

    /// Decide whether an email is an interview invitation. Always produces a
    /// result: unparseable answers fall back to a keyword scan, and an
    /// unreachable model to a narrower one.
    pub async fn classify(&self, subject: &str, body: &str) -> Classification {
        let prompt = prompts::classify(subject, body);
        let reply = self
            .chat
            .complete(prompts::CLASSIFY_SYSTEM, &prompt, ANALYSIS_TEMPERATURE)
            .await;

        match reply {
            Ok(text) => match parse_classification(&text) {
                Some((is_interview, confidence)) => Classification {
                    is_interview,
                    confidence,
                    method: ClassificationMethod::Structured,
                },
                None => {
                    tracing::warn!("Classification response was not JSON, using keyword scan");
                    let hit = contains_keyword(subject, body, KEYWORDS);
                    Classification {
                        is_interview: hit,
                        confidence: if hit { 70 } else { 30 },
                        method: ClassificationMethod::KeywordFallback,
                    }
                }
            },
            Err(e) => {
                tracing::error!("Classification request failed: {:#}", e);
                let hit = contains_keyword(subject, body, OFFLINE_KEYWORDS);
                Classification {
                    is_interview: hit,
                    confidence: if hit { 60 } else { 0 },
                    method: ClassificationMethod::OfflineFallback,
                }
            }
        }
    }

    pub async fn extract_fields(
        &self,
        subject: &str,
        body: &str,
    ) -> Annotation<ExtractedInterviewInfo> {
        let prompt = prompts::extract(subject, body);
        let text = match self
            .chat
            .complete(prompts::EXTRACT_SYSTEM, &prompt, ANALYSIS_TEMPERATURE)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Extraction request failed: {:#}", e);
                return Annotation::Unavailable;
            }
        };

        match parse_extraction(&text) {
            Some(info) => Annotation::Structured(info),
            None => {
                tracing::warn!("Extraction response was not JSON: {}", prompts::truncate_chars(&text, 200));
                Annotation::Degraded(ExtractedInterviewInfo::empty(DEGRADED_EXTRACTION_CONFIDENCE))
            }
        }
    }

    /// Primary language of a text; English when undecidable.
    pub async fn detect_language(&self, subject: &str, body: &str) -> Language {
        let prompt = prompts::detect_language(subject, body);
        match self
            .chat
            .complete(prompts::LANGUAGE_SYSTEM, &prompt, ANALYSIS_TEMPERATURE)
            .await
        {
            Ok(text) if text.to_lowercase().contains("chinese") => Language::Chinese,
            Ok(_) => Language::English,
            Err(e) => {
                tracing::error!("Language detection failed: {:#}", e);
                Language::English
            }
        }
    }

    /// Reply body in the language of the invitation. `None` when the model
    /// fails or returns nothing.
    pub async fn generate_reply(&self, info: &ExtractedInterviewInfo, tone: Tone) -> Option<String> {
        let language = self
            .detect_language(
                info.company_name.as_deref().unwrap_or_default(),
                &prompts::info_summary(info),
            )
            .await;

        let (system, prompt) = prompts::reply(info, tone, language);
        match self.chat.complete(system, &prompt, REPLY_TEMPERATURE).await {
            Ok(text) => {
                let body = text.trim();
                if body.is_empty() {
                    tracing::warn!("Reply generation returned an empty body");
                    None
                } else {
                    Some(body.to_string())
                }
            }
            Err(e) => {
                tracing::error!("Reply generation failed: {:#}", e);
                None
            }
        }
    }

    /// Reply subject line; `"Re: <original>"` on any failure.
    pub async fn generate_subject(&self, original: &str) -> String {
        let language = self.detect_language(original, "").await;
        let (system, prompt) = prompts::subject(original, language);

        let generated = match self
            .chat
            .complete(system, &prompt, ANALYSIS_TEMPERATURE)
            .await
        {
            Ok(text) => clean_subject(&text),
            Err(e) => {
                tracing::error!("Subject generation failed: {:#}", e);
                None
            }
        };

        generated.unwrap_or_else(|| format!("Re: {}", original))
    }
}

fn contains_keyword(subject: &str, body: &str, keywords: &[&str]) -> bool {
    let haystack = format!("{} {}", subject, body).to_lowercase();
    keywords.iter().any(|kw| haystack.contains(kw))
}

fn clean_subject(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Subject:")
        .or_else(|| line.strip_prefix("主旨:"))
        .or_else(|| line.strip_prefix("主旨："))
        .unwrap_or(line)
        .trim()
        .trim_matches('"')
        .trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Find a JSON object in a model answer, tolerating code fences and prose
/// around it.
fn json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Some(map);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// A 0..=100 score from a JSON number or numeric string.
fn score(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(0.0, 100.0) as u8)
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_classification(text: &str) -> Option<(bool, u8)> {
    let map = json_object(text)?;
    let is_interview = flag(map.get("is_interview")?)?;
    let confidence = score(map.get("confidence")?)?;
    Some((is_interview, confidence))
}

/// A present, meaningful string field. Models sometimes answer "null" as text.
fn text_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    let raw = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let lowered = raw.to_lowercase();
    if raw.is_empty() || matches!(lowered.as_str(), "null" | "none" | "n/a" | "unknown") {
        None
    } else {
        Some(raw)
    }
}

fn parse_extraction(text: &str) -> Option<ExtractedInterviewInfo> {
    let map = json_object(text)?;

    let interview_date = text_field(&map, "interview_date").and_then(|raw| {
        let parsed = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok();
        if parsed.is_none() {
            tracing::debug!("Ignoring interview date {:?}", raw);
        }
        parsed
    });

    Some(ExtractedInterviewInfo {
        company_name: text_field(&map, "company_name"),
        position: text_field(&map, "position"),
        interview_date,
        interview_time: text_field(&map, "interview_time"),
        interview_location: text_field(&map, "interview_location"),
        interview_type: text_field(&map, "interview_type")
            .as_deref()
            .and_then(InterviewType::from_str),
        interviewer_name: text_field(&map, "interviewer_name"),
        interviewer_email: text_field(&map, "interviewer_email"),
        additional_info: text_field(&map, "additional_info"),
        confidence_score: map
            .get("confidence_score")
            .and_then(score)
            .unwrap_or(DEGRADED_EXTRACTION_CONFIDENCE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChat;

    fn engine(chat: ScriptedChat) -> AnnotationEngine {
        AnnotationEngine::new(Arc::new(chat))
    }

    #[tokio::test]
    async fn test_classify_structured() {
        let chat = ScriptedChat::replying(
            r#"{"is_interview": true, "confidence": 92, "reason": "invitation"}"#,
        );
        let result = engine(chat).classify("Interview", "Please join us").await;
        assert_eq!(
            result,
            Classification {
                is_interview: true,
                confidence: 92,
                method: ClassificationMethod::Structured
            }
        );
    }

    #[tokio::test]
    async fn test_classify_tolerates_prose_and_clamps() {
        let chat = ScriptedChat::replying(
            "Sure! ```json\n{\"is_interview\": false, \"confidence\": 140}\n```",
        );
        let result = engine(chat).classify("Newsletter", "Weekly digest").await;
        assert!(!result.is_interview);
        assert_eq!(result.confidence, 100);
        assert_eq!(result.method, ClassificationMethod::Structured);
    }

    #[tokio::test]
    async fn test_classify_unparseable_uses_keyword_scan() {
        let chat = ScriptedChat::replying("I think this is probably an interview.");
        let result = engine(chat.clone()).classify("Quick chat?", "Let's talk").await;
        assert_eq!(result.method, ClassificationMethod::KeywordFallback);
        assert!(result.is_interview);
        assert_eq!(result.confidence, 70);

        let result = engine(chat).classify("Invoice", "Payment due").await;
        assert!(!result.is_interview);
        assert_eq!(result.confidence, 30);
    }

    #[tokio::test]
    async fn test_classify_offline_uses_narrow_keywords() {
        let result = engine(ScriptedChat::unreachable())
            .classify("面試邀請", "您好")
            .await;
        assert_eq!(result.method, ClassificationMethod::OfflineFallback);
        assert!(result.is_interview);
        assert_eq!(result.confidence, 60);

        // "meeting" is only in the wider list
        let result = engine(ScriptedChat::unreachable())
            .classify("Team meeting", "")
            .await;
        assert!(!result.is_interview);
        assert_eq!(result.confidence, 0);
    }

    #[tokio::test]
    async fn test_extract_structured_normalizes_fields() {
        let chat = ScriptedChat::replying(
            r#"{"company_name": "Acme", "position": "null", "interview_date": "2025-03-06",
                "interview_time": "14:00", "interview_location": null, "interview_type": "Online",
                "interviewer_name": "Dana", "interviewer_email": null, "additional_info": "",
                "confidence_score": 88.6}"#,
        );
        let Annotation::Structured(info) = engine(chat).extract_fields("s", "b").await else {
            panic!("expected structured extraction");
        };
        assert_eq!(info.company_name.as_deref(), Some("Acme"));
        assert_eq!(info.position, None);
        assert_eq!(info.interview_date, NaiveDate::from_ymd_opt(2025, 3, 6));
        assert_eq!(info.interview_type, Some(InterviewType::Online));
        assert_eq!(info.additional_info, None);
        assert_eq!(info.confidence_score, 89);
    }

    #[tokio::test]
    async fn test_extract_parse_failure_degrades() {
        let chat = ScriptedChat::replying("The company is Acme.");
        let result = engine(chat).extract_fields("s", "b").await;
        assert_eq!(
            result,
            Annotation::Degraded(ExtractedInterviewInfo::empty(DEGRADED_EXTRACTION_CONFIDENCE))
        );
    }

    #[tokio::test]
    async fn test_extract_outage_is_unavailable() {
        let result = engine(ScriptedChat::unreachable())
            .extract_fields("s", "b")
            .await;
        assert_eq!(result, Annotation::Unavailable);
    }

    #[tokio::test]
    async fn test_detect_language_defaults_to_english() {
        assert_eq!(
            engine(ScriptedChat::replying("Chinese")).detect_language("面試", "").await,
            Language::Chinese
        );
        assert_eq!(
            engine(ScriptedChat::replying("french?")).detect_language("x", "").await,
            Language::English
        );
        assert_eq!(
            engine(ScriptedChat::unreachable()).detect_language("x", "").await,
            Language::English
        );
    }

    #[tokio::test]
    async fn test_generate_reply_uses_detected_language() {
        let chat = ScriptedChat::new(|system, user| {
            if system == prompts::LANGUAGE_SYSTEM {
                Ok("chinese".to_string())
            } else if user.contains("正式且謹慎") {
                Ok("  您好，感謝您的邀請。  ".to_string())
            } else {
                Err("unexpected prompt".to_string())
            }
        });
        let info = ExtractedInterviewInfo {
            company_name: Some("台積電".to_string()),
            ..Default::default()
        };
        let body = engine(chat).generate_reply(&info, Tone::Formal).await;
        assert_eq!(body.as_deref(), Some("您好，感謝您的邀請。"));
    }

    #[tokio::test]
    async fn test_generate_reply_outage_is_none() {
        let info = ExtractedInterviewInfo::empty(80);
        assert!(engine(ScriptedChat::unreachable())
            .generate_reply(&info, Tone::Professional)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_subject_falls_back_to_re_prefix() {
        let offline = ScriptedChat::unreachable();
        let subject = engine(offline.clone())
            .generate_subject("Interview Invitation")
            .await;
        assert_eq!(subject, "Re: Interview Invitation");
        // language detection, then the subject itself
        assert_eq!(offline.calls(), 2);

        let chat = ScriptedChat::new(|system, _| {
            if system == prompts::LANGUAGE_SYSTEM {
                Ok("english".to_string())
            } else {
                Ok("   \n".to_string())
            }
        });
        assert_eq!(
            engine(chat).generate_subject("Interview Invitation").await,
            "Re: Interview Invitation"
        );
    }

    #[tokio::test]
    async fn test_subject_strips_label_and_quotes() {
        let chat = ScriptedChat::new(|system, _| {
            if system == prompts::LANGUAGE_SYSTEM {
                Ok("english".to_string())
            } else {
                Ok("Subject: \"Re: Interview Invitation - Confirmed\"".to_string())
            }
        });
        assert_eq!(
            engine(chat).generate_subject("Interview Invitation").await,
            "Re: Interview Invitation - Confirmed"
        );
    }
}
