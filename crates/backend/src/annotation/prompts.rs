//! Prompt text for the annotation engine.

use shared_types::{ExtractedInterviewInfo, Language, Tone};

pub const CLASSIFY_BODY_CHARS: usize = 1500;
pub const LANGUAGE_EXCERPT_CHARS: usize = 500;

pub const CLASSIFY_SYSTEM: &str =
    "You are a professional email analysis expert. Always respond with valid JSON only.";
pub const EXTRACT_SYSTEM: &str =
    "You are a professional information extraction expert. Always respond with valid JSON only.";
pub const LANGUAGE_SYSTEM: &str = "You are a language detection expert.";

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn classify(subject: &str, body: &str) -> String {
    format!(
        r#"Analyze if the following email is an interview invitation.

Subject: {subject}
Content: {content}

You must respond with EXACTLY this JSON format (no extra text):
{{
    "is_interview": true or false,
    "confidence": number between 0-100,
    "reason": "brief explanation"
}}

Criteria:
- Contains interview-related keywords (interview, 面試, meeting, 會談, etc.)
- Mentions time scheduling
- From company HR or recruiter
- Job position related content
"#,
        content = truncate_chars(body, CLASSIFY_BODY_CHARS)
    )
}

pub fn extract(subject: &str, body: &str) -> String {
    format!(
        r#"Extract detailed information from the following interview invitation email.

Subject: {subject}
Content: {body}

You must respond with EXACTLY this JSON format (no extra text):
{{
    "company_name": "company name or null",
    "position": "job position or null",
    "interview_date": "interview date in YYYY-MM-DD format or null",
    "interview_time": "interview time or null",
    "interview_location": "interview location or null",
    "interview_type": "online or onsite or phone or null",
    "interviewer_name": "interviewer name or null",
    "interviewer_email": "interviewer email or null",
    "additional_info": "other important information or null",
    "confidence_score": number between 0-100
}}

Important: Use null (not "null" string) for missing information.
"#
    )
}

pub fn detect_language(subject: &str, body: &str) -> String {
    format!(
        r#"Analyze the following email and determine its primary language.

Subject: {subject}
Content: {excerpt}

Respond with only one word: "chinese" or "english"
"#,
        excerpt = truncate_chars(body, LANGUAGE_EXCERPT_CHARS)
    )
}

/// How the requested tone is phrased in each language.
pub fn tone_instruction(tone: Tone, language: Language) -> &'static str {
    match (language, tone) {
        (Language::Chinese, Tone::Professional) => "專業且有禮貌",
        (Language::Chinese, Tone::Friendly) => "友善且熱忱",
        (Language::Chinese, Tone::Formal) => "正式且謹慎",
        (Language::English, Tone::Professional) => "professional and polite",
        (Language::English, Tone::Friendly) => "friendly and enthusiastic",
        (Language::English, Tone::Formal) => "formal and courteous",
    }
}

/// Plain summary of the extracted fields, used as language-detection input.
pub fn info_summary(info: &ExtractedInterviewInfo) -> String {
    let fields = [
        ("company", info.company_name.as_deref()),
        ("position", info.position.as_deref()),
        ("time", info.interview_time.as_deref()),
        ("location", info.interview_location.as_deref()),
        ("interviewer", info.interviewer_name.as_deref()),
        ("notes", info.additional_info.as_deref()),
    ];
    fields
        .iter()
        .filter_map(|(label, value)| value.map(|v| format!("{label}: {v}")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_unknown(value: Option<String>, unknown: &str) -> String {
    value.unwrap_or_else(|| unknown.to_string())
}

/// System and user prompt for a reply body.
pub fn reply(info: &ExtractedInterviewInfo, tone: Tone, language: Language) -> (&'static str, String) {
    let tone_desc = tone_instruction(tone, language);
    let date = info.interview_date.map(|d| d.format("%Y-%m-%d").to_string());
    let kind = info.interview_type.map(|t| t.as_str().to_string());

    match language {
        Language::Chinese => {
            let u = "未知";
            (
                "你是專業的商務郵件撰寫專家，擅長撰寫各種語調的回信。",
                format!(
                    r#"請根據以下面試資訊生成一封{tone_desc}的回信草稿。

面試資訊：
- 公司: {company}
- 職位: {position}
- 面試日期: {date}
- 面試時間: {time}
- 面試地點: {location}
- 面試類型: {kind}
- 面試官: {interviewer}

回信內容要求：
1. 感謝面試機會
2. 確認參加面試
3. 確認面試時間和地點
4. 表達期待
5. 語調要{tone_desc}
6. 使用繁體中文
7. 格式要適合 email

請直接回傳郵件內容，不需要額外說明。
"#,
                    company = or_unknown(info.company_name.clone(), u),
                    position = or_unknown(info.position.clone(), u),
                    date = or_unknown(date, u),
                    time = or_unknown(info.interview_time.clone(), u),
                    location = or_unknown(info.interview_location.clone(), u),
                    kind = or_unknown(kind, u),
                    interviewer = or_unknown(info.interviewer_name.clone(), u),
                ),
            )
        }
        Language::English => {
            let u = "Unknown";
            (
                "You are a professional business email writing expert skilled in crafting replies with various tones.",
                format!(
                    r#"Generate a {tone_desc} reply email based on the following interview information.

Interview Information:
- Company: {company}
- Position: {position}
- Interview Date: {date}
- Interview Time: {time}
- Interview Location: {location}
- Interview Type: {kind}
- Interviewer: {interviewer}

Reply requirements:
1. Thank for the interview opportunity
2. Confirm attendance
3. Confirm interview time and location
4. Express enthusiasm
5. Use {tone_desc} tone
6. Proper email format
7. Professional business English

Return only the email content without additional explanations.
"#,
                    company = or_unknown(info.company_name.clone(), u),
                    position = or_unknown(info.position.clone(), u),
                    date = or_unknown(date, u),
                    time = or_unknown(info.interview_time.clone(), u),
                    location = or_unknown(info.interview_location.clone(), u),
                    kind = or_unknown(kind, u),
                    interviewer = or_unknown(info.interviewer_name.clone(), u),
                ),
            )
        }
    }
}

/// System and user prompt for a reply subject line.
pub fn subject(original: &str, language: Language) -> (&'static str, String) {
    match language {
        Language::Chinese => (
            "你是專業的郵件主旨專家。",
            format!(
                r#"請為以下面試邀請郵件生成適當的回信主旨。

原主旨: {original}

回信主旨要求：
1. 表明這是回信 (Re:)
2. 保持簡潔專業
3. 繁體中文

請直接回傳主旨，不需要額外說明。
"#
            ),
        ),
        Language::English => (
            "You are a professional email subject line expert.",
            format!(
                r#"Generate an appropriate reply subject for the following interview invitation email.

Original Subject: {original}

Reply subject requirements:
1. Indicate this is a reply (Re:)
2. Keep it concise and professional
3. Use English

Return only the subject line without additional explanations.
"#
            ),
        ),
    }
}
