//! 模型输出解析：{dialogues: [{character_name, content, emotion}]}
//!
//! 修复流水线按顺序尝试，任一步成功即返回：
//! 1. 原文直接解析
//! 2. 去掉 Markdown 代码块与前后说明文字（取最外层 {…} / […]）
//! 3. 转义字符串字面量中的裸换行 / 回车 / 制表符，合并连续的 \n
//! 4. 所有空白与转义序列归一为单个空格
//!
//! dialogues 为空视为失败；解析失败不重试。

use serde::Deserialize;
use thiserror::Error;

use crate::script::types::Turn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("model output is not valid dialogue JSON: {last_error}")]
    Malformed { last_error: String },

    #[error("model output contains no dialogues")]
    NoDialogues,
}

#[derive(Deserialize)]
struct RawTurn {
    #[serde(alias = "speaker", alias = "name")]
    character_name: String,
    content: String,
    #[serde(default)]
    emotion: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { dialogues: Vec<RawTurn> },
    Bare(Vec<RawTurn>),
}

/// 去掉 ``` 代码块标记与前后说明文字，返回最外层 JSON 对象或数组
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let inner = if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.find("```").map(|end| &rest[..end]).unwrap_or(rest)
    } else {
        trimmed
    };
    extract_outermost(inner).unwrap_or(inner).trim().to_string()
}

/// 取第一个 { 或 [ 到与之对应的最后一个闭合符之间的文本
fn extract_outermost(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// 字符串字面量内的裸控制字符转义为 \n / \r / \t，并合并连续的 \n
pub fn escape_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    while out.contains("\\n\\n") {
        out = out.replace("\\n\\n", "\\n");
    }
    out
}

/// 转义序列与空白统一替换为单个空格
pub fn collapse_whitespace(text: &str) -> String {
    let replaced = text
        .replace("\\r\\n", " ")
        .replace("\\n", " ")
        .replace("\\r", " ")
        .replace("\\t", " ");
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn try_parse(candidate: &str) -> Result<Vec<Turn>, ParseError> {
    let envelope: Envelope = serde_json::from_str(candidate).map_err(|e| ParseError::Malformed {
        last_error: e.to_string(),
    })?;
    let raw = match envelope {
        Envelope::Wrapped { dialogues } => dialogues,
        Envelope::Bare(list) => list,
    };
    if raw.is_empty() {
        return Err(ParseError::NoDialogues);
    }
    Ok(raw
        .into_iter()
        .map(|r| Turn {
            character_name: r.character_name.trim().to_string(),
            content: r.content.trim().to_string(),
            emotion: r.emotion.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
        })
        .collect())
}

/// 按修复流水线解析模型输出
pub fn parse_model_json(text: &str) -> Result<Vec<Turn>, ParseError> {
    let stripped = strip_code_fences(text);
    let escaped = escape_control_chars(&stripped);
    let collapsed = collapse_whitespace(&escaped);
    let candidates = [text.trim().to_string(), stripped, escaped, collapsed];

    let mut last_error = ParseError::Malformed {
        last_error: "empty output".to_string(),
    };
    for (step, candidate) in candidates.iter().enumerate() {
        match try_parse(candidate) {
            Ok(turns) => {
                if step > 0 {
                    tracing::debug!(step = step + 1, "Model output parsed after repair");
                }
                return Ok(turns);
            }
            Err(e) => last_error = e,
        }
    }
    tracing::warn!(error = %last_error, preview = %preview(text), "Failed to parse model output");
    Err(last_error)
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let turns = parse_model_json(
            r#"{"dialogues":[{"character_name":"A","content":"你好","emotion":"开心"}]}"#,
        )
        .unwrap();
        assert_eq!(turns, vec![Turn::new("A", "你好").with_emotion("开心")]);
    }

    #[test]
    fn test_parse_bare_array() {
        let turns = parse_model_json(r#"[{"character_name":"A","content":"你好"}]"#).unwrap();
        assert_eq!(turns.len(), 1);
        assert!(turns[0].emotion.is_none());
    }

    #[test]
    fn test_strip_code_fences() {
        let text = "好的，这是结果：\n```json\n{\"dialogues\": []}\n```\n希望有帮助";
        assert_eq!(strip_code_fences(text), "{\"dialogues\": []}");
        assert_eq!(strip_code_fences("前言 [1, 2] 后记"), "[1, 2]");
    }

    #[test]
    fn test_fenced_output_parses() {
        let text = "```json\n{\"dialogues\":[{\"character_name\":\"A\",\"content\":\"嗨\"}]}\n```";
        assert_eq!(parse_model_json(text).unwrap().len(), 1);
    }

    #[test]
    fn test_escape_control_chars() {
        let raw = "{\"content\": \"第一行\n\n\n第二行\t结束\"}\n";
        let fixed = escape_control_chars(raw);
        assert_eq!(fixed, "{\"content\": \"第一行\\n第二行\\t结束\"}\n");
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["content"], "第一行\n第二行\t结束");
    }

    #[test]
    fn test_raw_newlines_inside_strings_parse() {
        let text = "{\"dialogues\":[{\"character_name\":\"A\",\"content\":\"上一句\n下一句\"}]}";
        let turns = parse_model_json(text).unwrap();
        assert_eq!(turns[0].content, "上一句\n下一句");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("a\\n\\nb   c\\td"), "a b c d");
    }

    #[test]
    fn test_empty_dialogues_is_error() {
        assert_eq!(parse_model_json(r#"{"dialogues": []}"#), Err(ParseError::NoDialogues));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_model_json("抱歉，我无法完成这个请求"),
            Err(ParseError::Malformed { .. })
        ));
    }
}
