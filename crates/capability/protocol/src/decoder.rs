//! 记录解码
//!
//! 设备按固定字段顺序 U、V、W、T 输出带符号十进制数。支持两种排布：
//!
//! ```text
//! 标签格式：   U=+01.23 V=-00.45 W=+00.02 T=+21.34
//! 分隔符格式： 010000320000000000000000000000;-0.001;-0.036;0.012;23.602;0.036;1.525
//!              ^ 状态字                      ^ U    ^ V    ^ W   ^ T    ^ 其余字段忽略
//! ```

use crate::error::DecodeError;
use domain::{DecodedSample, Field, RawRecord, RecordFormat};

const DELIMITER: char = ';';
const DELIMITED_MIN_FIELDS: usize = 1 + Field::ALL.len();

/// 记录解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordDecoder {
    format: RecordFormat,
}

impl RecordDecoder {
    pub fn new(format: RecordFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    pub fn decode(&self, record: &RawRecord) -> Result<DecodedSample, DecodeError> {
        decode(record, self.format)
    }
}

/// 将一条原始记录解码为样本。
///
/// 字段缺失、多余、非数值或非有限值都返回 [`DecodeError`]。
pub fn decode(record: &RawRecord, format: RecordFormat) -> Result<DecodedSample, DecodeError> {
    let text = record.as_text();
    let text = strip_framing(&text);
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let format = match format {
        RecordFormat::Auto if text.contains(DELIMITER) => RecordFormat::Delimited,
        RecordFormat::Auto => RecordFormat::Labeled,
        other => other,
    };
    let (status, values) = match format {
        RecordFormat::Delimited => decode_delimited(text)?,
        _ => (None, decode_labeled(text)?),
    };

    let [u, v, w, t] = values;
    Ok(DecodedSample {
        u,
        v,
        w,
        t,
        valid: true,
        status,
        ts_ms: record.received_at_ms,
    })
}

fn decode_labeled(text: &str) -> Result<[f64; 4], DecodeError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != Field::ALL.len() {
        return Err(DecodeError::FieldCount {
            expected: Field::ALL.len(),
            found: tokens.len(),
        });
    }

    let mut values = [0.0; 4];
    for (slot, (field, token)) in values.iter_mut().zip(Field::ALL.into_iter().zip(tokens)) {
        let (label, raw) = token.split_once('=').ok_or_else(|| DecodeError::Label {
            expected: field.label(),
            found: token.to_string(),
        })?;
        if !label.trim().eq_ignore_ascii_case(field.label()) {
            return Err(DecodeError::Label {
                expected: field.label(),
                found: label.to_string(),
            });
        }
        *slot = parse_number(field, raw)?;
    }
    Ok(values)
}

fn decode_delimited(text: &str) -> Result<(Option<String>, [f64; 4]), DecodeError> {
    let parts: Vec<&str> = text.split(DELIMITER).collect();
    if parts.len() < DELIMITED_MIN_FIELDS {
        return Err(DecodeError::FieldCount {
            expected: DELIMITED_MIN_FIELDS,
            found: parts.len(),
        });
    }

    let mut values = [0.0; 4];
    for (slot, (field, raw)) in values
        .iter_mut()
        .zip(Field::ALL.into_iter().zip(&parts[1..DELIMITED_MIN_FIELDS]))
    {
        *slot = parse_number(field, raw)?;
    }
    let status = Some(parts[0].trim())
        .filter(|status| !status.is_empty())
        .map(str::to_string);
    Ok((status, values))
}

fn parse_number(field: Field, raw: &str) -> Result<f64, DecodeError> {
    let raw = strip_framing(raw);
    let value = raw.parse::<f64>().map_err(|_| DecodeError::InvalidNumber {
        field: field.label(),
        raw: raw.to_string(),
    })?;
    if !value.is_finite() {
        return Err(DecodeError::NonFinite {
            field: field.label(),
        });
    }
    Ok(value)
}

/// 去掉首尾的空白与控制字节（STX/ETX/NUL/CR/LF）。
fn strip_framing(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c.is_control())
}
