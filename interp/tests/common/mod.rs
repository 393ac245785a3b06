//! A minimal content-stream tokenizer standing in for the external
//! parser in tests.

use pdfkit::content::{Token, Tokenize};
use pdfkit::error::{PdfError, Result};
use pdfkit::primitive::{Dictionary, Name, PdfString, Primitive};

pub struct TestTokenizer;

impl Tokenize for TestTokenizer {
    fn tokens(&self, data: &[u8]) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < data.len() {
            skip_whitespace(data, &mut i);
            if i >= data.len() {
                break;
            }
            if let Some(value) = parse_value(data, &mut i)? {
                tokens.push(Token::Operand(value));
                continue;
            }
            let word = read_word(data, &mut i);
            if word.is_empty() {
                return Err(PdfError::ParseStructural {
                    reason: format!("stray byte {:#04x}", data[i]),
                });
            }
            match word.as_str() {
                "true" => tokens.push(Token::Operand(Primitive::Boolean(true))),
                "false" => tokens.push(Token::Operand(Primitive::Boolean(false))),
                "null" => tokens.push(Token::Operand(Primitive::Null)),
                "ID" => {
                    tokens.push(Token::operator("ID"));
                    // one whitespace byte, then raw data up to EI
                    if i < data.len() && is_whitespace(data[i]) {
                        i += 1;
                    }
                    let start = i;
                    while i + 1 < data.len() {
                        if data[i] == b'E'
                            && data[i + 1] == b'I'
                            && (i == 0 || is_whitespace(data[i - 1]))
                        {
                            break;
                        }
                        i += 1;
                    }
                    let end = if i + 1 < data.len() { i } else { data.len() };
                    let mut bytes = data[start..end].to_vec();
                    while bytes.last().map_or(false, |&b| is_whitespace(b)) {
                        bytes.pop();
                    }
                    tokens.push(Token::ImageData(bytes));
                }
                _ => tokens.push(Token::Operator(word)),
            }
        }
        Ok(tokens)
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn skip_whitespace(data: &[u8], i: &mut usize) {
    loop {
        while *i < data.len() && is_whitespace(data[*i]) {
            *i += 1;
        }
        if *i < data.len() && data[*i] == b'%' {
            while *i < data.len() && data[*i] != b'\n' {
                *i += 1;
            }
            continue;
        }
        break;
    }
}

fn read_word(data: &[u8], i: &mut usize) -> String {
    let start = *i;
    while *i < data.len() && !is_whitespace(data[*i]) && !is_delimiter(data[*i]) {
        *i += 1;
    }
    String::from_utf8_lossy(&data[start..*i]).into_owned()
}

/// `Ok(None)` when the next token is not a value (an operator).
fn parse_value(data: &[u8], i: &mut usize) -> Result<Option<Primitive>> {
    skip_whitespace(data, i);
    if *i >= data.len() {
        return Ok(None);
    }
    match data[*i] {
        b'/' => {
            *i += 1;
            let mut name = String::new();
            while *i < data.len() && !is_whitespace(data[*i]) && !is_delimiter(data[*i]) {
                if data[*i] == b'#' && *i + 2 < data.len() {
                    let hex = std::str::from_utf8(&data[*i + 1..*i + 3]).unwrap_or("");
                    if let Ok(b) = u8::from_str_radix(hex, 16) {
                        name.push(b as char);
                        *i += 3;
                        continue;
                    }
                }
                name.push(data[*i] as char);
                *i += 1;
            }
            Ok(Some(Primitive::Name(Name::new(&name))))
        }
        b'(' => {
            *i += 1;
            let mut bytes = Vec::new();
            let mut depth = 1;
            while *i < data.len() && depth > 0 {
                match data[*i] {
                    b'\\' if *i + 1 < data.len() => {
                        let escaped = data[*i + 1];
                        bytes.push(match escaped {
                            b'n' => b'\n',
                            b'r' => b'\r',
                            b't' => b'\t',
                            b'b' => 8,
                            b'f' => 12,
                            other => other,
                        });
                        *i += 2;
                    }
                    b'(' => {
                        depth += 1;
                        bytes.push(b'(');
                        *i += 1;
                    }
                    b')' => {
                        depth -= 1;
                        if depth > 0 {
                            bytes.push(b')');
                        }
                        *i += 1;
                    }
                    b => {
                        bytes.push(b);
                        *i += 1;
                    }
                }
            }
            Ok(Some(Primitive::String(PdfString::new(bytes))))
        }
        b'<' if data.get(*i + 1) == Some(&b'<') => {
            *i += 2;
            let mut dict = Dictionary::new();
            loop {
                skip_whitespace(data, i);
                if data[*i..].starts_with(b">>") {
                    *i += 2;
                    break;
                }
                let key = match parse_value(data, i)? {
                    Some(Primitive::Name(n)) => n,
                    _ => {
                        return Err(PdfError::ParseStructural {
                            reason: "dictionary key is not a name".into(),
                        })
                    }
                };
                let value = parse_value(data, i)?.ok_or(PdfError::ParseStructural {
                    reason: "missing dictionary value".into(),
                })?;
                dict.insert(key, value);
            }
            Ok(Some(Primitive::Dictionary(dict)))
        }
        b'<' => {
            *i += 1;
            let mut digits = Vec::new();
            while *i < data.len() && data[*i] != b'>' {
                if !is_whitespace(data[*i]) {
                    digits.push(data[*i]);
                }
                *i += 1;
            }
            *i += 1;
            if digits.len() % 2 == 1 {
                digits.push(b'0');
            }
            let bytes = digits
                .chunks(2)
                .map(|pair| {
                    let hex = std::str::from_utf8(pair).unwrap_or("00");
                    u8::from_str_radix(hex, 16).unwrap_or(0)
                })
                .collect();
            Ok(Some(Primitive::String(PdfString::new(bytes))))
        }
        b'[' => {
            *i += 1;
            let mut items = Vec::new();
            loop {
                skip_whitespace(data, i);
                if *i >= data.len() {
                    return Err(PdfError::ParseStructural {
                        reason: "unterminated array".into(),
                    });
                }
                if data[*i] == b']' {
                    *i += 1;
                    break;
                }
                let value = parse_value(data, i)?.ok_or(PdfError::ParseStructural {
                    reason: "operator inside array".into(),
                })?;
                items.push(value);
            }
            Ok(Some(Primitive::Array(items)))
        }
        b'+' | b'-' | b'.' | b'0'..=b'9' => {
            let word = read_number(data, i);
            if word.contains('.') {
                word.parse::<f32>()
                    .map(|n| Some(Primitive::Number(n)))
                    .map_err(|_| PdfError::ParseStructural {
                        reason: format!("bad number {}", word),
                    })
            } else {
                word.parse::<i32>()
                    .map(|n| Some(Primitive::Integer(n)))
                    .map_err(|_| PdfError::ParseStructural {
                        reason: format!("bad number {}", word),
                    })
            }
        }
        _ => Ok(None),
    }
}

fn read_number(data: &[u8], i: &mut usize) -> String {
    let start = *i;
    if matches!(data[*i], b'+' | b'-') {
        *i += 1;
    }
    while *i < data.len() && matches!(data[*i], b'0'..=b'9' | b'.') {
        *i += 1;
    }
    String::from_utf8_lossy(&data[start..*i]).into_owned()
}
