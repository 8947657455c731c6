//! Just enough XML-RPC for string-in, string-out calls: every method we speak takes
//! string parameters and returns a string (usually JSON text).

use std::fmt::Write as _;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum XmlRpcError {
    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },
    #[error("malformed XML-RPC document: {0}")]
    Malformed(&'static str),
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|h| u32::from_str_radix(h, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

fn between<'a>(s: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = s.find(open)? + open.len();
    let end = s[start..].find(close)? + start;
    Some(&s[start..end])
}

/// Text of a scalar `<value>` body: `<string>x</string>`, `<int>1</int>`, `<string/>` or bare text.
fn scalar_text(inner: &str) -> Result<String, XmlRpcError> {
    let inner = inner.trim();
    let Some(tag_body) = inner.strip_prefix('<') else {
        return Ok(unescape(inner));
    };
    let close = tag_body.find('>').ok_or(XmlRpcError::Malformed("unterminated tag"))?;
    let tag = &tag_body[..close];
    if let Some(name) = tag.strip_suffix('/') {
        return match name.trim() {
            "string" | "nil" => Ok(String::new()),
            _ => Err(XmlRpcError::Malformed("empty scalar")),
        };
    }
    let end_tag = format!("</{tag}>");
    let body = &tag_body[close + 1..];
    let end = body
        .find(&end_tag)
        .ok_or(XmlRpcError::Malformed("missing closing tag"))?;
    Ok(unescape(&body[..end]))
}

pub fn encode_call(method: &str, params: &[&str]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for p in params {
        let _ = write!(out, "<param><value><string>{}</string></value></param>", escape(p));
    }
    out.push_str("</params></methodCall>\n");
    out
}

pub fn decode_response(body: &str) -> Result<String, XmlRpcError> {
    if let Some(fault) = between(body, "<fault>", "</fault>") {
        let code = member(fault, "faultCode")
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(0);
        let message = member(fault, "faultString").unwrap_or_default();
        return Err(XmlRpcError::Fault { code, message });
    }
    let params = between(body, "<params>", "</params>")
        .ok_or(XmlRpcError::Malformed("no params in response"))?;
    let value = between(params, "<value>", "</value>")
        .ok_or(XmlRpcError::Malformed("no value in response"))?;
    scalar_text(value)
}

fn member(fault: &str, name: &str) -> Option<String> {
    let at = fault.find(&format!("<name>{name}</name>"))?;
    let value = between(&fault[at..], "<value>", "</value>")?;
    scalar_text(value).ok()
}

/// Server side: method name and string parameters of a `methodCall`.
pub fn decode_call(body: &str) -> Result<(String, Vec<String>), XmlRpcError> {
    let method = between(body, "<methodName>", "</methodName>")
        .ok_or(XmlRpcError::Malformed("no methodName"))?
        .trim()
        .to_string();
    let mut params = Vec::new();
    if let Some(mut rest) = between(body, "<params>", "</params>") {
        while let Some(v) = between(rest, "<value>", "</value>") {
            params.push(scalar_text(v)?);
            let consumed = rest.find("</value>").map(|i| i + "</value>".len());
            rest = consumed.map(|i| &rest[i..]).unwrap_or("");
        }
    }
    Ok((method, params))
}

pub fn encode_response(value: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<methodResponse><params><param><value><string>{}</string></value></param></params></methodResponse>\n",
        escape(value)
    )
}

pub fn encode_fault(code: i64, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<methodResponse><fault><value><struct>\
<member><name>faultCode</name><value><int>{code}</int></value></member>\
<member><name>faultString</name><value><string>{}</string></value></member>\
</struct></value></fault></methodResponse>\n",
        escape(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_survives_the_wire() {
        let body = encode_call("getPlugin", &["cpu & <mem>"]);
        let (m, p) = decode_call(&body).unwrap();
        assert_eq!(m, "getPlugin");
        assert_eq!(p, vec!["cpu & <mem>".to_string()]);
    }

    #[test]
    fn call_without_params() {
        let (m, p) = decode_call(&encode_call("init", &[])).unwrap();
        assert_eq!(m, "init");
        assert!(p.is_empty());
    }

    #[test]
    fn decodes_python_style_responses() {
        let bare = "<?xml version='1.0'?><methodResponse><params><param>\n<value>4.3.0</value>\n</param></params></methodResponse>";
        assert_eq!(decode_response(bare).unwrap(), "4.3.0");
        let json = "<methodResponse><params><param><value><string>{&quot;idle&quot;: 90}</string></value></param></params></methodResponse>";
        assert_eq!(decode_response(json).unwrap(), "{\"idle\": 90}");
        let empty = "<methodResponse><params><param><value><string/></value></param></params></methodResponse>";
        assert_eq!(decode_response(empty).unwrap(), "");
    }

    #[test]
    fn fault_is_reported() {
        let err = decode_response(&encode_fault(1, "<class 'KeyError'>")).unwrap_err();
        assert_eq!(
            err,
            XmlRpcError::Fault {
                code: 1,
                message: "<class 'KeyError'>".into()
            }
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode_response("<html>nope</html>"),
            Err(XmlRpcError::Malformed(_))
        ));
    }

    #[test]
    fn numeric_entities() {
        assert_eq!(unescape("a&#65;&#x42;&bogus;"), "aAB&bogus;");
    }
}
