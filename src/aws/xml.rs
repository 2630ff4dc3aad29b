//! EC2 XML rendering
//!
//! Success bodies are `<{Action}Response xmlns=...>` documents with a
//! `<requestId>` first; lists are `<fooSet><item>...</item></fooSet>`.
//! Fields are pushed through [`XmlFields`] so that "omit when empty" stays a
//! decision of the builder call, not of the renderer.

use std::fmt::Write;

use crate::core::ErrorEnvelope;

/// Namespace of the 2016-11-15 EC2 API
pub const EC2_XMLNS: &str = "http://ec2.amazonaws.com/doc/2016-11-15/";

#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    Text(String),
    Bool(bool),
    Int(i64),
    Struct(XmlFields),
    List(Vec<XmlValue>),
}

/// Ordered element list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlFields {
    fields: Vec<(String, XmlValue)>,
}

impl XmlFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.fields
            .push((name.to_string(), XmlValue::Text(value.as_ref().to_string())));
        self
    }

    /// Text element, skipped when absent or empty
    pub fn opt_text(self, name: &str, value: Option<impl AsRef<str>>) -> Self {
        match value {
            Some(v) if !v.as_ref().is_empty() => self.text(name, v),
            _ => self,
        }
    }

    pub fn bool(mut self, name: &str, value: bool) -> Self {
        self.fields.push((name.to_string(), XmlValue::Bool(value)));
        self
    }

    pub fn int(mut self, name: &str, value: i64) -> Self {
        self.fields.push((name.to_string(), XmlValue::Int(value)));
        self
    }

    pub fn structure(mut self, name: &str, value: XmlFields) -> Self {
        self.fields.push((name.to_string(), XmlValue::Struct(value)));
        self
    }

    /// `<name><item>..</item></name>`, skipped when empty
    pub fn list(self, name: &str, items: Vec<XmlValue>) -> Self {
        if items.is_empty() {
            return self;
        }
        self.set(name, items)
    }

    /// Like [`XmlFields::list`] but rendered even when empty
    pub fn set(mut self, name: &str, items: Vec<XmlValue>) -> Self {
        self.fields.push((name.to_string(), XmlValue::List(items)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rendered child element, for assertions
    pub fn get(&self, name: &str) -> Option<&XmlValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn write_to(&self, out: &mut String) {
        for (name, value) in &self.fields {
            write_element(out, name, value);
        }
    }
}

fn write_element(out: &mut String, name: &str, value: &XmlValue) {
    let _ = write!(out, "<{}>", name);
    write_value(out, value);
    let _ = write!(out, "</{}>", name);
}

fn write_value(out: &mut String, value: &XmlValue) {
    match value {
        XmlValue::Text(text) => out.push_str(&escape(text)),
        XmlValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        XmlValue::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        XmlValue::Struct(fields) => fields.write_to(out),
        XmlValue::List(items) => {
            for item in items {
                write_element(out, "item", item);
            }
        }
    }
}

/// Escape the five XML special characters
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Success document for an action
pub fn render_response(action: &str, request_id: &str, fields: &XmlFields) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = write!(out, "<{}Response xmlns=\"{}\">", action, EC2_XMLNS);
    let _ = write!(out, "<requestId>{}</requestId>", escape(request_id));
    fields.write_to(&mut out);
    let _ = write!(out, "</{}Response>", action);
    out
}

/// Error document for an envelope
pub fn serialize_error_response(err: &ErrorEnvelope, request_id: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response><Errors><Error><Code>{}</Code><Message>{}</Message></Error></Errors><RequestID>{}</RequestID></Response>",
        escape(&err.code),
        escape(&err.message),
        escape(request_id)
    )
}
