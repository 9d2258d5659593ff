//! Raw endpoint file structures.
//!
//! These mirror the YAML one-to-one. Required fields are `Option` so that
//! validation can name the missing field and entry instead of surfacing a
//! generic deserialization error. Unknown keys are rejected.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEndpoint {
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub response: Option<RawBehavior>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBehavior {
    #[serde(rename = "type")]
    pub kind: Option<String>,

    // static
    pub body: Option<String>,

    // template, image, stateful
    pub template: Option<String>,

    // image
    pub font: Option<String>,
    pub canvas: Option<RawCanvas>,
    pub font_size: Option<f32>,
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub padding: Option<u32>,
    pub max_text_len: Option<usize>,

    // stateful
    pub snapshot: Option<String>,
    pub mutation: Option<RawMutation>,
}

impl RawBehavior {
    /// Names of the optional fields that are set, in declaration order.
    pub fn present_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut mark = |set: bool, name: &'static str| {
            if set {
                fields.push(name);
            }
        };
        mark(self.body.is_some(), "body");
        mark(self.template.is_some(), "template");
        mark(self.font.is_some(), "font");
        mark(self.canvas.is_some(), "canvas");
        mark(self.font_size.is_some(), "font_size");
        mark(self.foreground.is_some(), "foreground");
        mark(self.background.is_some(), "background");
        mark(self.padding.is_some(), "padding");
        mark(self.max_text_len.is_some(), "max_text_len");
        mark(self.snapshot.is_some(), "snapshot");
        mark(self.mutation.is_some(), "mutation");
        fields
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCanvas {
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMutation {
    pub op: Option<String>,
    pub field: Option<String>,
    pub by: Option<i64>,
    pub value: Option<String>,
    pub max_len: Option<usize>,
}

impl RawMutation {
    pub fn present_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.field.is_some() {
            fields.push("field");
        }
        if self.by.is_some() {
            fields.push("by");
        }
        if self.value.is_some() {
            fields.push("value");
        }
        if self.max_len.is_some() {
            fields.push("max_len");
        }
        fields
    }
}
