use crate::frame::StackFrame;
use serde::{Deserialize, Serialize};

/// A parsed failure signal to localize
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizeRequest {
    /// Stack frames, innermost first
    #[serde(default)]
    pub frames: Vec<StackFrame>,

    /// Exception type and message, or any other free text
    #[serde(default)]
    pub free_text: String,

    /// Overrides the configured number of candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    /// Embedding of `free_text`, when the caller already has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_vector: Option<Vec<f32>>,
}

impl LocalizeRequest {
    pub fn new(free_text: impl Into<String>) -> Self {
        Self {
            free_text: free_text.into(),
            ..Default::default()
        }
    }

    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = StackFrame>) -> Self {
        self.frames.extend(frames);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_query_vector(mut self, vector: Vec<f32>) -> Self {
        self.query_vector = Some(vector);
        self
    }

    /// Text searched lexically: the free text followed by each distinct
    /// frame method name
    pub fn query_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let free_text = self.free_text.trim();
        if !free_text.is_empty() {
            parts.push(free_text);
        }
        for frame in &self.frames {
            let method = frame.method_name.trim();
            if !method.is_empty() && !parts.contains(&method) {
                parts.push(method);
            }
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_text_appends_method_names_once() {
        let request = LocalizeRequest::new("  ValueError: missing payload ")
            .with_frame(StackFrame::new("app/api.py", 10, "handle"))
            .with_frame(StackFrame::new("app/validator.py", 20, "validate"))
            .with_frame(StackFrame::new("app/validator.py", 31, "validate"));

        assert_eq!(
            request.query_text(),
            "ValueError: missing payload handle validate"
        );
    }

    #[test]
    fn test_query_text_without_free_text() {
        let request = LocalizeRequest::default().with_frame(StackFrame::new("a.py", 1, "run"));
        assert_eq!(request.query_text(), "run");
        assert_eq!(LocalizeRequest::default().query_text(), "");
    }
}
