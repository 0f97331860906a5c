use serde::{Deserialize, Serialize};

/// One frame of a parsed stack trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    pub file_path: String,

    /// 1-indexed
    pub line_number: usize,

    pub method_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl StackFrame {
    pub fn new(
        file_path: impl Into<String>,
        line_number: usize,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
            method_name: method_name.into(),
            class_name: None,
            package: None,
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// `Class.method`, or just `method` for free functions
    pub fn full_method(&self) -> String {
        match &self.class_name {
            Some(class_name) => format!("{class_name}.{}", self.method_name),
            None => self.method_name.clone(),
        }
    }

    /// `package.Class.method` when the frame names a package
    pub fn qualified_method(&self) -> Option<String> {
        self.package
            .as_ref()
            .filter(|package| !package.is_empty())
            .map(|package| format!("{package}.{}", self.full_method()))
    }
}
