use serde::Serialize;

use crate::sandbox::SandboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Language {
    Python,
    JavaScript,
}

impl Language {
    pub(crate) fn parse(value: &str) -> Result<Self, SandboxError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" | "nodejs" => Ok(Language::JavaScript),
            _ => Err(SandboxError::UnsupportedLanguage(value.trim().to_string())),
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
        }
    }

    pub(crate) fn source_file(self) -> &'static str {
        match self {
            Language::Python => "main.py",
            Language::JavaScript => "main.js",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Language;

    #[test]
    fn parses_aliases() {
        assert_eq!(Language::parse("Python3").unwrap(), Language::Python);
        assert_eq!(Language::parse(" js ").unwrap(), Language::JavaScript);
        assert_eq!(Language::parse("node").unwrap(), Language::JavaScript);
    }

    #[test]
    fn rejects_unknown_languages() {
        let err = Language::parse("cobol").unwrap_err();
        assert_eq!(err.to_string(), "unsupported language: cobol");
    }
}
