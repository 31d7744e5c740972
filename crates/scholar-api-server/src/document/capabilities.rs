use serde::Serialize;

/// Which upload kinds this deployment can actually handle, computed once at
/// startup and reported over `/api/capabilities`. Text extractors are
/// compiled in; vision depends on a configured vision model.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExtractorCapabilities {
    pub pdf: bool,
    pub docx: bool,
    pub plain_text: bool,
    pub vision: bool,
}

impl ExtractorCapabilities {
    pub fn detect(vision_enabled: bool) -> Self {
        Self {
            pdf: true,
            docx: true,
            plain_text: true,
            vision: vision_enabled,
        }
    }

    /// One-line summary for the startup log.
    pub fn summary(&self) -> String {
        let mut enabled = Vec::new();
        if self.pdf {
            enabled.push("pdf");
        }
        if self.docx {
            enabled.push("docx");
        }
        if self.plain_text {
            enabled.push("text");
        }
        if self.vision {
            enabled.push("vision");
        }
        enabled.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reflects_vision_flag() {
        assert_eq!(
            ExtractorCapabilities::detect(false).summary(),
            "pdf, docx, text"
        );
        assert_eq!(
            ExtractorCapabilities::detect(true).summary(),
            "pdf, docx, text, vision"
        );
    }
}
