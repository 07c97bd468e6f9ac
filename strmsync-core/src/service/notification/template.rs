//! Notification template rendering
//!
//! Text substitution over the fixed vocabulary of task-result counters.

use handlebars::Handlebars;

use crate::models::{TaskResultPayload, TemplateType};
use crate::{Error, Result};

const TASK_COMPLETED_TEMPLATE: &str = "\
✅ Task completed: {{taskName}}
Source: {{sourcePath}}
Target: {{targetPath}}
Duration: {{duration}}s
Files: {{totalFile}} total, {{generatedFile}} generated, {{skipFile}} skipped
Metadata: {{metadataDownloaded}}/{{metadataCount}} downloaded
Subtitles: {{subtitleDownloaded}}/{{subtitleCount}} downloaded
Failed: {{failedCount}}
Time: {{eventTime}}";

const TASK_FAILED_TEMPLATE: &str = "\
❌ Task failed: {{taskName}}
Source: {{sourcePath}}
Target: {{targetPath}}
Duration: {{duration}}s
Files: {{totalFile}} total, {{generatedFile}} generated, {{skipFile}} skipped
Failed: {{failedCount}}
Error: {{errorMessage}}
Time: {{eventTime}}";

/// Template renderer
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(
                &TemplateType::TaskCompleted.to_string(),
                TASK_COMPLETED_TEMPLATE,
            )
            .map_err(|e| Error::Internal(format!("bad template: {e}")))?;
        registry
            .register_template_string(
                &TemplateType::TaskFailed.to_string(),
                TASK_FAILED_TEMPLATE,
            )
            .map_err(|e| Error::Internal(format!("bad template: {e}")))?;
        Ok(Self { registry })
    }

    /// Render a payload with the named template.
    pub fn render(
        &self,
        template_type: TemplateType,
        payload: &serde_json::Value,
    ) -> Result<String> {
        self.registry
            .render(&template_type.to_string(), payload)
            .map_err(|e| Error::Internal(format!("template render failed: {e}")))
    }

    /// Render a typed payload.
    pub fn render_payload(
        &self,
        template_type: TemplateType,
        payload: &TaskResultPayload,
    ) -> Result<String> {
        let value = serde_json::to_value(payload)?;
        self.render(template_type, &value)
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TaskResultPayload {
        TaskResultPayload {
            task_name: "Movies".to_string(),
            status: "completed".to_string(),
            duration: 93,
            source_path: "/A".to_string(),
            target_path: "/out".to_string(),
            total_file: 3,
            generated_file: 1,
            skip_file: 0,
            metadata_count: 2,
            subtitle_count: 0,
            metadata_downloaded: 2,
            subtitle_downloaded: 0,
            failed_count: 0,
            error_message: String::new(),
            event_time: "2024-05-01 12:00:00".to_string(),
        }
    }

    #[test]
    fn test_render_completed() {
        let renderer = TemplateRenderer::new().unwrap();
        let text = renderer
            .render_payload(TemplateType::TaskCompleted, &payload())
            .unwrap();
        assert!(text.contains("Task completed: Movies"));
        assert!(text.contains("Duration: 93s"));
        assert!(text.contains("3 total, 1 generated, 0 skipped"));
        assert!(text.contains("Metadata: 2/2 downloaded"));
    }

    #[test]
    fn test_render_failed_includes_error() {
        let renderer = TemplateRenderer::new().unwrap();
        let mut p = payload();
        p.status = "failed".to_string();
        p.error_message = "listing failed: code 403".to_string();
        let text = renderer
            .render_payload(TemplateType::TaskFailed, &p)
            .unwrap();
        assert!(text.contains("Task failed: Movies"));
        assert!(text.contains("Error: listing failed: code 403"));
    }
}
