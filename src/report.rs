//! Before/after diagnostics logged when the cleaner runs in debug mode.

use crate::engine::Pattern;
use crate::engine::markup::truncate_on_char_boundary;

const MAX_EXAMPLES: usize = 3;
const MAX_LINE_SAMPLES: usize = 5;
const MAX_LINES_COMPARED: usize = 100;
const SAMPLE_LEN: usize = 200;

static ANALYSIS: [Pattern; 6] = [
    Pattern::new("mso_style_declarations", r"(?i)mso-[^:=\s>]*:[^;>]*;?"),
    Pattern::new("mso_class_attributes", r#"(?i)class\s*=\s*["'][^"']*(?:Mso|mso)[^"']*["']"#),
    Pattern::new("word_xml_tags", r"(?i)</?(?:o:p|w:[^>]*|m:[^>]*|v:[^>]*)>"),
    Pattern::new("conditional_comments", r"(?is)<!--\[if.*?\]>.*?<!\[endif\]-->"),
    Pattern::new("style_attributes", r#"(?i)style\s*=\s*["'][^"']*["']"#),
    Pattern::new("font_declarations", r"(?i)font-[a-z]+\s*:[^;>]*;?"),
];

#[derive(Clone, Debug, PartialEq)]
pub struct PatternFinding {
    pub name: &'static str,
    /// Matches in the original content.
    pub count: usize,
    pub examples: Vec<String>,
}

/// A line that differs between the original and the cleaned content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineChange {
    pub line: usize,
    pub before: String,
    pub after: String,
}

/// What one cleaning run changed.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeReport {
    pub original_len: usize,
    pub cleaned_len: usize,
    pub findings: Vec<PatternFinding>,
    pub changed_lines: usize,
    pub samples: Vec<LineChange>,
}

impl ChangeReport {
    pub fn analyze(original: &str, cleaned: &str) -> Self {
        let findings = ANALYSIS
            .iter()
            .filter_map(|pattern| {
                let re = pattern.regex().ok()?;
                let count = re.find_iter(original).count();
                (count > 0).then(|| PatternFinding {
                    name: pattern.name(),
                    count,
                    examples: re
                        .find_iter(original)
                        .take(MAX_EXAMPLES)
                        .map(|m| sample(m.as_str()))
                        .collect(),
                })
            })
            .collect();

        let before: Vec<&str> = original.lines().collect();
        let after: Vec<&str> = cleaned.lines().collect();
        let compared = before.len().max(after.len()).min(MAX_LINES_COMPARED);
        let mut changed_lines = 0;
        let mut samples = Vec::new();
        for line in 0..compared {
            let b = before.get(line).copied().unwrap_or("");
            let a = after.get(line).copied().unwrap_or("");
            if a != b {
                changed_lines += 1;
                if samples.len() < MAX_LINE_SAMPLES {
                    samples.push(LineChange {
                        line: line + 1,
                        before: sample(b),
                        after: sample(a),
                    });
                }
            }
        }

        Self {
            original_len: original.len(),
            cleaned_len: cleaned.len(),
            findings,
            changed_lines,
            samples,
        }
    }

    pub fn bytes_removed(&self) -> usize {
        self.original_len.saturating_sub(self.cleaned_len)
    }

    pub fn reduction_percent(&self) -> f64 {
        if self.original_len == 0 {
            return 0.0;
        }
        (self.bytes_removed() as f64 / self.original_len as f64 * 10_000.0).round() / 100.0
    }

    /// Emit the report at debug level.
    pub fn log(&self, context: &str) {
        tracing::debug!(
            "{context}: {} -> {} bytes ({}% removed), {} lines changed",
            self.original_len,
            self.cleaned_len,
            self.reduction_percent(),
            self.changed_lines
        );
        for finding in &self.findings {
            tracing::debug!("{context}: {} x{} e.g. {:?}", finding.name, finding.count, finding.examples);
        }
        for change in &self.samples {
            tracing::debug!("{context}: line {}: {:?} -> {:?}", change.line, change.before, change.after);
        }
    }
}

fn sample(text: &str) -> String {
    let truncated = truncate_on_char_boundary(text, SAMPLE_LEN);
    if truncated.len() < text.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_findings_and_size() {
        let original = "<p class=\"MsoNormal\" style=\"mso-bidi-font-size:11pt\">a<o:p></o:p></p>\n<p>same</p>";
        let cleaned = "<p>a</p>\n<p>same</p>";
        let report = ChangeReport::analyze(original, cleaned);
        assert_eq!(report.cleaned_len, cleaned.len());
        assert!(report.bytes_removed() > 0);
        assert!(report.reduction_percent() > 50.0);
        assert_eq!(report.changed_lines, 1);
        assert_eq!(report.samples[0].line, 1);
        let names: Vec<_> = report.findings.iter().map(|f| f.name).collect();
        assert!(names.contains(&"mso_class_attributes"));
        assert!(names.contains(&"word_xml_tags"));
    }

    #[test]
    fn examples_are_capped() {
        let original = "<o:p></o:p>".repeat(10);
        let report = ChangeReport::analyze(&original, "");
        let xml = report.findings.iter().find(|f| f.name == "word_xml_tags").unwrap();
        assert_eq!(xml.count, 20);
        assert_eq!(xml.examples.len(), MAX_EXAMPLES);
    }

    #[test]
    fn long_samples_are_truncated() {
        assert!(sample(&"x".repeat(500)).ends_with("..."));
        assert_eq!(sample("short"), "short");
    }
}
