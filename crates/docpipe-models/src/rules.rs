use regex::Regex;

use docpipe_core::{DocumentFields, FieldRule, PipelineError, RecognitionResult, Result, RuleModel};

/// Rule-kind model: ordered regex rules applied to the recognized full text.
///
/// Each rule's first capture group becomes the field value; the first match
/// wins, later matches for the same field are ignored.
#[derive(Debug)]
pub struct RegexRuleModel {
    rules: Vec<(String, Regex)>,
}

impl RegexRuleModel {
    /// Compile the rule set. A malformed pattern is a real load failure:
    /// the model must not come up resident with half its rules.
    pub fn compile(rules: &[FieldRule]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = Regex::new(&rule.pattern).map_err(|e| {
                PipelineError::LoadError(format!("rule '{}': {e}", rule.field))
            })?;
            compiled.push((rule.field.clone(), regex));
        }
        Ok(Self { rules: compiled })
    }
}

impl RuleModel for RegexRuleModel {
    fn extract(&self, recognition: &RecognitionResult) -> Result<DocumentFields> {
        let text = recognition.full_text();
        let mut fields = DocumentFields::default();

        for (field, regex) in &self.rules {
            if fields.fields.contains_key(field) {
                continue;
            }
            if let Some(captures) = regex.captures(text) {
                let value = captures
                    .get(1)
                    .map(|m| m.as_str())
                    .unwrap_or_else(|| captures.get(0).map(|m| m.as_str()).unwrap_or(""));
                fields.fields.insert(field.clone(), value.trim().to_string());
            }
        }

        tracing::debug!(extracted = fields.fields.len(), rules = self.rules.len(), "rule extraction");
        Ok(fields)
    }
}

/// Default invoice field rules, registered as `invoice_fields_v1`.
pub fn invoice_field_rules() -> Vec<FieldRule> {
    vec![
        FieldRule {
            field: "invoice_number".into(),
            pattern: r"(?i)invoice\s*(?:no|number|#)[.:]?\s*([A-Za-z0-9/-]+)".into(),
        },
        FieldRule {
            field: "date".into(),
            pattern: r"(?i)date[.:]?\s*(\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4})".into(),
        },
        FieldRule {
            field: "total".into(),
            pattern: r"(?i)total[.:]?\s*([0-9][0-9.,]*)".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_core::TextReading;

    fn reading(text: &str) -> RecognitionResult {
        RecognitionResult::whole_image(TextReading {
            text: text.to_string(),
            regions: vec![],
        })
    }

    #[test]
    fn extracts_invoice_fields() {
        let model = RegexRuleModel::compile(&invoice_field_rules()).unwrap();
        let fields = model
            .extract(&reading("Invoice No: INV-042 Date: 2024-11-03 Total: 1,250.00"))
            .unwrap();

        assert_eq!(fields.fields["invoice_number"], "INV-042");
        assert_eq!(fields.fields["date"], "2024-11-03");
        assert_eq!(fields.fields["total"], "1,250.00");
    }

    #[test]
    fn missing_fields_are_absent_not_empty() {
        let model = RegexRuleModel::compile(&invoice_field_rules()).unwrap();
        let fields = model.extract(&reading("no structure here")).unwrap();
        assert!(fields.fields.is_empty());
    }

    #[test]
    fn bad_pattern_is_a_load_error() {
        let err = RegexRuleModel::compile(&[FieldRule {
            field: "broken".into(),
            pattern: "([unclosed".into(),
        }])
        .unwrap_err();
        assert!(matches!(err, PipelineError::LoadError(_)));
    }
}
