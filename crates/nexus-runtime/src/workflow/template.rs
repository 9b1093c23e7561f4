//! Workflow templates: a table of named pipelines, each a flat ordered
//! step list, plus `detect_template`, a pure keyword-table lookup from
//! free text to the first matching template type (not an agent call).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    CostOptimization,
    SecurityHardening,
    Deployment,
    IncidentResponse,
    ComplianceAudit,
    MlModelLifecycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub agent_name: String,
    pub display_name: String,
    pub required: bool,
    pub approval_required: bool,
}

impl Step {
    pub fn new(agent_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            display_name: display_name.into(),
            required: true,
            approval_required: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn needs_approval(mut self) -> Self {
        self.approval_required = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub template_type: TemplateType,
    pub name: String,
    pub steps: Vec<Step>,
    pub estimated_duration_secs: u64,
    pub risk_level: RiskLevel,
}

/// Keyword -> template lookup table. Matched in declaration order against
/// a lowercased input string; first hit wins. A pure function, not an
/// agent call, matching the original's `detect_workflow_intent`.
const KEYWORDS: &[(&str, TemplateType)] = &[
    ("cost", TemplateType::CostOptimization),
    ("spend", TemplateType::CostOptimization),
    ("budget", TemplateType::CostOptimization),
    ("security", TemplateType::SecurityHardening),
    ("harden", TemplateType::SecurityHardening),
    ("vulnerability", TemplateType::SecurityHardening),
    ("deploy", TemplateType::Deployment),
    ("release", TemplateType::Deployment),
    ("rollout", TemplateType::Deployment),
    ("incident", TemplateType::IncidentResponse),
    ("outage", TemplateType::IncidentResponse),
    ("down", TemplateType::IncidentResponse),
    ("compliance", TemplateType::ComplianceAudit),
    ("audit", TemplateType::ComplianceAudit),
    ("regulation", TemplateType::ComplianceAudit),
    ("model", TemplateType::MlModelLifecycle),
    ("training", TemplateType::MlModelLifecycle),
    ("ml ", TemplateType::MlModelLifecycle),
];

pub fn detect_template(text: &str) -> Option<TemplateType> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|(_, t)| *t)
}

pub fn builtin_template(template_type: TemplateType) -> WorkflowTemplate {
    match template_type {
        TemplateType::CostOptimization => WorkflowTemplate {
            template_type,
            name: "Cost Optimization".into(),
            steps: vec![
                Step::new("cost-analyzer", "Analyze current spend"),
                Step::new("resource-rightsizer", "Recommend rightsizing").needs_approval(),
                Step::new("cost-reporter", "Report savings").optional(),
            ],
            estimated_duration_secs: 900,
            risk_level: RiskLevel::Low,
        },
        TemplateType::SecurityHardening => WorkflowTemplate {
            template_type,
            name: "Security Hardening".into(),
            steps: vec![
                Step::new("vuln-scanner", "Scan for vulnerabilities"),
                Step::new("patch-planner", "Plan remediation"),
                Step::new("patch-applier", "Apply patches").needs_approval(),
                Step::new("security-reporter", "Report findings").optional(),
            ],
            estimated_duration_secs: 1800,
            risk_level: RiskLevel::High,
        },
        TemplateType::Deployment => WorkflowTemplate {
            template_type,
            name: "Deployment".into(),
            steps: vec![
                Step::new("build-agent", "Build release artifact"),
                Step::new("test-agent", "Run test suite"),
                Step::new("deploy-agent", "Deploy to production").needs_approval(),
                Step::new("smoke-test-agent", "Run smoke tests"),
            ],
            estimated_duration_secs: 1200,
            risk_level: RiskLevel::High,
        },
        TemplateType::IncidentResponse => WorkflowTemplate {
            template_type,
            name: "Incident Response".into(),
            steps: vec![
                Step::new("triage-agent", "Triage incident"),
                Step::new("mitigation-agent", "Apply mitigation").needs_approval(),
                Step::new("postmortem-agent", "Draft postmortem").optional(),
            ],
            estimated_duration_secs: 600,
            risk_level: RiskLevel::High,
        },
        TemplateType::ComplianceAudit => WorkflowTemplate {
            template_type,
            name: "Compliance Audit".into(),
            steps: vec![
                Step::new("control-mapper", "Map controls to evidence"),
                Step::new("gap-analyzer", "Identify gaps"),
                Step::new("audit-reporter", "Generate audit report").optional(),
            ],
            estimated_duration_secs: 2400,
            risk_level: RiskLevel::Medium,
        },
        TemplateType::MlModelLifecycle => WorkflowTemplate {
            template_type,
            name: "ML Model Lifecycle".into(),
            steps: vec![
                Step::new("data-prep-agent", "Prepare training data"),
                Step::new("training-agent", "Train candidate model"),
                Step::new("eval-agent", "Evaluate against baseline"),
                Step::new("promotion-agent", "Promote to production").needs_approval(),
            ],
            estimated_duration_secs: 3600,
            risk_level: RiskLevel::Medium,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_deployment_keyword() {
        assert_eq!(detect_template("please deploy the new service"), Some(TemplateType::Deployment));
    }

    #[test]
    fn detects_incident_keyword() {
        assert_eq!(detect_template("we have an outage in prod"), Some(TemplateType::IncidentResponse));
    }

    #[test]
    fn unmatched_text_detects_nothing() {
        assert_eq!(detect_template("what's the weather like"), None);
    }

    #[test]
    fn every_template_type_has_a_builtin() {
        for t in [
            TemplateType::CostOptimization,
            TemplateType::SecurityHardening,
            TemplateType::Deployment,
            TemplateType::IncidentResponse,
            TemplateType::ComplianceAudit,
            TemplateType::MlModelLifecycle,
        ] {
            let tpl = builtin_template(t);
            assert!(!tpl.steps.is_empty());
        }
    }
}
