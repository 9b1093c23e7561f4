use nexus_runtime::{builtin_template, TemplateType};

const ALL: &[TemplateType] = &[
    TemplateType::CostOptimization,
    TemplateType::SecurityHardening,
    TemplateType::Deployment,
    TemplateType::IncidentResponse,
    TemplateType::ComplianceAudit,
    TemplateType::MlModelLifecycle,
];

pub fn execute() -> anyhow::Result<()> {
    for template_type in ALL {
        let template = builtin_template(*template_type);
        println!("{:?}", template_type);
        for step in &template.steps {
            let tags = match (!step.required, step.approval_required) {
                (true, true) => " [optional, approval]",
                (true, false) => " [optional]",
                (false, true) => " [approval]",
                (false, false) => "",
            };
            println!("  - {} ({}){}", step.agent_name, step.display_name, tags);
        }
    }
    Ok(())
}
